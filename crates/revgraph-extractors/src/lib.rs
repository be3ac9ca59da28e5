pub mod api;
pub mod ci;
pub mod cli;
pub mod env;
pub mod model;
pub mod module;
pub mod route;

use std::path::Path;

use anyhow::Result;
use tracing::debug;

use revgraph_core::config::CONFIG_FILE;
use revgraph_core::{
    Config, ExtractError, ExtractOptions, Extraction, ExtractionPipeline, ExtractorPass,
};

pub use api::ApiPass;
pub use ci::CiJobPass;
pub use cli::CliPass;
pub use env::EnvPass;
pub use model::ModelPass;
pub use module::ModulePass;
pub use route::{RouteMatcher, RoutePass};

/// The seven built-in passes, in the order their output is merged.
pub fn default_passes() -> Result<Vec<Box<dyn ExtractorPass>>> {
    Ok(vec![
        Box::new(CliPass::new()?),
        Box::new(CiJobPass::new()),
        Box::new(EnvPass::new()?),
        Box::new(ModulePass::new()?),
        Box::new(RoutePass::new()?),
        Box::new(ApiPass::new()?),
        Box::new(ModelPass::new()?),
    ])
}

/// Pipeline over the built-in passes.
pub fn pipeline(config: Config) -> Result<ExtractionPipeline> {
    ExtractionPipeline::new(default_passes()?, config)
}

/// Extract the entity graph of the repository at `root`.
///
/// Configuration comes from `.ai/extractor.toml` when present; a malformed
/// file falls back to defaults. That and every per-file and per-input failure
/// end up in [`Extraction::diagnostics`]; an `Err` here means the passes
/// themselves could not be built.
pub fn extract(root: &Path, options: &ExtractOptions) -> Result<Extraction> {
    debug!(root = %root.display(), incremental = options.is_incremental(), "starting extraction");
    let pipeline = match Config::load_project(root) {
        Ok(config) => pipeline(config)?,
        Err(e) => pipeline(Config::default())?.with_diagnostic(ExtractError::Config {
            path: CONFIG_FILE.to_string(),
            message: format!("{e:#}"),
        }),
    };
    Ok(pipeline.extract(root, options))
}

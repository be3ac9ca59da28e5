pub mod cache;
pub mod collector;
pub mod config;
pub mod error;
pub mod extractor;
pub mod globs;
pub mod lifecycle;
pub mod merge;
pub mod pipeline;
pub mod profile;
pub mod reachability;
pub mod resolve;
pub mod suppress;
pub mod testlink;
pub mod types;

pub use config::Config;
pub use error::{Diagnostic, ExtractError};
pub use extractor::{ExtractorPass, SourceFile};
pub use pipeline::{ExtractOptions, Extraction, ExtractionPipeline};
pub use types::*;

use std::fs;
use std::path::Path;

use revgraph_core::cache::CACHE_FILE;
use revgraph_core::profile::PROFILE_FILE;
use revgraph_core::{Entity, EntityType, ExtractOptions, Extraction, Lifecycle, RelationType};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn run(root: &Path) -> Extraction {
    revgraph_extractors::extract(root, &ExtractOptions::default()).unwrap()
}

fn entity<'a>(extraction: &'a Extraction, id: &str) -> &'a Entity {
    extraction
        .entities
        .iter()
        .find(|e| e.id.as_str() == id)
        .unwrap_or_else(|| panic!("missing entity {id}"))
}

fn has_relation(extraction: &Extraction, kind: RelationType, from: &str, to: &str) -> bool {
    extraction
        .relations
        .iter()
        .any(|r| r.kind == kind && r.from_id.as_str() == from && r.to_id.as_str() == to)
}

fn two_module_repo(root: &Path) {
    write(
        root,
        "tools/a.js",
        "import { bar } from './b.js';\n\nexport function foo() {\n  return bar();\n}\n",
    );
    write(root, "tools/b.js", "export function bar() {\n  return 1;\n}\n");
}

#[test]
fn test_end_to_end_modules_symbols_and_edges() {
    let dir = tempfile::tempdir().unwrap();
    two_module_repo(dir.path());

    let result = run(dir.path());
    for id in ["tools/a.js", "tools/a.js#foo", "tools/b.js", "tools/b.js#bar"] {
        entity(&result, id);
    }
    assert!(has_relation(&result, RelationType::DependsOn, "tools/a.js", "tools/b.js"));
    assert!(has_relation(&result, RelationType::Exposes, "tools/a.js", "tools/a.js#foo"));
    assert!(has_relation(&result, RelationType::Exposes, "tools/b.js", "tools/b.js#bar"));
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

    let edge = result
        .relations
        .iter()
        .find(|r| r.kind == RelationType::DependsOn)
        .unwrap();
    assert_eq!(edge.evidence_path, "tools/a.js -> tools/b.js");

    assert!(dir.path().join(CACHE_FILE).exists());
    assert!(dir.path().join(PROFILE_FILE).exists());
}

#[test]
fn test_ids_stable_across_rename() {
    let dir = tempfile::tempdir().unwrap();
    two_module_repo(dir.path());
    let before = run(dir.path());

    fs::remove_file(dir.path().join("tools/b.js")).unwrap();
    write(dir.path(), "tools/c.js", "export function bar() {\n  return 1;\n}\n");
    write(
        dir.path(),
        "tools/a.js",
        "import { bar } from './c.js';\n\nexport function foo() {\n  return bar();\n}\n",
    );
    let after = run(dir.path());

    let untouched = |x: &Extraction| -> Vec<String> {
        x.entities
            .iter()
            .map(|e| e.id.0.clone())
            .filter(|id| !id.starts_with("tools/b.js") && !id.starts_with("tools/c.js"))
            .collect()
    };
    assert_eq!(untouched(&before), untouched(&after));
    assert_eq!(untouched(&after), vec!["tools/a.js", "tools/a.js#foo"]);
    assert!(has_relation(&after, RelationType::DependsOn, "tools/a.js", "tools/c.js"));
    assert!(!after.entities.iter().any(|e| e.id.as_str().starts_with("tools/b.js")));
}

#[test]
fn test_lifecycle_follows_reachability_report() {
    let dir = tempfile::tempdir().unwrap();
    two_module_repo(dir.path());

    let first = run(dir.path());
    assert!(first.entities.iter().all(|e| e.lifecycle == Lifecycle::Active));

    write(dir.path(), ".ai/dep-report.json", r#"{"unreachable":["tools/b.js"]}"#);
    let second = run(dir.path());
    assert_eq!(entity(&second, "tools/b.js").lifecycle, Lifecycle::Unused);
    assert_eq!(entity(&second, "tools/b.js#bar").lifecycle, Lifecycle::Unused);
    assert_eq!(entity(&second, "tools/a.js").lifecycle, Lifecycle::Active);

    write(dir.path(), ".ai/dep-report.json", r#"{"unreachable":[]}"#);
    let third = run(dir.path());
    assert_eq!(entity(&third, "tools/b.js").lifecycle, Lifecycle::Active);

    write(dir.path(), ".ai/dep-report.json", "{}");
    let fourth = run(dir.path());
    assert_eq!(entity(&fourth, "tools/b.js").lifecycle, Lifecycle::Active);
    assert!(fourth.diagnostics.is_empty());
}

#[test]
fn test_annotations_override_reachability_and_suppression() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "tools/plugin.js",
        "// @dynamic loaded by name at runtime\nexport function register() {}\n",
    );
    write(
        dir.path(),
        "tools/legacy.js",
        "/**\n * @deprecated use plugin.js\n */\nexport function old() {}\n",
    );
    write(
        dir.path(),
        ".ai/dep-report.json",
        r#"{"unreachable":["tools/plugin.js","tools/legacy.js"]}"#,
    );
    write(dir.path(), ".ai/extractor-suppress.json", r#"["tools/legacy.js"]"#);

    let result = run(dir.path());
    assert_eq!(entity(&result, "tools/plugin.js").lifecycle, Lifecycle::Active);
    assert_eq!(entity(&result, "tools/plugin.js#register").lifecycle, Lifecycle::Active);
    assert_eq!(entity(&result, "tools/legacy.js").lifecycle, Lifecycle::Deprecated);
    assert_eq!(entity(&result, "tools/legacy.js#old").lifecycle, Lifecycle::Deprecated);
}

#[test]
fn test_suppressed_import_target_drops_relation() {
    let dir = tempfile::tempdir().unwrap();
    two_module_repo(dir.path());
    write(
        dir.path(),
        ".ai/extractor-suppress.jsonc",
        "// generated helpers\n[\"tools/b.js\"]\n",
    );

    let result = run(dir.path());
    assert!(!has_relation(&result, RelationType::DependsOn, "tools/a.js", "tools/b.js"));
    assert_eq!(entity(&result, "tools/b.js").lifecycle, Lifecycle::Active);
}

// Stands in for timing the second run against the first: every file must be
// a cache hit with zero misses, and the output must be byte-identical.
#[test]
fn test_unchanged_repo_is_deterministic_and_served_from_cache() {
    const N: usize = 25;
    let dir = tempfile::tempdir().unwrap();
    for i in 0..N {
        let body = if i + 1 < N {
            format!("import {{ f{} }} from './m{}.js';\nexport function f{i}() {{ return f{}(); }}\n", i + 1, i + 1, i + 1)
        } else {
            format!("export function f{i}() {{ return {i}; }}\n")
        };
        write(dir.path(), &format!("src/m{i}.js"), &body);
    }

    let first = run(dir.path());
    let second = run(dir.path());

    assert_eq!(first.profile.cache_misses, N);
    assert_eq!(second.profile.cache_hits, N);
    assert_eq!(second.profile.cache_misses, 0);
    assert_eq!(
        serde_json::to_string(&first.entities).unwrap(),
        serde_json::to_string(&second.entities).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&first.relations).unwrap(),
        serde_json::to_string(&second.relations).unwrap()
    );

    let depends_on = second
        .relations
        .iter()
        .filter(|r| r.kind == RelationType::DependsOn)
        .count();
    assert_eq!(depends_on, N - 1);

    let mut sorted = second.relations.clone();
    sorted.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    assert_eq!(sorted, second.relations);
    let ids: Vec<&str> = second.entities.iter().map(|e| e.id.as_str()).collect();
    let mut sorted_ids = ids.clone();
    sorted_ids.sort();
    assert_eq!(ids, sorted_ids);
}

#[test]
fn test_no_backslashes_in_ids() {
    let dir = tempfile::tempdir().unwrap();
    two_module_repo(dir.path());
    write(dir.path(), "src/nested/deep/x.ts", "export const x = 1;\n");
    write(dir.path(), "server/app.js", "app.get('/a\\\\b', h);\n");

    let result = run(dir.path());
    assert!(!result.entities.is_empty());
    for e in &result.entities {
        assert!(!e.id.as_str().contains('\\'), "backslash in {}", e.id);
        assert!(e.source_paths.iter().all(|p| !p.contains('\\')));
    }
}

#[test]
fn test_incremental_run_trusts_cache_outside_only_paths() {
    let dir = tempfile::tempdir().unwrap();
    two_module_repo(dir.path());
    run(dir.path());

    write(dir.path(), "tools/a.js", "export function foo2() {}\n");
    write(dir.path(), "tools/b.js", "export function baz() {}\n");
    let result = revgraph_extractors::extract(
        dir.path(),
        &ExtractOptions::incremental(["tools/a.js"]),
    )
    .unwrap();

    assert!(result.profile.incremental);
    entity(&result, "tools/a.js#foo2");
    entity(&result, "tools/b.js#bar");
    assert!(!result.entities.iter().any(|e| e.id.as_str() == "tools/b.js#baz"));
    assert!(!has_relation(&result, RelationType::DependsOn, "tools/a.js", "tools/b.js"));
}

#[test]
fn test_routes_apis_env_models_and_cli() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "server/users.js",
        "const router = require('express').Router();\nrouter.get('/users', list);\nrouter.post(\"/users\", create);\nmodule.exports = router;\n",
    );
    write(
        dir.path(),
        "server/legacy.js",
        "app.get('/users', legacyList);\n",
    );
    write(
        dir.path(),
        "src/db.js",
        "const url = process.env.DATABASE_URL;\nconst User = sequelize.define('User', {});\nexport { User };\n",
    );
    write(dir.path(), ".env.example", "DATABASE_URL=\nUNUSED_KEY=1\n");
    write(
        dir.path(),
        "tools/cli.js",
        "program.command('sync').option('--dry-run').action(sync);\n",
    );

    let result = run(dir.path());

    let api = entity(&result, "api:/users#GET");
    assert_eq!(api.kind, EntityType::Api);
    assert_eq!(api.source_paths.len(), 2);
    assert!(has_relation(&result, RelationType::RoutesTo, "api:/users#GET", "server/users.js#route:GET:/users"));
    assert!(has_relation(&result, RelationType::RoutesTo, "api:/users#GET", "server/legacy.js#route:GET:/users"));
    assert_eq!(entity(&result, "server/users.js#route:POST:/users").kind, EntityType::Route);

    let env = entity(&result, ".env.example");
    assert_eq!(env.kind, EntityType::Env);
    assert!(env.symbols.contains("DATABASE_URL"));
    assert!(env.evidence.iter().any(|ev| ev.file == "src/db.js"));
    assert!(has_relation(&result, RelationType::Uses, "src/db.js", ".env.example"));

    let model = entity(&result, "src/db.js#model:User");
    assert_eq!(model.kind, EntityType::Model);
    assert!(has_relation(&result, RelationType::Exposes, "src/db.js", "src/db.js#model:User"));

    let cli = entity(&result, "tools/cli.js#cli:sync");
    assert_eq!(cli.kind, EntityType::Cli);
    assert!(cli.symbols.contains("flag:--dry-run"));
}

#[test]
fn test_cached_source_becomes_cli_entry() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "tools/cli.js", "program.command('sync');\n");
    write(dir.path(), "src/cli.ts", "program.command('deploy');\n");

    let first = run(dir.path());
    assert!(first.entities.iter().any(|e| e.id.as_str() == "tools/cli.js#cli:sync"));
    assert!(first.entities.iter().all(|e| e.id.as_str() != "src/cli.ts#cli:deploy"));

    fs::remove_file(dir.path().join("tools/cli.js")).unwrap();
    let second = run(dir.path());
    assert_eq!(entity(&second, "src/cli.ts#cli:deploy").kind, EntityType::Cli);
    assert!(has_relation(&second, RelationType::Exposes, "src/cli.ts", "src/cli.ts#cli:deploy"));
}

#[test]
fn test_ci_jobs_and_config_files() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        ".github/workflows/release.yml",
        "name: Release\non:\n  push:\n    tags: ['v*']\njobs:\n  build:\n    runs-on: ubuntu-latest\n  publish:\n    needs: build\n    runs-on: ubuntu-latest\n",
    );
    write(dir.path(), "config/default.json", r#"{"port": 8080, "db": {}}"#);

    let result = run(dir.path());
    let publish = entity(&result, ".github/workflows/release.yml#job:publish");
    assert_eq!(publish.kind, EntityType::CiJob);
    assert!(publish.labels.contains("trigger:push"));
    assert!(has_relation(
        &result,
        RelationType::DependsOn,
        ".github/workflows/release.yml#job:publish",
        ".github/workflows/release.yml#job:build"
    ));

    let config = entity(&result, "config/default.json");
    assert_eq!(config.kind, EntityType::Config);
    assert!(config.symbols.contains("port"));
}

#[test]
fn test_tests_link_to_entities() {
    let dir = tempfile::tempdir().unwrap();
    two_module_repo(dir.path());
    write(
        dir.path(),
        "tests/a.test.js",
        "import { foo } from '../tools/a.js';\ntest('foo', () => foo());\n",
    );

    let result = run(dir.path());
    assert!(entity(&result, "tools/a.js").tests.contains("tests/a.test.js"));
    assert!(entity(&result, "tools/a.js#foo").tests.contains("tests/a.test.js"));
    assert!(!entity(&result, "tools/b.js#bar").tests.contains("tests/a.test.js"));
    assert!(!result.entities.iter().any(|e| e.id.as_str().starts_with("tests/")));
}

#[test]
fn test_malformed_inputs_become_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    two_module_repo(dir.path());
    write(dir.path(), ".ai/extractor-suppress.json", "not json");
    write(dir.path(), ".ai/dep-report.json", "{ broken");
    write(dir.path(), ".github/workflows/ci.yml", "jobs: [unclosed\n");

    let result = run(dir.path());
    entity(&result, "tools/a.js#foo");
    assert_eq!(result.diagnostics.len(), 3, "{:?}", result.diagnostics);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.path == ".github/workflows/ci.yml"));
}

use super::{install_upstream, project};
use std::path::Path;
use twm_cache::ReadReason;
use twm_config::TwmConfig;
use twm_mangle::{prepare, MangleError, PipelineInputs, TokenInventory, TokenSource};

fn write_inventory(root: &Path, tokens: &[&str]) {
    let inventory: TokenInventory = tokens.iter().copied().collect();
    inventory
        .save(&root.join(".tw-patch").join("tw-class-list.json"))
        .unwrap();
}

fn inputs(root: &Path) -> PipelineInputs {
    PipelineInputs::new(root, root)
}

#[test]
fn second_run_is_served_from_the_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let root = project(tmp.path(), "app");
    install_upstream(&root, "3.4.17");
    write_inventory(&root, &["font-bold", "bg-red-500", "bg-red-500/50"]);
    let config = TwmConfig::default();

    let first = prepare(&config, &inputs(&root), None).unwrap();
    assert_eq!(first.source, TokenSource::InventoryFile);
    let meta = first.cache.as_ref().unwrap();
    assert!(!meta.hit);
    assert_eq!(meta.reason, ReadReason::NotFound);
    assert!(config.cache.index_path(&root).is_file());

    std::fs::remove_file(root.join(".tw-patch").join("tw-class-list.json")).unwrap();

    let second = prepare(&config, &inputs(&root), None).unwrap();
    assert_eq!(second.source, TokenSource::Cache);
    let meta = second.cache.as_ref().unwrap();
    assert!(meta.hit);
    assert_eq!(meta.reason, ReadReason::Hit);
    assert_eq!(
        second.context.records(),
        first.context.records(),
        "cached tokens must allocate identically"
    );
    assert_eq!(second.context.replace_map().get("bg-red-500/50"), Some("tw-a"));
}

#[test]
fn upstream_upgrade_invalidates_with_details() {
    let tmp = tempfile::tempdir().unwrap();
    let root = project(tmp.path(), "app");
    install_upstream(&root, "3.4.17");
    write_inventory(&root, &["p-4"]);
    let config = TwmConfig::default();

    prepare(&config, &inputs(&root), None).unwrap();

    install_upstream(&root, "3.4.18");
    let prepared = prepare(&config, &inputs(&root), None).unwrap();
    assert_eq!(prepared.source, TokenSource::InventoryFile);
    let meta = prepared.cache.unwrap();
    assert_eq!(meta.reason, ReadReason::ContextMismatch);
    assert_eq!(meta.details, vec!["tailwind-package version changed"]);

    // Both contexts now live side by side in the shared index.
    let store = prepared.store.unwrap();
    let index = store.read_index_snapshot().unwrap();
    assert_eq!(index.contexts.len(), 2);
}

#[test]
fn option_changes_are_part_of_the_context() {
    let tmp = tempfile::tempdir().unwrap();
    let root = project(tmp.path(), "app");
    write_inventory(&root, &["p-4"]);
    let config = TwmConfig::default();
    prepare(&config, &inputs(&root), None).unwrap();

    let mut changed = config.clone();
    changed.mangle.class_prefix = "x-".to_owned();
    let prepared = prepare(&changed, &inputs(&root), None).unwrap();
    let meta = prepared.cache.unwrap();
    assert_eq!(meta.reason, ReadReason::ContextMismatch);
    assert_eq!(meta.details, vec!["patch options hash changed"]);
    assert_eq!(prepared.context.replace_map().get("p-4"), Some("x-a"));
}

#[test]
fn extractor_runs_only_on_a_miss() {
    let tmp = tempfile::tempdir().unwrap();
    let root = project(tmp.path(), "app");
    let config = TwmConfig::default();

    let mut calls = 0usize;
    let mut extractor = |project_root: &Path| {
        calls += 1;
        let mut inventory = TokenInventory::new();
        let file = project_root.join("src").join("App.vue");
        inventory.extend_file(&file.to_string_lossy(), ["text-sm", "md:flex"]);
        Ok::<_, anyhow::Error>(inventory)
    };

    let first = prepare(&config, &inputs(&root), Some(&mut extractor)).unwrap();
    assert_eq!(first.source, TokenSource::Extractor);
    assert_eq!(first.context.replace_map().len(), 2);

    let second = prepare(&config, &inputs(&root), Some(&mut extractor)).unwrap();
    assert_eq!(second.source, TokenSource::Cache);
    assert_eq!(second.context.replace_map().len(), 2);

    drop(extractor);
    assert_eq!(calls, 1);
}

#[test]
fn extractor_failures_are_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let root = project(tmp.path(), "app");
    let mut failing =
        |_: &Path| -> anyhow::Result<TokenInventory> { anyhow::bail!("parser crashed") };

    let err = prepare(&TwmConfig::default(), &inputs(&root), Some(&mut failing)).unwrap_err();
    assert!(matches!(err, MangleError::Extraction(_)));
    assert!(err.to_string().contains("parser crashed"), "{err}");
}

#[test]
fn nothing_to_mangle_without_sources() {
    let tmp = tempfile::tempdir().unwrap();
    let root = project(tmp.path(), "app");
    let config = TwmConfig::default();

    let prepared = prepare(&config, &inputs(&root), None).unwrap();
    assert_eq!(prepared.source, TokenSource::Empty);
    assert!(prepared.context.replace_map().is_empty());
    assert!(!config.cache.index_path(&root).exists());
}

#[test]
fn disabled_cache_is_never_touched() {
    let tmp = tempfile::tempdir().unwrap();
    let root = project(tmp.path(), "app");
    write_inventory(&root, &["p-4"]);
    let config = TwmConfig::load_from_str("[cache]\nenabled = false\n").unwrap();

    let prepared = prepare(&config, &inputs(&root), None).unwrap();
    assert_eq!(prepared.source, TokenSource::InventoryFile);
    assert!(prepared.cache.is_none());
    assert!(prepared.store.is_none());
    assert!(!config.cache.index_path(&root).exists());
}

#[test]
fn missing_project_root_degrades_to_no_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("not-created");

    let prepared = prepare(&TwmConfig::default(), &inputs(&root), None).unwrap();
    assert!(prepared.cache.is_none());
    assert_eq!(prepared.source, TokenSource::Empty);
}

#[test]
fn cache_hit_allocates_exactly_like_the_miss_that_filled_it() {
    let tmp = tempfile::tempdir().unwrap();
    let root = project(tmp.path(), "app");
    let config = TwmConfig::load_from_str("[mangle]\nexclude = [\"**/vendor/**\"]\n").unwrap();

    let mut extractor = |_: &Path| {
        let mut inventory = TokenInventory::new();
        inventory.extend_file("src/vendor/lib.js", ["only-vendor-token", "text-sm"]);
        inventory.extend_file("src/App.vue", ["text-sm", "font-bold"]);
        Ok::<_, anyhow::Error>(inventory)
    };

    let miss = prepare(&config, &inputs(&root), Some(&mut extractor)).unwrap();
    assert_eq!(miss.source, TokenSource::Extractor);
    let hit = prepare(&config, &inputs(&root), Some(&mut extractor)).unwrap();
    assert_eq!(hit.source, TokenSource::Cache);

    let names = |prepared: &twm_mangle::Prepared| -> Vec<(String, String)> {
        prepared
            .context
            .records()
            .into_iter()
            .map(|record| (record.original, record.mangled))
            .collect()
    };
    let expected = vec![
        ("font-bold".to_owned(), "tw-a".to_owned()),
        ("text-sm".to_owned(), "tw-b".to_owned()),
    ];
    assert_eq!(names(&miss), expected);
    assert_eq!(names(&hit), expected);
    assert!(hit.context.get("only-vendor-token").is_none());
}

use std::path::Path;
use twm_cache::{CacheContext, ContextInputs, Fingerprint};

mod store;

pub(crate) fn context_for(project_root: &Path, upstream_version: &str) -> CacheContext {
    let inputs = ContextInputs {
        project_root: project_root.to_path_buf(),
        process_cwd: project_root.to_path_buf(),
        cache_cwd: project_root.to_path_buf(),
        upstream_config_path: None,
        upstream_package_root: None,
        upstream_package_version: Some(upstream_version.to_string()),
        tool_version: "0.1.0".to_string(),
        major_version_mode: Some("3".to_string()),
        options_hash: Fingerprint::from_bytes(b"{}"),
    };
    CacheContext::capture(&inputs).expect("project root should exist")
}

pub(crate) fn project(tmp: &Path, name: &str) -> std::path::PathBuf {
    let root = tmp.join(name);
    std::fs::create_dir_all(&root).unwrap();
    root
}

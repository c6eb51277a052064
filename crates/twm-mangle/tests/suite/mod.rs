use std::path::{Path, PathBuf};

mod mapping;
mod pipeline;

pub(crate) fn project(tmp: &Path, name: &str) -> PathBuf {
    let root = tmp.join(name);
    std::fs::create_dir_all(&root).unwrap();
    root
}

pub(crate) fn install_upstream(project_root: &Path, version: &str) {
    let root = project_root.join("node_modules").join("tailwindcss");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(
        root.join("package.json"),
        format!(r#"{{"name":"tailwindcss","version":"{version}"}}"#),
    )
    .unwrap();
}

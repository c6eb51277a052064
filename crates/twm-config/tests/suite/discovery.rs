use tempfile::tempdir;
use twm_config::{discover_config_path, load_for_project, ConfigError, TwmConfig};

#[test]
fn missing_config_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let (config, path) = load_for_project(dir.path()).unwrap();
    assert_eq!(config, TwmConfig::default());
    assert!(path.is_none());
}

#[test]
fn prefers_twm_toml_over_dotfile() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join(".twm.toml"), "[mangle]\nclass_prefix = \"dot-\"\n").unwrap();
    assert_eq!(
        discover_config_path(dir.path()),
        Some(dir.path().join(".twm.toml"))
    );

    std::fs::write(dir.path().join("twm.toml"), "[mangle]\nclass_prefix = \"main-\"\n").unwrap();
    let (config, path) = load_for_project(dir.path()).unwrap();
    assert_eq!(path, Some(dir.path().join("twm.toml")));
    assert_eq!(config.mangle.class_prefix, "main-");
}

#[test]
fn parse_errors_surface_without_source_snippets() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("twm.toml"),
        "[upstream]\nmajor_version = \"three-secret\"\n",
    )
    .unwrap();

    let err = load_for_project(dir.path()).unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, ConfigError::Toml(_)));
    assert!(!message.contains("three-secret"), "{message}");
}

#[test]
fn unreadable_path_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = TwmConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

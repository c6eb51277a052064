use twm_config::json_schema;

#[test]
fn schema_describes_every_section() {
    let schema = serde_json::to_value(json_schema()).unwrap();
    let properties = schema["properties"].as_object().expect("top-level properties");
    for section in ["mangle", "cache", "upstream", "logging"] {
        assert!(properties.contains_key(section), "missing {section}");
    }

    let mangle = &schema["definitions"]["MangleConfig"]["properties"];
    assert_eq!(mangle["class_prefix"]["minLength"], 1);
    assert!(mangle["mapping"].is_object());

    let drivers = &schema["definitions"]["CacheDriverSetting"]["enum"];
    assert_eq!(drivers, &serde_json::json!(["file", "memory"]));
    assert_eq!(schema["title"], "twm.toml");
}

/*!
 * App configuration tests
 */

use anyhow::Result;
use babelbook::app_config::{Config, LogLevel, ProviderKind};

use crate::common;

#[test]
fn test_load_or_create_should_write_default_file() -> Result<()> {
    let tmp = common::create_temp_dir()?;
    let path = tmp.path().join("conf.json");

    let config = Config::load_or_create(&path)?;
    assert!(path.is_file(), "default config file should be created");
    assert_eq!(config.source_language, "en");
    assert_eq!(config.target_language, "zh");

    // Reloading parses the file that was just written
    let reloaded = Config::load_or_create(&path)?;
    assert_eq!(reloaded.provider.model, config.provider.model);
    assert_eq!(reloaded.memory.retention_days, config.memory.retention_days);
    Ok(())
}

#[test]
fn test_load_should_parse_realistic_config_file() -> Result<()> {
    let tmp = common::create_temp_dir()?;
    let raw = r#"{
        "source_language": "en",
        "target_language": "fr",
        "provider": {
            "type": "azure",
            "api_key": "secret",
            "endpoint": "https://res.openai.azure.com",
            "deployment": "gpt4o",
            "rate_limit": null
        },
        "translation": {
            "max_tokens_per_request": 800,
            "terminology": {"the Order": "l'Ordre"}
        },
        "memory": {"min_similarity": 0.9},
        "log_level": "debug"
    }"#;
    let path = common::create_test_file(tmp.path(), "conf.json", raw)?;

    let config = Config::load_or_create(&path)?;
    config.validate()?;

    assert_eq!(config.provider.kind, ProviderKind::Azure);
    assert_eq!(config.target_language, "fr");
    assert_eq!(config.provider.rate_limit, None);
    assert_eq!(config.log_level, LogLevel::Debug);

    let options = config.translation_options();
    assert_eq!(options.max_tokens_per_request, 800);
    assert_eq!(options.terminology["the Order"], "l'Ordre");
    assert_eq!(options.min_similarity, 0.9);
    Ok(())
}

#[test]
fn test_load_should_reject_malformed_json() -> Result<()> {
    let tmp = common::create_temp_dir()?;
    let path = common::create_test_file(tmp.path(), "conf.json", "{ not json")?;

    assert!(Config::load_or_create(&path).is_err());
    Ok(())
}

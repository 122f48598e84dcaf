#[cfg(test)]
mod tests {
    use serial_test::serial;
    use common::config::{ConfigLoader, ConfigSource, ConfigValidator, SniffConfig};
    use std::env;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::fs;

    #[tokio::test]
    async fn test_config_loader_from_toml() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("sniff.toml");

        let toml_content = r##"
auto_fix_enabled = true
confidence_threshold = 0.65
max_workers = 3
report_path = "out/reports"

[monitoring]
cpu_threshold = 70.0

[notifications.slack]
webhook_url = "https://hooks.slack.test/T000"
channel = "#sniffing"

[logging]
level = "debug"
"##;
        fs::write(&config_path, toml_content).await?;

        let loader = ConfigLoader::new()
            .with_paths(vec![config_path.clone()])
            .with_env_prefix("SNIFF_TEST_TOML_");
        let (config, source) = loader.load().await?;

        assert_eq!(source, ConfigSource::File(config_path));
        assert!(config.auto_fix_enabled);
        assert_eq!(config.confidence_threshold, 0.65);
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.report_path, PathBuf::from("out/reports"));
        assert_eq!(config.monitoring.cpu_threshold, 70.0);
        assert_eq!(config.monitoring.memory_threshold, 85.0);
        assert_eq!(
            config.notifications.slack.as_ref().map(|s| s.channel.clone()),
            Some(Some("#sniffing".to_string()))
        );
        assert_eq!(config.logging.level, "debug");
        Ok(())
    }

    #[tokio::test]
    async fn test_config_loader_from_json() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("sniff.json");
        fs::write(
            &config_path,
            r#"{ "retention_days": 30, "per_domain_timeout_seconds": 5 }"#,
        )
        .await?;

        let loader = ConfigLoader::new()
            .with_paths(vec![config_path])
            .with_env_prefix("SNIFF_TEST_JSON_");
        let (config, _) = loader.load().await?;

        assert_eq!(config.retention_days, 30);
        assert_eq!(config.per_domain_timeout_seconds, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let loader = ConfigLoader::new()
            .with_paths(vec![temp_dir.path().join("absent.toml")])
            .with_env_prefix("SNIFF_TEST_DEFAULT_");
        let (config, source) = loader.load().await?;

        assert_eq!(source, ConfigSource::Default);
        assert_eq!(config, SniffConfig::default());
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_env_overrides_win_over_file() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("sniff.toml");
        fs::write(&config_path, "confidence_threshold = 0.5\n").await?;

        env::set_var("SNIFF_TEST_ENV_CONFIDENCE_THRESHOLD", "0.9");
        env::set_var("SNIFF_TEST_ENV_AUTO_FIX_ENABLED", "true");
        env::set_var("SNIFF_TEST_ENV_SLACK_WEBHOOK_URL", "https://hooks.slack.test/X");

        let loader = ConfigLoader::new()
            .with_paths(vec![config_path])
            .with_env_prefix("SNIFF_TEST_ENV_");
        let (config, _) = loader.load().await?;

        assert_eq!(config.confidence_threshold, 0.9);
        assert!(config.auto_fix_enabled);
        assert_eq!(
            config.notifications.slack.map(|s| s.webhook_url),
            Some("https://hooks.slack.test/X".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_invalid_env_value_is_an_error() {
        env::set_var("SNIFF_TEST_BAD_MAX_WORKERS", "many");
        let loader = ConfigLoader::new()
            .with_paths(vec![])
            .with_env_prefix("SNIFF_TEST_BAD_");
        assert!(loader.load().await.is_err());
    }

    #[test]
    fn test_validator_rejects_out_of_range_values() {
        let validator = ConfigValidator::new();
        assert!(validator.validate(&SniffConfig::default()).is_ok());

        let mut config = SniffConfig::default();
        config.confidence_threshold = 1.5;
        assert!(validator.validate(&config).is_err());

        let mut config = SniffConfig::default();
        config.max_workers = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = SniffConfig::default();
        config.monitoring.cpu_threshold = 0.0;
        assert!(validator.validate(&config).is_err());

        let mut config = SniffConfig::default();
        config.per_domain_timeout_seconds = 0;
        assert!(validator.validate(&config).is_err());
    }
}

use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ContextSettings;

/// Name of the table holding Astrix settings inside a settings file
pub const SETTINGS_TABLE: &str = "astrix";

/// Pick the file format from the extension, defaulting to TOML
pub fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    }
}

/// Build a `config::Config` from a settings file
pub fn build_config(settings_path: &str) -> Result<Config> {
    let path = Path::new(settings_path);
    Config::builder()
        .add_source(File::new(
            path.to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?,
            file_format(path),
        ))
        .build()
        .with_context(|| format!("Failed to build settings from {}", path.display()))
}

/// Load the `[astrix]` table of a settings file.
///
/// A file without the table yields the default settings.
pub async fn load_settings(settings_path: &str) -> Result<ContextSettings> {
    load_settings_sync(settings_path)
}

/// Load settings synchronously
pub fn load_settings_sync(settings_path: &str) -> Result<ContextSettings> {
    let config = build_config(settings_path)?;
    match config.get::<ContextSettings>(SETTINGS_TABLE) {
        Ok(settings) => Ok(settings),
        Err(config::ConfigError::NotFound(_)) => Ok(ContextSettings::default()),
        Err(e) => Err(e).with_context(|| {
            format!("Failed to deserialize settings from {settings_path}")
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn test_load_toml_settings() {
        let toml_content = r#"
[astrix]
subsystem = "trading"
enforce_subsystem_boundaries = false
bean_bind_attempt_interval = "500ms"
bind_worker_pool_size = 2

[astrix.services]
quotes = "direct:1"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let settings = load_settings(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(settings.subsystem, "trading");
        assert!(!settings.enforce_subsystem_boundaries);
        assert_eq!(
            settings.bind_attempt_interval().unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(settings.service_lease_renew_interval, "30s");
        assert_eq!(settings.bind_worker_pool_size, 2);
        assert_eq!(settings.services.get("quotes").unwrap(), "direct:1");
    }

    #[tokio::test]
    async fn test_load_json_settings() {
        let json_content = r#"
{
  "astrix": {
    "subsystem": "accounts",
    "service_lease_renew_interval": "1m"
  }
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let settings = load_settings(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(settings.subsystem, "accounts");
        assert_eq!(
            settings.lease_renew_interval().unwrap(),
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_missing_table_yields_defaults() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[other]\nvalue = 1\n").unwrap();

        let settings = load_settings(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(settings, ContextSettings::default());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_settings_sync("/definitely/not/here.toml").is_err());
    }
}

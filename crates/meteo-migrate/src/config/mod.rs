//! Configuration loading and validation.
//!
//! A YAML file supplies defaults; the CLI overrides individual fields and
//! prompts for whatever is still missing before calling [`Config::validate`].

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// The file may be partial; call [`Config::validate`] once every
    /// override has been applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl SourceConfig {
    /// `user@host:port/database`, for progress output. Never includes the password.
    pub fn display_target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let yaml = r#"
source:
  host: db.local
  database: meteo
  user: meteo
  password: hunter2
target:
  path: /tmp/meteo.db
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.source.ssl_mode, SslMode::Preferred);
        assert_eq!(config.target.path, PathBuf::from("/tmp/meteo.db"));
        assert_eq!(config.target.journal_mode, JournalMode::Delete);
        assert_eq!(config.migration.batch_size, 1000);
        assert_eq!(config.migration.entity_mode, EntityMode::Create);
        assert_eq!(config.migration.on_mismatch, MismatchPolicy::Abort);
        assert_eq!(config.migration.verify, VerifyMode::Count);
        assert_eq!(config.migration.dangling_tokens, DanglingTokenPolicy::Warn);
        assert!(!config.migration.assume_yes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_migration_overrides() {
        let yaml = r#"
migration:
  batch_size: 250
  assume_yes: true
  entity_mode: merge
  on_mismatch: continue
  verify: values
  dangling_tokens: reject
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.migration.batch_size, 250);
        assert!(config.migration.assume_yes);
        assert_eq!(config.migration.entity_mode, EntityMode::Merge);
        assert_eq!(config.migration.on_mismatch, MismatchPolicy::Continue);
        assert_eq!(config.migration.verify, VerifyMode::Values);
        assert_eq!(config.migration.dangling_tokens, DanglingTokenPolicy::Reject);
        // Partial file: source and target still have to be supplied
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_rejects_unknown_enum_value() {
        let yaml = "migration:\n  entity_mode: overwrite\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/meteo-migrate.yaml").unwrap_err();
        assert!(matches!(err, crate::error::MigrateError::Io(_)));
    }

    #[test]
    fn test_display_target_hides_password() {
        let source = SourceConfig {
            host: "db".into(),
            database: "meteo".into(),
            user: "felix".into(),
            password: "secret".into(),
            ..Default::default()
        };
        assert_eq!(source.display_target(), "felix@db:3306/meteo");
    }
}

//! Run configuration loaded from environment variables

use crate::error::{EtlError, Result};
use crate::ingestion::parse::XmlLayout;
use crate::ingestion::transform::TransformSpec;
use crate::logging::LogConfig;
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;

/// What to do when an artifact upload fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadFailurePolicy {
    /// Stop the run
    #[default]
    Abort,
    /// Log the failure and carry on to the next stage
    Warn,
}

impl std::str::FromStr for UploadFailurePolicy {
    type Err = EtlError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" | "fatal" => Ok(UploadFailurePolicy::Abort),
            "warn" | "warning" => Ok(UploadFailurePolicy::Warn),
            other => Err(EtlError::Config(format!(
                "Invalid upload failure policy: {} (expected abort or warn)",
                other
            ))),
        }
    }
}

/// Object store settings
#[derive(Clone, PartialEq)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Explicit keys; when absent the default AWS credential chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub endpoint: Option<String>,
    pub path_style: bool,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("path_style", &self.path_style)
            .finish()
    }
}

/// Relational sink settings
#[derive(Clone, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Everything one run needs; passed explicitly to the orchestrator
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub target_table: String,
    pub raw_key: String,
    pub transformed_key: String,
    pub publish_raw: bool,
    pub upload_failure_policy: UploadFailurePolicy,
    pub xml_layout: XmlLayout,
    pub transform: TransformSpec,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

impl EtlConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, so tests need not touch the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| EtlError::Config(format!("{} must be set", key)))
        };

        let access_key = var("AWS_ACCESS_KEY_ID");
        let secret_key = var("AWS_SECRET_ACCESS_KEY");
        if access_key.is_some() != secret_key.is_some() {
            return Err(EtlError::Config(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".to_string(),
            ));
        }

        Ok(EtlConfig {
            data_dir: var("ETL_DATA_DIR").unwrap_or_else(|| "data".to_string()).into(),

            output_dir: var("ETL_OUTPUT_DIR").unwrap_or_else(|| ".".to_string()).into(),

            target_table: var("ETL_TARGET_TABLE")
                .unwrap_or_else(|| "transformed_table".to_string()),

            raw_key: var("ETL_RAW_KEY").unwrap_or_else(|| "raw_data.csv".to_string()),

            transformed_key: var("ETL_TRANSFORMED_KEY")
                .unwrap_or_else(|| "transformed_data.csv".to_string()),

            publish_raw: parse_bool("ETL_PUBLISH_RAW", var("ETL_PUBLISH_RAW"), true)?,

            upload_failure_policy: var("ETL_UPLOAD_FAILURE")
                .map(|v| v.parse::<UploadFailurePolicy>())
                .transpose()?
                .unwrap_or_default(),

            xml_layout: XmlLayout::default(),

            transform: TransformSpec::default(),

            storage: StorageConfig {
                bucket: required("S3_BUCKET")?,
                region: var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key,
                secret_key,
                endpoint: var("S3_ENDPOINT"),
                path_style: parse_bool("S3_PATH_STYLE", var("S3_PATH_STYLE"), false)?,
            },

            database: DatabaseConfig {
                host: var("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: var("DB_PORT")
                    .map(|p| {
                        p.trim().parse::<u16>().map_err(|_| {
                            EtlError::Config(format!("DB_PORT must be a valid port, got {}", p))
                        })
                    })
                    .transpose()?
                    .unwrap_or(5432),
                user: required("DB_USER")?,
                password: required("DB_PASSWORD")?,
                database: required("DB_NAME")?,
            },

            log: LogConfig::from_lookup(&var)?,
        })
    }
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(EtlError::Config(format!(
                "{} must be a boolean, got {}",
                key, v
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("S3_BUCKET", "etl-artifacts"),
        ("DB_USER", "etl"),
        ("DB_PASSWORD", "hunter2"),
        ("DB_NAME", "warehouse"),
    ];

    #[test]
    fn test_defaults() {
        let config = EtlConfig::from_lookup(lookup(REQUIRED)).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.target_table, "transformed_table");
        assert_eq!(config.raw_key, "raw_data.csv");
        assert_eq!(config.transformed_key, "transformed_data.csv");
        assert!(config.publish_raw);
        assert_eq!(config.upload_failure_policy, UploadFailurePolicy::Abort);
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.access_key, None);
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.log.path, PathBuf::from("etl.log"));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend_from_slice(&[
            ("ETL_PUBLISH_RAW", "false"),
            ("ETL_UPLOAD_FAILURE", "warn"),
            ("DB_PORT", "6543"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("S3_PATH_STYLE", "yes"),
        ]);

        let config = EtlConfig::from_lookup(lookup(&pairs)).unwrap();

        assert!(!config.publish_raw);
        assert_eq!(config.upload_failure_policy, UploadFailurePolicy::Warn);
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.storage.access_key.as_deref(), Some("AKIA"));
        assert!(config.storage.path_style);
    }

    #[test]
    fn test_missing_required() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "DB_PASSWORD")
            .collect();

        match EtlConfig::from_lookup(lookup(&pairs)) {
            Err(EtlError::Config(msg)) => assert!(msg.contains("DB_PASSWORD")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_half_credentials_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("AWS_ACCESS_KEY_ID", "AKIA"));
        assert!(EtlConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_invalid_values() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DB_PORT", "not-a-port"));
        assert!(EtlConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ETL_UPLOAD_FAILURE", "sometimes"));
        assert!(EtlConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend_from_slice(&[("AWS_ACCESS_KEY_ID", "AKIA"), ("AWS_SECRET_ACCESS_KEY", "s3cr3t")]);
        let config = EtlConfig::from_lookup(lookup(&pairs)).unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("<redacted>"));
    }
}

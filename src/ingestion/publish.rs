//! Publish functions - write tables to local CSV artifacts and mirror them to object storage

use crate::config::StorageConfig;
use crate::error::{EtlError, Result};
use crate::ingestion::types::Table;
use async_trait::async_trait;
use aws_credential_types::provider::ProvideCredentials;
use aws_config::SdkConfig;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Destination for artifact files
#[async_trait]
pub trait ObjectStore {
    /// Upload a local file under `key`, replacing any existing object
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()>;

    /// Human-readable location of `key`, for logs
    fn describe(&self, key: &str) -> String;
}

/// Serialize a table to CSV: header row, then rows in table order
///
/// Nulls are written as empty fields.
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_write_error(path, e))?;

    // A table with no columns produces an empty file
    if !table.columns().is_empty() {
        writer
            .write_record(table.columns())
            .map_err(|e| csv_write_error(path, e))?;
    }

    for row in table.rows() {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| csv_write_error(path, e))?;
    }

    writer.flush().map_err(|e| EtlError::io(path, e))?;

    debug!("Wrote {} rows to {:?}", table.len(), path);

    Ok(())
}

fn csv_write_error(path: &Path, err: csv::Error) -> EtlError {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => EtlError::io(path, io),
        other => EtlError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::Other, format!("{:?}", other)),
        ),
    }
}

/// Object key used when the caller gives none: the local file name
pub fn default_key(local_path: &Path) -> String {
    local_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| local_path.to_string_lossy().into_owned())
}

/// Write `table` to `local_path`, then upload it under `key`
///
/// The two steps are not atomic: a failed upload leaves the local file behind.
#[instrument(skip(table, store), fields(rows = table.len()))]
pub async fn publish<S>(
    table: &Table,
    local_path: &Path,
    key: Option<&str>,
    store: &S,
) -> Result<String>
where
    S: ObjectStore + ?Sized,
{
    write_csv(table, local_path)?;
    info!("Saved {} rows to {:?}", table.len(), local_path);

    let key = key.map(str::to_string).unwrap_or_else(|| default_key(local_path));

    match store.upload(local_path, &key).await {
        Ok(()) => {
            info!("Uploaded {:?} to {}", local_path, store.describe(&key));
            Ok(key)
        }
        Err(e) => {
            error!("Upload of {:?} to {} failed: {}", local_path, store.describe(&key), e);
            Err(e)
        }
    }
}

/// S3-compatible object store
pub struct S3Store {
    client: Client,
    bucket: String,
    /// Why the credential chain could not be resolved; every upload fails with it
    credential_error: Option<String>,
}

impl S3Store {
    /// Build a client from explicit keys, or from the default AWS credential chain
    pub async fn new(config: &StorageConfig) -> Self {
        let region = Region::new(config.region.clone());

        match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "etl-config");
                let builder = aws_sdk_s3::Config::builder()
                    .credentials_provider(credentials)
                    .region(region);
                Self::from_builder(config, builder, None)
            }
            _ => {
                let shared = aws_config::from_env().region(region).load().await;
                Self::from_shared(config, &shared).await
            }
        }
    }

    /// Build a client from a loaded AWS configuration
    ///
    /// The credential chain is resolved here. When it yields nothing the store
    /// is still built, and each upload returns a `Credential` error for the
    /// run's upload failure policy to handle.
    pub async fn from_shared(config: &StorageConfig, shared: &SdkConfig) -> Self {
        let credential_error = match shared.credentials_provider() {
            Some(provider) => provider
                .provide_credentials()
                .await
                .err()
                .map(|e| e.to_string()),
            None => Some("no credential provider configured".to_string()),
        };

        if let Some(reason) = &credential_error {
            warn!("AWS credentials unavailable, uploads will fail: {}", reason);
        }

        Self::from_builder(
            config,
            aws_sdk_s3::config::Builder::from(shared),
            credential_error,
        )
    }

    fn from_builder(
        config: &StorageConfig,
        mut builder: aws_sdk_s3::config::Builder,
        credential_error: Option<String>,
    ) -> Self {
        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());
        info!("Storage client initialized for bucket: {}", config.bucket);

        Self {
            client,
            bucket: config.bucket.clone(),
            credential_error,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        if let Some(reason) = &self.credential_error {
            return Err(EtlError::Credential(reason.clone()));
        }

        debug!("Uploading {:?} to s3://{}/{}", local_path, self.bucket, key);

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| EtlError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("text/csv")
            .body(body)
            .send()
            .await
            .map_err(|e| EtlError::Upload {
                key: key.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }

    fn describe(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

/// Object store kept in memory, keyed by object key
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose uploads all fail, as with missing credentials
    pub fn failing() -> Self {
        InMemoryStore {
            objects: Mutex::new(HashMap::new()),
            fail_uploads: true,
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        if self.fail_uploads {
            return Err(EtlError::Credential("credentials not available".to_string()));
        }

        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| EtlError::io(local_path, e))?;

        self.objects
            .lock()
            .map_err(|_| EtlError::Upload {
                key: key.to_string(),
                message: "store lock poisoned".to_string(),
            })?
            .insert(key.to_string(), data);

        Ok(())
    }

    fn describe(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}

/// Local path for an artifact key inside the output directory
pub fn artifact_path(output_dir: &Path, key: &str) -> PathBuf {
    output_dir.join(default_key(Path::new(key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::types::{Record, Value};
    use tempfile::tempdir;

    fn mock_table() -> Table {
        let mut table = Table::new();
        let rows: Vec<Record> = vec![
            vec![
                ("name".to_string(), Value::from("A, Jr.")),
                ("height_in".to_string(), Value::from(70.0)),
                ("height_m".to_string(), Value::from(1.78)),
            ],
            vec![
                ("name".to_string(), Value::from("B")),
                ("height_in".to_string(), Value::Null),
            ],
        ];
        for row in rows {
            table.push_record(row);
        }
        table
    }

    #[test]
    fn test_write_csv_layout() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("out.csv");

        write_csv(&mock_table(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "name,height_in,height_m\n\"A, Jr.\",70,1.78\nB,,\n");
    }

    #[test]
    fn test_write_csv_empty_table() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("empty.csv");

        write_csv(&Table::with_columns(["name"]), &path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "name\n");
    }

    #[test]
    fn test_default_key_and_artifact_path() {
        assert_eq!(default_key(Path::new("out/raw_data.csv")), "raw_data.csv");
        assert_eq!(
            artifact_path(Path::new("/tmp/etl"), "exports/transformed_data.csv"),
            PathBuf::from("/tmp/etl/transformed_data.csv")
        );
    }

    #[tokio::test]
    async fn test_publish_writes_then_uploads() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("raw_data.csv");
        let store = InMemoryStore::new();

        let key = publish(&mock_table(), &path, None, &store).await.unwrap();

        assert_eq!(key, "raw_data.csv");
        assert!(path.exists());
        let uploaded = store.get("raw_data.csv").unwrap();
        assert_eq!(uploaded, std::fs::read(&path).unwrap());
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_local_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("transformed_data.csv");
        let store = InMemoryStore::failing();

        let result = publish(&mock_table(), &path, Some("custom.csv"), &store).await;

        assert!(matches!(result, Err(EtlError::Credential(_))));
        assert!(path.exists());
        assert!(store.keys().is_empty());
    }

    fn storage_config() -> StorageConfig {
        StorageConfig {
            bucket: "test-bucket".to_string(),
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
            endpoint: Some("http://127.0.0.1:9".to_string()),
            path_style: true,
        }
    }

    /// Loaded AWS configuration with no credential provider at all
    fn shared_without_credentials() -> SdkConfig {
        SdkConfig::builder()
            .region(Region::new("us-east-1"))
            .behavior_version(aws_config::BehaviorVersion::latest())
            .build()
    }

    #[tokio::test]
    async fn test_s3_store_without_credentials_fails_on_upload() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("raw_data.csv");
        let store = S3Store::from_shared(&storage_config(), &shared_without_credentials()).await;

        let result = publish(&mock_table(), &path, None, &store).await;

        match result {
            Err(e @ EtlError::Credential(_)) => assert!(e.is_upload_failure()),
            other => panic!("Expected credential error, got {:?}", other),
        }
        assert!(path.exists());
    }
}

//! Run orchestrator - extract, reconcile, publish, transform, publish, load

use crate::config::{EtlConfig, UploadFailurePolicy};
use crate::error::{EtlError, Result};
use crate::ingestion::load::TableSink;
use crate::ingestion::parse::read_sources;
use crate::ingestion::publish::{artifact_path, publish, ObjectStore};
use crate::ingestion::reconcile::reconcile;
use crate::ingestion::transform::transform;
use crate::ingestion::{LoadStats, SourceFormat, Table, TransformStats};
use std::fs;
use tracing::{error, info, warn};

/// Stages of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    PublishRaw,
    Transform,
    PublishTransformed,
    Load,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Extract => write!(f, "extract"),
            Stage::PublishRaw => write!(f, "publish raw"),
            Stage::Transform => write!(f, "transform"),
            Stage::PublishTransformed => write!(f, "publish transformed"),
            Stage::Load => write!(f, "load"),
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub extracted_rows: usize,
    pub transform: TransformStats,
    pub load: LoadStats,
    /// Keys uploaded successfully
    pub published: Vec<String>,
    /// Keys whose upload failed under the warn policy
    pub upload_failures: Vec<String>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "extracted: {}, {}, loaded: {}, published: [{}], failed uploads: [{}]",
            self.extracted_rows,
            self.transform,
            self.load.inserted,
            self.published.join(", "),
            self.upload_failures.join(", ")
        )
    }
}

/// Sequences one run; every stage completes before the next starts
pub struct Orchestrator<S, L> {
    config: EtlConfig,
    store: S,
    sink: L,
}

impl<S, L> Orchestrator<S, L>
where
    S: ObjectStore,
    L: TableSink,
{
    pub fn new(config: EtlConfig, store: S, sink: L) -> Self {
        Orchestrator {
            config,
            store,
            sink,
        }
    }

    /// Run every stage; the first fatal failure aborts the rest
    ///
    /// Artifacts published before a failure are left in place.
    pub async fn run(&self) -> Result<RunSummary> {
        info!("Starting ETL process");
        let mut summary = RunSummary::default();

        info!("Step 1/6: Extracting data from {:?}...", self.config.data_dir);
        let tables = self.extract().map_err(|e| stage_failed(Stage::Extract, e))?;
        info!("✓ Extract complete");

        info!("Step 2/6: Reconciling schemas...");
        let combined = reconcile(tables);
        summary.extracted_rows = combined.len();
        info!(
            "✓ Reconciled {} rows with columns [{}]",
            combined.len(),
            combined.columns().join(", ")
        );

        fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| EtlError::io(&self.config.output_dir, e))
            .map_err(|e| stage_failed(self.first_publish_stage(), e))?;

        if self.config.publish_raw {
            info!("Step 3/6: Publishing raw data...");
            self.publish_artifact(&combined, &self.config.raw_key, &mut summary)
                .await
                .map_err(|e| stage_failed(Stage::PublishRaw, e))?;
            info!("✓ Raw publish complete");
        } else {
            info!("Step 3/6: Raw publish disabled, skipping");
        }

        info!("Step 4/6: Transforming data...");
        let (transformed, stats) = transform(combined, &self.config.transform)
            .map_err(|e| stage_failed(Stage::Transform, e))?;
        summary.transform = stats;
        info!("✓ Transform complete");

        info!("Step 5/6: Publishing transformed data...");
        self.publish_artifact(&transformed, &self.config.transformed_key, &mut summary)
            .await
            .map_err(|e| stage_failed(Stage::PublishTransformed, e))?;
        info!("✓ Transformed publish complete");

        info!("Step 6/6: Loading into {}...", self.config.target_table);
        summary.load = self
            .sink
            .replace_table(&transformed, &self.config.target_table)
            .await
            .map_err(|e| stage_failed(Stage::Load, e))?;
        info!("✓ Load complete");

        info!("ETL process completed successfully: {}", summary);

        Ok(summary)
    }

    /// First stage that writes into the output directory
    fn first_publish_stage(&self) -> Stage {
        if self.config.publish_raw {
            Stage::PublishRaw
        } else {
            Stage::PublishTransformed
        }
    }

    fn extract(&self) -> Result<Vec<Table>> {
        SourceFormat::ALL
            .iter()
            .map(|format| read_sources(&self.config.data_dir, *format, &self.config.xml_layout))
            .collect()
    }

    async fn publish_artifact(
        &self,
        table: &Table,
        key: &str,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let local_path = artifact_path(&self.config.output_dir, key);

        match publish(table, &local_path, Some(key), &self.store).await {
            Ok(key) => {
                summary.published.push(key);
                Ok(())
            }
            Err(e)
                if e.is_upload_failure()
                    && self.config.upload_failure_policy == UploadFailurePolicy::Warn =>
            {
                warn!("Continuing without {} after upload failure: {}", key, e);
                summary.upload_failures.push(key.to_string());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn stage_failed(stage: Stage, err: EtlError) -> EtlError {
    error!("✗ Stage {} failed: {}", stage, err);
    err
}

//! Operation engine
//!
//! Opens inputs, picks a walker, and runs every operation on a blocking
//! worker raced against the configured timeout. Losing the race trips the
//! cancellation flag, so the worker stops reading and drops its file handle.

use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancellationFlag;
use crate::config::{Config, ConfigManager};
use crate::document::{ParsedDocument, XmlDocument};
use crate::downsample::{
    DomainProfile, DownsampleOptions, DownsampleOutcome, SequentialPlaceholders, downsample_with,
};
use crate::error::{IntrospectError, Result};
use crate::generate::{GenerateOutcome, generate_from_schema};
use crate::model::{StructureSummary, WalkMode};
use crate::oracle::{SchemaValidator, ValidationOutcome};
use crate::schema::{SchemaDocument, SchemaOptions, synthesize};
use crate::upsample::{UpsampleOutcome, upsample};
use crate::walker::{WalkerLimits, walker_for_mode, walker_for_size};

/// A derived artefact together with the summary it was built from
#[derive(Debug, Clone, Serialize)]
pub struct Analyzed<T> {
    pub summary: StructureSummary,
    pub outcome: T,
}

pub struct Introspector {
    config: Config,
    profile: DomainProfile,
}

impl Introspector {
    pub fn new(config: Config) -> Result<Self> {
        ConfigManager::validate_config(&config)?;
        let profile = config.domain_profile()?;
        Ok(Self { config, profile })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `work` on a blocking worker, bounded by `timeout`
    async fn run_blocking<T, F>(&self, operation: &str, timeout: Duration, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationFlag) -> Result<T> + Send + 'static,
    {
        let cancel = CancellationFlag::new();
        let worker_flag = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || work(worker_flag));
        Self::with_timeout(operation, timeout, &cancel, async {
            handle.await.map_err(|e| IntrospectError::Concurrency {
                details: e.to_string(),
            })?
        })
        .await
    }

    async fn with_timeout<T>(
        operation: &str,
        timeout: Duration,
        cancel: &CancellationFlag,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                warn!(
                    operation,
                    timeout_seconds = timeout.as_secs(),
                    "operation timed out; worker cancelled"
                );
                Err(IntrospectError::OperationTimeout {
                    operation: operation.to_string(),
                    timeout_seconds: timeout.as_secs(),
                })
            }
        }
    }

    /// Analyse a file, choosing the walker from its size
    pub async fn analyze_path(&self, path: &Path) -> Result<StructureSummary> {
        self.analyze_path_with_mode(path, None).await
    }

    /// Analyse a file, forcing a walker when `mode` is given
    pub async fn analyze_path_with_mode(
        &self,
        path: &Path,
        mode: Option<WalkMode>,
    ) -> Result<StructureSummary> {
        let limits = self.config.walker_limits();
        let path = path.to_path_buf();
        self.run_blocking(
            "analyze",
            ConfigManager::get_analysis_timeout(&self.config),
            move |cancel| analyze_file(&path, mode, limits, &cancel),
        )
        .await
    }

    pub async fn schema_for_path(
        &self,
        path: &Path,
        mode: Option<WalkMode>,
        options: SchemaOptions,
    ) -> Result<Analyzed<SchemaDocument>> {
        let limits = self.config.walker_limits();
        let path = path.to_path_buf();
        self.run_blocking(
            "schema",
            ConfigManager::get_transform_timeout(&self.config),
            move |cancel| {
                let summary = analyze_file(&path, mode, limits, &cancel)?;
                let outcome = synthesize(&summary, &options);
                Ok(Analyzed { summary, outcome })
            },
        )
        .await
    }

    pub async fn sample_path(
        &self,
        path: &Path,
        mode: Option<WalkMode>,
        options: DownsampleOptions,
    ) -> Result<Analyzed<DownsampleOutcome>> {
        let limits = self.config.walker_limits();
        let path = path.to_path_buf();
        let profile = self.profile.clone();
        self.run_blocking(
            "sample",
            ConfigManager::get_analysis_timeout(&self.config),
            move |cancel| {
                let summary = analyze_file(&path, mode, limits, &cancel)?;
                cancel.check()?;
                let outcome =
                    downsample_with(&summary, &options, &profile, &SequentialPlaceholders)?;
                Ok(Analyzed { summary, outcome })
            },
        )
        .await
    }

    pub async fn expand_path(
        &self,
        path: &Path,
        mode: Option<WalkMode>,
        target_element_count: usize,
    ) -> Result<Analyzed<UpsampleOutcome>> {
        let limits = self.config.walker_limits();
        let path = path.to_path_buf();
        self.run_blocking(
            "expand",
            ConfigManager::get_transform_timeout(&self.config),
            move |cancel| {
                let summary = analyze_file(&path, mode, limits, &cancel)?;
                cancel.check()?;
                let outcome = upsample(&summary, target_element_count);
                Ok(Analyzed { summary, outcome })
            },
        )
        .await
    }

    pub async fn roundtrip_path(&self, path: &Path) -> Result<ParsedDocument> {
        let path = path.to_path_buf();
        self.run_blocking(
            "roundtrip",
            ConfigManager::get_analysis_timeout(&self.config),
            move |cancel| {
                let input = read_utf8(&path)?;
                cancel.check()?;
                XmlDocument::parse(&input)
            },
        )
        .await
    }

    pub async fn generate_from_schema_path(
        &self,
        xsd: &Path,
        max_elements: usize,
    ) -> Result<GenerateOutcome> {
        let xsd = xsd.to_path_buf();
        self.run_blocking(
            "generate",
            ConfigManager::get_transform_timeout(&self.config),
            move |_| generate_from_schema(&read_utf8(&xsd)?, max_elements),
        )
        .await
    }

    /// Delegate to an external validator under the transform timeout
    pub async fn validate_paths(
        &self,
        validator: &dyn SchemaValidator,
        xml: &Path,
        xsd: &Path,
    ) -> Result<ValidationOutcome> {
        let cancel = CancellationFlag::new();
        Self::with_timeout(
            "validate",
            ConfigManager::get_transform_timeout(&self.config),
            &cancel,
            validator.validate(xml, xsd),
        )
        .await
    }
}

fn analyze_file(
    path: &Path,
    mode: Option<WalkMode>,
    limits: WalkerLimits,
    cancel: &CancellationFlag,
) -> Result<StructureSummary> {
    let file = File::open(path)?;
    let walker = match mode {
        Some(mode) => walker_for_mode(mode, limits),
        None => walker_for_size(file.metadata()?.len(), limits),
    };
    debug!(path = %path.display(), mode = %walker.mode(), "walking document");

    let mut reader = BufReader::new(file);
    let summary = walker.analyze(&mut reader, cancel)?;
    info!(
        path = %path.display(),
        tags = summary.tag_count(),
        elements = summary.total_element_count,
        "analysis finished"
    );
    Ok(summary)
}

fn read_utf8(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).map_err(|e| IntrospectError::ParseFailure {
        details: format!("{} is not UTF-8 text: {}", path.display(), e),
    })
}

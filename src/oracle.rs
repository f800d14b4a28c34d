//! External schema validation
//!
//! Validation against XML Schema is delegated wholesale to a standards-compliant
//! engine. Nothing here interprets XSD semantics.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{IntrospectError, Result};

/// Result of validating one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub messages: Vec<String>,
}

#[async_trait]
pub trait SchemaValidator: Send + Sync {
    async fn validate(&self, xml: &Path, xsd: &Path) -> Result<ValidationOutcome>;
}

/// Runs `xmllint --noout --schema <xsd> <xml>`
#[derive(Debug, Clone)]
pub struct XmllintValidator {
    program: PathBuf,
}

impl Default for XmllintValidator {
    fn default() -> Self {
        Self {
            program: PathBuf::from("xmllint"),
        }
    }
}

impl XmllintValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl SchemaValidator for XmllintValidator {
    async fn validate(&self, xml: &Path, xsd: &Path) -> Result<ValidationOutcome> {
        let output = Command::new(&self.program)
            .arg("--noout")
            .arg("--schema")
            .arg(xsd)
            .arg(xml)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| IntrospectError::ExternalValidator {
                details: format!("failed to run {}: {}", self.program.display(), e),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let messages: Vec<String> = stderr
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.ends_with(" validates"))
            .map(str::to_string)
            .collect();
        debug!(status = ?output.status.code(), lines = messages.len(), "xmllint finished");

        match output.status.code() {
            Some(0) => Ok(ValidationOutcome {
                valid: true,
                messages,
            }),
            // 1: document not well-formed, 3/4: schema validation failure
            Some(1 | 3 | 4) => Ok(ValidationOutcome {
                valid: false,
                messages,
            }),
            code => Err(IntrospectError::ExternalValidator {
                details: format!(
                    "xmllint exited with {}: {}",
                    code.map_or_else(|| "a signal".to_string(), |c| format!("status {}", c)),
                    messages.join("; ")
                ),
            }),
        }
    }
}

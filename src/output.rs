//! Output and Reporting
//!
//! Renders structure summaries and operation reports, as human-readable
//! text or JSON.

use serde::Serialize;
use std::path::Path;

use crate::cli::VerbosityLevel;
use crate::config::OutputFormat;
use crate::downsample::DownsampleOutcome;
use crate::error::IntrospectError;
use crate::generate::GenerateOutcome;
use crate::model::{Recovery, StructureSummary};
use crate::oracle::ValidationOutcome;
use crate::schema::SchemaDocument;
use crate::upsample::UpsampleOutcome;

#[derive(Serialize)]
struct Report<'a, T: Serialize> {
    operation: &'a str,
    input: &'a Path,
    #[serde(skip_serializing_if = "<[Recovery]>::is_empty")]
    recoveries: &'a [Recovery],
    outcome: &'a T,
}

/// Output formatter for summaries and reports
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn json<T: Serialize>(
        operation: &str,
        input: &Path,
        recoveries: &[Recovery],
        outcome: &T,
    ) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Report {
            operation,
            input,
            recoveries,
            outcome,
        })
    }

    /// One `warning:` line per recovery
    pub fn format_warnings(&self, recoveries: &[Recovery]) -> Vec<String> {
        recoveries
            .iter()
            .map(|recovery| {
                let message = match IntrospectError::from_recovery(recovery) {
                    Some(error) => error.to_string(),
                    None => recovery.to_string(),
                };
                format!("{} {}", self.colorize("warning:", "33"), message)
            })
            .collect()
    }

    pub fn format_summary(&self, input: &Path, summary: &StructureSummary) -> serde_json::Result<String> {
        if self.format == OutputFormat::Json {
            return Self::json("analyze", input, &summary.recoveries, summary);
        }
        if self.verbosity == VerbosityLevel::Quiet {
            return Ok(String::new());
        }

        let mut output = String::new();
        output.push_str(&format!(
            "Structure Summary ({}):\n",
            self.colorize(&summary.mode.to_string(), "36")
        ));
        output.push_str(&format!("  Input: {}\n", input.display()));
        output.push_str(&format!("  Root element: {}\n", summary.root_element_name));
        output.push_str(&format!("  Elements: {}\n", summary.total_element_count));
        output.push_str(&format!("  Distinct tags: {}\n", summary.tag_count()));
        output.push_str(&format!("  Max depth: {}\n", summary.max_depth));
        if !summary.namespace_decls.is_empty() {
            output.push_str("  Namespaces:\n");
            for (name, uri) in &summary.namespace_decls {
                output.push_str(&format!("    {} = {}\n", name, uri));
            }
        }

        output.push_str("\nTags:\n");
        for (tag, stats) in &summary.tag_stats {
            output.push_str(&format!(
                "  {} count={} depth={}{}\n",
                self.colorize(tag, "1"),
                stats.count,
                stats.max_depth,
                if stats.has_text { " text" } else { "" }
            ));
            if self.verbosity >= VerbosityLevel::Verbose {
                if !stats.attribute_names.is_empty() {
                    let names: Vec<&str> = stats.attribute_names.iter().map(String::as_str).collect();
                    output.push_str(&format!("    attributes: {}\n", names.join(", ")));
                }
                if !stats.child_tag_names.is_empty() {
                    let names: Vec<&str> = stats.child_tag_names.iter().map(String::as_str).collect();
                    output.push_str(&format!("    children: {}\n", names.join(", ")));
                }
            }
            if self.verbosity == VerbosityLevel::Debug {
                output.push_str(&format!("    examples kept: {}\n", stats.examples.len()));
            }
        }
        Ok(output)
    }

    pub fn format_schema_report(
        &self,
        input: &Path,
        summary: &StructureSummary,
        schema: &SchemaDocument,
    ) -> serde_json::Result<String> {
        if self.format == OutputFormat::Json {
            return Self::json("schema", input, &summary.recoveries, schema);
        }
        Ok(format!(
            "{} schema for {}: {} element declarations, {} imports{}\n",
            self.colorize("✓", "32"),
            schema.root_element,
            schema.elements.len(),
            schema.imports.len(),
            schema
                .target_namespace
                .as_deref()
                .map(|ns| format!(", target namespace {}", ns))
                .unwrap_or_default()
        ))
    }

    pub fn format_sample_report(
        &self,
        input: &Path,
        summary: &StructureSummary,
        outcome: &DownsampleOutcome,
    ) -> serde_json::Result<String> {
        if self.format == OutputFormat::Json {
            return Self::json("sample", input, &summary.recoveries, outcome);
        }
        let mut output = format!(
            "{} sample of {}: {} elements ({} selected, {} reference targets in {} elements)\n",
            self.colorize("✓", "32"),
            input.display(),
            outcome.emitted_elements,
            outcome.selected,
            outcome.pinned,
            outcome.pinned_elements
        );
        if !outcome.unresolved_references.is_empty() {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Unresolved references:", "33"),
                outcome.unresolved_references.join(", ")
            ));
        }
        Ok(output)
    }

    pub fn format_expand_report(
        &self,
        input: &Path,
        summary: &StructureSummary,
        outcome: &UpsampleOutcome,
    ) -> serde_json::Result<String> {
        if self.format == OutputFormat::Json {
            return Self::json("expand", input, &summary.recoveries, outcome);
        }
        Ok(format!(
            "{} expansion of {}: {} rules x {} instances, {} elements\n",
            self.colorize("✓", "32"),
            input.display(),
            outcome.rules.len(),
            outcome.per_rule_count,
            outcome.emitted_elements
        ))
    }

    pub fn format_generate_report(
        &self,
        input: &Path,
        outcome: &GenerateOutcome,
    ) -> serde_json::Result<String> {
        if self.format == OutputFormat::Json {
            return Self::json("generate", input, &[], outcome);
        }
        Ok(format!(
            "{} generated <{}> from {}: {} elements\n",
            self.colorize("✓", "32"),
            outcome.root_element,
            input.display(),
            outcome.emitted_elements
        ))
    }

    pub fn format_validation(
        &self,
        xml: &Path,
        outcome: &ValidationOutcome,
    ) -> serde_json::Result<String> {
        if self.format == OutputFormat::Json {
            return Self::json("validate", xml, &[], outcome);
        }
        let mut output = if outcome.valid {
            format!("{}  {}\n", self.colorize("✓ VALID", "32"), xml.display())
        } else {
            format!("{}  {}\n", self.colorize("✗ INVALID", "31"), xml.display())
        };
        if !outcome.valid || self.verbosity >= VerbosityLevel::Verbose {
            for message in &outcome.messages {
                output.push_str(&format!("    {}\n", message));
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WalkMode;
    use crate::walker::{WalkerLimits, analyze_str};

    fn summary() -> StructureSummary {
        analyze_str(
            r#"<Catalog xmlns:dc="urn:dc"><Book id="b1" dc:lang="en"><Title>T</Title></Book></Catalog>"#,
            WalkMode::InMemory,
            WalkerLimits::default(),
        )
        .unwrap()
    }

    fn plain(verbosity: VerbosityLevel, format: OutputFormat) -> Output {
        Output::new(verbosity, format).with_colors(false)
    }

    #[test]
    fn test_human_summary() {
        let output = plain(VerbosityLevel::Normal, OutputFormat::Human);
        let text = output
            .format_summary(Path::new("c.xml"), &summary())
            .unwrap();
        assert!(text.contains("Structure Summary (in-memory):"));
        assert!(text.contains("Root element: Catalog"));
        assert!(text.contains("Elements: 3"));
        assert!(text.contains("xmlns:dc = urn:dc"));
        assert!(text.contains("Title count=1 depth=2 text"));
        assert!(!text.contains("attributes:"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_verbose_summary_lists_attributes() {
        let output = plain(VerbosityLevel::Verbose, OutputFormat::Human);
        let text = output
            .format_summary(Path::new("c.xml"), &summary())
            .unwrap();
        assert!(text.contains("attributes: id, dc:lang"));
        assert!(text.contains("children: Title"));
    }

    #[test]
    fn test_quiet_summary_is_empty() {
        let output = plain(VerbosityLevel::Quiet, OutputFormat::Human);
        let text = output
            .format_summary(Path::new("c.xml"), &summary())
            .unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn test_json_summary() {
        let output = plain(VerbosityLevel::Normal, OutputFormat::Json);
        let text = output
            .format_summary(Path::new("c.xml"), &summary())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["operation"], "analyze");
        assert_eq!(value["outcome"]["root_tag_name"], "Catalog");
        assert_eq!(value["outcome"]["mode"], "in-memory");
        assert_eq!(value["outcome"]["tag_stats"]["Book"]["count"], 1);
        assert!(value.get("recoveries").is_none());
    }

    #[test]
    fn test_warnings_per_recovery() {
        let output = plain(VerbosityLevel::Normal, OutputFormat::Human);
        let lines = output.format_warnings(&[
            Recovery::Malformed {
                position: 12,
                details: "unclosed <a>".to_string(),
            },
            Recovery::Truncated {
                reason: "depth limit 1000".to_string(),
            },
        ]);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("warning: Malformed document at byte 12"));
        assert_eq!(lines[1], "warning: analysis truncated: depth limit 1000");
    }

    #[test]
    fn test_validation_lines() {
        let output = plain(VerbosityLevel::Normal, OutputFormat::Human);
        let invalid = ValidationOutcome {
            valid: false,
            messages: vec!["element Foo: not expected".to_string()],
        };
        let text = output
            .format_validation(Path::new("a.xml"), &invalid)
            .unwrap();
        assert!(text.starts_with("✗ INVALID  a.xml"));
        assert!(text.contains("element Foo: not expected"));
    }
}

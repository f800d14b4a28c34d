use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::OutputFormat;
use crate::downsample::Strategy;
use crate::model::WalkMode;
use crate::schema::FormDefault;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

impl VerbosityLevel {
    /// Default `tracing` filter directive for this level
    pub fn filter_directive(&self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "off",
            VerbosityLevel::Normal => "error",
            VerbosityLevel::Verbose => "info",
            VerbosityLevel::Debug => "debug",
        }
    }
}

/// XML structure introspection: statistics, schemas, samples and expansions
#[derive(Parser, Debug, Clone)]
#[command(name = "xml-introspect")]
#[command(about = "Learn the structure of XML documents and derive schemas, samples and expansions")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long = "config", global = true, help = "Configuration file (TOML or JSON)")]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(long = "format", global = true, help = "Report format: human or json")]
    pub format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long = "debug", global = true, conflicts_with = "quiet")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the structure summary of a document
    Analyze(AnalyzeArgs),
    /// Synthesize an XML Schema from a document
    Schema(SchemaArgs),
    /// Write a small representative sample of a document
    Sample(SampleArgs),
    /// Write a larger synthetic document from a document's tag rules
    Expand(ExpandArgs),
    /// Generate an instance document from an XML Schema
    Generate(GenerateArgs),
    /// Parse and re-serialize a document
    Roundtrip(RoundtripArgs),
    /// Validate a document against a schema with xmllint
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Input XML document
    pub input: PathBuf,

    /// Force a walker instead of choosing by file size
    #[arg(long = "mode", help = "Walker: in-memory or streaming")]
    pub mode: Option<WalkMode>,
}

#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    pub input: PathBuf,

    /// Destination; stdout when omitted
    pub output: Option<PathBuf>,

    #[arg(long = "namespace", help = "Target namespace (inferred from the root when omitted)")]
    pub namespace: Option<String>,

    #[arg(long = "element-form", default_value = "qualified")]
    pub element_form: FormDefault,

    #[arg(long = "attribute-form", default_value = "unqualified")]
    pub attribute_form: FormDefault,

    #[arg(long = "mode")]
    pub mode: Option<WalkMode>,
}

#[derive(Args, Debug, Clone)]
pub struct SampleArgs {
    pub input: PathBuf,

    /// Destination; stdout when omitted
    pub output: Option<PathBuf>,

    /// Element budget, root and reference targets excluded
    #[arg(long = "max-elements")]
    pub max_elements: Option<usize>,

    /// Deepest output depth (root is 0)
    #[arg(long = "max-depth")]
    pub max_depth: Option<usize>,

    #[arg(long = "strategy", help = "Selection strategy: balanced, random or first")]
    pub strategy: Option<Strategy>,

    /// Do not force one example of every tag
    #[arg(long = "no-preserve-types")]
    pub no_preserve_types: bool,

    /// Fail when a reference cannot be resolved
    #[arg(long = "strict-references")]
    pub strict_references: bool,

    /// Seed for the random strategy
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    #[arg(long = "mode")]
    pub mode: Option<WalkMode>,

    /// Domain profile: wordnet or generic
    #[arg(long = "profile")]
    pub profile: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExpandArgs {
    pub input: PathBuf,

    pub output: PathBuf,

    /// Approximate number of synthetic elements
    #[arg(long = "target-size", default_value = "1000")]
    pub target_size: usize,

    #[arg(long = "mode")]
    pub mode: Option<WalkMode>,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Input XML Schema
    pub xsd: PathBuf,

    /// Destination; stdout when omitted
    pub output: Option<PathBuf>,

    #[arg(long = "max-elements", default_value = "100")]
    pub max_elements: usize,
}

#[derive(Args, Debug, Clone)]
pub struct RoundtripArgs {
    pub input: PathBuf,

    /// Destination; stdout when omitted
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    pub xml: PathBuf,

    pub xsd: PathBuf,

    /// xmllint executable to run
    #[arg(long = "xmllint", default_value = "xmllint")]
    pub xmllint: PathBuf,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.debug {
            VerbosityLevel::Debug
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Input files the chosen command reads
    pub fn inputs(&self) -> Vec<&PathBuf> {
        match &self.command {
            Command::Analyze(args) => vec![&args.input],
            Command::Schema(args) => vec![&args.input],
            Command::Sample(args) => vec![&args.input],
            Command::Expand(args) => vec![&args.input],
            Command::Generate(args) => vec![&args.xsd],
            Command::Roundtrip(args) => vec![&args.input],
            Command::Validate(args) => vec![&args.xml, &args.xsd],
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for input in self.inputs() {
            if !input.exists() {
                return Err(format!("Path does not exist: {}", input.display()));
            }
        }
        match &self.command {
            Command::Sample(args) if args.max_elements == Some(0) => {
                Err("--max-elements must be greater than 0".to_string())
            }
            Command::Generate(args) if args.max_elements == 0 => {
                Err("--max-elements must be greater than 0".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_basic_cli_parsing() {
        let args = vec!["xml-introspect", "analyze", "/tmp/doc.xml"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Analyze(ref args) => {
                assert_eq!(args.input, PathBuf::from("/tmp/doc.xml"));
                assert_eq!(args.mode, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.verbosity(), VerbosityLevel::Normal);
    }

    #[test]
    fn test_schema_options() {
        let cli = Cli::try_parse_from([
            "xml-introspect",
            "schema",
            "in.xml",
            "out.xsd",
            "--namespace",
            "urn:x",
            "--element-form",
            "unqualified",
        ])
        .unwrap();
        let Command::Schema(args) = cli.command else {
            panic!("expected schema command");
        };
        assert_eq!(args.output, Some(PathBuf::from("out.xsd")));
        assert_eq!(args.namespace.as_deref(), Some("urn:x"));
        assert_eq!(args.element_form, FormDefault::Unqualified);
        assert_eq!(args.attribute_form, FormDefault::Unqualified);
    }

    #[test]
    fn test_sample_options_and_global_flags() {
        let cli = Cli::try_parse_from([
            "xml-introspect",
            "sample",
            "in.xml",
            "--max-elements",
            "2",
            "--strategy",
            "first",
            "--mode",
            "streaming",
            "-q",
        ])
        .unwrap();
        assert_eq!(cli.verbosity(), VerbosityLevel::Quiet);
        let Command::Sample(args) = cli.command else {
            panic!("expected sample command");
        };
        assert_eq!(args.max_elements, Some(2));
        assert_eq!(args.strategy, Some(Strategy::First));
        assert_eq!(args.mode, Some(WalkMode::Streaming));
        assert!(args.output.is_none());
    }

    #[test]
    fn test_expand_requires_output() {
        assert!(Cli::try_parse_from(["xml-introspect", "expand", "in.xml"]).is_err());
        let cli =
            Cli::try_parse_from(["xml-introspect", "expand", "in.xml", "out.xml"]).unwrap();
        let Command::Expand(args) = cli.command else {
            panic!("expected expand command");
        };
        assert_eq!(args.target_size, 1000);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["xml-introspect", "-v", "-q", "analyze", "a.xml"]).is_err());
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        assert!(
            Cli::try_parse_from(["xml-introspect", "sample", "a.xml", "--strategy", "greedy"])
                .is_err()
        );
    }

    #[test]
    fn test_validate_reports_missing_input() {
        let cli =
            Cli::try_parse_from(["xml-introspect", "analyze", "/nonexistent/doc.xml"]).unwrap();
        let error = cli.validate().unwrap_err();
        assert!(error.contains("does not exist"));
    }

    #[test]
    fn test_verbosity_filters() {
        assert_eq!(VerbosityLevel::Quiet.filter_directive(), "off");
        assert_eq!(VerbosityLevel::Debug.filter_directive(), "debug");
        assert!(VerbosityLevel::Verbose > VerbosityLevel::Normal);
    }
}

//! # xml-introspect Library
//!
//! Learns the structure of an XML document in one pass, in memory or
//! streamed, and derives artefacts from what it learned: an XML Schema, a
//! small representative sample, or a larger synthetic expansion.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod document;
pub mod downsample;
pub mod engine;
pub mod error;
pub mod generate;
pub mod model;
pub mod oracle;
pub mod output;
pub mod schema;
pub mod upsample;
pub mod walker;

pub use cancel::CancellationFlag;
pub use cli::{Cli, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager, OutputFormat};
pub use document::{ParsedDocument, XmlDocument, XmlWriter, roundtrip};
pub use downsample::{
    DomainProfile, DownsampleOptions, DownsampleOutcome, PlaceholderSource, Strategy, downsample,
    downsample_with,
};
pub use engine::{Analyzed, Introspector};
pub use error::{IntrospectError, Result};
pub use generate::{GenerateOutcome, generate_from_schema};
pub use model::{ElementNode, PatternRule, Recovery, StructureSummary, TagStats, WalkMode};
pub use oracle::{SchemaValidator, ValidationOutcome, XmllintValidator};
pub use output::Output;
pub use schema::{CompanionSchema, FormDefault, SchemaDocument, SchemaOptions, synthesize};
pub use upsample::{UpsampleOutcome, upsample};
pub use walker::{InMemoryWalker, StreamingWalker, Walker, WalkerLimits, analyze_str};

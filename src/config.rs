use crate::cli::{Cli, Command};
use crate::downsample::{DomainProfile, DownsampleOptions, Strategy};
use crate::walker::{CaptureLimits, WalkerLimits};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

const ENV_PREFIX: &str = "XML_INTROSPECT_";
const CONFIG_NAMES: [&str; 4] = [
    "xml-introspect.toml",
    "xml-introspect.json",
    ".xml-introspect.toml",
    ".xml-introspect.json",
];

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub limits: LimitsConfig,
    pub timeouts: TimeoutConfig,
    pub sampling: SamplingConfig,
    pub output: OutputConfig,
}

/// Walker bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Inputs larger than this many bytes are streamed
    pub large_file_threshold_bytes: u64,
    pub max_depth_in_memory: usize,
    pub max_elements_in_memory: usize,
    /// Hard ceiling for the streaming walker
    pub max_elements_streaming: usize,
    pub examples_per_tag: usize,
    /// Elements kept in one captured example subtree
    pub max_example_nodes: usize,
}

/// Wall-clock budgets per operation family
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Analysis, sampling and roundtrip
    pub analysis_seconds: u64,
    /// Schema synthesis, expansion, generation and validation
    pub transform_seconds: u64,
}

/// Downsampler defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub max_elements: usize,
    pub strategy: Strategy,
    pub preserve_all_types: bool,
    pub strict_references: bool,
    pub seed: Option<u64>,
    /// Domain profile name: `wordnet` or `generic`
    pub profile: String,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

/// How reports are rendered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("invalid format '{}', expected 'human' or 'json'", other)),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let walker = WalkerLimits::default();
        Self {
            large_file_threshold_bytes: walker.large_file_threshold_bytes,
            max_depth_in_memory: walker.max_depth_in_memory,
            max_elements_in_memory: walker.max_elements_in_memory,
            max_elements_streaming: walker.max_elements_streaming,
            examples_per_tag: walker.capture.examples_per_tag,
            max_example_nodes: walker.capture.max_example_nodes,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            analysis_seconds: 30,
            transform_seconds: 45,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        let options = DownsampleOptions::default();
        Self {
            max_elements: options.max_elements,
            strategy: options.strategy,
            preserve_all_types: options.preserve_all_types,
            strict_references: options.strict_references,
            seed: options.seed,
            profile: "wordnet".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Human,
            verbose: false,
            quiet: false,
        }
    }
}

impl Config {
    pub fn walker_limits(&self) -> WalkerLimits {
        WalkerLimits {
            large_file_threshold_bytes: self.limits.large_file_threshold_bytes,
            max_depth_in_memory: self.limits.max_depth_in_memory,
            max_elements_in_memory: self.limits.max_elements_in_memory,
            max_elements_streaming: self.limits.max_elements_streaming,
            capture: CaptureLimits {
                examples_per_tag: self.limits.examples_per_tag,
                max_example_nodes: self.limits.max_example_nodes,
            },
        }
    }

    /// Downsample options from the sampling section; `max_depth` is per call
    pub fn downsample_options(&self) -> DownsampleOptions {
        DownsampleOptions {
            max_elements: self.sampling.max_elements,
            strategy: self.sampling.strategy,
            preserve_all_types: self.sampling.preserve_all_types,
            max_depth: None,
            strict_references: self.sampling.strict_references,
            seed: self.sampling.seed,
        }
    }

    pub fn domain_profile(&self) -> Result<DomainProfile> {
        DomainProfile::by_name(&self.sampling.profile).ok_or_else(|| {
            ConfigError::Validation(format!(
                "Unknown domain profile '{}', expected 'wordnet' or 'generic'",
                self.sampling.profile
            ))
        })
    }
}

fn env_value<T: FromStr>(env: &impl EnvProvider, name: &str) -> Result<Option<T>> {
    let key = format!("{}{}", ENV_PREFIX, name);
    match env.get(&key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, raw))),
        None => Ok(None),
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides(config)?;
        config = Self::merge_with_cli(config, cli);
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        for name in &CONFIG_NAMES {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("xml-introspect");
            for name in &CONFIG_NAMES {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Limits
        if let Some(bytes) = env_value(env, "LARGE_FILE_THRESHOLD")? {
            config.limits.large_file_threshold_bytes = bytes;
        }
        if let Some(depth) = env_value(env, "MAX_DEPTH_IN_MEMORY")? {
            config.limits.max_depth_in_memory = depth;
        }
        if let Some(elements) = env_value(env, "MAX_ELEMENTS_IN_MEMORY")? {
            config.limits.max_elements_in_memory = elements;
        }
        if let Some(elements) = env_value(env, "MAX_ELEMENTS_STREAMING")? {
            config.limits.max_elements_streaming = elements;
        }
        if let Some(examples) = env_value(env, "EXAMPLES_PER_TAG")? {
            config.limits.examples_per_tag = examples;
        }
        if let Some(nodes) = env_value(env, "MAX_EXAMPLE_NODES")? {
            config.limits.max_example_nodes = nodes;
        }

        // Timeouts
        if let Some(seconds) = env_value(env, "ANALYSIS_TIMEOUT")? {
            config.timeouts.analysis_seconds = seconds;
        }
        if let Some(seconds) = env_value(env, "TRANSFORM_TIMEOUT")? {
            config.timeouts.transform_seconds = seconds;
        }

        // Sampling
        if let Some(max_elements) = env_value(env, "MAX_ELEMENTS")? {
            config.sampling.max_elements = max_elements;
        }
        if let Some(strategy) = env_value(env, "STRATEGY")? {
            config.sampling.strategy = strategy;
        }
        if let Some(preserve) = env_value(env, "PRESERVE_ALL_TYPES")? {
            config.sampling.preserve_all_types = preserve;
        }
        if let Some(strict) = env_value(env, "STRICT_REFERENCES")? {
            config.sampling.strict_references = strict;
        }
        if let Some(seed) = env_value(env, "SEED")? {
            config.sampling.seed = Some(seed);
        }
        if let Some(profile) = env_value(env, "PROFILE")? {
            config.sampling.profile = profile;
        }

        // Output
        if let Some(format) = env_value(env, "FORMAT")? {
            config.output.format = format;
        }
        if let Some(verbose) = env_value(env, "VERBOSE")? {
            config.output.verbose = verbose;
        }
        if let Some(quiet) = env_value(env, "QUIET")? {
            config.output.quiet = quiet;
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(format) = cli.format {
            config.output.format = format;
        }
        if cli.verbose || cli.debug {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        if let Command::Sample(args) = &cli.command {
            if let Some(max_elements) = args.max_elements {
                config.sampling.max_elements = max_elements;
            }
            if let Some(strategy) = args.strategy {
                config.sampling.strategy = strategy;
            }
            if args.no_preserve_types {
                config.sampling.preserve_all_types = false;
            }
            if args.strict_references {
                config.sampling.strict_references = true;
            }
            if args.seed.is_some() {
                config.sampling.seed = args.seed;
            }
            if let Some(profile) = &args.profile {
                config.sampling.profile = profile.clone();
            }
        }

        config
    }

    /// Merge two configurations (second takes precedence)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        base.limits = override_config.limits;
        base.timeouts = override_config.timeouts;

        base.sampling.max_elements = override_config.sampling.max_elements;
        base.sampling.strategy = override_config.sampling.strategy;
        base.sampling.preserve_all_types = override_config.sampling.preserve_all_types;
        base.sampling.strict_references = override_config.sampling.strict_references;
        if override_config.sampling.seed.is_some() {
            base.sampling.seed = override_config.sampling.seed;
        }
        base.sampling.profile = override_config.sampling.profile;

        base.output = override_config.output;
        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        let limits = &config.limits;
        if limits.max_depth_in_memory == 0 {
            return Err(ConfigError::Validation(
                "In-memory depth limit must be greater than 0".to_string(),
            ));
        }
        if limits.max_elements_in_memory == 0 || limits.max_elements_streaming == 0 {
            return Err(ConfigError::Validation(
                "Element limits must be greater than 0".to_string(),
            ));
        }
        if limits.examples_per_tag == 0 || limits.max_example_nodes == 0 {
            return Err(ConfigError::Validation(
                "Example capture limits must be greater than 0".to_string(),
            ));
        }

        if config.timeouts.analysis_seconds == 0 || config.timeouts.transform_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        config.domain_profile()?;

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }

    pub fn get_analysis_timeout(config: &Config) -> Duration {
        Duration::from_secs(config.timeouts.analysis_seconds)
    }

    pub fn get_transform_timeout(config: &Config) -> Duration {
        Duration::from_secs(config.timeouts.transform_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Mock environment variable provider for testing
    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn new() -> Self {
            Self::default()
        }

        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.limits.large_file_threshold_bytes, 10 * 1024 * 1024);
        assert_eq!(config.limits.max_depth_in_memory, 1_000);
        assert_eq!(config.limits.max_elements_in_memory, 100_000);
        assert_eq!(config.limits.max_elements_streaming, 10_000_000);
        assert_eq!(config.limits.examples_per_tag, 5);
        assert_eq!(config.limits.max_example_nodes, 512);

        assert_eq!(config.timeouts.analysis_seconds, 30);
        assert_eq!(config.timeouts.transform_seconds, 45);

        assert_eq!(config.sampling.max_elements, 100);
        assert_eq!(config.sampling.strategy, Strategy::Balanced);
        assert!(config.sampling.preserve_all_types);
        assert!(!config.sampling.strict_references);
        assert_eq!(config.sampling.seed, None);
        assert_eq!(config.sampling.profile, "wordnet");

        assert_eq!(config.output.format, OutputFormat::Human);
        assert!(!config.output.verbose);
        assert!(!config.output.quiet);

        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let toml_content = r#"
[limits]
large_file_threshold_bytes = 1024
examples_per_tag = 3

[timeouts]
analysis_seconds = 10

[sampling]
max_elements = 25
strategy = "random"
seed = 9
profile = "generic"

[output]
format = "json"
verbose = true
"#;
        fs::write(&config_path, toml_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).await.unwrap();

        assert_eq!(config.limits.large_file_threshold_bytes, 1024);
        assert_eq!(config.limits.examples_per_tag, 3);
        assert_eq!(config.limits.max_depth_in_memory, 1_000);
        assert_eq!(config.timeouts.analysis_seconds, 10);
        assert_eq!(config.timeouts.transform_seconds, 45);
        assert_eq!(config.sampling.max_elements, 25);
        assert_eq!(config.sampling.strategy, Strategy::Random);
        assert_eq!(config.sampling.seed, Some(9));
        assert_eq!(config.domain_profile().unwrap().name, "generic");
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.verbose);
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json_content = r#"{
  "sampling": { "max_elements": 7, "strategy": "first", "preserve_all_types": false },
  "output": { "format": "human", "quiet": true }
}"#;
        fs::write(&config_path, json_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).await.unwrap();
        assert_eq!(config.sampling.max_elements, 7);
        assert_eq!(config.sampling.strategy, Strategy::First);
        assert!(!config.sampling.preserve_all_types);
        assert!(config.output.quiet);
    }

    #[tokio::test]
    async fn test_unsupported_and_invalid_files() {
        let temp_dir = TempDir::new().unwrap();
        let yaml_path = temp_dir.path().join("config.yaml");
        fs::write(&yaml_path, "limits: {}").unwrap();
        assert!(matches!(
            ConfigManager::load_from_file(&yaml_path).await,
            Err(ConfigError::UnsupportedFormat(_))
        ));

        let broken_path = temp_dir.path().join("config.toml");
        fs::write(&broken_path, "[limits\nmax = ").unwrap();
        assert!(matches!(
            ConfigManager::load_from_file(&broken_path).await,
            Err(ConfigError::TomlParsing(_))
        ));

        let missing = temp_dir.path().join("missing.toml");
        assert!(matches!(
            ConfigManager::load_from_file(&missing).await,
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_environment_overrides() {
        let mut env = MockEnvProvider::new();
        env.set("XML_INTROSPECT_LARGE_FILE_THRESHOLD", "2048");
        env.set("XML_INTROSPECT_ANALYSIS_TIMEOUT", "5");
        env.set("XML_INTROSPECT_STRATEGY", "first");
        env.set("XML_INTROSPECT_SEED", "17");
        env.set("XML_INTROSPECT_FORMAT", "JSON");
        env.set("XML_INTROSPECT_QUIET", "true");

        let config =
            ConfigManager::apply_environment_overrides_with(&env, Config::default()).unwrap();
        assert_eq!(config.limits.large_file_threshold_bytes, 2048);
        assert_eq!(config.timeouts.analysis_seconds, 5);
        assert_eq!(config.sampling.strategy, Strategy::First);
        assert_eq!(config.sampling.seed, Some(17));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.quiet);
    }

    #[test]
    fn test_environment_overrides_example_limits_and_preservation() {
        let mut env = MockEnvProvider::new();
        env.set("XML_INTROSPECT_MAX_EXAMPLE_NODES", "64");
        env.set("XML_INTROSPECT_PRESERVE_ALL_TYPES", "false");

        let config =
            ConfigManager::apply_environment_overrides_with(&env, Config::default()).unwrap();
        assert_eq!(config.limits.max_example_nodes, 64);
        assert!(!config.sampling.preserve_all_types);
        assert_eq!(config.walker_limits().capture.max_example_nodes, 64);
        assert!(!config.downsample_options().preserve_all_types);
    }

    #[test]
    fn test_invalid_environment_value() {
        let mut env = MockEnvProvider::new();
        env.set("XML_INTROSPECT_MAX_ELEMENTS", "lots");
        let result = ConfigManager::apply_environment_overrides_with(&env, Config::default());
        match result {
            Err(ConfigError::Environment(message)) => {
                assert!(message.contains("XML_INTROSPECT_MAX_ELEMENTS"))
            }
            other => panic!("expected environment error, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_overrides_sampling() {
        let cli = Cli::try_parse_from([
            "xml-introspect",
            "--format",
            "json",
            "sample",
            "in.xml",
            "--max-elements",
            "12",
            "--strategy",
            "random",
            "--no-preserve-types",
            "--seed",
            "3",
        ])
        .unwrap();
        let config = ConfigManager::merge_with_cli(Config::default(), &cli);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.sampling.max_elements, 12);
        assert_eq!(config.sampling.strategy, Strategy::Random);
        assert!(!config.sampling.preserve_all_types);
        assert_eq!(config.sampling.seed, Some(3));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.timeouts.transform_seconds = 0;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.limits.examples_per_tag = 0;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.output.verbose = true;
        config.output.quiet = true;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.sampling.profile = "docbook".to_string();
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_conversions() {
        let config = Config::default();
        assert_eq!(config.walker_limits(), WalkerLimits::default());
        assert_eq!(config.downsample_options(), DownsampleOptions::default());
        assert_eq!(
            ConfigManager::get_transform_timeout(&config),
            Duration::from_secs(45)
        );
    }
}

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use xml_introspect::cli::{Cli, Command, VerbosityLevel};
use xml_introspect::config::{ConfigManager, OutputFormat};
use xml_introspect::engine::Introspector;
use xml_introspect::error::IntrospectError;
use xml_introspect::model::Recovery;
use xml_introspect::oracle::XmllintValidator;
use xml_introspect::output::Output;
use xml_introspect::schema::{SchemaDocument, SchemaOptions};

/// Exit status when the validator rejects the document
const EXIT_INVALID: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.verbosity());

    match run(cli).await {
        Ok(code) => code,
        Err(err) => match err.downcast_ref::<IntrospectError>() {
            Some(error) if !error.is_fatal() => {
                eprintln!("warning: {:#}", err);
                ExitCode::SUCCESS
            }
            _ => {
                eprintln!("error: {:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

/// `RUST_LOG` wins over the verbosity flags
fn init_logging(verbosity: VerbosityLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let config = ConfigManager::load_config(&cli)
        .await
        .context("failed to load configuration")?;
    let output = Output::new(cli.verbosity(), config.output.format);
    let quiet = cli.verbosity() == VerbosityLevel::Quiet;
    let engine = Introspector::new(config)?;

    match &cli.command {
        Command::Analyze(args) => {
            let summary = engine
                .analyze_path_with_mode(&args.input, args.mode)
                .await?;
            print_warnings(&output, &summary.recoveries);
            print!("{}", output.format_summary(&args.input, &summary)?);
        }
        Command::Schema(args) => {
            let options = SchemaOptions {
                target_namespace: args.namespace.clone(),
                element_form_default: args.element_form,
                attribute_form_default: args.attribute_form,
                companion_stem: args
                    .output
                    .as_deref()
                    .and_then(Path::file_stem)
                    .map(|stem| stem.to_string_lossy().into_owned()),
            };
            let analyzed = engine
                .schema_for_path(&args.input, args.mode, options)
                .await?;
            print_warnings(&output, &analyzed.summary.recoveries);
            emit(args.output.as_deref(), &analyzed.outcome.to_xml()).await?;
            write_companions(args.output.as_deref(), &analyzed.outcome).await?;
            let report =
                output.format_schema_report(&args.input, &analyzed.summary, &analyzed.outcome)?;
            print_report(&output, quiet, args.output.is_some(), &report);
        }
        Command::Sample(args) => {
            let mut options = engine.config().downsample_options();
            options.max_depth = args.max_depth;
            let analyzed = engine
                .sample_path(&args.input, args.mode, options)
                .await?;
            print_warnings(&output, &analyzed.summary.recoveries);
            emit(args.output.as_deref(), &analyzed.outcome.xml).await?;
            let report =
                output.format_sample_report(&args.input, &analyzed.summary, &analyzed.outcome)?;
            print_report(&output, quiet, args.output.is_some(), &report);
        }
        Command::Expand(args) => {
            let analyzed = engine
                .expand_path(&args.input, args.mode, args.target_size)
                .await?;
            print_warnings(&output, &analyzed.summary.recoveries);
            emit(Some(&args.output), &analyzed.outcome.xml).await?;
            let report =
                output.format_expand_report(&args.input, &analyzed.summary, &analyzed.outcome)?;
            print_report(&output, quiet, true, &report);
        }
        Command::Generate(args) => {
            let outcome = engine
                .generate_from_schema_path(&args.xsd, args.max_elements)
                .await?;
            emit(args.output.as_deref(), &outcome.xml).await?;
            let report = output.format_generate_report(&args.xsd, &outcome)?;
            print_report(&output, quiet, args.output.is_some(), &report);
        }
        Command::Roundtrip(args) => {
            let parsed = engine.roundtrip_path(&args.input).await?;
            if let Some(recovery) = &parsed.recovery {
                print_warnings(&output, std::slice::from_ref(recovery));
            }
            emit(args.output.as_deref(), &parsed.document.to_xml_string()).await?;
        }
        Command::Validate(args) => {
            let validator = XmllintValidator::with_program(&args.xmllint);
            let outcome = engine
                .validate_paths(&validator, &args.xml, &args.xsd)
                .await?;
            print!("{}", output.format_validation(&args.xml, &outcome)?);
            if !outcome.valid {
                return Ok(ExitCode::from(EXIT_INVALID));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_warnings(output: &Output, recoveries: &[Recovery]) {
    for line in output.format_warnings(recoveries) {
        eprintln!("{}", line);
    }
}

/// Reports go to stdout unless the artefact itself was written there
fn print_report(output: &Output, quiet: bool, artefact_in_file: bool, report: &str) {
    if quiet && output.format() == OutputFormat::Human {
        return;
    }
    if artefact_in_file {
        print!("{}", report);
    } else {
        eprint!("{}", report);
    }
}

/// Companion schemas go next to the main schema; stdout has no "next to"
async fn write_companions(destination: Option<&Path>, schema: &SchemaDocument) -> Result<()> {
    let Some(path) = destination else {
        for companion in &schema.companions {
            eprintln!(
                "warning: attributes in {} need {}; pass an output path to write it",
                companion.namespace, companion.location
            );
        }
        return Ok(());
    };
    for companion in &schema.companions {
        let companion_path = path.with_file_name(&companion.location);
        emit(Some(&companion_path), &companion.to_xml()).await?;
    }
    Ok(())
}

async fn emit(destination: Option<&Path>, content: &str) -> Result<()> {
    match destination {
        Some(path) => tokio::fs::write(path, content)
            .await
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

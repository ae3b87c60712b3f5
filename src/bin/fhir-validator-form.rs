//! FHIR Validator Form CLI
//!
//! Command-line front end for validating FHIR resources against an external
//! validator service.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fhir_validator_form::{
    locator_version, ClientConfig, FileRef, FormAction, GuideProfiles, Issue, LineBase,
    ProfileCatalog, Severity, SlotAction, SlotName, SubmitStatus, ValidationReport,
    ValidatorClient, ValidatorForm, DEFAULT_VALIDATOR_URL, FILE_READ_ERROR, VALIDATOR_URL_ENV,
};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fhir-validator-form")]
#[command(about = "Validate FHIR resources against profiles via an external validator")]
#[command(version)]
struct Cli {
    /// Base URL of the validator service
    #[arg(long, global = true, env = VALIDATOR_URL_ENV, default_value = DEFAULT_VALIDATOR_URL)]
    validator_url: String,

    /// HTTP timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    /// The validator numbers issue lines from 0
    #[arg(long, global = true)]
    zero_based_lines: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a resource (JSON or XML) and print the annotated result
    Validate {
        /// Resource file, or - for stdin
        resource: PathBuf,

        /// StructureDefinition to upload and validate against
        #[arg(long)]
        profile_file: Option<PathBuf>,

        /// Implementation guide to load before validating
        #[arg(long)]
        ig: Option<String>,

        /// Canonical URL of a profile to validate against
        #[arg(long)]
        profile: Option<String>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// List implementation guides known to the validator
    Igs {
        #[arg(long)]
        json: bool,
    },

    /// Load an implementation guide by id and list its profiles
    LoadIg {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Upload a package archive (package.tgz) and list its profiles
    LoadPackage {
        package: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// List profiles grouped by implementation guide
    ProfilesByIg {
        #[arg(long)]
        json: bool,
    },

    /// Show the validator's version
    Version {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let line_base = if cli.zero_based_lines {
        LineBase::ZeroBased
    } else {
        LineBase::AsReported
    };
    let config = ClientConfig::new(cli.validator_url)
        .timeout(Duration::from_secs(cli.timeout_secs))
        .line_base(line_base);

    let client = match ValidatorClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };
    let catalog = ProfileCatalog::new();

    let result = match cli.command {
        Commands::Validate {
            resource,
            profile_file,
            ig,
            profile,
            json,
        } => {
            run_validate(
                &client,
                &catalog,
                ValidateArgs {
                    resource,
                    profile_file,
                    ig,
                    profile,
                    json_output: json,
                },
            )
            .await
        }
        Commands::Igs { json } => run_igs(&client, json).await,
        Commands::LoadIg { id, json } => run_load_ig(&client, &catalog, &id, json).await,
        Commands::LoadPackage { package, json } => {
            run_load_package(&client, &catalog, &package, json).await
        }
        Commands::ProfilesByIg { json } => run_profiles_by_ig(&client, json).await,
        Commands::Version { json } => run_version(&client, json).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

struct ValidateArgs {
    resource: PathBuf,
    profile_file: Option<PathBuf>,
    ig: Option<String>,
    profile: Option<String>,
    json_output: bool,
}

async fn run_validate(
    client: &ValidatorClient,
    catalog: &ProfileCatalog,
    args: ValidateArgs,
) -> Result<(), u8> {
    let ValidateArgs {
        resource,
        profile_file,
        ig,
        profile,
        json_output,
    } = args;
    let mut form = ValidatorForm::new();

    if resource.as_os_str() == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .map_err(|e| {
                report_error(json_output, &format!("reading stdin: {}", e));
                3u8
            })?;
        form.change_text(SlotName::Resource, text);
    } else {
        load_slot(&mut form, SlotName::Resource, &resource).await;
    }

    if let Some(path) = &profile_file {
        load_slot(&mut form, SlotName::Profile, path).await;
        if let Some(message) = form.state().profile.error() {
            eprintln!("Warning: profile {}: {}", path.display(), message);
        }
    }

    if !form.can_submit() {
        let slot_error = form.state().resource.error().unwrap_or_default().to_string();
        let code = if slot_error.starts_with(FILE_READ_ERROR) { 3 } else { 2 };
        let banner = match form.begin_submit() {
            Err(e) => e.to_string(),
            Ok(_) => String::new(),
        };
        let message = if slot_error.is_empty() {
            banner
        } else {
            format!("{banner}: {slot_error}")
        };
        report_error(json_output, &message);
        return Err(code);
    }
    if let Some(kind) = form.detected_resource_banner() {
        tracing::info!("{}", kind);
    }

    if let Some(ig) = ig {
        form.dispatch(FormAction::SetImplementationGuide(Some(ig.clone())));
        catalog.load(client, &ig).await.map_err(|e| {
            report_error(json_output, &format!("loading {}: {}", ig, e));
            e.exit_code() as u8
        })?;
        if let Some(url) = &profile {
            if !form.profile_options(catalog).contains(url) {
                eprintln!("Warning: {} is not a profile of {}", url, ig);
            }
        }
    }
    if profile.is_some() {
        form.dispatch(FormAction::SetProfileSelection(profile));
    }

    match form.submit(client).await {
        SubmitStatus::Completed => {}
        SubmitStatus::Failed(e) => {
            report_error(json_output, &form.state().error);
            return Err(e.exit_code() as u8);
        }
        SubmitStatus::Discarded => {
            report_error(json_output, "submission was superseded");
            return Err(3);
        }
    }

    let Some(report) = form.report(client.config().line_base) else {
        report_error(json_output, "no validation results");
        return Err(3);
    };

    if json_output {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if report.issues.has_errors() {
        Err(1)
    } else {
        Ok(())
    }
}

/// Upload a file into a form slot and wait for its read to land.
async fn load_slot(form: &mut ValidatorForm, name: SlotName, path: &Path) {
    let pending = form.dispatch(FormAction::Slot(
        name,
        SlotAction::UploadFile(FileRef::from_path(path)),
    ));
    if let Some(read) = pending {
        form.complete_read(name, read.run().await);
    }
}

fn print_report(report: &ValidationReport) {
    println!("{}\n", report.summary());

    let highlighted: BTreeSet<i64> = report.issues.highlighted_lines();
    for (index, line) in report.resource_text.lines().enumerate() {
        let number = index as i64 + 1;
        let marker = if highlighted.contains(&number) { '>' } else { ' ' };
        println!("{}{:>5} | {}", marker, number, line);
    }
    println!();

    print_bucket(Severity::Error, &report.issues.errors);
    print_bucket(Severity::Warning, &report.issues.warnings);
    print_bucket(Severity::Information, &report.issues.information);
}

fn print_bucket(severity: Severity, issues: &[Issue]) {
    let color = match severity {
        Severity::Fatal | Severity::Error => "\x1b[31m",
        Severity::Warning => "\x1b[33m",
        _ => "\x1b[36m",
    };
    println!(
        "{}{}\x1b[0m",
        color,
        ValidationReport::heading(severity, issues.len())
    );
    for issue in issues {
        println!("  {}", issue);
    }
    println!();
}

async fn run_igs(client: &ValidatorClient, json_output: bool) -> Result<(), u8> {
    let guides = client.get_implementation_guides().await.map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;

    if json_output {
        return print_json(&guides);
    }
    for (id, locator) in &guides {
        match locator_version(locator) {
            Some(version) => println!("{} {} ({})", id, locator, version),
            None => println!("{} {}", id, locator),
        }
    }
    Ok(())
}

async fn run_load_ig(
    client: &ValidatorClient,
    catalog: &ProfileCatalog,
    id: &str,
    json_output: bool,
) -> Result<(), u8> {
    let guide = catalog.load(client, id).await.map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;
    print_guide(&guide, json_output)
}

async fn run_load_package(
    client: &ValidatorClient,
    catalog: &ProfileCatalog,
    package: &Path,
    json_output: bool,
) -> Result<(), u8> {
    let file = FileRef::from_path(package);
    let guide = catalog.load_package(client, &file).await.map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;
    print_guide(&guide, json_output)
}

fn print_guide(guide: &GuideProfiles, json_output: bool) -> Result<(), u8> {
    if json_output {
        return print_json(guide);
    }
    println!("{}#{}", guide.id, guide.version);
    for profile in &guide.profiles {
        println!("  {}", profile);
    }
    Ok(())
}

async fn run_profiles_by_ig(client: &ValidatorClient, json_output: bool) -> Result<(), u8> {
    let profiles = client.get_profiles_by_ig().await.map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;

    if json_output {
        return print_json(&profiles);
    }
    for (id, urls) in &profiles {
        println!("{}", id);
        for url in urls {
            println!("  {}", url);
        }
    }
    Ok(())
}

async fn run_version(client: &ValidatorClient, json_output: bool) -> Result<(), u8> {
    let versions = client.get_version().await.map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;

    if json_output {
        return print_json(&versions);
    }
    for (name, version) in &versions {
        println!("{}: {}", name, version);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), u8> {
    let output = serde_json::to_string_pretty(value).map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", output);
    Ok(())
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

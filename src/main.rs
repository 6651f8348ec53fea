use clap::{Parser, Subcommand};
use plugin_sandbox::{
    CapabilityType, PermissionChecker, PermissionSet, PermissionValidator,
};
use std::path::PathBuf;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

/// Plugin Sandbox - Capability Firewall for Untrusted Plugins
///
/// Inspect and validate the permission sets that govern what sandboxed
/// plugin code may do.
#[derive(Parser)]
#[command(name = "plugin-sandbox")]
#[command(version = "0.1.0")]
#[command(about = "Capability sandbox for plugin modules", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a permission-set JSON file
    Validate {
        /// Path to the permission-set document
        file: PathBuf,
    },
    /// Check one capability (and optional resource) against a permission set
    Check {
        /// Capability name, e.g. "net:https"
        capability: String,
        /// Resource the request targets, e.g. "api.example.com"
        resource: Option<String>,
        /// Path to a permission-set document
        #[arg(short, long, conflicts_with = "preset")]
        file: Option<PathBuf>,
        /// Use a named preset instead of a file
        #[arg(short, long)]
        preset: Option<String>,
    },
    /// List the named permission presets and their grants
    Presets,
    /// List the closed capability enumeration
    Capabilities,
}

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let result = match cli.command {
        Commands::Validate { file } => validate(&file),
        Commands::Check {
            capability,
            resource,
            file,
            preset,
        } => check(&capability, resource.as_deref(), file.as_deref(), preset.as_deref()),
        Commands::Presets => {
            show_presets();
            Ok(())
        }
        Commands::Capabilities => {
            show_capabilities();
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_set(
    file: Option<&std::path::Path>,
    preset: Option<&str>,
) -> Result<PermissionSet, Box<dyn std::error::Error>> {
    match (file, preset) {
        (Some(path), _) => {
            let raw = std::fs::read_to_string(path)?;
            let doc: serde_json::Value = serde_json::from_str(&raw)?;
            let report = PermissionValidator::validate(&doc);
            if !report.valid {
                return Err(format!(
                    "invalid permission set: {}",
                    report.errors.join("; ")
                )
                .into());
            }
            Ok(serde_json::from_value(doc)?)
        }
        (None, Some(name)) => {
            PermissionSet::preset(name).ok_or_else(|| format!("unknown preset '{}'", name).into())
        }
        (None, None) => Err("provide either --file or --preset".into()),
    }
}

fn validate(file: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(file)?;
    let doc: serde_json::Value = serde_json::from_str(&raw)?;
    let report = PermissionValidator::validate(&doc);

    println!("\n{}", "=".repeat(60));
    println!("Validation: {}", file.display());
    println!("{}", "=".repeat(60));

    if report.valid {
        println!("Valid permission set.");
        Ok(())
    } else {
        for error in &report.errors {
            println!("  - {}", error);
        }
        Err(format!("{} error(s)", report.errors.len()).into())
    }
}

fn check(
    capability: &str,
    resource: Option<&str>,
    file: Option<&std::path::Path>,
    preset: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let capability = CapabilityType::parse(capability)
        .ok_or_else(|| format!("unknown capability '{}'", capability))?;
    let checker = PermissionChecker::new(load_set(file, preset)?);
    let result = checker.check(capability, resource);

    println!("\n{}", "=".repeat(60));
    println!("Capability: {}", capability);
    if let Some(resource) = resource {
        println!("Resource: {}", resource);
    }
    println!("Granted: {}", result.granted);
    if let Some(reason) = &result.reason {
        println!("Reason: {}", reason);
    }
    println!("{}", "=".repeat(60));

    if result.granted {
        Ok(())
    } else {
        std::process::exit(2);
    }
}

fn show_presets() {
    println!("\n{}", "=".repeat(60));
    println!("Permission Presets");
    println!("{}", "=".repeat(60));

    for name in ["minimal", "standard", "unrestricted"] {
        let set = PermissionSet::preset(name).expect("built-in preset");
        println!("\n{}:", name);
        if set.permissions.is_empty() {
            println!("  (no explicit grants)");
        }
        for permission in &set.permissions {
            match &permission.resource {
                Some(resource) => println!("  {} ({})", permission.capability, resource),
                None => println!("  {}", permission.capability),
            }
        }
        if bool::from(set.unlisted) {
            println!("  allowUnlisted: true");
        }
    }

    println!("\n{}", "=".repeat(60));
}

fn show_capabilities() {
    println!("\n{}", "=".repeat(60));
    println!("Capabilities");
    println!("{}", "=".repeat(60));

    for capability in CapabilityType::ALL {
        println!("  {}", capability);
    }

    println!("{}", "=".repeat(60));
}

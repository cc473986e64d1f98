use std::path::Path;

use astrix::{
    config::{SettingsValidator, loader::load_settings, models::ContextSettings},
    core::service_properties::split_service_uri,
    tracing_setup,
};
use clap::{Parser, ValueEnum};
use color_eyre::{Result, eyre::Context};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Commands,

    /// Log level filter, e.g. "info" or "astrix=debug"
    #[clap(long, default_value = "warn", global = true)]
    log_level: String,

    /// Log output format
    #[clap(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    /// One line per event
    Compact,
    /// One JSON object per event
    Json,
    /// Multi-line, for reading in a terminal
    Console,
}

impl LogFormat {
    fn init(self, level: &str) -> Result<()> {
        match self {
            Self::Compact => tracing_setup::init_tracing_with_config(level, false, false)?,
            Self::Json => tracing_setup::init_tracing(level)?,
            Self::Console => tracing_setup::init_console_tracing(level)?,
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate a settings file
    Validate {
        /// Settings file to validate
        #[clap(short, long, default_value = "astrix.toml")]
        config: String,

        /// Print the resolved settings as JSON
        #[clap(long)]
        json: bool,
    },
    /// Write a default settings file
    Init {
        /// Output path for the new settings file
        #[clap(short, long, default_value = "astrix.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    args.log_format.init(&args.log_level)?;

    let result = match args.command {
        Commands::Validate { config, json } => validate_settings_command(&config, json).await,
        Commands::Init { config } => init_settings_command(&config).await,
    };
    tracing_setup::shutdown_tracing();
    result
}

/// Validate a settings file and exit
async fn validate_settings_command(settings_path: &str, json: bool) -> Result<()> {
    println!("🔍 Validating settings file: {settings_path}");

    if !Path::new(settings_path).exists() {
        eprintln!("❌ Error: Settings file '{settings_path}' not found");
        std::process::exit(1);
    }

    let settings = match load_settings(settings_path).await {
        Ok(settings) => {
            println!("✅ Settings parsing: OK");
            settings
        }
        Err(e) => {
            eprintln!("❌ Settings parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match SettingsValidator::validate(&settings) {
        Ok(()) => {
            println!("✅ Settings validation: OK");
            println!();
            if json {
                let rendered = serde_json::to_string_pretty(&settings)
                    .context("Failed to render settings as JSON")?;
                println!("{rendered}");
            } else {
                print_summary(&settings);
            }
            println!();
            println!("🎉 Settings are valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Settings validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Intervals use humantime units, e.g. \"250ms\", \"10s\", \"1m\"");
            println!("   • bind_worker_pool_size must be at least 1 and fit a semaphore");
            println!("   • Service URIs look like <component>:<address>, e.g. \"direct:1\"");
            std::process::exit(1);
        }
    }
}

fn print_summary(settings: &ContextSettings) {
    println!("📋 Settings Summary:");
    println!("   • Subsystem: {}", settings.subsystem);
    println!(
        "   • Enforce Subsystem Boundaries: {}",
        settings.enforce_subsystem_boundaries
    );
    println!(
        "   • Bind Attempt Interval: {}",
        settings.bean_bind_attempt_interval
    );
    println!(
        "   • Lease Renew Interval: {}",
        settings.service_lease_renew_interval
    );
    println!("   • Bind Worker Pool Size: {}", settings.bind_worker_pool_size);
    println!("   • Configured Services: {}", settings.services.len());
    for (name, uri) in &settings.services {
        let component = split_service_uri(uri)
            .map(|(component, _)| component)
            .unwrap_or("?");
        println!("     - {name} -> {uri} (component: {component})");
    }
}

/// Initialize a new settings file
async fn init_settings_command(settings_path: &str) -> Result<()> {
    let path = Path::new(settings_path);
    if path.exists() {
        eprintln!("❌ Error: Settings file '{settings_path}' already exists");
        std::process::exit(1);
    }

    let default_settings = r#"# Astrix context settings

[astrix]
# Subsystem this application belongs to
subsystem = "default"

# Refuse non-versioned services provided by other subsystems
enforce_subsystem_boundaries = true

# How often unbound beans retry binding
bean_bind_attempt_interval = "10s"

# How often bound beans re-run discovery
service_lease_renew_interval = "30s"

# Maximum concurrent bind attempts
bind_worker_pool_size = 4

# Service URIs used by config-provided services
[astrix.services]
# quotes = "direct:1"
"#;

    tokio::fs::write(path, default_settings)
        .await
        .context("Failed to write settings file")?;
    println!("✅ Created default settings at: {settings_path}");
    println!("   Run 'astrix validate --config {settings_path}' to check it");
    Ok(())
}

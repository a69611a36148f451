//! tagw CLI entry point.
//!
//! Runs a gateway from a TOML configuration, or performs one-shot reads,
//! writes and tag listings against it.
//!
//! ```bash
//! tagw --config gateway.toml read Speed line2/Level
//! tagw --config gateway.toml run --tags Speed,line2/Level --interval-ms 500
//! tagw example > gateway.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use tagw::core::logging::init_tracing;
use tagw::core::metadata::get_driver_catalog;
use tagw::gateway::{ControllerConfig, Gateway, GatewayConfig, GatewaySettings};
use tagw::{Result, Value};

/// Tag gateway for industrial controllers
#[derive(Parser, Debug)]
#[command(name = "tagw", version, about, long_about = None)]
struct Cli {
    /// Gateway configuration file
    #[arg(short, long, env = "TAGW_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway, optionally printing subscription updates as JSON lines
    Run {
        /// Tags to subscribe to (comma separated)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Poll interval; defaults to the configured one
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Read tags once and print the values as JSON
    Read {
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Write one tag; the value is parsed as JSON, falling back to a string
    Write { tag: String, value: String },

    /// Print every controller's tag table as JSON
    Tags,

    /// List built-in drivers
    ListDrivers,

    /// Print an example configuration
    Example {
        #[arg(default_value = "simulated")]
        driver: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::ListDrivers => {
            list_drivers();
            Ok(())
        }
        Commands::Example { driver } => generate_example(&driver),
        command => match cli.config {
            Some(path) => run_command(path, command).await,
            None => {
                eprintln!("--config (or TAGW_CONFIG) is required for this command");
                return ExitCode::from(2);
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(path: PathBuf, command: Commands) -> Result<()> {
    let gateway = Gateway::from_config_file(&path).await?;

    let result = match command {
        Commands::Run { tags, interval_ms } => run(&gateway, tags, interval_ms).await,
        Commands::Read { tags } => {
            let outcome = gateway.read(tags).await;
            print_json(&outcome.values);
            outcome.error.map_or(Ok(()), Err)
        }
        Commands::Write { tag, value } => {
            let value = serde_json::from_str::<serde_json::Value>(&value)
                .map(Value::from)
                .unwrap_or(Value::String(value));
            gateway.write(&tag, value).await
        }
        Commands::Tags => {
            print_json(&gateway.all_tags());
            Ok(())
        }
        Commands::ListDrivers | Commands::Example { .. } => Ok(()),
    };

    gateway.shutdown().await;
    result
}

async fn run(gateway: &Gateway, tags: Vec<String>, interval_ms: Option<u64>) -> Result<()> {
    if !tags.is_empty() {
        let interval = interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| gateway.default_poll_interval());
        if let Some(token) = gateway.subscribe(tags, interval, |update| print_json(&update)) {
            info!(%token, "subscribed");
        }
    }

    info!(gateway = %gateway.name(), "running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| tagw::GatewayError::Internal(e.to_string()))?;
    info!("shutting down");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("cannot encode output: {}", e),
    }
}

fn list_drivers() {
    let catalog = get_driver_catalog();

    println!("Built-in drivers:");
    println!();

    for driver in catalog.drivers() {
        println!("  {} ({})", driver.name, driver.display_name);
        println!("    {}", driver.description);
        if !driver.parameters.is_empty() {
            println!("    Parameters:");
            for param in &driver.parameters {
                let req = if param.required { " (required)" } else { "" };
                println!("      - {}{}: {}", param.name, req, param.description);
            }
        }
        println!();
    }
}

fn generate_example(driver: &str) -> Result<()> {
    let Some(meta) = get_driver_catalog().get(driver) else {
        let known: Vec<&str> = get_driver_catalog().drivers().iter().map(|d| d.name).collect();
        eprintln!("Unknown driver: {}", driver);
        eprintln!("Available: {}", known.join(", "));
        return Ok(());
    };

    let config = GatewayConfig::new(GatewaySettings {
        name: "Example gateway".into(),
        tag_file_dir: "tags".into(),
        default_controller: Some("plc1".into()),
        ..Default::default()
    })
    .with_controller(
        ControllerConfig::new("plc1", meta.name, "plc1.txt")
            .with_allow_write(true)
            .with_parameters(meta.example_parameters.clone()),
    );

    let text = toml::to_string(&config)
        .map_err(|e| tagw::GatewayError::Internal(e.to_string()))?;

    println!("# tagw configuration - {} example", meta.display_name);
    println!("#");
    println!("# tags/plc1.txt holds one `name=address` per line, e.g.");
    println!("#   Speed=DB1,REAL0");
    println!("#   Running=DB1,X4.0");
    println!();
    println!("{}", text);
    Ok(())
}

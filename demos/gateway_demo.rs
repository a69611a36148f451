//! Gateway demo.
//!
//! Builds a two-controller plant (or loads a configuration file), reads and
//! writes a few tags, then subscribes for a while and prints every update.
//!
//! # Run
//!
//! ```bash
//! cargo run --example gateway_demo
//! cargo run --example gateway_demo -- --config gateway.toml --tags Speed,line2/Level --jsonl
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;

use tagw::core::logging::init_tracing;
use tagw::gateway::{ControllerConfig, Gateway, GatewayConfig, GatewaySettings, SubscriptionUpdate};
use tagw::store::MemorySource;
use tagw::{Result, TagValues, Value};

#[derive(Parser, Debug)]
#[command(name = "gateway_demo", about = "tagw gateway demo")]
struct Args {
    /// Configuration file; an in-memory plant is used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tags to subscribe to
    #[arg(long, value_delimiter = ',', default_value = "Speed,Running,line2/Level")]
    tags: Vec<String>,

    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// How long to keep the subscription running
    #[arg(long, default_value_t = 3)]
    seconds: u64,

    /// Output events as JSON Lines
    #[arg(long)]
    jsonl: bool,

    #[arg(short, long)]
    verbose: bool,
}

/// Demo event stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DemoEvent {
    Started {
        gateway_name: String,
        controllers: Vec<String>,
    },
    Read {
        values: TagValues,
        error: Option<String>,
    },
    Written {
        tag: String,
        value: Value,
        error: Option<String>,
    },
    Update(SubscriptionUpdate),
    Stopped {
        gateway_name: String,
    },
}

struct Printer {
    jsonl: bool,
}

impl Printer {
    fn emit(&self, event: &DemoEvent) {
        if self.jsonl {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{}", line);
            }
            return;
        }

        match event {
            DemoEvent::Started {
                gateway_name,
                controllers,
            } => println!("[{}] started with {}", gateway_name, controllers.join(", ")),
            DemoEvent::Read { values, error } => {
                let mut tags: Vec<_> = values.iter().collect();
                tags.sort_by(|a, b| a.0.cmp(b.0));
                for (tag, reading) in tags {
                    println!("  {:<16} {}", tag, reading);
                }
                if let Some(e) = error {
                    println!("  error: {}", e);
                }
            }
            DemoEvent::Written { tag, value, error } => match error {
                None => println!("  wrote {} = {}", tag, value),
                Some(e) => println!("  write {} failed: {}", tag, e),
            },
            DemoEvent::Update(update) => {
                let mut tags: Vec<_> = update.values.iter().collect();
                tags.sort_by(|a, b| a.0.cmp(b.0));
                let line: Vec<String> = tags.iter().map(|(t, r)| format!("{}={}", t, r)).collect();
                println!("  update from {}: {}", update.controller, line.join(" "));
            }
            DemoEvent::Stopped { gateway_name } => println!("[{}] stopped", gateway_name),
        }
    }
}

async fn demo_plant() -> Result<Gateway> {
    let source = MemorySource::new()
        .with_source("tags/line1.txt", "Speed=DB1,REAL0\nRunning=DB1,X4.0\nSetpoint=DB1,REAL8\n")
        .with_source("tags/line2.txt", "Level=MW20\nPressure=MW22\n");

    let config = GatewayConfig::new(GatewaySettings {
        name: "Demo plant".into(),
        tag_file_dir: "tags".into(),
        default_controller: Some("line1".into()),
        ..Default::default()
    })
    .with_controller(
        ControllerConfig::new("line1", "simulated", "line1.txt")
            .with_allow_write(true)
            .with_parameters(serde_json::json!({
                "latency_ms": 40,
                "values": { "DB1,REAL0": 1450.0, "DB1,X4.0": true, "DB1,REAL8": 1500.0 }
            })),
    )
    .with_controller(
        ControllerConfig::new("line2", "simulated", "line2.txt")
            .with_passthrough(true)
            .with_parameters(serde_json::json!({
                "latency_ms": 120,
                "values": { "MW20": 870, "MW40": 12 },
                "faults": { "MW22": "BAD_COMM" }
            })),
    );

    Gateway::builder(config)
        .tag_source(Arc::new(source))
        .build()
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let printer = Arc::new(Printer { jsonl: args.jsonl });

    let gateway = match &args.config {
        Some(path) => Gateway::from_config_file(path).await?,
        None => demo_plant().await?,
    };

    printer.emit(&DemoEvent::Started {
        gateway_name: gateway.name().to_string(),
        controllers: gateway.controllers().map(|c| c.id().to_string()).collect(),
    });

    // One-shot batch read; line2/MW40 only resolves through passthrough.
    let mut tags = args.tags.clone();
    tags.push("line2/MW40".into());
    let outcome = gateway.read(tags).await;
    printer.emit(&DemoEvent::Read {
        values: outcome.values,
        error: outcome.error.map(|e| e.to_string()),
    });

    for (tag, value) in [("Setpoint", Value::from(1600.0)), ("line2/Level", Value::from(0))] {
        let result = gateway.write(tag, value.clone()).await;
        printer.emit(&DemoEvent::Written {
            tag: tag.to_string(),
            value,
            error: result.err().map(|e| e.to_string()),
        });
    }

    let sink = Arc::clone(&printer);
    let token = gateway.subscribe(
        args.tags.clone(),
        Duration::from_millis(args.interval_ms),
        move |update| sink.emit(&DemoEvent::Update(update)),
    );

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.seconds)) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    if let Some(token) = token {
        gateway.unsubscribe(&token)?;
    }
    gateway.shutdown().await;
    printer.emit(&DemoEvent::Stopped {
        gateway_name: gateway.name().to_string(),
    });
    Ok(())
}

mod config;
mod serve;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use rfidgate_core::{
    GateStorage, LogEntryRecord, ScanResult, SetStatusOutcome, TagRecord, TagStatus,
};
use tracing_subscriber::EnvFilter;

use crate::config::{build_workflow, DatabaseArgs, NotifyArgs};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// RFID gate: toggle tag presence on each scan and publish the result.
#[derive(Parser)]
#[command(name = "rfidgate", version, about = "RFID gate presence tracker")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(flatten)]
    db: DatabaseArgs,

    #[command(flatten)]
    notify: NotifyArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, env = "RFIDGATE_PORT", default_value_t = 8080)]
        port: u16,
    },

    /// Create the database schema and exit
    Init,

    /// Add a tag to the registry
    Register {
        /// Tag identifier as read from the card
        tag: String,
        /// Initial status (0 = absent, 1 = present)
        #[arg(long, default_value = "0")]
        status: TagStatus,
    },

    /// Process one scan: toggle a registered tag or log an unknown one
    Scan {
        /// Tag identifier as read from the card
        tag: String,
    },

    /// Set a tag's status without toggling
    SetStatus {
        /// Tag identifier
        tag: String,
        /// New status (0 = absent, 1 = present)
        status: TagStatus,
    },

    /// List registered tags
    Tags,

    /// Show recent log entries, newest first
    Logs {
        /// Number of entries to show (0 = all)
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    let output = cli.output;

    // Logs go to stderr so `--output json` stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), output);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        report_error(&format!("error: {}", e), output);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let output = cli.output;
    match cli.command {
        Commands::Serve { port } => {
            let workflow = build_workflow(&cli.db, &cli.notify).await?;
            serve::start_server(port, workflow).await
        }
        Commands::Init => cmd_init(&cli.db, output).await,
        Commands::Register { tag, status } => {
            let workflow = build_workflow(&cli.db, &cli.notify).await?;
            let record = workflow.register(&tag, status).await?;
            print_tag_registered(&record, output);
            Ok(())
        }
        Commands::Scan { tag } => {
            let workflow = build_workflow(&cli.db, &cli.notify).await?;
            let result = workflow.process_scan(&tag).await?;
            print_scan(&result, output);
            Ok(())
        }
        Commands::SetStatus { tag, status } => {
            let workflow = build_workflow(&cli.db, &cli.notify).await?;
            let outcome = workflow.set_status(&tag, status).await?;
            print_set_status(&outcome, output);
            Ok(())
        }
        Commands::Tags => {
            let storage = cli.db.connect().await?;
            let tags = storage.list_tags().await?;
            print_tags(&tags, output);
            Ok(())
        }
        Commands::Logs { limit } => {
            let storage = cli.db.connect().await?;
            let logs = storage.list_recent_logs(limit).await?;
            print_logs(&logs, output);
            Ok(())
        }
    }
}

async fn cmd_init(db: &DatabaseArgs, output: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let storage = db.connect().await?;
    storage.close().await;
    match output {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "initialized": true, "database_url": db.database_url })
        ),
        OutputFormat::Text => println!("initialized {}", db.database_url),
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

fn print_tag_registered(record: &TagRecord, output: OutputFormat) {
    match output {
        OutputFormat::Json => print_json(record),
        OutputFormat::Text => println!("registered {} ({})", record.tag_id, record.status),
    }
}

fn print_scan(result: &ScanResult, output: OutputFormat) {
    match output {
        OutputFormat::Json => print_json(result),
        OutputFormat::Text => match result.previous_status {
            Some(previous) => println!(
                "{}: {} -> {} at {}",
                result.tag_id, previous, result.new_status, result.timestamp
            ),
            None => println!(
                "{}: not registered, logged {} at {}",
                result.tag_id, result.new_status, result.timestamp
            ),
        },
    }
}

fn print_set_status(outcome: &SetStatusOutcome, output: OutputFormat) {
    match output {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Text => {
            println!("{}: set to {}", outcome.tag_id, outcome.new_status);
            if outcome.rows_affected == 0 {
                println!("warning: {} is not registered; only the log was written", outcome.tag_id);
            }
        }
    }
}

fn print_tags(tags: &[TagRecord], output: OutputFormat) {
    match output {
        OutputFormat::Json => print_json(&tags),
        OutputFormat::Text => {
            if tags.is_empty() {
                println!("no registered tags");
            }
            for tag in tags {
                println!("{}\t{}", tag.tag_id, tag.status);
            }
        }
    }
}

fn print_logs(logs: &[LogEntryRecord], output: OutputFormat) {
    match output {
        OutputFormat::Json => print_json(&logs),
        OutputFormat::Text => {
            if logs.is_empty() {
                println!("no log entries");
            }
            for entry in logs {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.id, entry.timestamp, entry.tag_id, entry.status
                );
            }
        }
    }
}

/// Print an error message in the requested output format.
pub(crate) fn report_error(msg: &str, output: OutputFormat) {
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

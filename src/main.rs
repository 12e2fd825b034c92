use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use index_readjuster_lib::{logging, Config, EngineError, ReadjustmentEngine};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "readjust", about = "Contract readjustment by published index series")]
struct Cli {
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured sources
    Sources,
    /// List the periods of a source, oldest first
    Periods { source: String },
    /// Show one data point
    Point { source: String, period: String },
    /// Readjust an amount between two periods (defaults: oldest -> latest)
    Calc {
        source: String,
        amount: f64,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load().context("loading configuration")?;
    logging::init(config.log_json);

    let engine = ReadjustmentEngine::from_config(&config)?;

    match cli.command {
        Command::Sources => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(engine.sources())?);
            } else {
                for s in engine.sources() {
                    println!("{:<6} {:<16} {}", s.id, format!("{:?}", s.kind), s.name);
                }
            }
        }
        Command::Periods { source } => {
            let periods = match engine.list_periods(&source).await {
                Ok(periods) => periods,
                Err(e) => return user_exit(e),
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&periods)?);
            } else {
                for p in periods {
                    println!("{}", p);
                }
            }
        }
        Command::Point { source, period } => match engine.get_point(&source, &period).await {
            Err(e) => return user_exit(e),
            Ok(Some(point)) if cli.json => println!("{}", serde_json::to_string_pretty(&point)?),
            Ok(Some(point)) => {
                let variation = point
                    .variation
                    .map(|v| format!("{:.2}%", v))
                    .unwrap_or_else(|| "-".to_string());
                println!("{}  index {}  variation {}", point.period_label, point.index_value, variation);
            }
            Ok(None) => {
                eprintln!("Period '{}' not found in '{}'", period, source);
                return Ok(ExitCode::from(2));
            }
        },
        Command::Calc { source, amount, from, to } => {
            let (start, end) = match engine.resolve_range(&source, from, to).await {
                Ok(range) => range,
                Err(e) => return user_exit(e),
            };

            let result = match engine.compute_readjustment(&source, amount, &start, &end).await {
                Ok(r) => r,
                Err(e) => return user_exit(e),
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Original amount:        {:.2}", result.original_amount);
                println!("Index at {:<14} {}", format!("{}:", result.start.period_label), result.start.index_value);
                println!("Index at {:<14} {}", format!("{}:", result.end.period_label), result.end.index_value);
                println!("Readjusted amount:      {:.2}", result.adjusted_amount);
                println!("Change:                 {:.2}%", result.percent_change);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Caller mistakes exit with 2; anything else is a failure.
fn user_exit(e: EngineError) -> Result<ExitCode> {
    if e.is_user_error() {
        eprintln!("{}", e);
        Ok(ExitCode::from(2))
    } else {
        Err(e.into())
    }
}

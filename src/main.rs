use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde::Serialize;

use prover_backend_lib::config::Config;
use prover_backend_lib::db;
use prover_backend_lib::db::error::StoreError;
use prover_backend_lib::logging;
use prover_backend_lib::witness_queue::{WitnessQueue, WitnessStatus};

#[derive(Parser, Debug)]
#[clap(about = "Inspection CLI for the batch-witness proving pipeline")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print stage counts and the latest height
    Stats {
        #[clap(long)]
        json: bool,
    },
    /// Page through heights currently at a stage
    Heights {
        #[clap(long, value_parser = parse_status)]
        status: WitnessStatus,

        #[clap(long, default_value_t = 50)]
        limit: i64,

        #[clap(long, default_value_t = 0)]
        offset: i64,
    },
    /// Show the latest witness record, optionally filtered by stage
    Latest {
        #[clap(long, value_parser = parse_status)]
        status: Option<WitnessStatus>,
    },
}

fn parse_status(value: &str) -> Result<WitnessStatus, String> {
    value.parse()
}

#[derive(Serialize)]
struct StatsOutput {
    table: String,
    total: i64,
    published: i64,
    received: i64,
    finished: i64,
    latest_height: Option<i64>,
}

fn run(command: Command, config: &Config) -> Result<(), StoreError> {
    let queue = WitnessQueue::new(&config.table_suffix)?;
    let mut conn = db::connect(&config.db_url, config.statement_timeout_ms)?;

    match command {
        Command::Stats { json } => {
            let counts = queue.stage_counts(&mut conn)?;
            let latest_height = match queue.latest_height(&mut conn) {
                Ok(height) => Some(height),
                Err(StoreError::NotFound) => None,
                Err(err) => return Err(err),
            };

            let stats = StatsOutput {
                table: queue.table_name().to_string(),
                total: counts.total,
                published: counts.published,
                received: counts.received,
                finished: counts.finished,
                latest_height,
            };

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&stats).expect("stats must serialize")
                );
            } else {
                println!("table:         {}", stats.table);
                println!("total:         {}", stats.total);
                println!("published:     {}", stats.published);
                println!("received:      {}", stats.received);
                println!("finished:      {}", stats.finished);
                match stats.latest_height {
                    Some(height) => println!("latest height: {height}"),
                    None => println!("latest height: (empty)"),
                }
            }
        }
        Command::Heights {
            status,
            limit,
            offset,
        } => match queue.heights_by_status(&mut conn, status, limit, offset) {
            Ok(heights) => {
                for height in heights {
                    println!("{height}");
                }
            }
            // NotFound here means "no more data", not a failure.
            Err(StoreError::NotFound) => {
                println!("no heights at status {status} in this page");
            }
            Err(err) => return Err(err),
        },
        Command::Latest { status } => {
            let witness = match status {
                Some(status) => queue.latest_by_status(&mut conn, status),
                None => queue.latest(&mut conn),
            };
            match witness {
                Ok(witness) => println!(
                    "height={} status={} updated_at={}",
                    witness.height, witness.status, witness.updated_at
                ),
                Err(StoreError::NotFound) => println!("no matching witness records"),
                Err(err) => return Err(err),
            }
        }
    }

    Ok(())
}

fn main() {
    dotenv().ok();
    logging::init_logging("prover-backend", "info");

    let args = Cli::parse();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(args.command, &config) {
        eprintln!("{}", logging::format_error_report(&err));
        std::process::exit(1);
    }
}

use std::path::PathBuf;
use std::process;

use affordability::api::{
    self, AffordabilityArgs, BuydownArgs, GridArgs, affordability_response, buydown_response,
    grid_response,
};
use affordability::config::{self, DEFAULT_CONFIG_PATH};
use affordability::report;
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "affordability",
    about = "Mortgage affordability calculator (28/36 rule, amortization, rate buydowns)"
)]
struct Cli {
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long, global = true, help = "Print JSON instead of text")]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Housing costs and debt-to-income ratios
    Summary(AffordabilityArgs),
    /// Month-by-month amortization schedule
    Schedule {
        #[command(flatten)]
        args: AffordabilityArgs,
        #[arg(long, help = "Aggregate rows by loan year")]
        yearly: bool,
    },
    /// Break-even analysis for buying down the interest rate
    Buydown(BuydownArgs),
    /// Monthly housing cost over a band of rates and prices
    Grid(GridArgs),
    /// Serve the web page and JSON API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

fn print_output<T: Serialize>(json: bool, value: &T, render: impl FnOnce(&T) -> String) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Serialization error: {e}");
                process::exit(1);
            }
        }
    } else {
        print!("{}", render(value));
    }
}

fn exit_with(msg: &str) -> ! {
    eprintln!("Error: {msg}");
    process::exit(2);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("affordability=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match config::load_or_default(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Config error: {e}");
            process::exit(1);
        }
    };

    match cli.command {
        Command::Summary(args) => {
            let response = affordability_response(&args, &cfg).unwrap_or_else(|e| exit_with(&e));
            print_output(cli.json, &response, report::render_summary);
        }
        Command::Schedule { args, yearly } => {
            let response = affordability_response(&args, &cfg).unwrap_or_else(|e| exit_with(&e));
            print_output(cli.json, &response.schedule, |schedule| {
                report::render_schedule(schedule, yearly)
            });
        }
        Command::Buydown(args) => {
            let response = buydown_response(&args).unwrap_or_else(|e| exit_with(&e));
            print_output(cli.json, &response, report::render_buydown);
        }
        Command::Grid(args) => {
            let response = grid_response(&args, &cfg).unwrap_or_else(|e| exit_with(&e));
            print_output(cli.json, &response, report::render_grid);
        }
        Command::Serve { port } => {
            if let Err(e) = api::run_http_server(port, cfg).await {
                eprintln!("Server error: {e}");
                process::exit(1);
            }
        }
    }
}

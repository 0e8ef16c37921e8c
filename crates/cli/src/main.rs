//! powchain CLI entry point.

use clap::Parser;
use colored::Colorize;

mod commands;

#[derive(Parser)]
#[command(name = "powchain")]
#[command(about = "Offline tools for powchain wallets and ledgers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(cmd) => {
            if let Err(e) = commands::run(cmd) {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
                std::process::exit(1);
            }
        }
        None => {
            println!("powchain - offline tools for powchain wallets and ledgers");
            println!("Run 'powchain --help' for usage information.");
        }
    }
}

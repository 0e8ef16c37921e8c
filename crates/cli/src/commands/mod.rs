//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod ledger;
mod tx;
mod wallet;

#[derive(Subcommand)]
pub enum Commands {
    /// Wallet management
    Wallet(wallet::WalletArgs),
    /// Transaction operations
    Tx(tx::TxArgs),
    /// Inspect a ledger file
    Ledger(ledger::LedgerArgs),
}

pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Wallet(args) => wallet::run(args),
        Commands::Tx(args) => tx::run(args),
        Commands::Ledger(args) => ledger::run(args),
    }
}

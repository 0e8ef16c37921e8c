//! Transaction operations command.

use super::wallet::read_private_key;
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use powchain_core::{Identity, SignedTransaction, Transaction};
use std::path::PathBuf;

#[derive(Args)]
pub struct TxArgs {
    #[command(subcommand)]
    command: TxCommand,
}

#[derive(Subcommand)]
enum TxCommand {
    /// Sign a transfer and print the /add_transaction payload
    Sign {
        /// Wallet JSON, PEM or bare private key body of the sender
        #[arg(short = 'k', long)]
        private_key_file: PathBuf,

        /// Receiver identity (public key body)
        #[arg(short, long)]
        receiver: String,

        /// Amount to transfer
        #[arg(short, long)]
        amount: u64,
    },
}

pub fn run(args: TxArgs) -> Result<()> {
    match args.command {
        TxCommand::Sign {
            private_key_file,
            receiver,
            amount,
        } => sign(private_key_file, receiver, amount),
    }
}

fn sign(private_key_file: PathBuf, receiver: String, amount: u64) -> Result<()> {
    let keypair = read_private_key(&private_key_file)?;
    let payload = build_payload(&keypair, Identity::new(receiver), amount)?;

    eprintln!(
        "{}  Signed transfer of {} (POST this to /add_transaction)",
        "✓".green().bold(),
        amount.to_string().bright_cyan()
    );
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn build_payload(
    keypair: &powchain_core::Keypair,
    receiver: Identity,
    amount: u64,
) -> Result<SignedTransaction> {
    if receiver.public_key().is_err() {
        bail!("Receiver is not a valid public key");
    }
    let sender = keypair.identity()?;
    Ok(Transaction::new(sender, receiver, amount).signed(keypair))
}

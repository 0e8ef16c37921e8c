//! Ledger inspection command.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use powchain_chain::balance_of;
use powchain_consensus::{ChainValidator, Difficulty, ProofOfWork, DEFAULT_DIFFICULTY};
use powchain_core::{Block, Identity};
use powchain_storage::ledger::parse_records;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct LedgerArgs {
    #[command(subcommand)]
    command: LedgerCommand,
}

#[derive(Subcommand)]
enum LedgerCommand {
    /// Check hash links and proofs of every block
    Verify {
        /// Ledger file to read
        #[arg(short, long, default_value = "./data/ledger.txt")]
        ledger: PathBuf,

        /// Difficulty the ledger was mined at
        #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: usize,
    },
    /// Show the committed balance of an identity
    Balance {
        /// Ledger file to read
        #[arg(short, long, default_value = "./data/ledger.txt")]
        ledger: PathBuf,

        /// Identity (public key body)
        #[arg(short, long, required_unless_present = "address_file")]
        address: Option<String>,

        /// File holding the identity, as a bare body or PEM
        #[arg(long, conflicts_with = "address")]
        address_file: Option<PathBuf>,
    },
}

pub fn run(args: LedgerArgs) -> Result<()> {
    match args.command {
        LedgerCommand::Verify { ledger, difficulty } => verify(&ledger, difficulty),
        LedgerCommand::Balance {
            ledger,
            address,
            address_file,
        } => {
            let identity = match (address, address_file) {
                (Some(address), _) => Identity::new(address),
                (None, Some(path)) => read_identity(&path)?,
                (None, None) => bail!("Pass --address or --address-file"),
            };
            balance(&ledger, &identity)
        }
    }
}

/// Read a ledger file without modifying it.
fn load_ledger(path: &Path) -> Result<Vec<Block>> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed = parse_records(&data)
        .with_context(|| format!("{} is not a valid ledger", path.display()))?;

    if parsed.valid_len < data.len() {
        eprintln!(
            "{}  Ignoring {} bytes of incomplete trailing record",
            "!".yellow().bold(),
            data.len() - parsed.valid_len
        );
    }
    Ok(parsed.blocks)
}

fn read_identity(path: &Path) -> Result<Identity> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Identity::new(powchain_core::crypto::strip_armor(&text)))
}

fn verify(path: &Path, difficulty: usize) -> Result<()> {
    let chain = load_ledger(path)?;
    let validator = ChainValidator::new(ProofOfWork::new(Difficulty(difficulty)));

    println!();
    println!("  Ledger: {}", path.display().to_string().bright_black());
    println!("  Blocks: {}", chain.len().to_string().bright_cyan());
    if let Some(tip) = chain.last() {
        println!("  Tip:    {}", tip.hash().to_hex().bright_yellow());
    }
    println!();

    match validator.validate(&chain) {
        Ok(()) => {
            println!("{}  Ledger is valid", "✓".green().bold());
            Ok(())
        }
        Err(e) => {
            println!("{}  {}", "✗".red().bold(), e);
            bail!("Ledger failed verification")
        }
    }
}

fn balance(path: &Path, identity: &Identity) -> Result<()> {
    let chain = load_ledger(path)?;
    let balance = balance_of(&chain, identity);

    println!();
    println!("  Total:   {}", balance.total.to_string().bright_cyan());
    println!("  Income:  {}", balance.income.to_string().green());
    println!("  Outcome: {}", balance.outcome.to_string().red());
    println!();

    Ok(())
}

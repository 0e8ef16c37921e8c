//! Wallet management command.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use powchain_core::crypto::{strip_armor, DEFAULT_KEY_BITS};
use powchain_core::{Identity, Keypair};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct WalletArgs {
    #[command(subcommand)]
    command: WalletCommand,
}

#[derive(Subcommand)]
enum WalletCommand {
    /// Generate a new RSA keypair
    New {
        /// Save the wallet as JSON to this file
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// RSA modulus size
        #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,
    },
}

/// A wallet file as written by `wallet new --out`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletFile {
    pub public_key: Identity,
    pub private_key: String,
}

pub fn run(args: WalletArgs) -> Result<()> {
    match args.command {
        WalletCommand::New { out, bits } => new_wallet(out, bits),
    }
}

fn new_wallet(out: Option<PathBuf>, bits: usize) -> Result<()> {
    let keypair = Keypair::generate_with_bits(bits).context("Failed to generate keypair")?;
    let wallet = WalletFile {
        public_key: keypair.identity()?,
        private_key: keypair.private_key()?,
    };

    println!("{}", "Generated new wallet:".bold().cyan());
    println!();
    println!("{}", "  Public key (your address):".bold());
    println!("{}", wallet.public_key.as_str().bright_yellow());
    println!();
    println!("{}", "  Private key:".bold());
    println!("{}", wallet.private_key.bright_black());

    if let Some(path) = out {
        if path.exists() {
            bail!("Refusing to overwrite {}", path.display());
        }
        fs::write(&path, serde_json::to_string_pretty(&wallet)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!();
        println!(
            "{}  Saved to: {}",
            "✓".green().bold(),
            path.display().to_string().bright_black()
        );
    }

    println!();
    println!("{}", "Keep your private key safe!".yellow().bold());

    Ok(())
}

/// Load a private key body from a wallet JSON file, a PEM file, or a bare
/// key body.
pub fn read_private_key(path: &Path) -> Result<Keypair> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file {}", path.display()))?;

    let body = match serde_json::from_str::<WalletFile>(&text) {
        Ok(wallet) => wallet.private_key,
        Err(_) => strip_armor(text.trim()),
    };

    Keypair::from_private_key(&body)
        .with_context(|| format!("No usable private key in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use powchain_core::crypto::{armor, PemLabel};
    use tempfile::TempDir;

    #[test]
    fn test_read_private_key_formats() {
        let dir = TempDir::new().unwrap();
        let keypair = Keypair::generate_with_bits(1024).unwrap();
        let body = keypair.private_key().unwrap();
        let identity = keypair.identity().unwrap();

        let wallet = dir.path().join("wallet.json");
        fs::write(
            &wallet,
            serde_json::to_string(&WalletFile {
                public_key: identity.clone(),
                private_key: body.clone(),
            })
            .unwrap(),
        )
        .unwrap();

        let pem = dir.path().join("key.pem");
        fs::write(&pem, armor(&body, PemLabel::RsaPrivateKey)).unwrap();

        let bare = dir.path().join("key.txt");
        fs::write(&bare, format!("{}\n", body)).unwrap();

        for path in [wallet, pem, bare] {
            assert_eq!(read_private_key(&path).unwrap().identity().unwrap(), identity);
        }
    }

    #[test]
    fn test_read_private_key_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.txt");
        fs::write(&path, "hello").unwrap();
        assert!(read_private_key(&path).is_err());
    }
}

//! Credo - identity credential registry CLI

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credo_core::{types::parse_biguint, AccumulatorParams, ContentRef, IdentityHash, Witness};
use credo_registry::{publish, AccumulatorExport, RegistryStorage};

/// Credo - RSA accumulator identity registry
#[derive(Parser)]
#[command(name = "credo")]
#[command(about = "Register, revoke and verify identity credentials against an RSA accumulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to registry storage
    #[arg(long, env = "CREDO_DATA_DIR", default_value = "./credo_data")]
    data_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new accumulator
    Init {
        /// RSA modulus as 0x-hex or decimal (defaults to RSA-2048)
        #[arg(long)]
        modulus: Option<String>,

        /// Accumulator base as 0x-hex or decimal
        #[arg(long, default_value = "65537")]
        base: String,
    },

    /// Register a new identity
    Add {
        /// Raw identity credential
        #[arg(long)]
        identity: String,

        /// Off-chain document handle (e.g. an IPFS CID)
        #[arg(long)]
        content_ref: String,

        /// Write the issued witness to this file
        #[arg(long)]
        witness_out: Option<PathBuf>,
    },

    /// Permanently revoke an identity
    Revoke {
        /// Identity hash (hex)
        #[arg(long)]
        identity_hash: String,
    },

    /// Verify a witness against the live accumulator
    Verify {
        /// Identity hash (hex)
        #[arg(long)]
        identity_hash: String,

        /// Witness file (JSON)
        #[arg(long)]
        witness: PathBuf,
    },

    /// Print the current witness for an identity
    Witness {
        /// Identity hash (hex)
        #[arg(long)]
        identity_hash: String,

        /// Write the witness to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show registry status
    Status,

    /// Recompute the accumulator value from the history
    Replay {
        /// First generation
        #[arg(long, default_value = "0")]
        from: u64,

        /// Last generation
        #[arg(long)]
        to: u64,
    },

    /// Replay the full history and compare with the live state
    Audit,

    /// Export the current accumulator for verifiers
    Export {
        /// Output path for the binary export
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the QR text form
        #[arg(long)]
        qr: bool,
    },
}

fn parse_identity_hash(hex: &str) -> anyhow::Result<IdentityHash> {
    IdentityHash::from_hex(hex).with_context(|| format!("invalid identity hash: {}", hex))
}

fn write_witness(witness: &Witness, output: Option<&PathBuf>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(witness)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("Witness written to {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credo=info,credo_registry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let storage = RegistryStorage::new(cli.data_dir.clone())?;

    match cli.command {
        Commands::Init { modulus, base } => {
            let base =
                parse_biguint(&base).with_context(|| format!("invalid base: {}", base))?;
            let modulus = match modulus {
                Some(modulus) => parse_biguint(&modulus)
                    .with_context(|| format!("invalid modulus: {}", modulus))?,
                None => AccumulatorParams::rsa2048()?.modulus,
            };
            let params = AccumulatorParams::new(modulus, base)?;

            let registry = storage.create_registry(params)?;
            let state = registry.get_accumulator()?;

            info!("Registry created at {:?}", cli.data_dir);
            println!("\n=== Accumulator Initialized ===\n");
            println!("Modulus bits: {}", state.modulus.bits());
            println!("Generation:   {}", state.generation);
            println!("Value:        0x{}", state.value.to_str_radix(16));
        }

        Commands::Add {
            identity,
            content_ref,
            witness_out,
        } => {
            let registry = storage.open_registry()?;
            let (identity_hash, witness) =
                registry.add_identity(identity.as_bytes(), ContentRef::new(content_ref))?;

            println!("\n=== Identity Added ===\n");
            println!("Identity hash: {}", identity_hash);
            println!("Generation:    {}", witness.generation);
            write_witness(&witness, witness_out.as_ref())?;
        }

        Commands::Revoke { identity_hash } => {
            let identity_hash = parse_identity_hash(&identity_hash)?;
            let registry = storage.open_registry()?;
            let state = registry.revoke_identity(&identity_hash)?;

            println!("\n=== Identity Revoked ===\n");
            println!("Identity hash: {}", identity_hash);
            println!("Generation:    {}", state.generation);
        }

        Commands::Verify {
            identity_hash,
            witness,
        } => {
            let identity_hash = parse_identity_hash(&identity_hash)?;
            let content = std::fs::read_to_string(&witness)
                .with_context(|| format!("failed to read witness {:?}", witness))?;
            let witness: Witness = serde_json::from_str(&content)?;

            let registry = storage.open_registry()?;
            if registry.verify_identity(&identity_hash, &witness)? {
                println!("✓ {} is a current member", identity_hash);
            } else {
                println!("✗ {} does not verify", identity_hash);
                std::process::exit(1);
            }
        }

        Commands::Witness {
            identity_hash,
            output,
        } => {
            let identity_hash = parse_identity_hash(&identity_hash)?;
            let registry = storage.open_registry()?;
            let witness = registry.witness(&identity_hash)?;
            write_witness(&witness, output.as_ref())?;
        }

        Commands::Status => {
            if !storage.is_initialized() {
                println!("Registry not initialized. Run 'credo init' first.");
                return Ok(());
            }

            let registry = storage.open_registry()?;
            let status = registry.status()?;
            let config = registry.config();

            println!("\n=== Registry Status ===\n");
            println!("Data dir:    {:?}", storage.base_path());
            println!("Modulus:     {} bits", status.state.modulus.bits());
            println!("Generation:  {}", status.state.generation);
            println!("Value:       0x{}", status.state.value.to_str_radix(16));
            println!("\nIdentities:");
            println!("  Active:  {}", status.active);
            println!("  Revoked: {}", status.revoked);
            println!("\nConfig:");
            println!("  Refresh strategy:   {:?}", config.refresh_strategy);
            println!("  Tombstone policy:   {:?}", config.tombstone_policy);
            println!("  Max prime attempts: {}", config.max_prime_attempts);
        }

        Commands::Replay { from, to } => {
            let registry = storage.open_registry()?;
            let value = registry.replay_history(from, to)?;
            println!("Generation {}: 0x{}", to, value.to_str_radix(16));
        }

        Commands::Audit => {
            // Opening the registry already audits the stored history
            let registry = storage.open_registry()?;
            let state = registry.audit()?;
            println!(
                "✓ History consistent through generation {} ({} entries)",
                state.generation,
                registry.history()?.len()
            );
        }

        Commands::Export { output, qr } => {
            let registry = storage.open_registry()?;
            let export = AccumulatorExport::new(registry.get_accumulator()?);

            if let Some(path) = output {
                publish::save_to_file(&export, &path)?;
                println!("Accumulator export written to {:?}", path);
            } else if qr {
                println!("{}", export.to_qr());
            } else {
                println!("{}", export.to_json()?);
            }
        }
    }

    Ok(())
}

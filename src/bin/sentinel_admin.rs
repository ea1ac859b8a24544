use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};

use sentinel_consensus::required_signers;
use sentinel_core::{request_id, Address, EvidenceHash};
use sentinel_crypto::{verify_possession, BlsSigner};
use sentinel_root::signer_address;

#[derive(Parser)]
#[command(name = "sentinel_admin")]
#[command(about = "Sentinel key and request utilities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a BLS key file (kept if it already exists)
    Keygen {
        #[arg(short, long, default_value = "./data/bls.key")]
        out: PathBuf,
    },

    /// Print the public key, signer address and proof of possession
    Pubkey {
        #[arg(short, long, default_value = "./data/bls.key")]
        key: PathBuf,
    },

    /// Compute a pause request ID
    RequestId {
        target: Address,
        evidence: EvidenceHash,
        created_at: u64,
    },

    /// Attestations needed for a pause with this many active signers
    RequiredSigners {
        active: usize,
        #[arg(long, default_value_t = sentinel_consensus::DEFAULT_MIN_SIGNERS)]
        floor: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Keygen { out } => {
            let existed = out.exists();
            let signer = BlsSigner::load_or_generate(&out)
                .with_context(|| format!("writing key to {}", out.display()))?;
            if existed {
                println!("Key already present at {}", out.display());
            } else {
                println!("Wrote new key to {}", out.display());
            }
            println!("public key: {}", signer.public_key_hex());
            println!("address:    {}", signer_address(&signer.public_key()));
        }
        Command::Pubkey { key } => {
            ensure!(key.exists(), "no key file at {}", key.display());
            let signer = BlsSigner::load_or_generate(&key)
                .with_context(|| format!("reading key from {}", key.display()))?;
            let proof = signer.prove_possession();
            ensure!(verify_possession(&signer.public_key(), &proof), "key file is inconsistent");
            println!("public key: {}", signer.public_key_hex());
            println!("address:    {}", signer_address(&signer.public_key()));
            println!("possession: {}", proof.to_hex());
        }
        Command::RequestId {
            target,
            evidence,
            created_at,
        } => {
            println!("{}", request_id(&target, &evidence, created_at));
        }
        Command::RequiredSigners { active, floor } => {
            println!("{}", required_signers(active, floor));
        }
    }

    Ok(())
}

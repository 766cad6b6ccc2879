//! accountctl
//!
//! Command-line access to an accountkv data directory.

use std::path::PathBuf;
use std::process::ExitCode;

use accountkv::{AccountStore, Config, HashCost, UserRecord};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// accountctl
#[derive(Parser, Debug)]
#[command(name = "accountctl")]
#[command(about = "Manage accounts in an accountkv data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./accountkv_data")]
    data_dir: PathBuf,

    /// Argon2 memory cost in KiB for newly hashed passwords
    #[arg(long, default_value_t = HashCost::default().memory_kib)]
    hash_memory_kib: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account
    Add {
        email: String,
        password: String,
        /// Metadata as JSON
        #[arg(long, default_value = "{}")]
        data: String,
    },

    /// Show an account
    Find { email: String },

    /// Verify a password
    Check { email: String, password: String },

    /// Move an account to a new email
    Rename { old_email: String, new_email: String },

    /// Set a new password
    Passwd { email: String, password: String },

    /// Replace an account's metadata
    Modify {
        email: String,
        /// Metadata as JSON
        data: String,
    },

    /// Delete an account
    Delete { email: String },

    /// Print every account, one JSON object per line
    List,

    /// Rewrite the log to hold only live accounts
    Compact,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,accountkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> accountkv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .hash_cost(HashCost {
            memory_kib: args.hash_memory_kib,
            ..HashCost::default()
        })
        .build();

    tracing::debug!("Data directory: {}", args.data_dir.display());
    let store = AccountStore::open(config)?;

    match args.command {
        Commands::Add { email, password, data } => {
            let record = store.add_user(&email, &password, parse_json(&data)?)?;
            print_record(&record)?;
        }
        Commands::Find { email } => print_record(&store.find_user(&email)?)?,
        Commands::Check { email, password } => {
            store.check_password(&email, &password)?;
            println!("ok");
        }
        Commands::Rename { old_email, new_email } => store.change_email(&old_email, &new_email)?,
        Commands::Passwd { email, password } => store.change_password(&email, &password)?,
        Commands::Modify { email, data } => store.modify_user(&email, parse_json(&data)?)?,
        Commands::Delete { email } => store.delete_user(&email)?,
        Commands::List => {
            for record in store.user_stream() {
                print_record(&record?)?;
            }
        }
        Commands::Compact => store.engine().compact()?,
    }

    store.close()
}

fn parse_json(text: &str) -> accountkv::Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| accountkv::AccountError::Serialization(format!("invalid JSON data: {}", e)))
}

fn print_record(record: &UserRecord) -> accountkv::Result<()> {
    let line = serde_json::to_string(record)
        .map_err(|e| accountkv::AccountError::Serialization(e.to_string()))?;
    println!("{}", line);
    Ok(())
}

//! cachet CLI Client
//!
//! Command-line interface for poking at a cache server.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use cachet::{Client, ClientConfig, GetOptions, SetOptions};

/// cachet CLI
#[derive(Parser, Debug)]
#[command(name = "cachet-cli")]
#[command(about = "CLI for memcached-compatible cache servers")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:11211")]
    server: String,

    /// Raise an error on missing keys instead of printing a placeholder
    #[arg(long)]
    verbose_miss: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,

        /// Also print the entry's flags and CAS token
        #[arg(short, long)]
        extended: bool,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Opaque flags to store with the entry
        #[arg(short, long, default_value = "0")]
        flags: u32,

        /// Expiration in seconds (0 = never)
        #[arg(short, long, default_value = "0")]
        expiry: u32,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,cachet=info"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    if let Err(error) = execute(&args) {
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}

fn execute(args: &Args) -> cachet::Result<()> {
    let config = ClientConfig::builder()
        .addr(args.server.clone())
        .quiet(!args.verbose_miss)
        .build();
    let mut client = Client::connect(config)?;

    match &args.command {
        Commands::Get { key, extended } => {
            if *extended {
                match client.get_extended_with(key.as_bytes(), &GetOptions::default())? {
                    Some(entry) => println!(
                        "{} (flags=0x{:x}, cas={})",
                        String::from_utf8_lossy(&entry.value),
                        entry.flags,
                        entry.cas
                    ),
                    None => println!("(not found)"),
                }
            } else {
                match client.get(key.as_bytes())? {
                    Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                    None => println!("(not found)"),
                }
            }
        }
        Commands::Set {
            key,
            value,
            flags,
            expiry,
        } => {
            let options = SetOptions {
                flags: *flags,
                expiry: *expiry,
                cas: 0,
            };
            let cas = client.set_with(key.as_bytes(), value.as_bytes(), &options)?;
            println!("stored (cas={})", cas);
        }
        Commands::Del { key } => {
            if client.delete(key.as_bytes())? {
                println!("deleted");
            } else {
                println!("(not found)");
            }
        }
    }

    Ok(())
}

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use smtp_intake::config::{self, ServerConfig, StorageBackend};
use smtp_intake::storage::FileStore;

#[derive(Parser)]
#[command(name = "mail-admin")]
#[command(about = "Maintenance for the smtp-intake message spool", long_about = None)]
struct Cli {
    /// Server configuration file naming the spool.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete every stored message
    Purge {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Print the number of stored messages
    Count,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => ServerConfig::default(),
    };
    if config.storage.backend != StorageBackend::File {
        return Err("storage.backend is not \"file\"; in-memory messages cannot be administered".into());
    }

    let store = FileStore::open(&config.storage.path).await?;

    match cli.command {
        Commands::Count => {
            println!("{}", store.count().await?);
        }
        Commands::Purge { yes } => {
            let pending = store.count().await?;
            if !yes && !confirm(&format!(
                "Delete all {pending} messages from {}? Type 'yes' to continue: ",
                store.path().display()
            ))? {
                println!("Aborted.");
                return Ok(());
            }

            let removed = store.purge().await?;
            println!("Deleted {removed} messages.");
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

//! hashfs - command-line host for a content-addressable store
//!
//! Subcommands:
//! - `hashfs put <file>` - Store a file (or `-` for stdin)
//! - `hashfs get <candidate>` - Resolve an id or path to its address
//! - `hashfs cat <candidate>` - Write stored content to stdout
//! - `hashfs delete <candidate>` - Remove stored content
//! - `hashfs url <candidate>` - Print the public URL
//! - `hashfs ls` / `stats` / `check` / `repair` - Whole-store maintenance
//!
//! Configuration comes from `--config`, else the per-user config file, else
//! `HASHFS_*` environment variables. `--root` overrides the root folder.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hashfs::{Address, HashFs, HashFsConfig, UrlBuilder};

#[derive(Parser)]
#[command(name = "hashfs")]
#[command(about = "Content-addressable file storage")]
#[command(version)]
struct Cli {
    /// Config file with a [hashfs] section
    #[arg(short, long, env = "HASHFS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Storage root (overrides config)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Print addresses as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file, or stdin when the path is `-`
    Put {
        file: PathBuf,

        /// Extension appended to the stored file name (e.g. ".png")
        #[arg(short, long)]
        extension: Option<String>,
    },

    /// Resolve an id, relative path, or absolute path
    Get { candidate: String },

    /// Write stored content to stdout
    Cat { candidate: String },

    /// Remove stored content and empty shard directories
    Delete { candidate: String },

    /// Print the URL for stored content
    Url {
        candidate: String,

        /// Host to use when none is configured
        #[arg(long)]
        request_host: Option<String>,
    },

    /// List every stored file
    Ls,

    /// Show file count and total size
    Stats,

    /// Report files whose content does not match their address
    Check,

    /// Move mismatched files to their correct address
    Repair,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let config = load_config(&cli)?;
    let store = HashFs::new(config.clone())
        .with_context(|| format!("failed to open store at {}", config.root.display()))?;

    match cli.command {
        Commands::Put { file, extension } => {
            let address = if file.as_os_str() == "-" {
                store.put(io::stdin().lock(), extension.as_deref())?
            } else {
                store.put_file(&file, extension.as_deref())?
            };
            print_address(&address, cli.json)?;
        }
        Commands::Get { candidate } => {
            let address = store
                .get(&candidate)?
                .with_context(|| format!("not found: {candidate}"))?;
            print_address(&address, cli.json)?;
        }
        Commands::Cat { candidate } => {
            let mut file = store
                .open(&candidate)?
                .with_context(|| format!("not found: {candidate}"))?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut file, &mut stdout).context("failed to write to stdout")?;
            stdout.flush()?;
        }
        Commands::Delete { candidate } => match store.delete(&candidate)? {
            Some(address) => print_address(&address, cli.json)?,
            None => bail!("not found: {candidate}"),
        },
        Commands::Url {
            candidate,
            request_host,
        } => {
            // URLs don't require the content to exist.
            let address = match store.get(&candidate)? {
                Some(address) => address,
                None => store.resolver().resolve(&candidate)?,
            };
            let urls = UrlBuilder::new(&config)?;
            let url = match request_host {
                Some(host) => urls.external_url_for(&address.relpath, &host),
                None => urls.url_for_address(&address),
            };
            println!("{url}");
        }
        Commands::Ls => {
            for address in store.files()? {
                print_address(&address, cli.json)?;
            }
        }
        Commands::Stats => {
            println!("root:  {}", store.root().display());
            println!("files: {}", store.count()?);
            println!("bytes: {}", store.size()?);
        }
        Commands::Check => {
            let corrupted = store.corrupted()?;
            for (path, expected) in &corrupted {
                println!("{}\t-> {}", path.display(), expected.relpath);
            }
            if !corrupted.is_empty() {
                bail!("{} corrupted file(s)", corrupted.len());
            }
        }
        Commands::Repair => {
            for address in store.repair()? {
                print_address(&address, cli.json)?;
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<HashFsConfig> {
    let user_config = HashFsConfig::default_config_file().filter(|path| path.exists());

    let mut config = match (&cli.config, user_config) {
        (Some(path), _) => HashFsConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        (None, Some(path)) => HashFsConfig::from_file(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        (None, None) => HashFsConfig::from_env_with_root(cli.root.clone()).context(
            "invalid HASHFS_* environment (set HASHFS_ROOT_FOLDER or pass --root)",
        )?,
    };

    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    Ok(config)
}

fn print_address(address: &Address, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(address)?);
    } else if address.is_duplicate {
        println!("{}\t{}\t(duplicate)", address.id, address.relpath);
    } else {
        println!("{}\t{}", address.id, address.relpath);
    }
    Ok(())
}

//! Title Installer - install and uninstall titles on console storage.
//!
//! Writes the ticket, TMD and content blobs for one title either directly
//! into a host directory or through a session to a filesystem service.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use title_installer::storage::{FsaServer, LocalStorage, SessionStorage};
use title_installer::{
    InstallFailure, Installer, InstallerConfig, RollbackPolicy, TitleId, TitleStorage,
};

#[derive(Parser)]
#[command(name = "title-installer")]
#[command(author, version, long_about = None)]
#[command(
    about = "Staged title installer for console internal storage",
    long_about = "Installs a title's ticket, TMD and content into the title and ticket trees of a storage volume, and removes them again."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Format an empty volume in a host directory
    Init {
        /// Host directory standing in for the volume
        root: PathBuf,

        /// Volume name
        #[arg(long, default_value = title_installer::config::DEFAULT_VOLUME)]
        volume: String,
    },

    /// Install a title
    Install {
        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        title: TitleArgs,

        /// Ticket file
        #[arg(long)]
        ticket: PathBuf,

        /// Title metadata file
        #[arg(long)]
        tmd: PathBuf,

        /// Content blobs, in index order
        #[arg(long, num_args = 0..)]
        content: Vec<PathBuf>,

        /// Remove the title and ticket if the install fails
        #[arg(long)]
        rollback: bool,

        /// Read every file back after writing it
        #[arg(long)]
        verify: bool,
    },

    /// Uninstall a title
    Uninstall {
        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        title: TitleArgs,
    },

    /// Serve a volume to remote sessions
    Serve {
        /// Host directory standing in for the volume
        root: PathBuf,

        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7878")]
        listen: String,

        /// Volume name
        #[arg(long, default_value = title_installer::config::DEFAULT_VOLUME)]
        volume: String,
    },

    /// Decode a packed status code
    Decode {
        /// Status as decimal or hex (e.g. -3342358 or -0x330016)
        #[arg(allow_hyphen_values = true, value_parser = parse_status)]
        status: i32,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct BackendArgs {
    /// Access the volume directly in this host directory
    #[arg(long)]
    root: Option<PathBuf>,

    /// Access the volume through a filesystem service at this address
    #[arg(long)]
    remote: Option<String>,
}

#[derive(Args)]
struct TitleArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Title id (e.g. 000100014f484243 or 00010001-4f484243)
    #[arg(long)]
    title_id: Option<TitleId>,

    /// Volume name
    #[arg(long)]
    volume: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(0) => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Run a command, returning the packed status it produced.
fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Init { root, volume } => cmd_init(&root, &volume),

        Commands::Install {
            backend,
            title,
            ticket,
            tmd,
            content,
            rollback,
            verify,
        } => {
            let mut config = load_config(&title)?;
            if rollback {
                config.rollback = RollbackPolicy::RemoveAll;
            }
            config.verify |= verify;
            cmd_install(&backend, &config, &ticket, &tmd, &content)
        }

        Commands::Uninstall { backend, title } => {
            let config = load_config(&title)?;
            cmd_uninstall(&backend, &config)
        }

        Commands::Serve {
            root,
            listen,
            volume,
        } => cmd_serve(&root, &listen, &volume),

        Commands::Decode { status } => {
            report(status);
            Ok(0)
        }
    }
}

fn load_config(args: &TitleArgs) -> Result<InstallerConfig> {
    let mut config = match &args.config {
        Some(path) => InstallerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => InstallerConfig::default(),
    };

    if let Some(title_id) = args.title_id {
        config.title_id = title_id;
    }
    if let Some(volume) = &args.volume {
        config.volume = volume.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_storage(args: &BackendArgs, volume: &str) -> Result<Box<dyn TitleStorage>> {
    match (&args.root, &args.remote) {
        (Some(root), None) => {
            let storage = LocalStorage::open(root, volume)
                .with_context(|| format!("opening volume at {}", root.display()))?;
            Ok(Box::new(storage))
        }
        (None, Some(addr)) => {
            let storage = SessionStorage::connect(addr.as_str())
                .with_context(|| format!("connecting to {}", addr))?;
            Ok(Box::new(storage))
        }
        _ => anyhow::bail!("exactly one of --root or --remote is required"),
    }
}

fn cmd_init(root: &Path, volume: &str) -> Result<i32> {
    LocalStorage::create(root, volume)
        .with_context(|| format!("formatting volume at {}", root.display()))?;
    println!("Volume {} initialized at {}", volume, root.display());
    Ok(0)
}

fn cmd_install(
    backend: &BackendArgs,
    config: &InstallerConfig,
    ticket: &Path,
    tmd: &Path,
    content: &[PathBuf],
) -> Result<i32> {
    let ticket = read_input(ticket)?;
    let tmd = read_input(tmd)?;
    let contents = content
        .iter()
        .map(|path| read_input(path))
        .collect::<Result<Vec<_>>>()?;

    let mut storage = open_storage(backend, &config.volume)?;
    let status = Installer::from_config(&mut *storage, config)?.install_status(
        &ticket,
        &tmd,
        &contents,
    );

    report(status);
    Ok(status)
}

fn cmd_uninstall(backend: &BackendArgs, config: &InstallerConfig) -> Result<i32> {
    let mut storage = open_storage(backend, &config.volume)?;
    let status = Installer::from_config(&mut *storage, config)?.uninstall_status();

    report(status);
    Ok(status)
}

fn cmd_serve(root: &Path, listen: &str, volume: &str) -> Result<i32> {
    let storage = LocalStorage::open(root, volume)
        .with_context(|| format!("opening volume at {}", root.display()))?;
    let listener = TcpListener::bind(listen).with_context(|| format!("binding {}", listen))?;
    info!("Serving {} from {} on {}", volume, root.display(), listen);

    FsaServer::new(storage).serve_listener(&listener)?;
    Ok(0)
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn report(status: i32) {
    println!("Status: {}", status);
    if status == 0 {
        println!("  Success");
        return;
    }
    match InstallFailure::from_status_code(status) {
        Some(failure) => {
            println!("  Stage: {} ({})", failure.stage, failure.stage.number());
            println!("  Code:  -{:#x}", -(failure.code as i64));
        }
        None => println!("  (not a packed status code)"),
    }
}

fn parse_status(s: &str) -> std::result::Result<i32, String> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let hex = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"));
    if hex.unwrap_or(digits).starts_with(['-', '+']) {
        return Err(format!("invalid status '{}': misplaced sign", s));
    }
    let value = match hex {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|e| format!("invalid status '{}': {}", s, e))?;

    let value = if negative { -value } else { value };
    i32::try_from(value).map_err(|_| format!("status out of range: {}", s))
}

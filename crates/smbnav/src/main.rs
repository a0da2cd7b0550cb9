//! smbnav
//!
//! Command-line front end for the share browser.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use smbnav::config::{default_config_path, Config};
use smbnav::dispatcher::CompletionQueue;
use smbnav::files::{EntryFilter, ListQuery, TransferProgress};
use smbnav::protocol::LocalServer;
use smbnav::{logging, Controller, Credentials, Navigation, PathCursor};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// smbnav - browse and transfer files on legacy file-sharing servers.
#[derive(Parser, Debug)]
#[command(name = "smbnav")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Server address
    #[arg(long, global = true, default_value = "127.0.0.1")]
    pub address: String,

    /// NetBIOS name of the server
    #[arg(long, global = true, default_value = "LOCALHOST")]
    pub server_name: String,

    /// Server port (defaults to the configured port)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Username; omit for guest access
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Password for --user
    #[arg(long, global = true, requires = "user")]
    pub password: Option<String>,

    /// Domain for --user (defaults to the configured domain)
    #[arg(long, global = true, requires = "user")]
    pub domain: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the shares of the server
    Shares {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List a directory
    Ls {
        /// Share name
        share: String,

        /// Directory inside the share
        #[arg(default_value = "\\")]
        path: String,

        /// Maximum number of entries (defaults to the configured page limit)
        #[arg(long, short)]
        limit: Option<usize>,

        /// Entry kinds to show
        #[arg(long, short, value_enum, default_value = "all")]
        filter: FilterArg,

        /// Case-insensitive name filter
        #[arg(long, short)]
        search: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Download a file
    Get {
        /// Share name
        share: String,

        /// File path inside the share
        remote: String,

        /// Destination file or directory (defaults to the download directory)
        local: Option<PathBuf>,
    },

    /// Upload a file
    Put {
        /// Share name
        share: String,

        /// Local file to send
        local: PathBuf,

        /// Destination directory inside the share
        #[arg(default_value = "\\")]
        remote_dir: String,
    },

    /// Create a directory
    Mkdir {
        /// Share name
        share: String,

        /// Directory path inside the share
        path: String,
    },

    /// Print the configuration in effect
    Config,
}

/// Entry kinds for `ls --filter`.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum FilterArg {
    #[default]
    All,
    Folders,
    Files,
}

impl From<FilterArg> for EntryFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => EntryFilter::All,
            FilterArg::Folders => EntryFilter::FoldersOnly,
            FilterArg::Files => EntryFilter::FilesOnly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    let _logging = logging::init(&config.logging, cli.verbose)?;
    tracing::debug!("Using config file: {:?}", config_path);

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let server = loopback_server(&config);
    if server.shares().is_empty() {
        tracing::warn!("No loopback shares configured; the server will expose only IPC$");
    }

    let (controller, mut queue) = Controller::new(Arc::new(server), &config, Handle::current());

    let result = run(&cli, &config, &controller, &mut queue).await;

    call(&mut queue, |done| controller.disconnect(done)).await??;
    result
}

fn loopback_server(config: &Config) -> LocalServer {
    config
        .loopback
        .shares
        .iter()
        .fold(LocalServer::new(), |server, (name, root)| {
            if config.loopback.read_only.contains(name) {
                server.with_read_only_share(name.clone(), root.clone())
            } else {
                server.with_share(name.clone(), root.clone())
            }
        })
}

/// Issue one controller operation and drain completions until it reports.
async fn call<T: Send + 'static>(
    queue: &mut CompletionQueue,
    issue: impl FnOnce(Box<dyn FnOnce(T) + Send>),
) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    issue(Box::new(move |result| {
        let _ = tx.send(result);
    }));
    queue
        .wait_for(rx)
        .await
        .context("Operation finished without reporting a result")
}

/// Print progress updates until the sender side is dropped.
fn progress_printer() -> (mpsc::UnboundedSender<TransferProgress>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<TransferProgress>();
    let printer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            eprintln!("{} {:>6.1}%", progress.remote_path, progress.percent);
        }
    });
    (tx, printer)
}

async fn run(
    cli: &Cli,
    config: &Config,
    controller: &Controller,
    queue: &mut CompletionQueue,
) -> Result<()> {
    let port = cli.port.unwrap_or(config.connection.port);
    let credentials = cli.user.as_ref().map(|user| {
        Credentials::new(
            user.clone(),
            cli.password.clone().unwrap_or_default(),
            cli.domain.clone().unwrap_or_default(),
        )
    });

    call(queue, |done| {
        controller.connect(&cli.server_name, &cli.address, port, credentials, done)
    })
    .await??;

    match &cli.command {
        Commands::Shares { json } => {
            let shares = call(queue, |done| controller.list_shares(done)).await??;
            if *json {
                println!("{}", serde_json::to_string_pretty(&shares)?);
            } else {
                for share in &shares {
                    println!("{}", share.name);
                }
            }
        }

        Commands::Ls {
            share,
            path,
            limit,
            filter,
            search,
            json,
        } => {
            call(queue, |done| controller.select_share(share, done)).await??;
            controller.navigate(Navigation::Enter(path.clone()));

            let mut query = ListQuery::new(limit.unwrap_or(config.browse.page_limit))
                .with_filter((*filter).into());
            if let Some(search) = search {
                query = query.with_search(search.clone());
            }

            let listing = call(queue, |done| controller.list_entries(query, done)).await??;
            if *json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                for row in listing.rows() {
                    if row.is_directory {
                        println!("{:>12}  {}", "<DIR>", row.name);
                    } else {
                        println!("{:>12}  {}", row.size_bytes, row.name);
                    }
                }
                if listing.limit_reached {
                    eprintln!("(listing truncated; raise --limit to see more)");
                }
            }
        }

        Commands::Get {
            share,
            remote,
            local,
        } => {
            let remote = PathCursor::parse(remote);
            let name = remote
                .name()
                .with_context(|| format!("Not a file path: {}", remote))?
                .to_string();
            let local = match local {
                Some(path) if path.is_dir() => path.join(&name),
                Some(path) => path.clone(),
                None => config.transfer.download_dir.join(&name),
            };

            call(queue, |done| controller.select_share(share, done)).await??;
            controller.navigate(Navigation::Enter(remote.up().to_string()));

            let (progress, printer) = progress_printer();
            let job = call(queue, |done| {
                controller.download(&name, local, Some(progress), done)
            })
            .await;
            let _ = printer.await;
            let job = job??;
            println!(
                "Downloaded {} ({} bytes) to {}",
                job.remote_path,
                job.transferred_bytes,
                job.local_path.display()
            );
        }

        Commands::Put {
            share,
            local,
            remote_dir,
        } => {
            call(queue, |done| controller.select_share(share, done)).await??;
            controller.navigate(Navigation::Enter(remote_dir.clone()));

            let (progress, printer) = progress_printer();
            let job = call(queue, |done| controller.upload(local, Some(progress), done)).await;
            let _ = printer.await;
            let job = job??;
            println!(
                "Uploaded {} ({} bytes) to {}",
                job.local_path.display(),
                job.transferred_bytes,
                job.remote_path
            );
        }

        Commands::Mkdir { share, path } => {
            let target = PathCursor::parse(path);
            let name = target
                .name()
                .with_context(|| format!("Not a directory path: {}", target))?
                .to_string();

            call(queue, |done| controller.select_share(share, done)).await??;
            controller.navigate(Navigation::Enter(target.up().to_string()));
            call(queue, |done| controller.create_directory(&name, done)).await??;
            println!("Created {}", target);
        }

        Commands::Config => {}
    }

    Ok(())
}

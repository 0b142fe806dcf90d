mod backup;
mod logging;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;

use backup::{run_backup, BackupOptions};
use tmbackup_core::address::Destination;
use tmbackup_core::cancel::CancelFlag;
use tmbackup_core::config::Config;
use tmbackup_core::exec::{CommandRunner, SystemRunner};
use tmbackup_core::snapshot::{scan_local, Timestamp};
use tmbackup_mount::{locate_partition, mount_time_machine};
use tmbackup_storage::{list_remote, prune, Rsync};

const DEFAULT_CONFIG: &str = "/etc/tmbackup/config.toml";

#[derive(Parser)]
#[command(
    name = "tmbackup",
    version,
    about = "Incremental rsync backups of Time Machine sparse bundles"
)]
struct Cli {
    /// Config file; /etc/tmbackup/config.toml is read when present
    #[arg(long)]
    config: Option<String>,
    #[arg(long, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// Time Machine sparse bundle to mount read-only
    #[arg(long, conflicts_with = "mounted")]
    sparse_bundle: Option<PathBuf>,
    /// Already exposed Time Machine tree (`<computer>/<timestamp>/...`)
    #[arg(long)]
    mounted: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct DestinationArgs {
    /// Local path, `[user@]host:path`, `[user@]host::module/path` or `rsync://[user@]host/module/path`
    #[arg(long)]
    destination: Option<String>,
    /// Extra argument passed to every rsync call; repeatable
    #[arg(long = "rsync-arg", allow_hyphen_values = true)]
    rsync_args: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Copy every snapshot missing from the destination
    Backup {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        target: DestinationArgs,
        /// Restrict to this computer; repeatable
        #[arg(long = "computer")]
        computers: Vec<String>,
        /// Remove destination snapshots that no longer exist in the source
        #[arg(long)]
        prune: bool,
        #[arg(long)]
        dry_run: bool,
    },
    List {
        #[command(subcommand)]
        target: ListCommand,
    },
    /// Remove one snapshot of one computer from the destination
    Prune {
        computer: String,
        timestamp: String,
        #[command(flatten)]
        target: DestinationArgs,
    },
    /// Print the byte offset and size of the Time Machine partition in a disk image
    Partition { image: PathBuf },
}

#[derive(Subcommand)]
enum ListCommand {
    /// Snapshots in the Time Machine volume
    Source {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Snapshots of one computer on the destination
    Destination {
        computer: String,
        #[command(flatten)]
        target: DestinationArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let cancel = CancelFlag::default();
    let worker = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || run(cli, &cancel)
    });
    tokio::pin!(worker);

    loop {
        tokio::select! {
            joined = &mut worker => return joined.context("backup worker panicked")?,
            signal = shutdown_signal() => {
                let name = signal?;
                warn!(signal = name, "stopping after the current step; mounts will be released");
                cancel.cancel();
            }
        }
    }
}

async fn shutdown_signal() -> Result<&'static str> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to install Ctrl+C handler")?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

fn run(cli: Cli, cancel: &CancelFlag) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    let runner = SystemRunner;
    match cli.command {
        Command::Backup {
            source,
            target,
            computers,
            prune,
            dry_run,
        } => {
            let options = BackupOptions {
                computers,
                prune,
                dry_run,
            };
            backup(&runner, &cfg, &source, &target, &options, cancel)
        }
        Command::List { target } => match target {
            ListCommand::Source { source } => list_source(&runner, &cfg, &source),
            ListCommand::Destination { computer, target } => {
                list_destination(&runner, &cfg, &computer, &target)
            }
        },
        Command::Prune {
            computer,
            timestamp,
            target,
        } => prune_snapshot(&runner, &cfg, &computer, &timestamp, &target),
        Command::Partition { image } => partition(&runner, &cfg, &image),
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("config required at {path}")),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(DEFAULT_CONFIG)
            .with_context(|| format!("failed to load {DEFAULT_CONFIG}")),
        None => Ok(Config::default()),
    }
}

fn resolve_destination(cfg: &Config, target: &DestinationArgs) -> Result<(Destination, Rsync)> {
    let root = target
        .destination
        .as_deref()
        .or_else(|| cfg.destination_root())
        .ok_or_else(|| anyhow!("destination required: pass --destination or set [destination] root"))?;
    Ok((
        Destination::parse(root),
        Rsync::from_settings(&cfg.rsync, &target.rsync_args),
    ))
}

/// Runs `f` on the Time Machine tree, mounting the sparse bundle for the duration if needed.
fn with_source<T>(
    runner: &dyn CommandRunner,
    cfg: &Config,
    source: &SourceArgs,
    f: impl FnOnce(&Path) -> Result<T>,
) -> Result<T> {
    if let Some(root) = &source.mounted {
        return f(root);
    }
    let bundle = source
        .sparse_bundle
        .clone()
        .or_else(|| cfg.sparse_bundle().map(PathBuf::from))
        .ok_or_else(|| anyhow!("source required: pass --sparse-bundle, --mounted or set [source] sparse_bundle"))?;

    let view = mount_time_machine(runner, &cfg.mount, &bundle)
        .with_context(|| format!("failed to mount {}", bundle.display()))?;
    let result = f(view.path());
    match (result, view.release()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err).context("failed to release Time Machine mounts"),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(teardown)) => {
            warn!(error = %teardown, "teardown after failure was incomplete");
            Err(err)
        }
    }
}

fn backup(
    runner: &dyn CommandRunner,
    cfg: &Config,
    source: &SourceArgs,
    target: &DestinationArgs,
    options: &BackupOptions,
    cancel: &CancelFlag,
) -> Result<()> {
    let (destination, rsync) = resolve_destination(cfg, target)?;
    let summary = with_source(runner, cfg, source, |root| {
        run_backup(runner, &rsync, root, &destination, options, cancel)
            .with_context(|| format!("backup to {destination} stopped"))
    })?;

    let prefix = if options.dry_run { "dry run: " } else { "" };
    println!(
        "{prefix}{} transferred, {} refreshed, {} up to date, {} pruned",
        summary.transferred, summary.refreshed, summary.up_to_date, summary.pruned
    );
    if !summary.failed.is_empty() {
        for (computer, err) in &summary.failed {
            eprintln!("{computer}: {err}");
        }
        return Err(anyhow!("{} computer(s) failed", summary.failed.len()));
    }
    Ok(())
}

fn list_source(runner: &dyn CommandRunner, cfg: &Config, source: &SourceArgs) -> Result<()> {
    let catalog = with_source(runner, cfg, source, |root| {
        scan_local(root).with_context(|| format!("failed to scan {}", root.display()))
    })?;
    for (computer, timestamps) in &catalog {
        for timestamp in timestamps {
            println!("{computer}/{timestamp}");
        }
    }
    Ok(())
}

fn list_destination(
    runner: &dyn CommandRunner,
    cfg: &Config,
    computer: &str,
    target: &DestinationArgs,
) -> Result<()> {
    let (destination, rsync) = resolve_destination(cfg, target)?;
    let timestamps = list_remote(runner, &rsync, &destination, computer)
        .with_context(|| format!("failed to list {computer} on {destination}"))?;
    for timestamp in timestamps {
        println!("{computer}/{timestamp}");
    }
    Ok(())
}

fn prune_snapshot(
    runner: &dyn CommandRunner,
    cfg: &Config,
    computer: &str,
    timestamp: &str,
    target: &DestinationArgs,
) -> Result<()> {
    let timestamp = Timestamp::parse(timestamp)?;
    let (destination, rsync) = resolve_destination(cfg, target)?;
    prune(runner, &rsync, &destination, computer, &timestamp)?;
    println!("Pruned {computer}/{timestamp}");
    Ok(())
}

fn partition(runner: &dyn CommandRunner, cfg: &Config, image: &Path) -> Result<()> {
    let geometry = locate_partition(runner, &cfg.mount.parted, image, &cfg.mount.partition_type)?;
    println!("offset={} size={}", geometry.offset, geometry.size);
    Ok(())
}

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use queuepress::config::{self, Config};
use queuepress::error::ArchiveError;
use queuepress::sync::{self, DeviceTarget};

#[derive(Parser)]
#[command(
    name = "queuepress",
    about = "Archive a web reading queue into paginated image PDFs for e-readers"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Log output file path (logs go to stderr otherwise, filtered by RUST_LOG)
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Viewport and page width in px
    #[arg(long, global = true)]
    width: Option<u32>,

    /// Viewport and page height in px
    #[arg(long, global = true)]
    height: Option<u32>,

    /// Directory the PDFs are written to
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Run Chromium without a window
    #[arg(long, global = true)]
    headless: bool,

    /// Do not copy the documents to the device afterwards
    #[arg(long, global = true)]
    no_sync: bool,

    /// Keep documents from earlier runs in the output directory
    #[arg(long, global = true)]
    no_rotate: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Archive every queued article, then sync (default)
    Archive,
    /// Print the queued articles without touching them
    List,
    /// Copy the output directory to the device
    Sync,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log.as_ref()) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    cfg.merge_cli(cli.width, cli.height, cli.output, cli.headless);
    let config = cfg.resolve();

    let result = match cli.command.unwrap_or(Command::Archive) {
        Command::Archive => cmd_archive(&config, !cli.no_rotate, !cli.no_sync),
        Command::List => cmd_list(&config),
        Command::Sync => cmd_sync(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(log: Option<&PathBuf>) -> Result<()> {
    if let Some(path) = log {
        let file = std::fs::File::create(path)
            .map_err(|e| anyhow::anyhow!("failed to open log file {}: {e}", path.display()))?;
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }
    Ok(())
}

#[cfg(feature = "chrome")]
fn cmd_archive(config: &Config, rotate: bool, sync_after: bool) -> Result<()> {
    use anyhow::Context;
    use queuepress::artifact::FsArtifactStore;
    use queuepress::cancel::{self, CancelToken};
    use queuepress::chrome::ChromeBrowser;
    use queuepress::pdf::TypstAssembler;

    cancel::install_sigint_handler()?;
    let cancel = CancelToken::with_sigint();

    sync::ensure_dirs(&[
        &config.output_dir,
        &config.scratch_dir,
        &config.browser.user_data_dir,
    ])?;
    if rotate {
        sync::rotate_output(&config.output_dir, &config.previous_dir)?;
    }

    let mut store = FsArtifactStore::open(&config.scratch_dir)?;
    let mut assembler = TypstAssembler::new(&config.output_dir)?;
    let mut browser = ChromeBrowser::launch(&config.browser, config.archive.capture)?;

    let result = queuepress::archive_queue(
        &mut browser,
        &mut store,
        &mut assembler,
        &config.archive,
        &cancel,
    );
    if let Err(e) = browser.shutdown() {
        warn!("main: {e:#}");
    }
    let report = result.context("archive run failed")?;

    for summary in &report.archived {
        eprintln!(
            "archived: {} ({}) -> {}",
            summary.title,
            summary.author,
            summary.document.display()
        );
    }
    for skipped in &report.skipped {
        eprintln!(
            "skipped:  {} ({}): {}",
            skipped.article.title,
            skipped.article.href,
            skipped.error.chain()
        );
    }
    eprintln!(
        "{} archived, {} skipped",
        report.archived.len(),
        report.skipped.len()
    );

    if sync_after {
        cmd_sync(config)?;
    }
    Ok(())
}

#[cfg(feature = "chrome")]
fn cmd_list(config: &Config) -> Result<()> {
    use queuepress::cancel::{self, CancelToken};
    use queuepress::chrome::ChromeBrowser;

    cancel::install_sigint_handler()?;
    let cancel = CancelToken::with_sigint();
    sync::ensure_dirs(&[&config.browser.user_data_dir])?;

    let mut browser = ChromeBrowser::launch(&config.browser, config.archive.capture)?;
    let result = queuepress::drain::list_queue(&mut browser, &config.archive, &cancel);
    if let Err(e) = browser.shutdown() {
        warn!("main: {e:#}");
    }
    for article in result? {
        println!("{}\t{}\t{}", article.title, article.author, article.href);
    }
    Ok(())
}

#[cfg(not(feature = "chrome"))]
fn cmd_archive(_config: &Config, _rotate: bool, _sync_after: bool) -> Result<()> {
    anyhow::bail!("queuepress was built without the `chrome` feature")
}

#[cfg(not(feature = "chrome"))]
fn cmd_list(_config: &Config) -> Result<()> {
    anyhow::bail!("queuepress was built without the `chrome` feature")
}

fn cmd_sync(config: &Config) -> Result<()> {
    let target = DeviceTarget::new(&config.device.root, config.device.subdir.as_str());
    match sync::sync_output(&target, &config.output_dir) {
        Ok(copied) => {
            info!("main: synced {copied} document(s)");
            Ok(())
        }
        Err(e) => match e.downcast_ref::<ArchiveError>() {
            Some(ArchiveError::SyncUnavailable { path }) => {
                eprintln!("device not found at {}, skipping sync", path.display());
                Ok(())
            }
            _ => Err(e),
        },
    }
}

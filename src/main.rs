use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info, warn};
use url::Url;

use judgment_scraper::archive::Archiver;
use judgment_scraper::browser::HttpFormSession;
use judgment_scraper::captcha::ManualSolver;
use judgment_scraper::config::{AppConfig, LoadFromEnv};
use judgment_scraper::extract::ApiReplayer;
use judgment_scraper::logger;
use judgment_scraper::object_store::LocalObjectStore;
use judgment_scraper::progress::ProgressStore;
use judgment_scraper::requests::RequestClient;
use judgment_scraper::runtime::{self, SHUTDOWN_GRACE};
use judgment_scraper::store::{JudgmentStore, MemoryStore, PgStore};
use judgment_scraper::{Crawler, RangeScheduler};

#[derive(Parser)]
#[command(name = "judgment-scraper", version, about = "Collects court judgments by judgment date")]
struct Cli {
    /// error, warn, info, debug, or trace. RUST_LOG overrides it.
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl every date range not yet completed.
    Run(RunArgs),
    /// Continue from the saved progress.
    Resume(RunArgs),
    /// Show crawl progress and store statistics.
    Stats,
    /// Forget all recorded progress.
    ResetProgress {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    start_year: Option<i32>,

    #[arg(long)]
    end_year: Option<i32>,

    /// Keep judgments in memory instead of the database.
    #[arg(long)]
    dry_run: bool,

    /// With --dry-run, write the collected judgments here as JSON.
    #[arg(long, requires = "dry_run")]
    output: Option<PathBuf>,
}

fn load_config(args: Option<&RunArgs>) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load_from_env()?;
    if let Some(args) = args {
        if let Some(year) = args.start_year {
            config.scraping_start_year = year;
        }
        if let Some(year) = args.end_year {
            config.scraping_end_year = year;
        }
    }
    config.validate()?;
    Ok(config)
}

fn scheduler_for(config: &AppConfig) -> RangeScheduler {
    RangeScheduler::new(
        config.scraping_start_year,
        config.scraping_end_year,
        config.max_date_range_days,
        ProgressStore::new(&config.progress_file),
    )
}

/// Everything a crawl needs besides the store. Built before the store is
/// opened, so a failure here leaves nothing to close.
struct Collaborators {
    session: HttpFormSession,
    replayer: ApiReplayer,
    archiver: Option<Archiver>,
}

fn collaborators(config: &AppConfig, dry_run: bool) -> anyhow::Result<Collaborators> {
    let session =
        HttpFormSession::new(config.request_timeout()).context("cannot open browser session")?;
    let replayer = ApiReplayer::new(RequestClient::new(config.request_timeout(), &config.base_url)?);
    let archiver = if config.archive_documents && !dry_run {
        let objects = LocalObjectStore::new(&config.archive_root, config.archive_prefix.clone());
        Some(Archiver::new(
            Box::new(RequestClient::new(config.request_timeout(), &config.base_url)?),
            Box::new(objects),
            Url::parse(&config.base_url)?,
            std::env::temp_dir().join("judgment_downloads"),
        ))
    } else {
        None
    };
    Ok(Collaborators {
        session,
        replayer,
        archiver,
    })
}

async fn crawl(args: RunArgs, resuming: bool) -> anyhow::Result<()> {
    let config = load_config(Some(&args))?;
    let scheduler = scheduler_for(&config);
    if resuming {
        let summary = scheduler.summary()?;
        info!(
            "Resuming: {} of {} ranges already done, {} remaining",
            summary.completed, summary.total_ranges, summary.remaining
        );
    }
    let Collaborators {
        session,
        replayer,
        archiver,
    } = collaborators(&config, args.dry_run)?;

    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn JudgmentStore> = match (&config.database_url, args.dry_run) {
        (Some(url), false) => Arc::new(
            PgStore::connect(url)
                .await
                .context("cannot open judgment store")?,
        ),
        (None, false) => {
            warn!("DATABASE_URL is not set; judgments are kept in memory only");
            memory.clone()
        }
        (_, true) => {
            info!("Dry run: judgments are kept in memory only");
            memory.clone()
        }
    };

    let solver = ManualSolver::new(&config.captcha_image_path);
    let mut crawler = Crawler::new(config.clone(), Box::new(session), Box::new(solver), store)
        .with_replayer(replayer);
    if let Some(archiver) = archiver {
        crawler = crawler.with_archiver(archiver);
    }

    info!("Starting judgment scraper");
    crawler.run(&scheduler).await?;

    if let Some(path) = args.output {
        memory.write_json(&path).await?;
    }
    Ok(())
}

async fn stats() -> anyhow::Result<()> {
    let config = load_config(None)?;
    let summary = scheduler_for(&config).summary()?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let Some(url) = &config.database_url else {
        println!("No DATABASE_URL configured; no store statistics.");
        return Ok(());
    };
    let store = PgStore::connect(url).await.context("cannot open judgment store")?;
    let statistics = store.statistics().await;
    store.close().await;
    let statistics = statistics?;
    println!("{}", serde_json::to_string_pretty(&statistics)?);
    println!("Completion rate: {:.2}%", statistics.completion_rate());
    Ok(())
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    let mut stdout = io::stdout();
    write!(stdout, "{question} [y/N]: ")?;
    stdout.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn reset_progress(yes: bool) -> anyhow::Result<()> {
    let config = load_config(None)?;
    if !yes && !confirm("Reset all scraping progress?")? {
        println!("Progress kept.");
        return Ok(());
    }
    scheduler_for(&config).reset()?;
    println!("Progress reset.");
    Ok(())
}

// The runtime is built by hand so a CAPTCHA prompt still waiting on stdin
// cannot keep the process alive after ctrl-c.
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init(cli.log_level);

    match cli.command {
        Command::Run(args) => runtime::block_on(crawl(args, false), SHUTDOWN_GRACE)?,
        Command::Resume(args) => runtime::block_on(crawl(args, true), SHUTDOWN_GRACE)?,
        Command::Stats => runtime::block_on(stats(), SHUTDOWN_GRACE)?,
        Command::ResetProgress { yes } => reset_progress(yes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(archive: &str) -> AppConfig {
        AppConfig::from_vars([
            ("BASE_URL".to_string(), "https://court.test/search/".to_string()),
            ("ARCHIVE_DOCUMENTS".to_string(), archive.to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn archiver_only_when_archiving_for_real() {
        assert!(collaborators(&config("true"), false).unwrap().archiver.is_some());
        assert!(collaborators(&config("true"), true).unwrap().archiver.is_none());
        assert!(collaborators(&config("false"), false).unwrap().archiver.is_none());
    }
}

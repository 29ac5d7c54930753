mod browser;
mod collect;
mod db;
mod errors;
mod extract;
mod fetch;
mod login;
mod page;
mod settings;

use std::path::Path;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rng, Rng};
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::db::PinRecord;
use crate::errors::SetupError;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "pin_scraper", about = "Pinterest feed scraper with SQLite store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in (when configured), scroll the feed, persist pins, download images
    Run {
        /// Target number of unique pins (overrides PIN_TARGET_COUNT)
        #[arg(short = 'n', long)]
        target: Option<usize>,
    },
    /// Show store statistics
    Stats,
    /// Most recently collected pins
    Recent {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { target } => run(target).await,
        Commands::Stats => stats(),
        Commands::Recent { limit } => recent(limit),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(target: Option<usize>) -> anyhow::Result<()> {
    let mut settings = Settings::load()?;
    if let Some(n) = target {
        settings.target_count = n;
    }

    let conn = db::connect(&settings.db_path).map_err(|e| SetupError::Database(e.to_string()))?;
    db::init_schema(&conn).map_err(|e| SetupError::Database(e.to_string()))?;
    std::fs::create_dir_all(&settings.save_dir)?;

    let session = BrowserSession::launch(&settings)
        .await
        .map_err(|e| SetupError::BrowserLaunch(e.to_string()))?;

    // Close the browser on every exit path before surfacing the result.
    let result = run_session(&session, &conn, &settings).await;
    session.close().await;
    result
}

async fn run_session(
    session: &BrowserSession,
    conn: &rusqlite::Connection,
    settings: &Settings,
) -> anyhow::Result<()> {
    if settings.has_credentials() {
        if !login::login(session, settings).await? {
            return Err(SetupError::LoginFailed.into());
        }
    } else {
        info!("No credentials configured; scraping anonymously");
    }

    session.goto(&settings.board_url).await?;
    pacing_delay(settings.delay_min_secs, settings.delay_max_secs).await;

    let opts = collect::CollectOptions {
        board_url: settings.board_url.clone(),
        target_count: settings.target_count,
        max_scrolls: settings.max_scrolls,
        wait_timeout: Duration::from_secs(settings.wait_timeout_secs),
        scroll_pause_secs: settings.scroll_pause_secs,
        render_pause_secs: (settings.delay_min_secs / 2.0, settings.delay_max_secs / 2.0),
    };
    let records = collect::collect(session, &opts).await?;
    if records.is_empty() {
        println!("No pins collected.");
        return Ok(());
    }

    println!("Persisting and downloading {} pins...", records.len());
    let counts = persist_and_download(conn, settings, &records).await?;
    counts.print();
    Ok(())
}

fn stats() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    let s = db::get_stats(&conn)?;
    println!("Pins:       {}", s.total);
    println!("Downloaded: {}", s.downloaded);
    println!("Boards:     {}", s.boards);
    Ok(())
}

fn recent(limit: usize) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    let rows = db::fetch_recent(&conn, limit)?;
    if rows.is_empty() {
        println!("No pins collected yet. Run 'run' first.");
        return Ok(());
    }

    println!(
        "{:>3} | {:<14} | {:<30} | {:<24} | {:<6} | {:<25}",
        "#", "Pin", "Title", "Board", "Image", "Collected"
    );
    println!("{}", "-".repeat(116));
    for (i, r) in rows.iter().enumerate() {
        let image = if r.local_path.is_some() { "saved" } else { "-" };
        println!(
            "{:>3} | {:<14} | {:<30} | {:<24} | {:<6} | {:<25}",
            i + 1,
            truncate(&r.pinterest_id, 14),
            truncate(&r.title, 30),
            truncate(&r.board_url, 24),
            image,
            truncate(&r.collected_at, 25)
        );
    }
    println!("\n{} pins", rows.len());
    Ok(())
}

struct RunCounts {
    collected: usize,
    inserted: usize,
    downloaded: usize,
    failed_inserts: usize,
    failed_downloads: usize,
}

impl RunCounts {
    fn print(&self) {
        println!("--- Run complete ---");
        println!("Pins collected:    {}", self.collected);
        println!("Rows inserted:     {}", self.inserted);
        println!("Images downloaded: {}", self.downloaded);
        if self.failed_inserts > 0 || self.failed_downloads > 0 {
            println!(
                "Failures:          {} inserts, {} downloads",
                self.failed_inserts, self.failed_downloads
            );
        }
    }
}

/// Sequential per-record download + insert, with short randomized pacing
/// between records. A failure on one record is counted and skipped, never
/// fatal for the batch.
async fn persist_and_download(
    conn: &rusqlite::Connection,
    settings: &Settings,
    records: &[PinRecord],
) -> anyhow::Result<RunCounts> {
    let client = reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .build()?;

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );

    let mut counts = RunCounts {
        collected: records.len(),
        inserted: 0,
        downloaded: 0,
        failed_inserts: 0,
        failed_downloads: 0,
    };
    let save_dir = Path::new(&settings.save_dir);

    for record in records {
        let local_path = match fetch::save_image(&client, &record.image_url, save_dir).await {
            Ok(Some(path)) => {
                counts.downloaded += 1;
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Download failed for {}: {}", record.pinterest_id, e);
                counts.failed_downloads += 1;
                None
            }
        };

        let local = local_path.as_deref().and_then(Path::to_str);
        match db::insert_pin(conn, record, local) {
            Ok(_) => counts.inserted += 1,
            Err(e) => {
                warn!("Insert failed for {}: {}", record.pinterest_id, e);
                counts.failed_inserts += 1;
            }
        }

        pacing_delay(0.1, 0.5).await;
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(counts)
}

async fn pacing_delay(min_secs: f64, max_secs: f64) {
    let secs = if max_secs > min_secs {
        rng().random_range(min_secs..max_secs)
    } else {
        min_secs
    };
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

//! CLI binary for byline-tally.
//!
//! A thin shim over the library crate: maps CLI flags to `TallyConfig`,
//! `SheetsConfig` and the storage/database clients, then prints results.

use anyhow::{bail, Context, Result};
use byline_tally::auth::default_token_source;
use byline_tally::leaderboard::{
    date_range_label, parse_daily_scores, top_journalists, DAILY_SCORES_PATH,
};
use byline_tally::points::{daily_points, DailyMetrics, PointsWeights};
use byline_tally::{
    extract_input, BlobStore, ExtractionProgressCallback, ExtractionStats, Extractor, GcsBlobStore,
    GoogleSheets, JournalistTally, LocalBlobStore, MemoryStore, ProgressCallback,
    RealtimeDatabase, ResultStore, SheetsConfig, StorageEvent, TallyConfig, TriggerHandler,
    TriggerOutcome, DEFAULT_MODEL,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_extraction_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            skipped: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Reading");
        self.bar.reset_eta();
    }

    fn page_elapsed_secs(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading bylines on {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut t) = self.page_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, journalists: usize) {
        let secs = self.page_elapsed_secs();
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<14}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{journalists:>2} journalists")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_skipped(&self, page_num: usize, total: usize, reason: String) {
        let secs = self.page_elapsed_secs();
        self.skipped.fetch_add(1, Ordering::SeqCst);

        let msg = if reason.chars().count() > 80 {
            format!("{}\u{2026}", reason.chars().take(79).collect::<String>())
        } else {
            reason
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, journalists: usize) {
        let skipped = self.skipped.load(Ordering::SeqCst);
        self.bar.finish_and_clear();
        if skipped == 0 {
            eprintln!(
                "{} {} pages read, {} journalists",
                green("✔"),
                bold(&total_pages.to_string()),
                bold(&journalists.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages read, {} journalists  ({} skipped)",
                if skipped == total_pages { red("✘") } else { cyan("⚠") },
                total_pages - skipped,
                total_pages,
                bold(&journalists.to_string()),
                red(&skipped.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Count bylines in a local PDF
  byline-tally extract afr-2024-11-07.pdf

  # Same, as JSON
  byline-tally extract --json https://example.com/afr-2024-11-07.pdf

  # Replay a storage finalize event against local files, no writes
  byline-tally handle-event --event event.json --local-root ./buckets --dry-run

  # Process an event for real (GCS + Realtime Database + Sheets)
  byline-tally handle-event --event event.json

  # Top five over the last 30 days
  byline-tally leaderboard --days 30 --limit 5

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY               Anthropic API key (default provider)
  EDGEQUAKE_LLM_PROVIDER          Override provider (anthropic, openai, gemini, ollama)
  EDGEQUAKE_MODEL                 Override model ID
  BYLINE_SERVICE_ACCOUNT          Service-account key file
  GOOGLE_APPLICATION_CREDENTIALS  Fallback key file; metadata server if neither is set
  BYLINE_DATABASE_URL             Realtime Database root URL
  BYLINE_SPREADSHEET_ID           Spreadsheet to append rows to
  BYLINE_SHEET_RANGE              Append range (default "New Data!A2")
  BYLINE_PUBLICATION              Publication column (default "AFR")
  PDFIUM_LIB_PATH                 Path to libpdfium (file or directory)
"#;

/// Count journalist bylines in newspaper PDFs using a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "byline-tally",
    version,
    about = "Count journalist bylines in newspaper PDFs using a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BYLINE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BYLINE_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "BYLINE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tally bylines in a local PDF or URL. Nothing is written anywhere.
    Extract {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        #[command(flatten)]
        model: ModelArgs,

        /// PDF user password for encrypted documents.
        #[arg(long, env = "BYLINE_PDF_PASSWORD")]
        password: Option<String>,

        /// HTTP download timeout in seconds.
        #[arg(long, env = "BYLINE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
        download_timeout: u64,

        /// Output the full extraction report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the storage-finalize handler on one event.
    HandleEvent {
        /// CloudEvent JSON file; stdin when omitted.
        #[arg(long)]
        event: Option<PathBuf>,

        /// Read objects from `DIR/{bucket}/{name}` instead of Cloud Storage.
        #[arg(long, value_name = "DIR")]
        local_root: Option<PathBuf>,

        /// Keep results in memory and print them; skip the sheet.
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        google: GoogleArgs,

        /// Spreadsheet to append rows to. No sheet sync when unset.
        #[arg(long, env = "BYLINE_SPREADSHEET_ID")]
        spreadsheet_id: Option<String>,

        /// A1 range rows are appended after.
        #[arg(long, env = "BYLINE_SHEET_RANGE", default_value = "New Data!A2")]
        sheet_range: String,

        /// Publication label for the sheet rows.
        #[arg(long, env = "BYLINE_PUBLICATION", default_value = "AFR")]
        publication: String,
    },

    /// Rank journalists by points stored under daily_scores.
    Leaderboard {
        /// Window length in days, ending today.
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// Number of journalists to show.
        #[arg(long, default_value_t = 5)]
        limit: usize,

        #[command(flatten)]
        google: GoogleArgs,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct ModelArgs {
    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL", long_help = "Vision LLM model to use. Default: claude-3-5-sonnet-20241022.")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Longest rendered page edge in pixels.
    #[arg(long, env = "BYLINE_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Max LLM output tokens per page.
    #[arg(long, env = "BYLINE_MAX_TOKENS", default_value_t = 1000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "BYLINE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Text file replacing the built-in byline prompt.
    #[arg(long, env = "BYLINE_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct GoogleArgs {
    /// Realtime Database root URL.
    #[arg(long, env = "BYLINE_DATABASE_URL")]
    database_url: Option<String>,

    /// Service-account key file.
    #[arg(long, env = "BYLINE_SERVICE_ACCOUNT")]
    service_account: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let json_out = matches!(
        cli.command,
        Command::Extract { json: true, .. } | Command::Leaderboard { json: true, .. }
    );
    let show_progress = !cli.quiet
        && !cli.no_progress
        && !json_out
        && !matches!(cli.command, Command::Leaderboard { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    match cli.command {
        Command::Extract {
            input,
            model,
            password,
            download_timeout,
            json,
        } => {
            let mut config = build_config(&model, progress_cb).await?;
            config.password = password;
            config.download_timeout_secs = download_timeout;

            let output = extract_input(&input, &config)
                .await
                .context("Extraction failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&output).context("Failed to serialise output")?
                );
            } else {
                print_tally(&output.tally);
                if !cli.quiet {
                    print_stats(&output.stats);
                }
            }
        }

        Command::HandleEvent {
            event,
            local_root,
            dry_run,
            model,
            google,
            spreadsheet_id,
            sheet_range,
            publication,
        } => {
            let raw = match event {
                Some(ref path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read event from {:?}", path))?,
                None => {
                    let mut buf = String::new();
                    io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read event from stdin")?;
                    buf
                }
            };
            let event = StorageEvent::from_json(&raw).context("Invalid storage event")?;

            let config = build_config(&model, progress_cb).await?;
            let extractor = Extractor::from_config(config).context("Failed to set up the model")?;

            let needs_google = local_root.is_none() || !dry_run;
            let tokens = if needs_google {
                Some(
                    default_token_source(google.service_account.as_deref())
                        .context("Failed to load Google credentials")?,
                )
            } else {
                None
            };

            let blobs: Arc<dyn BlobStore> = match (local_root, &tokens) {
                (Some(root), _) => Arc::new(LocalBlobStore::new(root)),
                (None, Some(tokens)) => Arc::new(GcsBlobStore::new(Arc::clone(tokens))),
                (None, None) => bail!("No Google credentials for Cloud Storage"),
            };

            let memory = Arc::new(MemoryStore::new());
            let store: Arc<dyn ResultStore> = match (dry_run, &tokens) {
                (true, _) => memory.clone() as Arc<dyn ResultStore>,
                (false, Some(tokens)) => {
                    let url = google
                        .database_url
                        .clone()
                        .context("--database-url (or BYLINE_DATABASE_URL) is required")?;
                    Arc::new(RealtimeDatabase::new(url, Arc::clone(tokens)))
                }
                (false, None) => bail!("No Google credentials for the database"),
            };

            let mut handler = TriggerHandler::new(blobs, store, extractor);
            if let (false, Some(id), Some(tokens)) = (dry_run, spreadsheet_id, &tokens) {
                let sheets = SheetsConfig::new(id)
                    .with_range(sheet_range)
                    .with_publication(publication);
                handler = handler.with_sheets(Arc::new(GoogleSheets::new(Arc::clone(tokens))), sheets);
            }

            match handler.handle(&event).await.context("Processing failed")? {
                TriggerOutcome::Skipped { name } => {
                    if !cli.quiet {
                        eprintln!("{} Skipped non-PDF object {}", dim("–"), name);
                    }
                }
                TriggerOutcome::Processed { key, result, stats } => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&result).context("Failed to serialise result")?
                    );
                    if !cli.quiet {
                        eprintln!("{} Stored at /{}", green("✔"), bold(&key));
                        print_stats(&stats);
                    }
                }
            }

            if dry_run {
                let snapshot = memory.snapshot().await;
                eprintln!("{}", dim("Dry run, database contents:"));
                eprintln!(
                    "{}",
                    serde_json::to_string_pretty(&snapshot).context("Failed to serialise snapshot")?
                );
            }
        }

        Command::Leaderboard {
            days,
            limit,
            google,
            json,
        } => {
            let url = google
                .database_url
                .context("--database-url (or BYLINE_DATABASE_URL) is required")?;
            let tokens = default_token_source(google.service_account.as_deref())
                .context("Failed to load Google credentials")?;
            let db = RealtimeDatabase::new(url, tokens);

            let scores = parse_daily_scores(
                db.get(DAILY_SCORES_PATH)
                    .await
                    .context("Failed to read daily scores")?,
            )?;
            let today = Utc::now().date_naive();
            let top = top_journalists(&scores, today, days, limit);

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&top).context("Failed to serialise leaderboard")?
                );
            } else {
                println!("{}", bold(&format!("Top {} ({})", limit, date_range_label(today, days))));
                for (rank, entry) in top.iter().enumerate() {
                    println!(
                        "{:>3}. {:<32} {:<8} {:>8}",
                        rank + 1,
                        entry.name,
                        dim(&entry.publication),
                        entry.points
                    );
                }
                if top.is_empty() {
                    println!("{}", dim("No scores in this window."));
                }
            }
        }
    }

    Ok(())
}

/// Map model flags to `TallyConfig`.
async fn build_config(args: &ModelArgs, progress: Option<ProgressCallback>) -> Result<TallyConfig> {
    let mut builder = TallyConfig::builder()
        .model(args.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()))
        .max_rendered_pixels(args.max_pixels)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature);

    if let Some(ref path) = args.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_tally(tally: &JournalistTally) {
    if tally.is_empty() {
        println!("No bylines found.");
        return;
    }
    let weights = PointsWeights::default();
    println!(
        "{:<32} {:>9} {:>8} {:>7}  {}",
        "Journalist",
        "Exclusive",
        "Standard",
        "Points",
        "Pages"
    );
    for (name, stat) in tally.iter() {
        let pages: Vec<String> = stat.pages.iter().map(|p| p.to_string()).collect();
        println!(
            "{:<32} {:>9} {:>8} {:>7}  {}",
            name,
            stat.exclusive,
            stat.standard,
            daily_points(&DailyMetrics::from(stat), &weights),
            dim(&pages.join(","))
        );
    }
}

fn print_stats(stats: &ExtractionStats) {
    eprintln!(
        "   {} pages  ({} with bylines, {} empty, {} skipped)  {}ms total",
        stats.total_pages,
        stats.pages_with_bylines,
        stats.empty_pages,
        stats.failed_pages,
        stats.total_duration_ms,
    );
}

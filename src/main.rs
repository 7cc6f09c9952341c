use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use url::Url;

use podarchive::{
    ArchiveListing, AssetCounts, AssetKind, DEFAULT_LISTING_URL, DEFAULT_SHOW, EpisodeStatus, NoopReporter,
    ProgressEvent, ProgressReporter, ReqwestClient, RunOptions, RunSummary,
    SharedProgressReporter, logging, run_archive,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static TRANSCRIPT: Emoji<'_, '_> = Emoji("📄 ", "[pdf] ");
static AUDIO: Emoji<'_, '_> = Emoji("🎧 ", "[mp3] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

/// Root directory name below the user's documents folder
const DEFAULT_ROOT_DIR: &str = "BBC_English_Podcast";

/// Archive podcast episodes (transcripts and audio) by show and year
#[derive(Parser, Debug)]
#[command(name = "podarchive")]
#[command(about = "Archive podcast episodes (transcripts and audio) by show and year")]
#[command(version)]
struct Args {
    /// Years to archive, comma separated or repeated (e.g. 2023,2024)
    #[arg(short, long, required = true, value_delimiter = ',', value_parser = clap::value_parser!(i32).range(1..))]
    years: Vec<i32>,

    /// Archive root directory [default: <Documents>/BBC_English_Podcast]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show name, used for the directory and the index file
    #[arg(long, default_value = DEFAULT_SHOW)]
    show: String,

    /// Listing page of the show
    #[arg(long, default_value = DEFAULT_LISTING_URL)]
    listing_url: String,

    /// Maximum number of episodes processed concurrently
    #[arg(short = 'c', long, default_value = "3", value_parser = clap::value_parser!(u16).range(1..))]
    concurrent: u16,

    /// Flush the index after this many episodes (0 = only at the end)
    #[arg(long, default_value = "10")]
    flush_every: usize,

    /// Seconds without data after which a download is abandoned
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    idle_timeout: u64,

    /// Re-download files that already exist
    #[arg(long)]
    force: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Log what happens to every episode and asset
    #[arg(short, long)]
    verbose: bool,
}

/// Terminal rendering of run progress.
///
/// One overall bar counts the episodes of the year being processed. Each
/// worker slot gets a transfer bar that is restyled for the asset kind it is
/// currently fetching.
struct IndicatifReporter {
    multi: MultiProgress,
    transfers: Mutex<HashMap<usize, ProgressBar>>,
    overall: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new_spinner());
        overall.set_style(spinner_style());
        overall.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            transfers: Mutex::new(HashMap::new()),
            overall,
        }
    }

    /// Switch the overall bar to counting `total` episodes of `year`
    fn start_year(&self, year: i32, total: usize) {
        self.overall.set_style(year_style());
        self.overall.set_length(total as u64);
        self.overall.set_position(0);
        self.overall.set_prefix(year.to_string());
    }

    fn transfer_bar(&self, slot: usize, kind: AssetKind) -> ProgressBar {
        let mut transfers = self.transfers.lock().unwrap();
        let bar = transfers
            .entry(slot)
            .or_insert_with(|| self.multi.add(ProgressBar::new(0)))
            .clone();
        bar.set_style(transfer_style(kind));
        bar
    }

    fn existing_transfer_bar(&self, slot: usize) -> Option<ProgressBar> {
        self.transfers.lock().unwrap().get(&slot).cloned()
    }

    fn clear_transfer(&self, slot: usize) {
        if let Some(bar) = self.transfers.lock().unwrap().remove(&slot) {
            bar.finish_and_clear();
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {wide_msg}")
        .unwrap()
}

fn year_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix:.bold} [{bar:25.green/white}] {pos}/{len} episodes {wide_msg}")
        .unwrap()
        .progress_chars("=> ")
}

fn transfer_style(kind: AssetKind) -> ProgressStyle {
    let (icon, colors) = match kind {
        AssetKind::Pdf => (&TRANSCRIPT, "magenta/white"),
        AssetKind::Mp3 => (&AUDIO, "cyan/blue"),
    };
    ProgressStyle::default_bar()
        .template(&format!(
            "  {icon}[{{bar:30.{colors}}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
        ))
        .unwrap()
        .progress_chars("█▓░")
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingListing { year } => {
                self.overall.set_style(spinner_style());
                self.overall
                    .set_message(format!("{SEARCH}Fetching listing for {}", year.to_string().cyan()));
            }

            ProgressEvent::ListingReady {
                year,
                listed,
                to_reconcile,
            } => {
                self.start_year(year, to_reconcile);
                self.overall.set_message(format!(
                    "{} listed",
                    listed.to_string().cyan()
                ));
            }

            ProgressEvent::ListingFailed { year, error } => {
                self.multi
                    .println(format!("{WARNING}{} {}", format!("Listing {year} skipped:").yellow(), error.dimmed()))
                    .ok();
            }

            ProgressEvent::IndexRecovered { path, error, backup } => {
                let kept = backup
                    .map(|b| format!(" (old file kept as {})", b.display()))
                    .unwrap_or_default();
                self.multi
                    .println(format!(
                        "{WARNING}{} {}: {}{}",
                        "Index unreadable, starting fresh:".yellow().bold(),
                        path.display(),
                        error.dimmed(),
                        kept
                    ))
                    .ok();
            }

            ProgressEvent::PartialFilesCleanedUp { count } => {
                self.multi
                    .println(format!("{WARNING}Removed {count} partial download(s) from an interrupted run"))
                    .ok();
            }

            ProgressEvent::AssetStarting {
                slot,
                episode_title,
                kind,
                content_length,
            } => {
                let bar = self.transfer_bar(slot, kind);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(format!(
                    "{} {}",
                    kind.label().cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::AssetProgress {
                slot,
                bytes_downloaded,
                total_bytes,
            } => {
                if let Some(bar) = self.existing_transfer_bar(slot) {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                }
            }

            ProgressEvent::AssetDownloaded { slot, .. } => {
                self.clear_transfer(slot);
            }

            ProgressEvent::AssetFailed {
                slot,
                episode_title,
                kind,
                error,
            } => {
                self.clear_transfer(slot);
                self.multi
                    .println(format!(
                        "  {FAILURE}{} {} - {}",
                        kind.label().red(),
                        truncate_title(&episode_title, 30).red(),
                        error.dimmed()
                    ))
                    .ok();
            }

            ProgressEvent::EpisodeReconciled {
                episode_title,
                year,
                status,
            } => {
                let title = truncate_title(&episode_title, 50);
                let line = match status {
                    EpisodeStatus::Downloaded => format!("  {SUCCESS}{} {}", year, title.green()),
                    EpisodeStatus::PartiallyDownloaded => {
                        format!("  {WARNING}{} {} (partial)", year, title.yellow())
                    }
                    EpisodeStatus::Failed => format!("  {FAILURE}{} {}", year, title.red()),
                    EpisodeStatus::Skipped | EpisodeStatus::Pending => {
                        format!("  {} {} (no files)", year, title.dimmed())
                    }
                };
                self.overall.inc(1);
                self.multi.println(line).ok();
            }

            ProgressEvent::IndexFlushed { .. } => {}

            ProgressEvent::RunCompleted { summary } => {
                self.overall.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} downloaded, {} skipped, {} failed",
                    "Run complete:".bold().green(),
                    summary.assets_downloaded().to_string().green().bold(),
                    summary.assets_skipped().to_string().yellow(),
                    if summary.assets_failed() > 0 {
                        summary.assets_failed().to_string().red().bold()
                    } else {
                        summary.assets_failed().to_string().green()
                    }
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn asset_line(label: &str, counts: &AssetCounts) -> String {
    format!(
        "  {label}: {} downloaded ({}), {} skipped, {} failed",
        counts.downloaded.to_string().green(),
        indicatif::HumanBytes(counts.bytes_downloaded),
        counts.skipped.to_string().yellow(),
        if counts.failed > 0 {
            counts.failed.to_string().red().bold()
        } else {
            counts.failed.to_string().normal()
        }
    )
}

fn print_summary(summary: &RunSummary) {
    println!("\n{}", "Run summary".bold());
    println!("  Requests sent:      {}", summary.requests_sent);
    println!("  Episodes scheduled: {}", summary.episodes_scheduled);
    println!("  Episodes fetched:   {}", summary.episodes_fetched);
    println!("  Episodes checked:   {}", summary.episodes_reconciled);
    if summary.episodes_aborted > 0 {
        println!("  Episodes aborted:   {}", summary.episodes_aborted.to_string().red());
    }
    if summary.listings_skipped > 0 {
        println!("  Listings skipped:   {}", summary.listings_skipped.to_string().red());
    }
    println!("  Index rows:         {}", summary.index_rows);
    println!("{}", asset_line("PDF", &summary.pdf));
    println!("{}", asset_line("MP3", &summary.mp3));
}

fn default_root() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_ROOT_DIR)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(logging::Verbosity::from_flags(args.quiet, args.verbose))?;

    let listing_url = Url::parse(&args.listing_url)
        .with_context(|| format!("Invalid listing URL '{}'", args.listing_url))?;

    let options = RunOptions {
        root: args.output.clone().unwrap_or_else(default_root),
        show: args.show.clone(),
        max_concurrent: usize::from(args.concurrent),
        force: args.force,
        flush_every: args.flush_every,
        idle_timeout: Duration::from_secs(args.idle_timeout),
    };

    let show_progress = !args.quiet && !args.json;
    if show_progress {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podarchive".bold().magenta(),
            format!("- {} archiver", options.show).dimmed()
        );
    }

    let reporter: SharedProgressReporter = if show_progress {
        Arc::new(IndicatifReporter::new())
    } else {
        NoopReporter::shared()
    };

    let client = ReqwestClient::new();
    let listing = ArchiveListing::new(client.clone(), listing_url)
        .with_page_concurrency(usize::from(args.concurrent));

    let mut years = args.years.clone();
    years.sort_unstable();
    years.dedup();

    let summary = run_archive(&client, &listing, &years, &options, reporter)
        .await
        .context("Failed to archive episodes")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    } else if !args.quiet {
        print_summary(&summary);
        println!(
            "\n{FOLDER}Output: {}\n",
            options.root.display().to_string().cyan()
        );
    }

    if summary.nothing_succeeded() {
        std::process::exit(1);
    }

    Ok(())
}

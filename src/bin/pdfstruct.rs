//! CLI binary for edgequake-pdfstruct.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfstruct::{
    convert_batch_with_cancel, convert_with_cancel, inspect, CancellationToken, ConversionConfig,
    ConversionProgressCallback, OcrMode, PageSeparator, PdfStructError, ProgressCallback, TagStore,
};
use edgequake_pdfstruct::heal::fetch::fetch_lists;
use edgequake_pdfstruct::heal::{Dictionary, Language};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
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

const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar counted in pages, one log line per
/// chunk. Chunks complete out of order, so start times are keyed by range.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<(usize, usize), Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Splitting PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total_pages: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.reset();
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recovering");
    }

    fn elapsed(&self, start: usize, end: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&(start, end)))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize, total_chunks: usize) {
        self.activate_bar(total_pages);
        self.errors.store(0, Ordering::SeqCst);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{total_pages} pages in {total_chunks} chunks…"))
        ));
    }

    fn on_chunk_start(&self, start_page: usize, end_page: usize, _total_pages: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert((start_page, end_page), Instant::now());
        }
        self.bar.set_message(format!("pages {start_page}-{end_page}"));
    }

    fn on_chunk_complete(&self, start_page: usize, end_page: usize, total_pages: usize, markdown_len: usize) {
        let secs = self.elapsed(start_page, end_page);
        self.bar.println(format!(
            "  {} Pages {:>3}-{:<3}/{:<3}  {:<8}  {}",
            green("✓"),
            start_page,
            end_page,
            total_pages,
            dim(&format!("{markdown_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc((end_page + 1 - start_page) as u64);
    }

    fn on_chunk_error(&self, start_page: usize, end_page: usize, total_pages: usize, error: &str) {
        let secs = self.elapsed(start_page, end_page);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Pages {:>3}-{:<3}/{:<3}  {}  {}",
            red("✗"),
            start_page,
            end_page,
            total_pages,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc((end_page + 1 - start_page) as u64);
    }

    fn on_document_complete(&self, total_pages: usize, failed_chunks: usize) {
        self.bar.finish_and_clear();
        if failed_chunks == 0 {
            eprintln!("{} {} pages recovered", green("✔"), bold(&total_pages.to_string()));
        } else {
            eprintln!(
                "{} {} pages  ({} chunks failed)",
                cyan("⚠"),
                bold(&total_pages.to_string()),
                red(&failed_chunks.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Single document to stdout
  pdfstruct report.pdf

  # Write report/report.md plus report/images/
  pdfstruct report.pdf -o out/ --images --charts

  # Every PDF under a directory, recursively
  pdfstruct scans/ -o out/ --recursive --workers 4

  # Force OCR with Turkish + English models
  pdfstruct scan.pdf --ocr on --ocr-lang tur+eng

  # Manage watermark candidates (validated again per document)
  pdfstruct --add-tag "CONFIDENTIAL DRAFT"
  pdfstruct --list-tags

  # Install the full word lists used by the text healer
  pdfstruct --fetch-dictionaries

  # Page count and metadata only
  pdfstruct --inspect report.pdf

ENVIRONMENT VARIABLES:
  PDFSTRUCT_*        Every flag has a PDFSTRUCT_<FLAG> variable
  PDFIUM_LIB_PATH    Directory containing libpdfium
  RUST_LOG           Overrides --verbose / --quiet log filtering
"#;

/// Recover tables, charts and headings from PDF geometry as Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "pdfstruct",
    version,
    about = "Recover tables, charts and headings from PDF geometry as Markdown",
    long_about = "Reconstruct the logical structure of PDF documents (tables, chart regions, \
headings, body text) from drawn lines, glyph positions and whitespace, and emit Markdown. \
Large documents are split into chunks processed by isolated worker processes.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file or directory of PDFs.
    input: Option<PathBuf>,

    /// Output directory. Each document is written to <OUTPUT>/<stem>/<stem>.md.
    /// Required for directory input; single files go to stdout without it.
    #[arg(short, long, env = "PDFSTRUCT_OUTPUT")]
    output: Option<PathBuf>,

    /// Skip table detection; table text flows into the body.
    #[arg(long, env = "PDFSTRUCT_NO_TABLES")]
    no_tables: bool,

    /// Extract embedded raster images into images/.
    #[arg(long, env = "PDFSTRUCT_IMAGES")]
    images: bool,

    /// Snapshot chart regions into images/.
    #[arg(long, env = "PDFSTRUCT_CHARTS")]
    charts: bool,

    /// OCR policy: auto (empty or garbled text layers), on, off.
    #[arg(long, env = "PDFSTRUCT_OCR", value_enum, default_value = "auto")]
    ocr: OcrArg,

    /// Tesseract language models, joined with '+'.
    #[arg(long, env = "PDFSTRUCT_OCR_LANG", default_value = "eng+tur")]
    ocr_lang: String,

    /// Path or name of the tesseract executable.
    #[arg(long, env = "PDFSTRUCT_TESSERACT")]
    tesseract: Option<PathBuf>,

    /// Raster DPI for OCR (72–600).
    #[arg(long, env = "PDFSTRUCT_OCR_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    ocr_dpi: u32,

    /// Worker processes (clamped to the number of CPUs).
    #[arg(short, long, env = "PDFSTRUCT_WORKERS")]
    workers: Option<usize>,

    /// Pages per chunk.
    #[arg(long, env = "PDFSTRUCT_CHUNK_SIZE", default_value_t = 2)]
    chunk_size: usize,

    /// Descend into sub-directories when the input is a directory.
    #[arg(short, long, env = "PDFSTRUCT_RECURSIVE")]
    recursive: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFSTRUCT_PASSWORD")]
    password: Option<String>,

    /// Page separator: none, hr, comment, or custom string.
    #[arg(long, env = "PDFSTRUCT_SEPARATOR", default_value = "none")]
    separator: String,

    /// Extra watermark candidate (repeatable). Validated per document.
    #[arg(long = "watermark", env = "PDFSTRUCT_WATERMARKS", value_delimiter = ',')]
    watermarks: Vec<String>,

    /// Minimum share of sampled pages a candidate must appear on.
    #[arg(long, env = "PDFSTRUCT_WATERMARK_THRESHOLD", default_value_t = 0.6)]
    watermark_threshold: f64,

    /// Ignore the persisted tag list for this run.
    #[arg(long)]
    no_tags: bool,

    /// Add a watermark candidate to the persisted tag list and exit.
    #[arg(long, value_name = "TAG")]
    add_tag: Option<String>,

    /// Remove a watermark candidate from the persisted tag list and exit.
    #[arg(long, value_name = "TAG")]
    remove_tag: Option<String>,

    /// Print the persisted tag list and exit.
    #[arg(long)]
    list_tags: bool,

    /// Directory with <lang>_freq.txt word lists for the text healer
    /// (default: the user data directory).
    #[arg(long, env = "PDFSTRUCT_DICTIONARY_DIR")]
    dictionary_dir: Option<PathBuf>,

    /// Download the full en/tr frequency lists into the dictionary directory and exit.
    #[arg(long)]
    fetch_dictionaries: bool,

    /// Healing language for text that does not read as English (en, tr).
    #[arg(long, env = "PDFSTRUCT_DEFAULT_LANGUAGE", default_value = "tr")]
    default_language: Language,

    /// Drop lines matching this regex (repeatable).
    #[arg(long = "blacklist", env = "PDFSTRUCT_BLACKLIST", value_delimiter = ',')]
    blacklist: Vec<String>,

    /// Directory for chunk sub-documents (defaults to the system temp dir).
    #[arg(long, env = "PDFSTRUCT_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect: bool,

    /// Output structured JSON instead of Markdown.
    #[arg(long, env = "PDFSTRUCT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFSTRUCT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFSTRUCT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFSTRUCT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    Auto,
    On,
    Off,
}

impl From<OcrArg> for OcrMode {
    fn from(v: OcrArg) -> Self {
        match v {
            OcrArg::Auto => OcrMode::Auto,
            OcrArg::On => OcrMode::On,
            OcrArg::Off => OcrMode::Off,
        }
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    // Worker processes are this same executable; they serve chunks on
    // stdin/stdout and never reach argument parsing.
    if std::env::var_os("PDFSTRUCT_WORKER").is_some() {
        init_tracing("warn");
        edgequake_pdfstruct::run_worker_if_requested();
    }

    let cli = Cli::parse();

    // The progress bar provides all the feedback that matters when active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    init_tracing(filter);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(run(cli, show_progress))
}

async fn run(cli: Cli, show_progress: bool) -> Result<()> {
    // ── Tag-store commands ───────────────────────────────────────────────
    if cli.add_tag.is_some() || cli.remove_tag.is_some() || cli.list_tags {
        return manage_tags(&cli);
    }
    if cli.fetch_dictionaries {
        return fetch_dictionaries(&cli).await;
    }

    let input = cli
        .input
        .clone()
        .context("An input PDF or directory is required")?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect {
        let meta = inspect(&input).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", input.display());
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Ctrl-C cancels the run and sweeps temp storage ───────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} cancelling…", cyan("⚠"));
                cancel.cancel();
            }
        });
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let outcome = if input.is_dir() || cli.output.is_some() {
        let out_dir = cli
            .output
            .clone()
            .context("--output is required when the input is a directory")?;
        run_batch(&cli, &input, &out_dir, &config, &cancel).await
    } else {
        run_single(&cli, &input, &config, &cancel, show_progress).await
    };

    match outcome {
        Err(e) if e.downcast_ref::<PdfStructError>().is_some_and(PdfStructError::is_cancelled) => {
            eprintln!("{} cancelled, nothing written", red("✘"));
            std::process::exit(130);
        }
        other => other,
    }
}

async fn run_single(
    cli: &Cli,
    input: &Path,
    config: &ConversionConfig,
    cancel: &CancellationToken,
    show_progress: bool,
) -> Result<()> {
    let output = convert_with_cancel(input, config, cancel).await?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !show_progress {
        let stats = &output.stats;
        eprintln!(
            "Recovered {} pages in {}ms: {} tables, {} charts, {} images, {} OCR pages",
            stats.total_pages, stats.total_duration_ms, stats.tables, stats.charts, stats.images, stats.ocr_pages
        );
        if stats.failed_chunks > 0 {
            eprintln!("  {} chunks failed ({} pages)", stats.failed_chunks, stats.failed_pages);
        }
    }
    if !output.images.is_empty() && !cli.quiet {
        eprintln!(
            "  {} images not written (use --output to keep them)",
            dim(&output.images.len().to_string())
        );
    }
    Ok(())
}

async fn run_batch(
    cli: &Cli,
    input: &Path,
    out_dir: &Path,
    config: &ConversionConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let report = convert_batch_with_cancel(input, out_dir, config, cancel).await?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        for (path, stats) in &report.converted {
            eprintln!(
                "{}  {} pages  {} tables  {}ms  →  {}",
                if stats.failed_chunks == 0 { green("✔") } else { cyan("⚠") },
                stats.total_pages,
                stats.tables,
                stats.total_duration_ms,
                bold(&path.display().to_string()),
            );
        }
        for (path, error) in &report.failed {
            eprintln!("{}  {}  {}", red("✘"), path.display(), red(error));
        }
    }

    if !report.failed.is_empty() && report.converted.is_empty() {
        anyhow::bail!("all {} documents failed", report.failed.len());
    }
    Ok(())
}

fn manage_tags(cli: &Cli) -> Result<()> {
    let store = TagStore::open_default().context("Failed to open tag store")?;
    if let Some(ref tag) = cli.add_tag {
        if store.add(tag)? {
            eprintln!("{} added {:?}", green("✔"), tag);
        } else {
            eprintln!("{} {:?} already stored", dim("·"), tag);
        }
    }
    if let Some(ref tag) = cli.remove_tag {
        if store.remove(tag)? {
            eprintln!("{} removed {:?}", green("✔"), tag);
        } else {
            eprintln!("{} {:?} not stored", dim("·"), tag);
        }
    }
    if cli.list_tags {
        let tags = store.list()?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&tags)?);
        } else {
            for tag in tags {
                println!("{tag}");
            }
        }
    }
    Ok(())
}

async fn fetch_dictionaries(cli: &Cli) -> Result<()> {
    let dir = cli
        .dictionary_dir
        .clone()
        .or_else(Dictionary::default_dir)
        .context("No data directory on this platform; pass --dictionary-dir")?;
    for path in fetch_lists(&dir, DOWNLOAD_TIMEOUT_SECS).await? {
        eprintln!("{} {}", green("✔"), path.display());
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut candidates = cli.watermarks.clone();
    if !cli.no_tags {
        match TagStore::open_default().and_then(|store| store.list()) {
            Ok(tags) => candidates.extend(tags),
            Err(e) => tracing::warn!(error = %e, "tag store unavailable, using command-line candidates only"),
        }
    }

    let separator: PageSeparator = cli.separator.parse().unwrap_or_default();

    let mut builder = ConversionConfig::builder()
        .tables(!cli.no_tables)
        .images(cli.images)
        .charts(cli.charts)
        .ocr_mode(cli.ocr.into())
        .ocr_languages(cli.ocr_lang.clone())
        .ocr_dpi(cli.ocr_dpi)
        .chunk_size(cli.chunk_size)
        .recursive(cli.recursive)
        .default_language(cli.default_language)
        .page_separator(separator)
        .watermark_threshold(cli.watermark_threshold)
        .watermark_candidates(candidates);

    if let Some(n) = cli.workers {
        builder = builder.workers(n);
    }
    if let Some(ref bin) = cli.tesseract {
        builder = builder.ocr_binary(bin.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref dir) = cli.dictionary_dir {
        builder = builder.dictionary_dir(dir.clone());
    }
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_root(dir.clone());
    }
    if !cli.blacklist.is_empty() {
        let mut cleaning = edgequake_pdfstruct::CleaningSettings::default();
        cleaning.regex_blacklist.extend(cli.blacklist.iter().cloned());
        builder = builder.cleaning(cleaning);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

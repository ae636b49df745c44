//! Eager (full-document) conversion entry points.
//!
//! ## Lifecycle of one document
//!
//! ```text
//! validate ─▶ orphan sweep ─▶ metadata ─▶ watermark pre-scan ─▶ split
//!          ─▶ dispatch (buffer_unordered over the worker pool)
//!          ─▶ collect ─▶ reassemble (sort by start page) ─▶ document sweep
//! ```
//!
//! Everything from the split onwards runs under one document token; the
//! final sweep removes every temp file carrying it, on success, failure and
//! cancellation alike.
//!
//! Use [`crate::stream::convert_stream`] instead when you want chunk results
//! as they complete.

use crate::cancel::CancellationToken;
use crate::config::{max_workers, ConversionConfig, ExtractionSettings};
use crate::error::PdfStructError;
use crate::output::{reassemble, ChunkResult, ConversionOutput, ConversionStats, DocumentMetadata};
use crate::pipeline::loader::{self, Chunk};
use crate::pipeline::pool::WorkerPool;
use crate::pipeline::worker::ChunkRequest;
use crate::pipeline::{cleanup, extract, images, input, pdfium, render};
use crate::progress::ProgressCallback;
use crate::watermark::{ValidatedWatermarkSet, WatermarkAnalyzer};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Temp files older than this are treated as left over by a crashed run.
pub const ORPHAN_MAX_AGE: Duration = Duration::from_secs(3600);

/// Convert one PDF to Markdown.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ConversionOutput)` on success, even if some chunks failed (their
/// pages carry an inline error marker; check `output.stats.failed_chunks`).
///
/// # Errors
/// Returns `Err(PdfStructError)` only for fatal errors:
/// - File not found / permission denied / not a PDF
/// - The document cannot be opened or split
/// - The pdfium library cannot be loaded
pub async fn convert(input: impl AsRef<Path>, config: &ConversionConfig) -> Result<ConversionOutput, PdfStructError> {
    convert_with_cancel(input, config, &CancellationToken::new()).await
}

/// [`convert`] with an explicit cancel signal.
///
/// On cancellation every further chunk completion is discarded, in-flight
/// worker processes are killed, temp storage is swept with retries, and
/// `Err(PdfStructError::Cancelled)` is returned. No partial output is produced.
pub async fn convert_with_cancel(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
    cancel: &CancellationToken,
) -> Result<ConversionOutput, PdfStructError> {
    let total_start = Instant::now();
    let path = input.as_ref();
    info!(path = %path.display(), "starting structure recovery");

    let prepared = prepare(path, config).await?;
    run_prepared(prepared, config, cancel, total_start).await
}

/// Dispatch a split document, sweep its temp files and assemble the output.
///
/// The sweep runs on every path, cancellation included; a cancelled run
/// yields no output.
async fn run_prepared(
    prepared: Prepared,
    config: &ConversionConfig,
    cancel: &CancellationToken,
    total_start: Instant,
) -> Result<ConversionOutput, PdfStructError> {
    let outcome = dispatch(&prepared, config, cancel).await;

    let (attempts, interval) = if outcome.is_err() {
        (config.cancel_sweep_attempts, Duration::from_millis(config.cancel_sweep_interval_ms))
    } else {
        (cleanup::DEFAULT_ATTEMPTS, cleanup::DEFAULT_INTERVAL)
    };
    // assets are read before the sweep removes their staging directory
    let assets = match (&outcome, &prepared.asset_dir) {
        (Ok(_), Some(dir)) => images::collect(dir),
        _ => Ok(Vec::new()),
    };
    let report =
        cleanup::sweep_document_async(prepared.temp_dir.clone(), prepared.doc_token.clone(), attempts, interval).await;
    if !report.is_clean() {
        warn!(left = report.remaining.len(), "temp files remain after conversion");
    }

    let (results, processing_ms) = outcome?;
    let images = assets?;

    let (markdown, chunks) = reassemble(results, &config.page_separator);
    let mut stats = ConversionStats {
        total_pages: prepared.metadata.page_count,
        validated_watermarks: prepared.settings.watermarks.len(),
        split_duration_ms: prepared.split_ms,
        processing_duration_ms: processing_ms,
        ..ConversionStats::default()
    };
    stats.absorb(&chunks);
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        pages = stats.total_pages,
        chunks = stats.total_chunks,
        failed = stats.failed_chunks,
        tables = stats.tables,
        ms = stats.total_duration_ms,
        "conversion complete"
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_document_complete(stats.total_pages, stats.failed_chunks);
    }

    Ok(ConversionOutput {
        markdown,
        chunks,
        images,
        metadata: prepared.metadata,
        stats,
    })
}

/// Convert a PDF and write `<output>.md` plus its `images/` directory next to it.
///
/// The Markdown is written atomically (temp file + rename).
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, PdfStructError> {
    let output = convert(input, config).await?;
    write_output(&output, output_path.as_ref()).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(input: impl AsRef<Path>, config: &ConversionConfig) -> Result<ConversionOutput, PdfStructError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PdfStructError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

/// Extract PDF metadata without running the engine.
pub async fn inspect(input: impl AsRef<Path>) -> Result<DocumentMetadata, PdfStructError> {
    let path = input.as_ref();
    input::validate_pdf(path)?;
    render::extract_metadata(path, None).await
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Documents written, with the Markdown path and stats of each.
    pub converted: Vec<(PathBuf, ConversionStats)>,
    /// Documents that failed fatally, with the error text.
    pub failed: Vec<(PathBuf, String)>,
}

/// Convert a file or every PDF under a directory into `out_dir`.
///
/// Each document lands in `<out_dir>/<stem>/<stem>.md` with its own
/// `images/`. Documents found in sub-directories keep their relative path.
/// A fatal error on one document is recorded and the batch moves on.
pub async fn convert_batch(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchReport, PdfStructError> {
    convert_batch_with_cancel(input, out_dir, config, &CancellationToken::new()).await
}

/// [`convert_batch`] with an explicit cancel signal; cancellation stops the batch.
pub async fn convert_batch_with_cancel(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &ConversionConfig,
    cancel: &CancellationToken,
) -> Result<BatchReport, PdfStructError> {
    let out_dir = out_dir.as_ref();
    let (root, files) = match input::resolve(input.as_ref(), config.recursive)? {
        input::Input::File(file) => {
            let root = file.parent().map(Path::to_path_buf).unwrap_or_default();
            (root, vec![file])
        }
        input::Input::Directory { root, files } => (root, files),
    };
    info!(documents = files.len(), out = %out_dir.display(), "batch started");

    let mut report = BatchReport::default();
    for file in files {
        let target = batch_target(&root, &file, out_dir);
        let outcome = match convert_with_cancel(&file, config, cancel).await {
            Ok(output) => write_output(&output, &target).await.map(|()| output.stats),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(stats) => report.converted.push((target, stats)),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                error!(path = %file.display(), error = %e, "document failed");
                report.failed.push((file, e.to_string()));
            }
        }
    }
    info!(converted = report.converted.len(), failed = report.failed.len(), "batch finished");
    Ok(report)
}

/// `<out_dir>/<relative dir>/<stem>/<stem>.md` for `file` found under `root`.
fn batch_target(root: &Path, file: &Path, out_dir: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let relative_dir = file
        .strip_prefix(root)
        .ok()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    out_dir.join(relative_dir).join(&stem).join(format!("{stem}.md"))
}

async fn write_output(output: &ConversionOutput, path: &Path) -> Result<(), PdfStructError> {
    let write_failed = |e| PdfStructError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await.map_err(write_failed)?;

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, &output.markdown).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;

    if !output.images.is_empty() {
        let dir = dir.to_path_buf();
        let assets = output.images.clone();
        tokio::task::spawn_blocking(move || images::write_assets(&dir, &assets))
            .await
            .map_err(|e| PdfStructError::Internal(format!("Asset write task panicked: {}", e)))??;
    }
    debug!(path = %path.display(), images = output.images.len(), "output written");
    Ok(())
}

// ── Shared with the streaming API ────────────────────────────────────────

/// A document that has been validated, scanned and split.
pub(crate) struct Prepared {
    pub metadata: DocumentMetadata,
    pub settings: ExtractionSettings,
    pub chunks: Vec<Chunk>,
    pub temp_dir: PathBuf,
    pub doc_token: String,
    pub asset_dir: Option<PathBuf>,
    pub split_ms: u64,
}

impl Prepared {
    pub fn requests(&self) -> Vec<ChunkRequest> {
        self.chunks
            .iter()
            .map(|c| ChunkRequest {
                chunk_path: c.temp_path.clone(),
                start_page: c.start_page,
                end_page: c.end_page,
                settings: self.settings.clone(),
                asset_dir: self.asset_dir.clone(),
            })
            .collect()
    }
}

/// Everything before dispatch. A failed split sweeps its own partial output.
pub(crate) async fn prepare(path: &Path, config: &ConversionConfig) -> Result<Prepared, PdfStructError> {
    input::validate_pdf(path)?;

    let temp_dir = config.temp_dir();
    tokio::fs::create_dir_all(&temp_dir)
        .await
        .map_err(|e| PdfStructError::TempStorage {
            path: temp_dir.clone(),
            source: e,
        })?;
    let orphan_dir = temp_dir.clone();
    let _ = tokio::task::spawn_blocking(move || cleanup::sweep_orphans(&orphan_dir, ORPHAN_MAX_AGE)).await;

    let metadata = render::extract_metadata(path, config.password.as_deref()).await?;
    info!(pages = metadata.page_count, "PDF opened");

    let watermarks = scan_watermarks(path, config, metadata.page_count).await?;

    let doc_token = loader::document_token();
    let split_start = Instant::now();
    let chunks = match loader::split(path, config.password.as_deref(), &temp_dir, &doc_token, config.chunk_size).await {
        Ok(chunks) => chunks,
        Err(e) => {
            cleanup::sweep_document_async(temp_dir, doc_token, cleanup::DEFAULT_ATTEMPTS, cleanup::DEFAULT_INTERVAL)
                .await;
            return Err(e);
        }
    };
    let split_ms = split_start.elapsed().as_millis() as u64;

    let asset_dir = (config.images_enabled || config.charts_enabled).then(|| loader::asset_dir(&temp_dir, &doc_token));
    Ok(Prepared {
        metadata,
        settings: config.extraction_settings(watermarks),
        chunks,
        temp_dir,
        doc_token,
        asset_dir,
        split_ms,
    })
}

/// Validate the configured watermark candidates against a sample of pages.
async fn scan_watermarks(
    path: &Path,
    config: &ConversionConfig,
    page_count: usize,
) -> Result<ValidatedWatermarkSet, PdfStructError> {
    if config.watermark_candidates.is_empty() {
        return Ok(ValidatedWatermarkSet::empty());
    }
    let analyzer = WatermarkAnalyzer::new(config.watermark.clone());
    let sample = analyzer.sample_pages(page_count);
    let path = path.to_path_buf();
    let password = config.password.clone();
    let texts = tokio::task::spawn_blocking(move || -> Result<Vec<String>, PdfStructError> {
        let pdfium = pdfium::shared()?;
        let document = pdfium::open(pdfium, &path, password.as_deref())?;
        Ok(extract::page_texts(&document, &sample))
    })
    .await
    .map_err(|e| PdfStructError::Internal(format!("Watermark scan task panicked: {}", e)))??;
    Ok(analyzer.validate(&config.watermark_candidates, texts))
}

/// Run one chunk and report it to the progress callback.
pub(crate) async fn run_chunk(
    pool: &WorkerPool,
    request: ChunkRequest,
    callback: Option<&ProgressCallback>,
    total_pages: usize,
) -> ChunkResult {
    let (start, end) = (request.start_page, request.end_page);
    if let Some(cb) = callback {
        cb.on_chunk_start(start, end, total_pages);
    }
    let result = pool.run(request).await;
    if let Some(cb) = callback {
        match &result.error {
            None => cb.on_chunk_complete(start, end, total_pages, result.markdown(&Default::default()).len()),
            Some(e) => cb.on_chunk_error(start, end, total_pages, &e.to_string()),
        }
    }
    result
}

/// Run every chunk through the pool; `Err(Cancelled)` if `cancel` fires first.
async fn dispatch(
    prepared: &Prepared,
    config: &ConversionConfig,
    cancel: &CancellationToken,
) -> Result<(Vec<ChunkResult>, u64), PdfStructError> {
    if cancel.is_cancelled() {
        return Err(PdfStructError::Cancelled);
    }
    let pool = WorkerPool::new(&config.worker_launch)?;
    let workers = config.workers.clamp(1, max_workers());
    let total_pages = prepared.metadata.page_count;
    let requests = prepared.requests();
    let callback = config.progress_callback.as_ref();
    if let Some(cb) = callback {
        cb.on_document_start(total_pages, requests.len());
    }
    info!(chunks = requests.len(), workers, "dispatching chunks");

    let started = Instant::now();
    let mut pending = stream::iter(
        requests
            .into_iter()
            .map(|request| run_chunk(&pool, request, callback, total_pages)),
    )
    .buffer_unordered(workers);

    let mut results = Vec::with_capacity(prepared.chunks.len());
    let cancelled = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break true,
            next = pending.next() => match next {
                Some(result) => results.push(result),
                None => break false,
            },
        }
    };
    // dropping in-flight futures kills their workers
    drop(pending);

    if cancelled {
        warn!(completed = results.len(), "conversion cancelled, discarding results");
        return Err(PdfStructError::Cancelled);
    }
    pool.shutdown().await;
    Ok((results, started.elapsed().as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerLaunch;
    use crate::pipeline::worker::WorkerReply;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn batch_targets_keep_relative_directories() {
        let root = Path::new("/in");
        assert_eq!(
            batch_target(root, Path::new("/in/report.pdf"), Path::new("/out")),
            PathBuf::from("/out/report/report.md")
        );
        assert_eq!(
            batch_target(root, Path::new("/in/2024/q1.pdf"), Path::new("/out")),
            PathBuf::from("/out/2024/q1/q1.md")
        );
    }

    #[tokio::test]
    async fn missing_input_is_fatal() {
        let err = convert("/no/such/file.pdf", &ConversionConfig::default()).await.unwrap_err();
        assert!(matches!(err, PdfStructError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello world").unwrap();
        let err = inspect(&path).await.unwrap_err();
        assert!(matches!(err, PdfStructError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn batch_records_failures_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"not really").unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"nor this").unwrap();
        let out = tempfile::tempdir().unwrap();
        let report = convert_batch(dir.path(), out.path(), &ConversionConfig::default())
            .await
            .unwrap();
        assert!(report.converted.is_empty());
        assert_eq!(report.failed.len(), 2);
    }

    #[tokio::test]
    async fn output_is_written_with_assets() {
        let out = tempfile::tempdir().unwrap();
        let output = ConversionOutput {
            markdown: "# Title\n".into(),
            chunks: vec![],
            images: vec![crate::output::ImageAsset {
                relative_path: "images/img_p1_1.png".into(),
                png: vec![1, 2, 3],
            }],
            metadata: DocumentMetadata::default(),
            stats: ConversionStats::default(),
        };
        let target = out.path().join("doc").join("doc.md");
        write_output(&output, &target).await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "# Title\n");
        assert_eq!(std::fs::read(out.path().join("doc/images/img_p1_1.png")).unwrap(), vec![1, 2, 3]);
        assert!(!target.with_extension("md.tmp").exists());
    }

    struct CancelOnFirstChunk {
        token: CancellationToken,
        completed: AtomicUsize,
        finished: AtomicUsize,
    }

    impl crate::progress::ConversionProgressCallback for CancelOnFirstChunk {
        fn on_chunk_complete(&self, _s: usize, _e: usize, _t: usize, _len: usize) {
            self.completed.fetch_add(1, Ordering::SeqCst);
            self.token.cancel();
        }

        fn on_document_complete(&self, _total_pages: usize, _failed_chunks: usize) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn prepared_with_chunk_files(temp_dir: &Path, pages: usize, config: &ConversionConfig) -> Prepared {
        let doc_token = loader::document_token();
        let chunks = (1..=pages)
            .map(|page| {
                let temp_path = temp_dir.join(loader::chunk_file_name(&doc_token));
                std::fs::write(&temp_path, b"%PDF-1.7\n").unwrap();
                Chunk {
                    source: temp_dir.join("source.pdf"),
                    start_page: page,
                    end_page: page,
                    temp_path,
                }
            })
            .collect();
        Prepared {
            metadata: DocumentMetadata {
                page_count: pages,
                ..DocumentMetadata::default()
            },
            settings: config.extraction_settings(ValidatedWatermarkSet::empty()),
            chunks,
            temp_dir: temp_dir.to_path_buf(),
            doc_token,
            asset_dir: None,
            split_ms: 0,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_discards_output_kills_workers_and_sweeps() {
        let temp = tempfile::tempdir().unwrap();
        let other_run = temp.path().join(loader::chunk_file_name(&loader::document_token()));
        std::fs::write(&other_run, b"%PDF-1.7\n").unwrap();

        // answers the page 1 chunk, then hangs like a stuck worker
        let reply = WorkerReply {
            start_page: 1,
            end_page: 1,
            result: Ok(Vec::new()),
        };
        let script = format!(
            "read line; case \"$line\" in *'\"start_page\":1,'*) printf '%s\\n' '{}';; esac; exec sleep 30",
            serde_json::to_string(&reply).unwrap()
        );

        let token = CancellationToken::new();
        let callback = Arc::new(CancelOnFirstChunk {
            token: token.clone(),
            completed: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });
        let config = ConversionConfig::builder()
            .temp_root(temp.path())
            .workers(4)
            .worker_launch(WorkerLaunch::Process {
                program: PathBuf::from("sh"),
                args: vec!["-c".into(), script],
            })
            .progress_callback(callback.clone())
            .build()
            .unwrap();
        let prepared = prepared_with_chunk_files(temp.path(), 4, &config);
        let doc_prefix = loader::document_prefix(&prepared.doc_token);

        let outcome = tokio::time::timeout(
            Duration::from_secs(20),
            run_prepared(prepared, &config, &token, Instant::now()),
        )
        .await
        .expect("cancellation must not wait for hung workers");

        assert!(matches!(outcome, Err(PdfStructError::Cancelled)), "{outcome:?}");
        assert_eq!(callback.completed.load(Ordering::SeqCst), 1);
        assert_eq!(callback.finished.load(Ordering::SeqCst), 0, "no document output on cancel");

        let left: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(&doc_prefix))
            .collect();
        assert!(left.is_empty(), "chunk files left behind: {left:?}");
        assert!(other_run.exists(), "another run's chunk file was swept");
    }

    #[tokio::test]
    async fn cancelled_before_dispatch_still_sweeps() {
        let temp = tempfile::tempdir().unwrap();
        let config = ConversionConfig::builder()
            .temp_root(temp.path())
            .worker_launch(WorkerLaunch::InProcess)
            .build()
            .unwrap();
        let prepared = prepared_with_chunk_files(temp.path(), 3, &config);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = run_prepared(prepared, &config, &token, Instant::now()).await;
        assert!(matches!(outcome, Err(PdfStructError::Cancelled)));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}

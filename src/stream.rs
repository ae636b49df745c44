//! Streaming conversion API: emit chunk results as they complete.
//!
//! Unlike the eager [`crate::convert::convert`], which returns only after
//! every chunk finishes, [`convert_stream`] yields each [`ChunkResult`] as
//! soon as its worker replies. Results arrive in completion order; sort by
//! `start_page` (or hand them to [`crate::output::reassemble`]) when order
//! matters.
//!
//! The returned [`ChunkStream`] owns the document's temp storage.
//! [`ChunkStream::finish`] kills any busy worker and sweeps the document's
//! temp files before returning. Dropping the stream does the same, with the
//! sweep handed to the blocking pool when a tokio runtime is running. Staged
//! images must be read with [`ChunkStream::images`] before either.

use crate::config::{max_workers, ConversionConfig};
use crate::convert::{prepare, run_chunk};
use crate::error::PdfStructError;
use crate::output::{ChunkResult, DocumentMetadata, ImageAsset};
use crate::pipeline::pool::WorkerPool;
use crate::pipeline::{cleanup, images};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_stream::Stream;
use tracing::{debug, info};

const SWEEP_ATTEMPTS: u32 = 2;
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Removes a document's temp files when dropped, unless disarmed.
struct DocumentGuard {
    temp_dir: PathBuf,
    doc_token: String,
    armed: bool,
}

impl DocumentGuard {
    async fn sweep_now(&mut self) -> cleanup::SweepReport {
        self.armed = false;
        cleanup::sweep_document_async(self.temp_dir.clone(), self.doc_token.clone(), SWEEP_ATTEMPTS, SWEEP_INTERVAL)
            .await
    }
}

impl Drop for DocumentGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let temp_dir = std::mem::take(&mut self.temp_dir);
        let doc_token = std::mem::take(&mut self.doc_token);
        let sweep = move || {
            let report = cleanup::sweep_document(&temp_dir, &doc_token, SWEEP_ATTEMPTS, SWEEP_INTERVAL);
            debug!(removed = report.removed, clean = report.is_clean(), "stream temp storage swept");
        };
        // the retry loop sleeps, so keep it off runtime worker threads
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(sweep);
            }
            Err(_) => sweep(),
        }
    }
}

/// Chunk results of one document in completion order.
pub struct ChunkStream {
    inner: Pin<Box<dyn Stream<Item = ChunkResult> + Send>>,
    metadata: DocumentMetadata,
    total_chunks: usize,
    asset_dir: Option<PathBuf>,
    // dropped last
    _guard: DocumentGuard,
}

impl ChunkStream {
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// Number of results the stream will yield.
    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    /// Images staged so far. Complete once the stream is exhausted.
    pub fn images(&self) -> Result<Vec<ImageAsset>, PdfStructError> {
        match &self.asset_dir {
            Some(dir) => images::collect(dir),
            None => Ok(Vec::new()),
        }
    }

    /// Stop the stream: kill busy workers and sweep the document's temp
    /// files before returning. Pending results are discarded.
    pub async fn finish(mut self) -> cleanup::SweepReport {
        // dropping the inner stream drops the pool and kills its workers
        self.inner = Box::pin(stream::empty::<ChunkResult>());
        let report = self._guard.sweep_now().await;
        debug!(removed = report.removed, clean = report.is_clean(), "stream finished");
        report
    }
}

impl Stream for ChunkStream {
    type Item = ChunkResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChunkResult>> {
        self.inner.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Convert a PDF, streaming chunk results as they are ready.
///
/// # Returns
/// - `Ok(ChunkStream)` once the document is validated and split
/// - `Err(PdfStructError)` for the same fatal errors as [`crate::convert::convert`]
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfstruct::{convert_stream, ConversionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::default();
/// let mut stream = convert_stream("report.pdf", &config).await?;
/// while let Some(chunk) = stream.next().await {
///     println!("pages {}-{}: ok={}", chunk.start_page, chunk.end_page, chunk.is_ok());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert_stream(input: impl AsRef<Path>, config: &ConversionConfig) -> Result<ChunkStream, PdfStructError> {
    let path = input.as_ref();
    info!(path = %path.display(), "starting streaming structure recovery");

    let prepared = prepare(path, config).await?;
    let guard = DocumentGuard {
        temp_dir: prepared.temp_dir.clone(),
        doc_token: prepared.doc_token.clone(),
        armed: true,
    };
    let pool = Arc::new(WorkerPool::new(&config.worker_launch)?);
    let workers = config.workers.clamp(1, max_workers());
    let total_pages = prepared.metadata.page_count;
    let requests = prepared.requests();
    let callback = config.progress_callback.clone();
    if let Some(cb) = &callback {
        cb.on_document_start(total_pages, requests.len());
    }

    let total_chunks = requests.len();
    let inner = stream::iter(requests)
        .map(move |request| {
            let pool = Arc::clone(&pool);
            let callback = callback.clone();
            async move { run_chunk(&pool, request, callback.as_ref(), total_pages).await }
        })
        .buffer_unordered(workers);

    Ok(ChunkStream {
        inner: Box::pin(inner),
        metadata: prepared.metadata,
        total_chunks,
        asset_dir: prepared.asset_dir,
        _guard: guard,
    })
}

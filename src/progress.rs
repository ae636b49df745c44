//! Progress-callback trait for document and chunk lifecycle events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the supervisor dispatches chunks to workers.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, or a terminal
//! progress bar without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because chunk events fire from
//! whichever pool task collected the reply.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfstruct::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     pages: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, start: usize, end: usize, _total: usize, _len: usize) {
//!         self.pages.fetch_add(end - start + 1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { pages: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the supervisor as a document moves through its chunks.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Chunk events arrive in completion order, which is
/// not page order.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once per document after splitting, before any chunk is dispatched.
    fn on_document_start(&self, total_pages: usize, total_chunks: usize) {
        let _ = (total_pages, total_chunks);
    }

    /// Called when a chunk is handed to a worker.
    ///
    /// # Arguments
    /// * `start_page`, `end_page`: 1-indexed inclusive page range
    /// * `total_pages`: pages in the document
    fn on_chunk_start(&self, start_page: usize, end_page: usize, total_pages: usize) {
        let _ = (start_page, end_page, total_pages);
    }

    /// Called when a chunk's Markdown has been collected.
    ///
    /// `markdown_len` is the byte length of the chunk's fragment.
    fn on_chunk_complete(&self, start_page: usize, end_page: usize, total_pages: usize, markdown_len: usize) {
        let _ = (start_page, end_page, total_pages, markdown_len);
    }

    /// Called when a chunk failed and an error marker replaces its pages.
    fn on_chunk_error(&self, start_page: usize, end_page: usize, total_pages: usize, error: &str) {
        let _ = (start_page, end_page, total_pages, error);
    }

    /// Called once after every chunk has been collected and reassembled.
    fn on_document_complete(&self, total_pages: usize, failed_chunks: usize) {
        let _ = (total_pages, failed_chunks);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        chunks: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        failed_total: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_document_start(&self, _total_pages: usize, total_chunks: usize) {
            self.chunks.store(total_chunks, Ordering::SeqCst);
        }

        fn on_chunk_start(&self, _s: usize, _e: usize, _t: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_complete(&self, _s: usize, _e: usize, _t: usize, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_error(&self, _s: usize, _e: usize, _t: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _total_pages: usize, failed_chunks: usize) {
            self.failed_total.store(failed_chunks, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_document_start(5, 3);
        cb.on_chunk_start(1, 2, 5);
        cb.on_chunk_complete(1, 2, 5, 42);
        cb.on_chunk_error(3, 4, 5, "worker exited");
        cb.on_document_complete(5, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_document_start(6, 3);
        for (s, e) in [(1, 2), (3, 4), (5, 6)] {
            tracker.on_chunk_start(s, e, 6);
        }
        tracker.on_chunk_complete(3, 4, 6, 100);
        tracker.on_chunk_complete(1, 2, 6, 80);
        tracker.on_chunk_error(5, 6, 6, "worker exited");
        tracker.on_document_complete(6, 1);

        assert_eq!(tracker.chunks.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.failed_total.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_document_start(10, 5);
        cb.on_chunk_complete(1, 2, 10, 512);
    }
}

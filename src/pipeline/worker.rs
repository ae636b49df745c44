//! Worker side of the chunk protocol.
//!
//! A worker is this same executable started with [`WORKER_ENV`] set. It
//! reads one JSON [`ChunkRequest`] per line from stdin and answers each with
//! one JSON [`WorkerReply`] line on stdout, until stdin closes. Logs go to
//! stderr, which the supervisor inherits.
//!
//! [`process_chunk`] is also what [`crate::config::WorkerLaunch::InProcess`]
//! runs on the blocking pool, so both launch modes share one code path.

use crate::config::ExtractionSettings;
use crate::error::ChunkError;
use crate::output::PageFragment;
use crate::pipeline::cleanup::TempFileGuard;
use crate::pipeline::extract::PdfiumPage;
use crate::pipeline::images::AssetSink;
use crate::pipeline::page::{process_page, PageContext};
use crate::pipeline::pdfium;
use crate::pipeline::stages::StageSet;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Environment variable that switches the executable into worker mode.
pub const WORKER_ENV: &str = "PDFSTRUCT_WORKER";

/// One chunk to process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub chunk_path: PathBuf,
    /// Source-document page number of the chunk's first page.
    pub start_page: usize,
    pub end_page: usize,
    pub settings: ExtractionSettings,
    /// Where PNG assets are staged; `None` when no stage writes assets.
    pub asset_dir: Option<PathBuf>,
}

/// The answer to one [`ChunkRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub start_page: usize,
    pub end_page: usize,
    pub result: Result<Vec<PageFragment>, ChunkError>,
}

/// Serve the chunk protocol and exit if this process was started as a worker.
///
/// Call first thing in `main`, after installing the tracing subscriber.
/// Returns immediately in a normal process.
pub fn run_worker_if_requested() {
    if std::env::var_os(WORKER_ENV).is_none() {
        return;
    }
    let code = match serve(io::stdin().lock(), io::stdout().lock()) {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "worker I/O failed");
            1
        }
    };
    std::process::exit(code);
}

/// Answer requests from `input` on `output` until `input` is exhausted.
pub fn serve<R: BufRead, W: Write>(input: R, mut output: W) -> io::Result<()> {
    info!(pid = std::process::id(), "worker ready");
    let mut cache: Option<StageSet> = None;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<ChunkRequest>(&line) {
            Ok(request) => handle(&request, &mut cache),
            Err(e) => {
                warn!(error = %e, "unreadable chunk request");
                WorkerReply {
                    start_page: 0,
                    end_page: 0,
                    result: Err(ChunkError::Protocol {
                        detail: format!("bad request: {e}"),
                    }),
                }
            }
        };
        serde_json::to_writer(&mut output, &reply)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }
    debug!("worker input closed");
    Ok(())
}

/// Process one request, reusing `cache` while the settings stay the same.
pub fn handle(request: &ChunkRequest, cache: &mut Option<StageSet>) -> WorkerReply {
    let stale = cache
        .as_ref()
        .is_none_or(|s| s.settings() != &request.settings);
    if stale {
        match StageSet::from_settings(&request.settings) {
            Ok(stages) => *cache = Some(stages),
            Err(e) => {
                return WorkerReply {
                    start_page: request.start_page,
                    end_page: request.end_page,
                    result: Err(ChunkError::Protocol {
                        detail: format!("invalid settings: {e}"),
                    }),
                }
            }
        }
    }
    let result = match cache.as_ref() {
        Some(stages) => process_chunk(request, stages),
        None => Err(ChunkError::Protocol {
            detail: "no stage set".into(),
        }),
    };
    WorkerReply {
        start_page: request.start_page,
        end_page: request.end_page,
        result,
    }
}

/// Run every page of a chunk sub-document through the engine.
///
/// The chunk file is deleted when this returns, whatever the outcome.
pub fn process_chunk(request: &ChunkRequest, stages: &StageSet) -> Result<Vec<PageFragment>, ChunkError> {
    // declared first so it drops after the document handle
    let _guard = TempFileGuard::new(&request.chunk_path);
    let open_failed = |detail: String| ChunkError::OpenFailed {
        path: request.chunk_path.clone(),
        detail,
    };

    let pdfium = pdfium::shared().map_err(|e| open_failed(e.to_string()))?;
    let document = pdfium::open(pdfium, &request.chunk_path, stages.settings().password.as_deref())
        .map_err(|e| open_failed(e.to_string()))?;

    let expected = request.end_page + 1 - request.start_page;
    let pages = document.pages();
    if pages.len() as usize != expected {
        warn!(
            chunk = %request.chunk_path.display(),
            expected,
            actual = pages.len(),
            "chunk page count differs from its range"
        );
    }

    let sink = request.asset_dir.as_ref().map(AssetSink::new);
    let mut fragments = Vec::with_capacity(expected);
    for (index, page) in pages.iter().enumerate() {
        let number = request.start_page + index;
        let source = PdfiumPage::load(page, number).map_err(|e| ChunkError::ExtractionFailed {
            page: number,
            detail: format!("{e:?}"),
        })?;
        let ctx = PageContext {
            chunk_path: &request.chunk_path,
            page_in_chunk: index + 1,
            assets: sink.as_ref(),
        };
        fragments.push(process_page(&source, &ctx, stages));
    }
    debug!(
        start = request.start_page,
        end = request.end_page,
        pages = fragments.len(),
        "chunk processed"
    );
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrMode;

    fn request(path: PathBuf) -> ChunkRequest {
        let mut settings = ExtractionSettings::default();
        settings.ocr.mode = OcrMode::Off;
        ChunkRequest {
            chunk_path: path,
            start_page: 3,
            end_page: 4,
            settings,
            asset_dir: None,
        }
    }

    #[test]
    fn unreadable_chunk_fails_and_is_still_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pdfstruct_t_c.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let mut cache = None;
        let reply = handle(&request(path.clone()), &mut cache);
        assert_eq!((reply.start_page, reply.end_page), (3, 4));
        assert!(matches!(reply.result, Err(ChunkError::OpenFailed { .. })));
        assert!(!path.exists());
        assert!(cache.is_some());
    }

    #[test]
    fn serve_answers_each_line_and_reports_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path().join("missing.pdf"));
        let input = format!("{}\n\nnot json\n", serde_json::to_string(&req).unwrap());

        let mut out = Vec::new();
        serve(input.as_bytes(), &mut out).unwrap();
        let replies: Vec<WorkerReply> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].start_page, 3);
        assert!(replies[0].result.is_err());
        assert!(matches!(replies[1].result, Err(ChunkError::Protocol { .. })));
    }

    #[test]
    fn invalid_settings_are_reported_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(dir.path().join("x.pdf"));
        req.settings.cleaning.regex_blacklist = vec!["(".into()];
        let reply = handle(&req, &mut None);
        assert!(matches!(reply.result, Err(ChunkError::Protocol { .. })));
    }

    #[test]
    fn reply_round_trips_through_json() {
        let reply = WorkerReply {
            start_page: 1,
            end_page: 2,
            result: Ok(vec![PageFragment {
                page: 1,
                markdown: "| a | b |\n".into(),
                tables: 1,
                ..PageFragment::default()
            }]),
        };
        let line = serde_json::to_string(&reply).unwrap();
        assert_eq!(serde_json::from_str::<WorkerReply>(&line).unwrap(), reply);
    }
}

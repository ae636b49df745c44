//! Integration tests for the structure-recovery pipeline.
//!
//! Pages are built from hand-placed glyphs and vector segments, so nothing
//! here needs the pdfium shared library. Worker-process tests use `sh` as a
//! stand-in worker speaking the line protocol.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use edgequake_pdfstruct::layout::{BoundingBox, Glyph, PagePrimitives, Segment};
use edgequake_pdfstruct::output::reassemble;
use edgequake_pdfstruct::pipeline::ocr::{OcrEngine, OcrPage};
use edgequake_pdfstruct::pipeline::pool::WorkerPool;
use edgequake_pdfstruct::pipeline::worker::{serve, ChunkRequest, WorkerReply};
use edgequake_pdfstruct::pipeline::{cleanup, loader};
use edgequake_pdfstruct::{
    convert, convert_batch, process_page, ChunkError, ChunkResult, ConversionConfig, ConversionStats,
    ExtractionSettings, MemoryPage, OcrMode, PageContext, PageSeparator, PdfStructError, StageSet,
    ValidatedWatermarkSet, WorkerLaunch,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Page builders ────────────────────────────────────────────────────────────

/// Glyphs for `text`, one per char, `advance` points apart.
fn glyph_run(text: &str, x: f64, y: f64, size: f64, advance: f64) -> Vec<Glyph> {
    text.chars()
        .enumerate()
        .map(|(i, c)| {
            let x0 = x + i as f64 * advance;
            Glyph::new(c.to_string(), BoundingBox::new(x0, y, x0 + advance * 0.9, y + size), size)
        })
        .collect()
}

/// Words of `text` on one line starting at (50, y).
fn write_line(page: &mut PagePrimitives, text: &str, y: f64, size: f64) {
    let advance = size / 2.0;
    let mut x = 50.0;
    for word in text.split(' ') {
        page.glyphs.extend(glyph_run(word, x, y, size, advance));
        x += word.chars().count() as f64 * advance + size;
    }
}

/// A 3×3 bordered table of `cell(r, c)` labels at (50, 100), 80×30 cells.
fn bordered_table(page: &mut PagePrimitives, cell: impl Fn(usize, usize) -> String) {
    for r in 0..=3 {
        let y = 100.0 + r as f64 * 30.0;
        page.segments.push(Segment::new(50.0, y, 290.0, y, 1.0));
    }
    for c in 0..=3 {
        let x = 50.0 + c as f64 * 80.0;
        page.segments.push(Segment::new(x, 100.0, x, 190.0, 1.0));
    }
    for r in 0..3 {
        for c in 0..3 {
            let x = 55.0 + c as f64 * 80.0;
            let y = 110.0 + r as f64 * 30.0;
            page.glyphs.extend(glyph_run(&cell(r, c), x, y, 10.0, 6.0));
        }
    }
}

fn ctx() -> PageContext<'static> {
    PageContext {
        chunk_path: Path::new("chunk.pdf"),
        page_in_chunk: 1,
        assets: None,
    }
}

/// OCR stand-in that records how often it was asked.
struct ScriptedOcr {
    text: &'static str,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    fn new(text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            text,
            calls: AtomicUsize::new(0),
        })
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, _page: &OcrPage<'_>) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.to_string())
    }
}

fn ok_chunk(start: usize, end: usize, pages: Vec<edgequake_pdfstruct::PageFragment>) -> ChunkResult {
    ChunkResult {
        start_page: start,
        end_page: end,
        pages,
        error: None,
        duration_ms: 1,
    }
}

// ── Synthetic documents ──────────────────────────────────────────────────────

#[test]
fn table_page_and_scanned_page_reassemble_in_order() {
    let ocr = ScriptedOcr::new("Scanned letter body");
    let stages = StageSet::from_settings(&ExtractionSettings::default())
        .unwrap()
        .with_ocr_engine(ocr.clone());

    let mut first = PagePrimitives::new(600.0, 800.0);
    write_line(&mut first, "Annual Report", 40.0, 22.0);
    bordered_table(&mut first, |r, c| format!("r{r}c{c}"));
    write_line(&mut first, "Figures are unaudited and may change", 300.0, 10.0);
    let page1 = process_page(&MemoryPage::new(1, first), &ctx(), &stages);

    let page2 = process_page(&MemoryPage::new(2, PagePrimitives::new(600.0, 800.0)), &ctx(), &stages);

    assert_eq!(page1.tables, 1);
    assert!(!page1.ocr_used, "claimed regions keep auto OCR off");
    assert!(page1.markdown.contains("# Annual Report"));
    assert!(page1.markdown.contains("| r0c0 | r0c1 | r0c2 |"));
    assert!(page2.ocr_used);
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);

    // completion order is not page order
    let crashed = ChunkResult::failed(
        3,
        4,
        ChunkError::WorkerExited {
            status: "signal: 9".into(),
        },
        5,
    );
    let chunks = vec![crashed, ok_chunk(2, 2, vec![page2]), ok_chunk(1, 1, vec![page1])];
    let (markdown, sorted) = reassemble(chunks, &PageSeparator::HorizontalRule);

    let table_at = markdown.find("| r0c0").unwrap();
    let ocr_at = markdown.find("Scanned letter body").unwrap();
    let error_at = markdown.find("[ERROR: Failed to process pages 3-4:").unwrap();
    assert!(table_at < ocr_at && ocr_at < error_at);
    assert_eq!(markdown.matches("\n\n---\n\n").count(), 2);
    assert!(markdown.ends_with('\n'));

    let mut stats = ConversionStats::default();
    stats.absorb(&sorted);
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.failed_chunks, 1);
    assert_eq!(stats.failed_pages, 2);
    assert_eq!(stats.tables, 1);
    assert_eq!(stats.ocr_pages, 1);
}

#[test]
fn validated_watermark_lines_are_removed() {
    let mut settings = ExtractionSettings::default();
    settings.ocr.mode = OcrMode::Off;
    settings.watermarks = ValidatedWatermarkSet::new(vec!["CONFIDENTIAL".to_string()]);
    let stages = StageSet::from_settings(&settings).unwrap();

    let mut page = PagePrimitives::new(600.0, 800.0);
    write_line(&mut page, "Meeting notes for the planning committee", 100.0, 10.0);
    write_line(&mut page, "CONFIDENTIAL", 700.0, 10.0);
    let fragment = process_page(&MemoryPage::new(1, page), &ctx(), &stages);

    assert!(fragment.markdown.contains("Meeting notes for the planning committee"));
    assert!(!fragment.markdown.contains("CONFIDENTIAL"));
}

#[test]
fn ocr_off_never_calls_the_engine() {
    let ocr = ScriptedOcr::new("should not appear");
    let mut settings = ExtractionSettings::default();
    settings.ocr.mode = OcrMode::Off;
    let stages = StageSet::from_settings(&settings).unwrap().with_ocr_engine(ocr.clone());

    let fragment = process_page(&MemoryPage::new(1, PagePrimitives::new(600.0, 800.0)), &ctx(), &stages);
    assert!(!fragment.ocr_used);
    assert!(fragment.markdown.is_empty());
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
}

// ── Worker protocol ──────────────────────────────────────────────────────────

fn request(chunk_path: PathBuf, start: usize, end: usize) -> ChunkRequest {
    let mut settings = ExtractionSettings::default();
    settings.ocr.mode = OcrMode::Off;
    ChunkRequest {
        chunk_path,
        start_page: start,
        end_page: end,
        settings,
        asset_dir: None,
    }
}

#[test]
fn worker_answers_every_line_and_deletes_chunk_files() {
    let dir = tempfile::tempdir().unwrap();
    let chunk = dir.path().join(loader::chunk_file_name("doc"));
    std::fs::write(&chunk, b"truncated").unwrap();

    let mut input = serde_json::to_string(&request(chunk.clone(), 1, 2)).unwrap();
    input.push_str("\n\nnot json\n");
    let mut output = Vec::new();
    serve(input.as_bytes(), &mut output).unwrap();

    let replies: Vec<WorkerReply> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(replies.len(), 2, "blank lines are skipped");
    assert_eq!((replies[0].start_page, replies[0].end_page), (1, 2));
    assert!(matches!(replies[0].result, Err(ChunkError::OpenFailed { .. })));
    assert!(matches!(replies[1].result, Err(ChunkError::Protocol { .. })));
    assert!(!chunk.exists());
}

#[tokio::test]
async fn in_process_pool_processes_chunks_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(WorkerPool::new(&WorkerLaunch::InProcess).unwrap());

    let runs = (0..4).map(|i| {
        let pool = Arc::clone(&pool);
        let path = dir.path().join(format!("pdfstruct_doc_{i}.pdf"));
        std::fs::write(&path, b"junk").unwrap();
        async move { pool.run(request(path, i * 2 + 1, i * 2 + 2)).await }
    });
    let results = futures::future::join_all(runs).await;

    assert_eq!(results.len(), 4);
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.start_page, i * 2 + 1);
        assert!(!r.is_ok());
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0, "every chunk file removed");
}

#[cfg(unix)]
#[tokio::test]
async fn crashed_worker_is_replaced_for_the_next_chunk() {
    let dir = tempfile::tempdir().unwrap();
    // first launch dies, every later launch answers
    let marker = dir.path().join("launched");
    let reply = WorkerReply {
        start_page: 1,
        end_page: 2,
        result: Ok(Vec::new()),
    };
    let script = format!(
        "if [ ! -e '{m}' ]; then touch '{m}'; exit 1; fi; while read line; do printf '%s\\n' '{r}'; done",
        m = marker.display(),
        r = serde_json::to_string(&reply).unwrap(),
    );
    let pool = WorkerPool::new(&WorkerLaunch::Process {
        program: PathBuf::from("sh"),
        args: vec!["-c".into(), script],
    })
    .unwrap();

    let first = pool.run(request(dir.path().join("a.pdf"), 1, 2)).await;
    assert!(matches!(first.error, Some(ChunkError::WorkerExited { .. })));
    assert_eq!(pool.idle_workers(), 0);

    let second = pool.run(request(dir.path().join("b.pdf"), 1, 2)).await;
    assert!(second.is_ok(), "{:?}", second.error);
    assert_eq!(pool.idle_workers(), 1);
    pool.shutdown().await;
}

#[cfg(unix)]
#[tokio::test]
async fn mismatched_reply_range_is_a_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let reply = WorkerReply {
        start_page: 7,
        end_page: 8,
        result: Ok(Vec::new()),
    };
    let script = format!(
        "read line; printf '%s\\n' '{}'",
        serde_json::to_string(&reply).unwrap()
    );
    let pool = WorkerPool::new(&WorkerLaunch::Process {
        program: PathBuf::from("sh"),
        args: vec!["-c".into(), script],
    })
    .unwrap();
    let result = pool.run(request(dir.path().join("a.pdf"), 1, 2)).await;
    assert!(matches!(result.error, Some(ChunkError::Protocol { .. })));
}

// ── Temp lifecycle ───────────────────────────────────────────────────────────

#[test]
fn document_sweep_leaves_other_runs_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mine = loader::document_token();
    let theirs = loader::document_token();
    let a = dir.path().join(loader::chunk_file_name(&mine));
    let b = dir.path().join(loader::chunk_file_name(&mine));
    let c = dir.path().join(loader::chunk_file_name(&theirs));
    for p in [&a, &b, &c] {
        std::fs::write(p, b"x").unwrap();
    }

    let report = cleanup::sweep_document(dir.path(), &mine, 3, Duration::from_millis(10));
    assert!(report.is_clean());
    assert_eq!(report.removed, 2);
    assert!(!a.exists() && !b.exists());
    assert!(c.exists());
}

#[test]
fn chunk_guard_removes_file_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunk.pdf");
    std::fs::write(&path, b"x").unwrap();
    {
        let guard = cleanup::TempFileGuard::new(&path);
        assert_eq!(guard.path(), path.as_path());
    }
    assert!(!path.exists());
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_pdf_input_is_fatal_and_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let temp = dir.path().join("tmp");
    std::fs::create_dir(&temp).unwrap();
    let input = dir.path().join("photo.pdf");
    std::fs::write(&input, b"GIF89a-not-a-pdf").unwrap();

    let config = ConversionConfig::builder()
        .worker_launch(WorkerLaunch::InProcess)
        .temp_root(&temp)
        .build()
        .unwrap();
    let err = convert(&input, &config).await.unwrap_err();
    assert!(matches!(err, PdfStructError::NotAPdf { .. }), "{err}");
    assert!(!err.is_cancelled());
    let leftovers = std::fs::read_dir(&temp).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn batch_records_bad_documents_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir_all(input.join("nested")).unwrap();
    std::fs::write(input.join("one.pdf"), b"plain text").unwrap();
    std::fs::write(input.join("nested/two.pdf"), b"more text").unwrap();

    let config = ConversionConfig::builder()
        .worker_launch(WorkerLaunch::InProcess)
        .recursive(true)
        .build()
        .unwrap();
    let report = convert_batch(&input, dir.path().join("out"), &config).await.unwrap();

    assert!(report.converted.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().all(|(_, e)| e.contains("not a valid PDF")));
}

#[tokio::test]
async fn batch_over_an_empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = convert_batch(dir.path(), dir.path().join("out"), &ConversionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PdfStructError::NoDocuments { .. }));
}

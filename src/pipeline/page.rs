//! The per-page engine: primitives in, one Markdown fragment out.
//!
//! ## Stages
//!
//! ```text
//! PageSource ─▶ analyze ─▶ detect regions ─▶ tables ─┬─▶ legacy fallback
//!                          (numeric filter)  charts ─┘
//!            ─▶ body text (masked by claimed regions) or OCR text
//!            ─▶ cleaner
//!            ─▶ assemble: charts, images, tables, text
//! ```
//!
//! Everything here is synchronous and runs inside one worker. A page never
//! fails: every stage degrades to "emit less" and logs at `debug` or `warn`.

use crate::config::OcrMode;
use crate::layout::{self, analyzer, markdown, regions, structure, text, BoundingBox, PagePrimitives, Region};
use crate::output::PageFragment;
use crate::pipeline::images::{self, AssetSink};
use crate::pipeline::legacy::validate_table;
use crate::pipeline::ocr::{needs_ocr, OcrPage};
use crate::pipeline::stages::StageSet;
use image::DynamicImage;
use std::path::Path;
use tracing::{debug, warn};

/// Everything the page engine needs from one page of a document.
pub trait PageSource {
    /// 1-indexed page number in the source document.
    fn page_number(&self) -> usize;

    fn primitives(&self) -> &PagePrimitives;

    /// The page's extracted text as the backend reports it.
    fn text(&self) -> String {
        self.primitives().raw_text()
    }

    /// Raster images embedded in the page.
    fn embedded_images(&self) -> Vec<DynamicImage> {
        Vec::new()
    }

    /// Rasterise the whole page at `dpi`.
    fn render(&self, dpi: u32) -> Result<DynamicImage, String>;
}

/// A page held entirely in memory.
///
/// Lets callers run the engine on primitives from another backend, and is
/// what the tests use.
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    pub number: usize,
    pub primitives: PagePrimitives,
    pub text: Option<String>,
    pub images: Vec<DynamicImage>,
    pub raster: Option<DynamicImage>,
}

impl MemoryPage {
    pub fn new(number: usize, primitives: PagePrimitives) -> Self {
        Self {
            number,
            primitives,
            ..Self::default()
        }
    }

    /// Report `text` as the extracted text instead of the glyph stream.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, image: DynamicImage) -> Self {
        self.images.push(image);
        self
    }

    /// Raster returned by [`PageSource::render`], whatever DPI is asked for.
    pub fn with_raster(mut self, raster: DynamicImage) -> Self {
        self.raster = Some(raster);
        self
    }
}

impl PageSource for MemoryPage {
    fn page_number(&self) -> usize {
        self.number
    }

    fn primitives(&self) -> &PagePrimitives {
        &self.primitives
    }

    fn text(&self) -> String {
        self.text.clone().unwrap_or_else(|| self.primitives.raw_text())
    }

    fn embedded_images(&self) -> Vec<DynamicImage> {
        self.images.clone()
    }

    fn render(&self, _dpi: u32) -> Result<DynamicImage, String> {
        self.raster
            .clone()
            .ok_or_else(|| format!("page {} has no raster", self.number))
    }
}

/// Where the page lives and where its assets go.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// The chunk sub-document, handed to the OCR engine.
    pub chunk_path: &'a Path,
    /// 1-indexed page number within `chunk_path`.
    pub page_in_chunk: usize,
    /// Staging directory for PNG assets; `None` disables asset output.
    pub assets: Option<&'a AssetSink>,
}

/// Run the full engine on one page.
pub fn process_page(source: &dyn PageSource, ctx: &PageContext<'_>, stages: &StageSet) -> PageFragment {
    let number = source.page_number();
    let page = source.primitives();
    let tuning = stages.tuning();
    let healer = stages.healer();
    let extracted = source.text();
    let lang = healer.detect_language(&extracted);

    let mut fragment = PageFragment {
        page: number,
        ..PageFragment::default()
    };
    let mut claimed: Vec<BoundingBox> = Vec::new();
    let mut chart_blocks = Vec::new();
    let mut table_blocks = Vec::new();

    // ── Regions ──────────────────────────────────────────────────────────
    let analysis = analyzer::analyze(page, tuning);
    let tables = stages.tables();
    let ratio = layout::digit_ratio(&extracted);
    let numeric = ratio > tuning.numeric_skip_ratio;

    let mut found = regions::detect(&analysis, tuning, tables.is_some() && numeric);
    let has_table = found.iter().any(|r| matches!(r, Region::Table(_)));
    if tables.is_some() && !has_table && ratio > tuning.numeric_force_ratio && !analysis.is_chart_dominant(tuning) {
        if let Some(forced) = regions::forced_borderless(&analysis, tuning) {
            debug!(page = number, ratio, "forced borderless pass found a table");
            found.push(Region::Table(forced));
            found = regions::resolve_overlaps(found, tuning.overlap_threshold);
        }
    }

    let mut raster: Option<DynamicImage> = None;
    for region in &found {
        match region {
            Region::Table(table) if tables.is_some() => {
                let matrix = structure::parse(table, &page.glyphs, tuning);
                if matrix.row_count() >= 2 {
                    let matrix = matrix.map_cells(|c| healer.heal_line(c, lang));
                    if let Some(md) = markdown::pipe_table(&matrix) {
                        table_blocks.push(md);
                        fragment.tables += 1;
                        claimed.push(*table.bbox());
                        continue;
                    }
                }
                match structure::raw_lines(table.bbox(), &page.glyphs, tuning) {
                    Some(lines) => {
                        fragment.raw_blocks += 1;
                        table_blocks.push(markdown::raw_block(number, fragment.raw_blocks, &lines));
                        claimed.push(*table.bbox());
                    }
                    None => debug!(page = number, "unparsable table region left to body text"),
                }
            }
            Region::Table(_) => {}
            Region::Chart(chart) => {
                claimed.push(*chart.bbox());
                fragment.charts += 1;
                let Some(dpi) = stages.charts() else {
                    continue;
                };
                let link = ctx.assets.and_then(|sink| {
                    if raster.is_none() {
                        match source.render(dpi) {
                            Ok(r) => raster = Some(r),
                            Err(e) => warn!(page = number, error = %e, "page raster unavailable for chart snapshot"),
                        }
                    }
                    let crop = images::crop_region(raster.as_ref()?, chart.bbox(), page.width, page.height)?;
                    let name = images::chart_snapshot_name(number, fragment.charts);
                    sink.write_image(&name, &crop, 0)
                });
                if link.is_some() {
                    fragment.images += 1;
                }
                chart_blocks.push(markdown::chart_marker(chart.kind(), link.as_deref()));
            }
        }
    }

    // ── Legacy fallback ──────────────────────────────────────────────────
    if let Some(Some(solver)) = tables {
        if fragment.tables == 0 && numeric {
            match solver.solve(page, tuning) {
                Some(legacy) if validate_table(&legacy.matrix) => {
                    let overlaps_claim = claimed.iter().any(|c| c.overlaps(&legacy.bbox, tuning.overlap_threshold));
                    if overlaps_claim {
                        debug!(page = number, "legacy table overlaps a claimed region, dropped");
                    } else {
                        let matrix = legacy.matrix.map_cells(|c| healer.heal_line(c, lang));
                        if let Some(md) = markdown::pipe_table(&matrix) {
                            debug!(page = number, rows = matrix.row_count(), "legacy solver table accepted");
                            table_blocks.push(md);
                            fragment.tables += 1;
                            claimed.push(legacy.bbox);
                        }
                    }
                }
                Some(_) => debug!(page = number, "legacy table failed validation"),
                None => {}
            }
        }
    }

    // ── Body text ────────────────────────────────────────────────────────
    let ocr_text = stages.ocr().and_then(|(engine, mode)| {
        let wanted = match mode {
            OcrMode::On => true,
            OcrMode::Auto => claimed.is_empty() && needs_ocr(&extracted),
            OcrMode::Off => false,
        };
        if !wanted {
            return None;
        }
        let request = OcrPage {
            pdf: ctx.chunk_path,
            page: ctx.page_in_chunk,
            extracted: &extracted,
            source,
        };
        match engine.recognize(&request) {
            Ok(text) if !text.trim().is_empty() && text.trim() != extracted.trim() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!(page = number, error = %e, "OCR failed, keeping extracted text");
                None
            }
        }
    });

    let body = match ocr_text {
        Some(text) => {
            fragment.ocr_used = true;
            stages.cleaner().clean(&healer.heal(&text))
        }
        None => {
            let body = text::extract(page, &claimed, stages.watermarks(), healer, tuning);
            stages.cleaner().clean(&body.to_markdown())
        }
    };

    // ── Images ───────────────────────────────────────────────────────────
    let mut image_blocks = Vec::new();
    if let (Some(min_bytes), Some(sink)) = (stages.images(), ctx.assets) {
        let mut n = 0;
        for img in source.embedded_images() {
            let name = images::embedded_image_name(number, n + 1);
            if let Some(link) = sink.write_image(&name, &img, min_bytes) {
                n += 1;
                image_blocks.push(format!("![Image {number}-{n}]({link})\n"));
            }
        }
        fragment.images += n;
    }

    fragment.markdown = assemble([chart_blocks, image_blocks, table_blocks, vec![body]]);
    debug!(
        page = number,
        tables = fragment.tables,
        charts = fragment.charts,
        images = fragment.images,
        ocr = fragment.ocr_used,
        "page processed"
    );
    fragment
}

fn assemble<const N: usize>(groups: [Vec<String>; N]) -> String {
    let blocks: Vec<String> = groups
        .into_iter()
        .flatten()
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .collect();
    let mut out = blocks.join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractionSettings, OcrMode};
    use crate::layout::reconstruct::tests::glyph_run;
    use crate::layout::{Curve, Segment};
    use crate::pipeline::ocr::OcrEngine;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;

    struct FixedOcr(&'static str);

    impl OcrEngine for FixedOcr {
        fn recognize(&self, _page: &OcrPage<'_>) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingOcr;

    impl OcrEngine for FailingOcr {
        fn recognize(&self, _page: &OcrPage<'_>) -> Result<String, String> {
            Err("engine missing".into())
        }
    }

    fn stages(settings: ExtractionSettings) -> StageSet {
        StageSet::from_settings(&settings).unwrap()
    }

    fn no_ocr() -> ExtractionSettings {
        let mut s = ExtractionSettings::default();
        s.ocr.mode = OcrMode::Off;
        s
    }

    fn ctx<'a>(assets: Option<&'a AssetSink>) -> PageContext<'a> {
        PageContext {
            chunk_path: Path::new("chunk.pdf"),
            page_in_chunk: 1,
            assets,
        }
    }

    /// 3×3 bordered grid at (50, 100) with 80×30 cells and a label in every cell.
    fn grid_page() -> PagePrimitives {
        let mut page = PagePrimitives::new(600.0, 800.0);
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
                let x = 50.0 + c as f64 * 80.0 + 5.0;
                let y = 100.0 + r as f64 * 30.0 + 10.0;
                page.glyphs.extend(glyph_run(&format!("r{r}c{c}"), x, y, 10.0, 6.0));
            }
        }
        page
    }

    fn prose(page: &mut PagePrimitives, text: &str, y: f64) {
        let mut x = 50.0;
        for word in text.split(' ') {
            page.glyphs.extend(glyph_run(word, x, y, 10.0, 5.0));
            x += word.chars().count() as f64 * 5.0 + 10.0;
        }
    }

    #[test]
    fn bordered_grid_becomes_a_pipe_table() {
        let mut page = grid_page();
        prose(&mut page, "Quarterly figures follow below", 300.0);
        let fragment = process_page(&MemoryPage::new(1, page), &ctx(None), &stages(no_ocr()));

        assert_eq!(fragment.tables, 1);
        assert!(fragment.markdown.starts_with("| r0c0 | r0c1 | r0c2 |\n| --- | --- | --- |\n"));
        assert!(fragment.markdown.contains("| r2c0 | r2c1 | r2c2 |"));
        // table text is not repeated as body text
        assert_eq!(fragment.markdown.matches("r1c1").count(), 1);
        assert!(fragment.markdown.trim_end().ends_with("Quarterly figures follow below"));
    }

    #[test]
    fn disabled_tables_leave_cell_text_in_the_body() {
        let mut settings = no_ocr();
        settings.tables = false;
        let fragment = process_page(&MemoryPage::new(1, grid_page()), &ctx(None), &stages(settings));
        assert_eq!(fragment.tables, 0);
        assert!(!fragment.markdown.contains("---"));
        assert!(fragment.markdown.contains("r1c1"));
    }

    #[test]
    fn ocr_replaces_poor_text() {
        let page = MemoryPage::new(2, PagePrimitives::new(600.0, 800.0));
        let set = stages(ExtractionSettings::default()).with_ocr_engine(Arc::new(FixedOcr("Scanned letter body")));
        let fragment = process_page(&page, &ctx(None), &set);
        assert!(fragment.ocr_used);
        assert_eq!(fragment.markdown, "Scanned letter body\n");
    }

    #[test]
    fn ocr_failure_falls_back_to_extraction() {
        let mut primitives = PagePrimitives::new(600.0, 800.0);
        prose(&mut primitives, "Short note", 300.0);
        let set = stages(ExtractionSettings::default()).with_ocr_engine(Arc::new(FailingOcr));
        let fragment = process_page(&MemoryPage::new(1, primitives), &ctx(None), &set);
        assert!(!fragment.ocr_used);
        assert_eq!(fragment.markdown, "Short note\n");
    }

    #[test]
    fn auto_ocr_skips_pages_with_claimed_regions() {
        let set = stages(ExtractionSettings::default()).with_ocr_engine(Arc::new(FixedOcr("ocr noise")));
        let fragment = process_page(&MemoryPage::new(1, grid_page()), &ctx(None), &set);
        assert!(!fragment.ocr_used);
        assert_eq!(fragment.tables, 1);
    }

    #[test]
    fn chart_snapshot_is_written_and_linked() {
        let mut primitives = PagePrimitives::new(200.0, 200.0);
        for i in 0..12 {
            let x = 20.0 + i as f64 * 12.0;
            primitives.curves.push(Curve {
                bbox: BoundingBox::new(x, 40.0, x + 11.0, 160.0),
                points: 4,
            });
        }
        let raster = DynamicImage::ImageRgb8(RgbImage::from_fn(200, 200, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90])));
        let page = MemoryPage::new(3, primitives).with_raster(raster);

        let dir = tempfile::tempdir().unwrap();
        let sink = AssetSink::new(dir.path());
        let mut settings = no_ocr();
        settings.charts = true;
        let fragment = process_page(&page, &ctx(Some(&sink)), &stages(settings));

        assert_eq!(fragment.charts, 1);
        assert_eq!(fragment.images, 1);
        assert!(fragment.markdown.starts_with("![Chart (pie)](images/chart_p3_1.png)"));
        assert!(dir.path().join("chart_p3_1.png").exists());
    }

    #[test]
    fn charts_disabled_still_mask_but_emit_nothing() {
        let mut primitives = PagePrimitives::new(200.0, 200.0);
        for i in 0..12 {
            let x = 20.0 + i as f64 * 12.0;
            primitives.curves.push(Curve {
                bbox: BoundingBox::new(x, 40.0, x + 11.0, 160.0),
                points: 4,
            });
        }
        let fragment = process_page(&MemoryPage::new(1, primitives), &ctx(None), &stages(no_ocr()));
        assert_eq!(fragment.charts, 1);
        assert!(fragment.markdown.is_empty());
    }

    #[test]
    fn small_images_are_skipped_and_large_ones_linked() {
        let tiny = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let mut state = 0x9E37_79B9u32;
        let noisy = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [a, b, c, _] = state.to_le_bytes();
            Rgb([a, b, c])
        }));
        let page = MemoryPage::new(5, PagePrimitives::new(600.0, 800.0))
            .with_text("A page whose text layer is perfectly fine and needs no recognition at all.")
            .with_image(tiny)
            .with_image(noisy);

        let dir = tempfile::tempdir().unwrap();
        let sink = AssetSink::new(dir.path());
        let mut settings = no_ocr();
        settings.images = true;
        let fragment = process_page(&page, &ctx(Some(&sink)), &stages(settings));

        assert_eq!(fragment.images, 1);
        assert_eq!(fragment.markdown, "![Image 5-1](images/img_p5_1.png)\n");
        assert!(dir.path().join("img_p5_1.png").exists());
    }

    #[test]
    fn assembly_skips_empty_groups() {
        let out = assemble([vec![], vec!["![x](y)\n".to_string()], vec![], vec!["body".to_string()]]);
        assert_eq!(out, "![x](y)\n\nbody\n");
        assert_eq!(assemble([Vec::<String>::new(), vec![String::new()]]), "");
    }
}

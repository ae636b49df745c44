//! The per-worker strategy object: which optional stages run, built once.
//!
//! A worker resolves [`ExtractionSettings`] into a [`StageSet`] when it sees
//! a document's settings for the first time and reuses it for every chunk of
//! that document. Disabled stages are simply absent from the set, so the
//! per-page code asks "is there an OCR stage?" rather than re-reading flags.
//!
//! The dictionary-backed healer and the compiled cleaning rules live here
//! too; both are expensive to build and are borrowed by the per-line path.

use crate::config::{ExtractionSettings, OcrMode};
use crate::error::PdfStructError;
use crate::heal::TextHealer;
use crate::layout::LayoutTuning;
use crate::pipeline::legacy::{LegacyTableSolver, StreamSolver};
use crate::pipeline::ocr::{OcrEngine, TesseractCli};
use crate::pipeline::postprocess::Cleaner;
use crate::watermark::ValidatedWatermarkSet;
use std::fmt;
use std::sync::Arc;

/// Resolution used to rasterise pages for chart snapshots.
pub const CHART_SNAPSHOT_DPI: u32 = 150;

/// One optional stage with everything it needs to run.
pub enum Stage {
    /// Replace poor extracted text with OCR output.
    Ocr {
        engine: Arc<dyn OcrEngine>,
        mode: OcrMode,
    },
    /// Emit tables; `legacy` handles numeric pages the detector missed.
    Tables {
        legacy: Option<Arc<dyn LegacyTableSolver>>,
    },
    /// Emit chart markers and snapshots.
    Charts { snapshot_dpi: u32 },
    /// Emit embedded raster images.
    Images { min_bytes: usize },
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ocr { mode, .. } => f.debug_struct("Ocr").field("mode", mode).finish(),
            Stage::Tables { legacy } => f
                .debug_struct("Tables")
                .field("legacy", &legacy.is_some())
                .finish(),
            Stage::Charts { snapshot_dpi } => f
                .debug_struct("Charts")
                .field("snapshot_dpi", snapshot_dpi)
                .finish(),
            Stage::Images { min_bytes } => f.debug_struct("Images").field("min_bytes", min_bytes).finish(),
        }
    }
}

/// Enabled stages plus the shared per-document resources.
#[derive(Debug)]
pub struct StageSet {
    stages: Vec<Stage>,
    healer: Arc<TextHealer>,
    cleaner: Cleaner,
    tuning: LayoutTuning,
    watermarks: ValidatedWatermarkSet,
    settings: ExtractionSettings,
}

impl StageSet {
    /// Resolve settings into stages with the built-in OCR engine and legacy solver.
    pub fn from_settings(settings: &ExtractionSettings) -> Result<Self, PdfStructError> {
        let healer = Arc::new(TextHealer::load(settings.dictionary_dir.as_deref())?.with_fallback(settings.default_language));
        let cleaner = Cleaner::new(&settings.cleaning, settings.watermarks.clone()).map_err(PdfStructError::InvalidConfig)?;

        let mut stages = Vec::new();
        if settings.ocr.mode != OcrMode::Off {
            let engine = TesseractCli::new(&settings.ocr).with_dictionary(healer.dictionary().clone());
            stages.push(Stage::Ocr {
                engine: Arc::new(engine),
                mode: settings.ocr.mode,
            });
        }
        if settings.tables {
            stages.push(Stage::Tables {
                legacy: Some(Arc::new(StreamSolver::default())),
            });
        }
        if settings.charts {
            stages.push(Stage::Charts {
                snapshot_dpi: CHART_SNAPSHOT_DPI,
            });
        }
        if settings.images {
            stages.push(Stage::Images {
                min_bytes: crate::pipeline::images::MIN_IMAGE_BYTES,
            });
        }

        Ok(Self {
            stages,
            healer,
            cleaner,
            tuning: settings.tuning.clone(),
            watermarks: settings.watermarks.clone(),
            settings: settings.clone(),
        })
    }

    /// Swap in a different OCR engine, keeping the configured mode.
    pub fn with_ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        for stage in &mut self.stages {
            if let Stage::Ocr { engine: slot, .. } = stage {
                *slot = engine.clone();
            }
        }
        self
    }

    /// Swap in a different legacy table solver, or remove it.
    pub fn with_legacy_solver(mut self, solver: Option<Arc<dyn LegacyTableSolver>>) -> Self {
        for stage in &mut self.stages {
            if let Stage::Tables { legacy } = stage {
                *legacy = solver.clone();
            }
        }
        self
    }

    /// The settings this set was built from.
    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn ocr(&self) -> Option<(&dyn OcrEngine, OcrMode)> {
        self.stages.iter().find_map(|s| match s {
            Stage::Ocr { engine, mode } => Some((engine.as_ref(), *mode)),
            _ => None,
        })
    }

    /// `Some` when tables are enabled; the inner option is the legacy solver.
    pub fn tables(&self) -> Option<Option<&dyn LegacyTableSolver>> {
        self.stages.iter().find_map(|s| match s {
            Stage::Tables { legacy } => Some(legacy.as_deref()),
            _ => None,
        })
    }

    /// Snapshot DPI when charts are enabled.
    pub fn charts(&self) -> Option<u32> {
        self.stages.iter().find_map(|s| match s {
            Stage::Charts { snapshot_dpi } => Some(*snapshot_dpi),
            _ => None,
        })
    }

    /// Minimum encoded size when images are enabled.
    pub fn images(&self) -> Option<usize> {
        self.stages.iter().find_map(|s| match s {
            Stage::Images { min_bytes } => Some(*min_bytes),
            _ => None,
        })
    }

    pub fn healer(&self) -> &TextHealer {
        &self.healer
    }

    pub fn cleaner(&self) -> &Cleaner {
        &self.cleaner
    }

    pub fn tuning(&self) -> &LayoutTuning {
        &self.tuning
    }

    pub fn watermarks(&self) -> &ValidatedWatermarkSet {
        &self.watermarks
    }
}

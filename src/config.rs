//! Configuration types for structure recovery.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across tasks, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! Worker processes never see the full config. The supervisor projects it
//! onto [`ExtractionSettings`], the serialisable subset every chunk needs,
//! and each worker resolves that into a [`crate::pipeline::stages::StageSet`]
//! once.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::PdfStructError;
use crate::heal::Language;
use crate::layout::LayoutTuning;
use crate::progress::ProgressCallback;
use crate::watermark::ValidatedWatermarkSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a structure-recovery conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfstruct::{ConversionConfig, OcrMode};
///
/// let config = ConversionConfig::builder()
///     .workers(2)
///     .chunk_size(4)
///     .ocr_mode(OcrMode::Off)
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_size, 4);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Detect and emit tables. Default: true.
    pub tables_enabled: bool,

    /// Write embedded raster images to `images/` and link them. Default: false.
    pub images_enabled: bool,

    /// Detect chart regions and snapshot them into `images/`. Default: false.
    ///
    /// Chart regions are always masked out of body text; this flag only
    /// controls whether a marker and snapshot are emitted for them.
    pub charts_enabled: bool,

    /// OCR collaborator settings.
    pub ocr: OcrSettings,

    /// Worker processes in the pool. Clamped to `1..=available_parallelism`. Default: 4.
    pub workers: usize,

    /// Descend into sub-directories when the input is a directory. Default: false.
    pub recursive: bool,

    /// Pages per chunk. Default: 2.
    ///
    /// Small chunks give finer progress and smaller blast radius when a
    /// worker dies; large chunks amortise the cost of writing each chunk
    /// sub-document.
    pub chunk_size: usize,

    /// Directory for chunk sub-documents. Default: `<system temp>/pdfstruct`.
    pub temp_root: Option<PathBuf>,

    /// How chunk workers are started.
    pub worker_launch: WorkerLaunch,

    /// Empirical layout constants.
    pub tuning: LayoutTuning,

    /// Watermark pre-scan settings.
    pub watermark: WatermarkSettings,

    /// Candidate watermark patterns, usually loaded from [`crate::tags::TagStore`].
    pub watermark_candidates: Vec<String>,

    /// Line-level cleaning rules.
    pub cleaning: CleaningSettings,

    /// Directory with extra `en_freq.txt` / `tr_freq.txt` word lists.
    /// Default: the installed lists under the user data directory.
    pub dictionary_dir: Option<PathBuf>,

    /// Healing language for text that does not read as English. Default: Turkish.
    pub default_language: Language,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page separator in assembled output. Default: None.
    pub page_separator: PageSeparator,

    /// Receives document and chunk lifecycle events.
    pub progress_callback: Option<ProgressCallback>,

    /// Attempts of the temp sweep that follows a cancellation. Default: 5.
    pub cancel_sweep_attempts: u32,

    /// Pause between cancellation sweep attempts in milliseconds. Default: 500.
    pub cancel_sweep_interval_ms: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            tables_enabled: true,
            images_enabled: false,
            charts_enabled: false,
            ocr: OcrSettings::default(),
            workers: 4usize.min(max_workers()),
            recursive: false,
            chunk_size: 2,
            temp_root: None,
            worker_launch: WorkerLaunch::default(),
            tuning: LayoutTuning::default(),
            watermark: WatermarkSettings::default(),
            watermark_candidates: Vec::new(),
            cleaning: CleaningSettings::default(),
            dictionary_dir: None,
            default_language: Language::default(),
            password: None,
            page_separator: PageSeparator::default(),
            progress_callback: None,
            cancel_sweep_attempts: 5,
            cancel_sweep_interval_ms: 500,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("tables_enabled", &self.tables_enabled)
            .field("images_enabled", &self.images_enabled)
            .field("charts_enabled", &self.charts_enabled)
            .field("ocr", &self.ocr)
            .field("workers", &self.workers)
            .field("recursive", &self.recursive)
            .field("chunk_size", &self.chunk_size)
            .field("temp_root", &self.temp_root)
            .field("worker_launch", &self.worker_launch)
            .field("watermark", &self.watermark)
            .field("watermark_candidates", &self.watermark_candidates.len())
            .field("dictionary_dir", &self.dictionary_dir)
            .field("default_language", &self.default_language)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("page_separator", &self.page_separator)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Temp directory for chunk sub-documents.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pdfstruct"))
    }

    /// The per-chunk settings shipped to every worker for one document.
    pub fn extraction_settings(&self, watermarks: ValidatedWatermarkSet) -> ExtractionSettings {
        ExtractionSettings {
            tables: self.tables_enabled,
            images: self.images_enabled,
            charts: self.charts_enabled,
            ocr: self.ocr.clone(),
            tuning: self.tuning.clone(),
            cleaning: self.cleaning.clone(),
            watermarks,
            dictionary_dir: self.dictionary_dir.clone(),
            default_language: self.default_language,
            password: self.password.clone(),
        }
    }
}

/// Upper bound for the worker pool.
pub fn max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn tables(mut self, v: bool) -> Self {
        self.config.tables_enabled = v;
        self
    }

    pub fn images(mut self, v: bool) -> Self {
        self.config.images_enabled = v;
        self
    }

    pub fn charts(mut self, v: bool) -> Self {
        self.config.charts_enabled = v;
        self
    }

    pub fn ocr_mode(mut self, mode: OcrMode) -> Self {
        self.config.ocr.mode = mode;
        self
    }

    pub fn ocr_languages(mut self, langs: impl Into<String>) -> Self {
        self.config.ocr.languages = langs.into();
        self
    }

    pub fn ocr_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ocr.binary = path.into();
        self
    }

    pub fn ocr_dpi(mut self, dpi: u32) -> Self {
        self.config.ocr.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.clamp(1, max_workers());
        self
    }

    pub fn recursive(mut self, v: bool) -> Self {
        self.config.recursive = v;
        self
    }

    pub fn chunk_size(mut self, pages: usize) -> Self {
        self.config.chunk_size = pages.max(1);
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(dir.into());
        self
    }

    pub fn worker_launch(mut self, launch: WorkerLaunch) -> Self {
        self.config.worker_launch = launch;
        self
    }

    pub fn tuning(mut self, tuning: LayoutTuning) -> Self {
        self.config.tuning = tuning;
        self
    }

    pub fn watermark_threshold(mut self, ratio: f64) -> Self {
        self.config.watermark.threshold = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn watermark_sampling(mut self, head_pages: usize, stride: usize) -> Self {
        self.config.watermark.head_pages = head_pages;
        self.config.watermark.stride = stride.max(1);
        self
    }

    pub fn watermark_candidates(mut self, patterns: Vec<String>) -> Self {
        self.config.watermark_candidates = patterns;
        self
    }

    pub fn cleaning(mut self, cleaning: CleaningSettings) -> Self {
        self.config.cleaning = cleaning;
        self
    }

    pub fn dictionary_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.dictionary_dir = Some(dir.into());
        self
    }

    pub fn default_language(mut self, lang: Language) -> Self {
        self.config.default_language = lang;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_sweep(mut self, attempts: u32, interval_ms: u64) -> Self {
        self.config.cancel_sweep_attempts = attempts.max(1);
        self.config.cancel_sweep_interval_ms = interval_ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, PdfStructError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(PdfStructError::InvalidConfig("workers must be ≥ 1".into()));
        }
        if c.chunk_size == 0 {
            return Err(PdfStructError::InvalidConfig("chunk_size must be ≥ 1".into()));
        }
        if !(0.0..=1.0).contains(&c.watermark.threshold) {
            return Err(PdfStructError::InvalidConfig(format!(
                "watermark threshold must be within 0–1, got {}",
                c.watermark.threshold
            )));
        }
        c.tuning.validate().map_err(PdfStructError::InvalidConfig)?;
        c.cleaning.compile().map_err(PdfStructError::InvalidConfig)?;
        Ok(self.config)
    }
}

// ── OCR ──────────────────────────────────────────────────────────────────

/// When the OCR collaborator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// Only for pages whose extracted text trips the trigger heuristic. (default)
    #[default]
    Auto,
    /// Every page.
    On,
    /// Never.
    Off,
}

impl std::str::FromStr for OcrMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(OcrMode::Auto),
            "on" => Ok(OcrMode::On),
            "off" => Ok(OcrMode::Off),
            other => Err(format!("unknown OCR mode '{other}' (expected auto, on or off)")),
        }
    }
}

/// Settings for the external OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrSettings {
    pub mode: OcrMode,
    /// Tesseract language spec. Default: `eng+tur`.
    pub languages: String,
    /// Tesseract executable. Default: `tesseract` on `PATH`.
    pub binary: PathBuf,
    /// Page render resolution for OCR. Default: 300.
    pub dpi: u32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            mode: OcrMode::Auto,
            languages: "eng+tur".into(),
            binary: PathBuf::from("tesseract"),
            dpi: 300,
        }
    }
}

// ── Workers ──────────────────────────────────────────────────────────────

/// How the pool starts chunk workers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkerLaunch {
    /// Re-run the current executable in worker mode. (default)
    ///
    /// The host binary must call
    /// [`crate::pipeline::worker::run_worker_if_requested`] first thing in `main`.
    #[default]
    CurrentExe,
    /// Run an explicit program in worker mode.
    Process { program: PathBuf, args: Vec<String> },
    /// Run chunks on the blocking thread pool of this process.
    InProcess,
}

// ── Watermarks ───────────────────────────────────────────────────────────

/// Sampling and threshold for watermark validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSettings {
    /// Minimum hit ratio over the sample. Default: 0.6.
    pub threshold: f64,
    /// Leading pages always sampled. Default: 10.
    pub head_pages: usize,
    /// After the head, every `stride`-th page is sampled. Default: 5.
    pub stride: usize,
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            head_pages: 10,
            stride: 5,
        }
    }
}

// ── Cleaning ─────────────────────────────────────────────────────────────

/// Line-level cleaning applied to body text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningSettings {
    /// Case-insensitive regexes; a matching line is dropped.
    pub regex_blacklist: Vec<String>,
    /// Drop a trailing line made only of a page number. Default: true.
    pub strip_page_numbers: bool,
}

impl Default for CleaningSettings {
    fn default() -> Self {
        Self {
            regex_blacklist: vec![
                "Google Translate".into(),
                "Translated by".into(),
                "Original text".into(),
                "Machine Translated by Google".into(),
                "achine Tranşlated by Google".into(),
            ],
            strip_page_numbers: true,
        }
    }
}

impl CleaningSettings {
    /// Compile the blacklist; an invalid pattern names itself in the error.
    pub fn compile(&self) -> Result<Vec<regex::Regex>, String> {
        self.regex_blacklist
            .iter()
            .map(|p| {
                regex::RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| format!("invalid blacklist pattern '{p}': {e}"))
            })
            .collect()
    }
}

// ── Worker-side settings ─────────────────────────────────────────────────

/// The serialisable subset of [`ConversionConfig`] that every chunk needs.
///
/// Sent to worker processes with each request; the validated watermark set
/// inside is computed once per document and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    pub tables: bool,
    pub images: bool,
    pub charts: bool,
    pub ocr: OcrSettings,
    pub tuning: LayoutTuning,
    pub cleaning: CleaningSettings,
    pub watermarks: ValidatedWatermarkSet,
    pub dictionary_dir: Option<PathBuf>,
    pub default_language: Language,
    pub password: Option<String>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        ConversionConfig::default().extraction_settings(ValidatedWatermarkSet::empty())
    }
}

// ── Output ───────────────────────────────────────────────────────────────

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string placed before page `page_num` (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}

impl std::str::FromStr for PageSeparator {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "none" => PageSeparator::None,
            "hr" | "---" => PageSeparator::HorizontalRule,
            "comment" => PageSeparator::Comment,
            _ => PageSeparator::Custom(s.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let c = ConversionConfig::builder().build().unwrap();
        assert!(c.tables_enabled);
        assert!(!c.charts_enabled);
        assert_eq!(c.chunk_size, 2);
        assert_eq!(c.ocr.mode, OcrMode::Auto);
        assert_eq!(c.watermark.threshold, 0.6);
        assert!(c.workers >= 1 && c.workers <= max_workers());
    }

    #[test]
    fn setters_clamp() {
        let c = ConversionConfig::builder()
            .workers(0)
            .chunk_size(0)
            .watermark_threshold(3.0)
            .build()
            .unwrap();
        assert_eq!(c.workers, 1);
        assert_eq!(c.chunk_size, 1);
        assert_eq!(c.watermark.threshold, 1.0);

        let c = ConversionConfig::builder().workers(10_000).build().unwrap();
        assert_eq!(c.workers, max_workers());
    }

    #[test]
    fn invalid_tuning_is_rejected() {
        let tuning = LayoutTuning {
            fill_ratio: 2.0,
            ..LayoutTuning::default()
        };
        let err = ConversionConfig::builder().tuning(tuning).build().unwrap_err();
        assert!(matches!(err, PdfStructError::InvalidConfig(_)));
    }

    #[test]
    fn invalid_blacklist_is_rejected() {
        let cleaning = CleaningSettings {
            regex_blacklist: vec!["(unclosed".into()],
            ..CleaningSettings::default()
        };
        let err = ConversionConfig::builder().cleaning(cleaning).build().unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn ocr_mode_parses() {
        assert_eq!("AUTO".parse::<OcrMode>().unwrap(), OcrMode::Auto);
        assert_eq!("off".parse::<OcrMode>().unwrap(), OcrMode::Off);
        assert!("sometimes".parse::<OcrMode>().is_err());
    }

    #[test]
    fn separator_renders() {
        assert_eq!(PageSeparator::None.render(2), "\n\n");
        assert!(PageSeparator::Comment.render(7).contains("page 7"));
        assert!(matches!("hr".parse::<PageSeparator>().unwrap(), PageSeparator::HorizontalRule));
    }

    #[test]
    fn extraction_settings_roundtrip_json() {
        let c = ConversionConfig::default();
        let wm = ValidatedWatermarkSet::new(vec!["TASLAK".to_string()]);
        let s = c.extraction_settings(wm);
        let json = serde_json::to_string(&s).unwrap();
        let back: ExtractionSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}

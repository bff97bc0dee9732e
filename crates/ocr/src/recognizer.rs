use std::collections::HashMap;
use std::sync::Mutex;

use image::GrayImage;
use thiserror::Error;
use tracing::debug;

use crate::types::BBox;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available, build with the `tesseract` feature")]
    NotAvailable,
}

/// Page-segmentation strategy handed to the engine (Tesseract `--psm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutMode {
    Auto,
    SingleColumn,
    SingleBlock,
    SingleLine,
    SingleWord,
    SparseText,
}

impl LayoutMode {
    pub fn psm(self) -> u8 {
        match self {
            LayoutMode::Auto => 3,
            LayoutMode::SingleColumn => 4,
            LayoutMode::SingleBlock => 6,
            LayoutMode::SingleLine => 7,
            LayoutMode::SingleWord => 8,
            LayoutMode::SparseText => 11,
        }
    }

    pub fn from_psm(psm: u8) -> Option<Self> {
        match psm {
            3 => Some(LayoutMode::Auto),
            4 => Some(LayoutMode::SingleColumn),
            6 => Some(LayoutMode::SingleBlock),
            7 => Some(LayoutMode::SingleLine),
            8 => Some(LayoutMode::SingleWord),
            11 => Some(LayoutMode::SparseText),
            _ => None,
        }
    }
}

/// Everything the engine needs besides the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Tesseract language string, e.g. `ron+eng`.
    pub languages: String,
    pub layout: LayoutMode,
    pub whitelist: Option<String>,
}

impl EngineConfig {
    pub fn new(languages: &str, layout: LayoutMode) -> Self {
        Self { languages: languages.to_string(), layout, whitelist: None }
    }

    pub fn with_whitelist(mut self, whitelist: Option<&str>) -> Self {
        self.whitelist = whitelist.map(str::to_string);
        self
    }

    /// Apply a template region's raw option string (`--psm 6 -c tessedit_char_whitelist=0123`).
    /// Unrecognized options are logged and ignored.
    pub fn apply_overrides(&mut self, overrides: &str) {
        let mut tokens = overrides.split_whitespace();
        while let Some(token) = tokens.next() {
            match token {
                "--psm" => match tokens.next().and_then(|v| v.parse().ok()).and_then(LayoutMode::from_psm) {
                    Some(layout) => self.layout = layout,
                    None => debug!("Ignoring unsupported --psm value in '{overrides}'"),
                },
                "-l" => {
                    if let Some(langs) = tokens.next() {
                        self.languages = langs.to_string();
                    }
                }
                "-c" => match tokens.next().and_then(|kv| kv.split_once('=')) {
                    Some(("tessedit_char_whitelist", value)) => self.whitelist = Some(value.to_string()),
                    Some((key, _)) => debug!(key, "Ignoring engine variable"),
                    None => debug!("Malformed -c option in '{overrides}'"),
                },
                other => debug!(option = other, "Ignoring engine option"),
            }
        }
    }
}

/// One recognized word, as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedWord {
    pub text: String,
    /// Engine confidence on a 0–100 scale; negative when the engine gave none.
    pub confidence: f32,
    pub bbox: BBox,
    /// Engine line index; words sharing it were printed on the same line.
    pub line: u32,
}

/// Abstraction over an OCR backend.
/// Implementations receive a preprocessed grayscale image and return words in reading order.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image: &GrayImage, config: &EngineConfig) -> Result<Vec<RecognizedWord>, OcrError>;
}

/// Parse Tesseract TSV output into word rows (level 5), numbering lines in order of appearance.
pub fn parse_tsv(tsv: &str) -> Vec<RecognizedWord> {
    let mut words = Vec::new();
    let mut last_line_key = None;
    let mut line = 0u32;
    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let key = (num(2), num(3), num(4));
        match last_line_key {
            Some(prev) if prev != key => line += 1,
            _ => {}
        }
        last_line_key = Some(key);
        words.push(RecognizedWord {
            text: text.to_string(),
            confidence: cols[10].trim().parse().unwrap_or(-1.0),
            bbox: BBox { left: num(6), top: num(7), width: num(8), height: num(9) },
            line,
        });
    }
    words
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Turns a pre-set string into words (one engine line per text line), useful
/// for testing recognition and parsing without Tesseract installed.
///
/// Individual layouts can be scripted with their own text, and every call's
/// config is recorded for inspection.
pub struct MockRecognizer {
    text: String,
    confidence: f32,
    scripts: HashMap<LayoutMode, (String, f32)>,
    fail_all: bool,
    fail_on: Vec<LayoutMode>,
    calls: Mutex<Vec<EngineConfig>>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: 90.0,
            scripts: HashMap::new(),
            fail_all: false,
            fail_on: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A recognizer whose every call fails with an engine error.
    pub fn failing() -> Self {
        Self { fail_all: true, ..Self::new("") }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Return `text` at `confidence` whenever `layout` is requested.
    pub fn with_layout(mut self, layout: LayoutMode, text: impl Into<String>, confidence: f32) -> Self {
        self.scripts.insert(layout, (text.into(), confidence));
        self
    }

    pub fn failing_on(mut self, layout: LayoutMode) -> Self {
        self.fail_on.push(layout);
        self
    }

    /// Configs of all calls so far, in call order.
    pub fn calls(&self) -> Vec<EngineConfig> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn words(text: &str, confidence: f32) -> Vec<RecognizedWord> {
        let mut words = Vec::new();
        for (line, content) in text.lines().enumerate() {
            for (i, w) in content.split_whitespace().enumerate() {
                words.push(RecognizedWord {
                    text: w.to_string(),
                    confidence,
                    bbox: BBox { left: i as u32 * 40, top: line as u32 * 20, width: 36, height: 16 },
                    line: line as u32,
                });
            }
        }
        words
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image: &GrayImage, config: &EngineConfig) -> Result<Vec<RecognizedWord>, OcrError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(config.clone());
        if self.fail_all || self.fail_on.contains(&config.layout) {
            return Err(OcrError::Engine(format!("mock failure (psm {})", config.layout.psm())));
        }
        Ok(match self.scripts.get(&config.layout) {
            Some((text, confidence)) => Self::words(text, *confidence),
            None => Self::words(&self.text, self.confidence),
        })
    }
}

/// Stand-in used when the binary was built without an engine.
pub struct UnavailableRecognizer;

impl OcrBackend for UnavailableRecognizer {
    fn recognize(&self, _image: &GrayImage, _config: &EngineConfig) -> Result<Vec<RecognizedWord>, OcrError> {
        Err(OcrError::NotAvailable)
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{parse_tsv, EngineConfig, OcrBackend, OcrError, RecognizedWord};
    use crate::preprocess::encode_png;
    use image::GrayImage;
    use leptess::{LepTess, Variable};

    /// Creates a fresh engine per call so one instance can serve many threads.
    pub struct TesseractRecognizer {
        data_path: Option<String>,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>) -> Self {
            Self { data_path }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image: &GrayImage, config: &EngineConfig) -> Result<Vec<RecognizedWord>, OcrError> {
            let png = encode_png(image).map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            let mut lt = LepTess::new(self.data_path.as_deref(), &config.languages)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(Variable::TesseditPagesegMode, &config.layout.psm().to_string())
                .map_err(|e| OcrError::Engine(format!("{e:?}")))?;
            if let Some(whitelist) = &config.whitelist {
                lt.set_variable(Variable::TesseditCharWhitelist, whitelist)
                    .map_err(|e| OcrError::Engine(format!("{e:?}")))?;
            }
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            lt.set_source_resolution(300);
            let tsv = lt.get_tsv_text(0).map_err(|e| OcrError::Engine(format!("{e:?}")))?;
            Ok(parse_tsv(&tsv))
        }
    }
}

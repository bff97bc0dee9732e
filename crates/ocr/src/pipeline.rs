use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::extract::Extractor;
use crate::preprocess::{self, PreprocessError};
use crate::recognition::{overall_confidence, RecognitionEngine};
use crate::recognizer::OcrBackend;
use crate::settings::EngineSettings;
use crate::template::{DocumentTemplate, TemplateError, TemplateRegistry};
use crate::types::{DocumentExtraction, DocumentResult, ImageSize, ParseOutcome};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not load image: {0}")]
    Image(#[from] PreprocessError),
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

/// Orchestrates: load → grayscale / downscale → per-region recognition
/// (+ whole-page fallback for photos) → field parsing.
///
/// Cloning is cheap; clones share the recognizer, registry and settings.
pub struct DocumentProcessor<R: OcrBackend + 'static> {
    recognizer: Arc<R>,
    registry: Arc<TemplateRegistry>,
    settings: Arc<EngineSettings>,
}

impl<R: OcrBackend + 'static> Clone for DocumentProcessor<R> {
    fn clone(&self) -> Self {
        Self {
            recognizer: Arc::clone(&self.recognizer),
            registry: Arc::clone(&self.registry),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<R: OcrBackend + 'static> DocumentProcessor<R> {
    pub fn new(recognizer: R, registry: Arc<TemplateRegistry>, settings: EngineSettings) -> Self {
        Self {
            recognizer: Arc::new(recognizer),
            registry,
            settings: Arc::new(settings),
        }
    }

    /// Open the template registry named by `settings.templates_dir`.
    pub fn open(recognizer: R, settings: EngineSettings) -> Result<Self, PipelineError> {
        let registry = TemplateRegistry::open(&settings.templates_dir)?;
        Ok(Self::new(recognizer, Arc::new(registry), settings))
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn template(&self, name: Option<&str>) -> Arc<DocumentTemplate> {
        self.registry.get(name.unwrap_or(self.settings.default_template.as_str()))
    }

    /// Process a file on disk. Never fails: load errors come back as an
    /// unsuccessful result.
    pub fn process_document(&self, path: &Path, template: Option<&str>) -> DocumentResult {
        let file = file_label(path);
        match self.extract_file(path, template) {
            Ok(extraction) => DocumentResult::succeeded(file, extraction),
            Err(e) => {
                warn!(path = %path.display(), "{e}");
                DocumentResult::failed(file, e.to_string())
            }
        }
    }

    /// Process raw bytes (an upload or camera capture); `file` is only used for reporting.
    pub fn process_bytes(&self, file: &str, data: &[u8], template: Option<&str>) -> DocumentResult {
        match preprocess::decode_image(data) {
            Ok(image) => self.process_image(file, &image, template),
            Err(e) => {
                let e = PipelineError::from(e);
                warn!(file, "{e}");
                DocumentResult::failed(file, e.to_string())
            }
        }
    }

    pub fn process_image(&self, file: &str, image: &DynamicImage, template: Option<&str>) -> DocumentResult {
        DocumentResult::succeeded(file, self.extract_image(file, image, template))
    }

    pub fn extract_file(&self, path: &Path, template: Option<&str>) -> Result<DocumentExtraction, PipelineError> {
        let image = preprocess::load_image(path)?;
        Ok(self.extract_image(&file_label(path), &image, template))
    }

    fn extract_image(&self, file: &str, image: &DynamicImage, template: Option<&str>) -> DocumentExtraction {
        let template = self.template(template);
        let image_size = ImageSize { width: image.width(), height: image.height() };

        let mut page = preprocess::fit_within(preprocess::to_grayscale(image), self.settings.max_side_px);
        if self.settings.deskew {
            page = preprocess::deskew(&page);
        }

        let engine = RecognitionEngine::new(self.recognizer.as_ref(), &self.settings);
        let regions = engine.recognize_document(&page, &template);
        let overall_confidence = overall_confidence(&regions);

        let full_text = Extractor::parser_input(&regions);
        let ParseOutcome { receipt, provenance } = Extractor::parse(&full_text);

        info!(
            file,
            template = %template.name,
            regions = regions.len(),
            confidence = overall_confidence,
            total = ?receipt.total.map(|t| t.to_string()),
            "Processed document"
        );

        DocumentExtraction {
            template: template.name.clone(),
            document_type: template.document_type.clone(),
            image_size,
            regions,
            overall_confidence,
            parsed_data: receipt,
            field_provenance: provenance,
            full_text,
        }
    }

    /// Process many files concurrently, at most `settings.worker_count()` at a
    /// time. Results come back in input order, one per path.
    pub async fn process_batch(&self, paths: Vec<PathBuf>, template: Option<String>) -> Vec<DocumentResult> {
        let semaphore = Arc::new(Semaphore::new(self.settings.worker_count()));
        let mut handles = Vec::with_capacity(paths.len());

        for path in paths {
            let processor = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let template = template.clone();
            let file = file_label(&path);
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                tokio::task::spawn_blocking(move || processor.process_document(&path, template.as_deref())).await
            });
            handles.push((file, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (file, handle) in handles {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) | Err(e) => {
                    error!(file = %file, "Processing task failed: {e}");
                    DocumentResult::failed(file, format!("Processing task failed: {e}"))
                }
            };
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(documents = results.len(), succeeded, "Batch complete");
        results
    }
}

/// Results report the bare file name, not the full path.
fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockRecognizer;
    use crate::template::FULL_TEXT_REGION;
    use docscan_core::Money;
    use image::{GrayImage, ImageBuffer, Luma};
    use std::io::Cursor;

    const RECEIPT_TEXT: &str = "KAUFLAND ROMANIA\nDATA 07.11.2025 17:45\nTOTAL 45,00 LEI\nCARD";

    fn receipt_image(width: u32, height: u32) -> DynamicImage {
        let img: GrayImage = ImageBuffer::from_fn(width, height, |x, y| {
            Luma([if y % 12 < 3 && x % 9 < 6 { 20 } else { 230 }])
        });
        DynamicImage::ImageLuma8(img)
    }

    fn tiny_png() -> Vec<u8> {
        let mut buf = Vec::new();
        receipt_image(60, 40)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn processor(mock: MockRecognizer, dir: &Path) -> DocumentProcessor<MockRecognizer> {
        let registry = Arc::new(TemplateRegistry::open(dir).unwrap());
        DocumentProcessor::new(mock, registry, EngineSettings::default())
    }

    #[test]
    fn process_image_parses_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockRecognizer::new(RECEIPT_TEXT), dir.path());

        let result = p.process_image("receipt.png", &receipt_image(120, 200), None);

        assert!(result.success);
        let extraction = result.extraction.as_ref().unwrap();
        assert_eq!(extraction.template, "romanian_receipt");
        assert_eq!(extraction.document_type, "receipt");
        assert_eq!(extraction.image_size, ImageSize { width: 120, height: 200 });
        assert_eq!(extraction.region(FULL_TEXT_REGION).unwrap().text, RECEIPT_TEXT);
        assert!((extraction.overall_confidence - 0.9).abs() < 1e-6);
        assert_eq!(extraction.full_text, RECEIPT_TEXT);

        let parsed = &extraction.parsed_data;
        assert_eq!(parsed.vendor_name.as_deref(), Some("KAUFLAND"));
        assert_eq!(parsed.total, Some(Money::from_cents(4500)));
        assert_eq!(parsed.time.as_deref(), Some("17:45"));
        assert_eq!(extraction.field_provenance["total"].rule, "total_label");
        assert!(!result.needs_review());
    }

    #[test]
    fn unknown_template_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockRecognizer::new(RECEIPT_TEXT), dir.path());
        let result = p.process_image("r.png", &receipt_image(80, 80), Some("no_such_template"));
        assert_eq!(result.extraction.unwrap().template, "romanian_receipt");
    }

    #[test]
    fn invoice_regions_in_template_order() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockRecognizer::new("FACTURA\nTOTAL 1.234,56"), dir.path());
        let extraction = p
            .process_image("inv.png", &receipt_image(200, 300), Some("invoice"))
            .extraction
            .unwrap();
        let names: Vec<&str> = extraction.regions.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["header", "details", "totals"]);
        // No full-text region: the parser sees every region joined.
        assert_eq!(extraction.full_text.matches("FACTURA").count(), 3);
        assert_eq!(extraction.parsed_data.total, Some(Money::from_cents(123456)));
    }

    #[test]
    fn low_confidence_needs_review() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockRecognizer::new(RECEIPT_TEXT).with_confidence(60.0), dir.path());
        let result = p.process_image("r.png", &receipt_image(80, 80), None);
        assert!((result.overall_confidence() - 0.6).abs() < 1e-6);
        assert!(result.needs_review());
    }

    #[test]
    fn engine_failure_still_succeeds_with_zero_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockRecognizer::failing(), dir.path());
        let result = p.process_image("r.png", &receipt_image(80, 80), None);
        assert!(result.success);
        let extraction = result.extraction.unwrap();
        assert_eq!(extraction.overall_confidence, 0.0);
        assert!(extraction.regions[0].1.error.is_some());
        assert_eq!(extraction.parsed_data.total, None);
    }

    #[test]
    fn missing_file_is_a_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockRecognizer::new(RECEIPT_TEXT), dir.path());
        let result = p.process_document(&dir.path().join("missing.jpg"), None);
        assert!(!result.success);
        assert_eq!(result.file, "missing.jpg");
        assert!(result.error.unwrap().starts_with("Could not load image"));
        assert!(result.extraction.is_none());
    }

    #[test]
    fn undecodable_bytes_are_a_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockRecognizer::new(RECEIPT_TEXT), dir.path());
        assert!(!p.process_bytes("junk.png", b"definitely not a png", None).success);
        assert!(p.process_bytes("ok.png", &tiny_png(), None).success);
    }

    #[test]
    fn large_photo_is_downscaled_and_gets_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(TemplateRegistry::open(dir.path()).unwrap());
        let settings = EngineSettings { photo_threshold_px: 100, max_side_px: 150, ..EngineSettings::default() };
        let mock = MockRecognizer::new(RECEIPT_TEXT);
        let p = DocumentProcessor::new(mock, registry, settings);

        let result = p.process_image("photo.jpg", &receipt_image(300, 200), None);
        let extraction = result.extraction.unwrap();
        assert_eq!(extraction.image_size, ImageSize { width: 300, height: 200 });
        // One template region plus four page strategies.
        assert_eq!(p.recognizer.calls().len(), 5);
        assert_eq!(extraction.parsed_data.total, Some(Money::from_cents(4500)));
    }

    #[tokio::test]
    async fn batch_returns_one_result_per_input_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let templates = dir.path().join("templates");
        let p = processor(MockRecognizer::new(RECEIPT_TEXT), &templates);

        let first = dir.path().join("a.png");
        let third = dir.path().join("c.png");
        receipt_image(60, 90).save(&first).unwrap();
        receipt_image(90, 60).save(&third).unwrap();
        let garbage = dir.path().join("b.png");
        std::fs::write(&garbage, b"not an image").unwrap();
        let paths = vec![first, garbage, third, dir.path().join("missing.png")];

        let results = p.process_batch(paths, None).await;

        assert_eq!(results.len(), 4);
        let files: Vec<&str> = results.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(files, vec!["a.png", "b.png", "c.png", "missing.png"]);
        let successes: Vec<bool> = results.iter().map(|r| r.success).collect();
        assert_eq!(successes, vec![true, false, true, false]);
    }

    #[tokio::test]
    async fn empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockRecognizer::new(""), dir.path());
        assert!(p.process_batch(Vec::new(), None).await.is_empty());
    }

    #[test]
    fn open_reads_templates_dir_from_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings { templates_dir: dir.path().join("tpl"), ..EngineSettings::default() };
        let p = DocumentProcessor::open(MockRecognizer::new(""), settings).unwrap();
        assert!(p.registry().contains("invoice"));
        assert!(dir.path().join("tpl").join("romanian_receipt.json").exists());
    }
}

pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognition;
pub mod recognizer;
pub mod settings;
pub mod template;
pub mod types;

pub use extract::Extractor;
pub use pipeline::{DocumentProcessor, PipelineError};
pub use preprocess::{PreprocessError, PreprocessVariant};
pub use recognition::{PageStrategy, RecognitionEngine};
pub use recognizer::{EngineConfig, LayoutMode, MockRecognizer, OcrBackend, OcrError, RecognizedWord, UnavailableRecognizer};
pub use settings::{EngineSettings, SettingsError};
pub use template::{DocumentRegion, DocumentTemplate, TemplateError, TemplateRegistry, DEFAULT_TEMPLATE, FULL_TEXT_REGION};
pub use types::{
    DocumentExtraction, DocumentResult, FieldProvenance, LineItem, ParseOutcome, ParsedReceipt, PaymentMethod,
    RegionExtraction,
};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;

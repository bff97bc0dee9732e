use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{Local, NaiveDateTime};
use docscan_core::DataType;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::preprocess::PreprocessVariant;

/// Template used whenever a caller asks for a name the registry does not know.
pub const DEFAULT_TEMPLATE: &str = "romanian_receipt";
/// Region whose text is preferred for parsing and may be replaced by the page fallback.
pub const FULL_TEXT_REGION: &str = "full_text";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid template JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid template name: '{0}'")]
    InvalidName(String),
    #[error("Invalid region '{region}': {reason}")]
    InvalidRegion { region: String, reason: String },
}

fn default_threshold() -> f32 {
    0.6
}

/// A rectangle of interest inside a document, in percent of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRegion {
    #[serde(default)]
    pub name: String,
    /// `[x1, y1, x2, y2]` as percentages (0–100) of width / height.
    pub coordinates: [f32; 4],
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f32,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub preprocessing: PreprocessVariant,
    #[serde(default, alias = "tesseract_config")]
    pub engine_config: String,
}

impl DocumentRegion {
    pub fn new(name: &str, coordinates: [f32; 4]) -> Self {
        Self {
            name: name.to_string(),
            coordinates,
            confidence_threshold: default_threshold(),
            data_type: DataType::Text,
            preprocessing: PreprocessVariant::Standard,
            engine_config: String::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_preprocessing(mut self, variant: PreprocessVariant) -> Self {
        self.preprocessing = variant;
        self
    }

    pub fn with_engine_config(mut self, config: &str) -> Self {
        self.engine_config = config.to_string();
        self
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        let invalid = |reason: &str| TemplateError::InvalidRegion {
            region: self.name.clone(),
            reason: reason.to_string(),
        };
        let [x1, y1, x2, y2] = self.coordinates;
        if self.coordinates.iter().any(|c| !(0.0..=100.0).contains(c)) {
            return Err(invalid("coordinates must lie within 0-100"));
        }
        if x1 >= x2 || y1 >= y2 {
            return Err(invalid("coordinates must satisfy x1 < x2 and y1 < y2"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid("confidence_threshold must lie within 0-1"));
        }
        Ok(())
    }
}

/// Named set of regions describing where to look on one kind of document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTemplate {
    pub name: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    #[serde(default = "now")]
    pub created_at: NaiveDateTime,
    #[serde(with = "region_map", default)]
    pub regions: Vec<DocumentRegion>,
}

fn default_document_type() -> String {
    "receipt".to_string()
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl DocumentTemplate {
    pub fn new(name: &str, document_type: &str) -> Self {
        Self {
            name: name.to_string(),
            document_type: document_type.to_string(),
            created_at: now(),
            regions: Vec::new(),
        }
    }

    /// Adds a region, replacing an existing one of the same name in place.
    pub fn add_region(&mut self, region: DocumentRegion) {
        match self.regions.iter_mut().find(|r| r.name == region.name) {
            Some(existing) => *existing = region,
            None => self.regions.push(region),
        }
    }

    pub fn remove_region(&mut self, name: &str) -> Option<DocumentRegion> {
        let idx = self.regions.iter().position(|r| r.name == name)?;
        Some(self.regions.remove(idx))
    }

    pub fn region(&self, name: &str) -> Option<&DocumentRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        validate_name(&self.name)?;
        self.regions.iter().try_for_each(DocumentRegion::validate)
    }

    pub fn save(&self, path: &Path) -> Result<(), TemplateError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let data = fs::read_to_string(path)?;
        let template: DocumentTemplate = serde_json::from_str(&data)?;
        template.validate()?;
        Ok(template)
    }

    /// Single full-page region tuned for thermal receipts.
    pub fn romanian_receipt() -> Self {
        let mut t = DocumentTemplate::new(DEFAULT_TEMPLATE, "receipt");
        t.add_region(
            DocumentRegion::new(FULL_TEXT_REGION, [0.0, 0.0, 100.0, 100.0])
                .with_threshold(0.5)
                .with_preprocessing(PreprocessVariant::Receipt),
        );
        t
    }

    /// Header / details / totals bands of a typical invoice.
    pub fn invoice() -> Self {
        let mut t = DocumentTemplate::new("invoice", "invoice");
        t.add_region(DocumentRegion::new("header", [0.0, 0.0, 100.0, 20.0]).with_threshold(0.6));
        t.add_region(DocumentRegion::new("details", [0.0, 20.0, 100.0, 70.0]).with_threshold(0.5));
        t.add_region(
            DocumentRegion::new("totals", [50.0, 70.0, 100.0, 100.0])
                .with_threshold(0.6)
                .with_data_type(DataType::Currency),
        );
        t
    }
}

fn validate_name(name: &str) -> Result<(), TemplateError> {
    let bad = name.trim().is_empty()
        || name.contains(['/', '\\'])
        || name == "."
        || name == "..";
    if bad {
        return Err(TemplateError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Regions are stored on disk as an object keyed by region name, in template order.
mod region_map {
    use super::DocumentRegion;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(regions: &[DocumentRegion], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(regions.len()))?;
        for region in regions {
            map.serialize_entry(&region.name, region)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<DocumentRegion>, D::Error> {
        struct RegionsVisitor;

        impl<'de> Visitor<'de> for RegionsVisitor {
            type Value = Vec<DocumentRegion>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of region name to region")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut regions = Vec::new();
                while let Some((name, mut region)) = access.next_entry::<String, DocumentRegion>()? {
                    region.name = name;
                    regions.push(region);
                }
                Ok(regions)
            }
        }

        deserializer.deserialize_map(RegionsVisitor)
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// In-memory template store backed by one JSON file per template.
///
/// Constructed once at startup and shared by `Arc`. Lookups take a read guard;
/// `register` serializes writers so two registrations never interleave on disk.
pub struct TemplateRegistry {
    dir: PathBuf,
    templates: RwLock<HashMap<String, Arc<DocumentTemplate>>>,
    writer: Mutex<()>,
}

impl TemplateRegistry {
    /// Load every template in `dir` (creating it if needed) and persist the
    /// built-in defaults the directory is missing.
    pub fn open(dir: &Path) -> Result<Self, TemplateError> {
        fs::create_dir_all(dir)?;
        let registry = Self {
            dir: dir.to_path_buf(),
            templates: RwLock::new(Self::load(dir)?),
            writer: Mutex::new(()),
        };
        registry.ensure_defaults()?;
        Ok(registry)
    }

    /// Read all `*.json` templates in `dir`. Unreadable or invalid files are
    /// skipped with a warning.
    pub fn load(dir: &Path) -> Result<HashMap<String, Arc<DocumentTemplate>>, TemplateError> {
        let mut templates = HashMap::new();
        for entry in fs::read_dir(dir)? {
            let path = match entry {
                Ok(e) => e.path(),
                Err(e) => {
                    warn!("Skipping unreadable template entry in {}: {e}", dir.display());
                    continue;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match DocumentTemplate::load(&path) {
                Ok(t) => {
                    debug!(template = %t.name, regions = t.regions.len(), "Loaded template");
                    templates.insert(t.name.clone(), Arc::new(t));
                }
                Err(e) => warn!("Error loading template {}: {e}", path.display()),
            }
        }
        Ok(templates)
    }

    fn ensure_defaults(&self) -> Result<(), TemplateError> {
        for template in [DocumentTemplate::romanian_receipt(), DocumentTemplate::invoice()] {
            if !self.contains(&template.name) {
                info!(template = %template.name, "Creating default template");
                self.register(template)?;
            }
        }
        Ok(())
    }

    /// Validate, persist, and publish a template. Replaces any template of the same name.
    pub fn register(&self, template: DocumentTemplate) -> Result<Arc<DocumentTemplate>, TemplateError> {
        template.validate()?;
        let _guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        template.save(&self.path_for(&template.name))?;
        let template = Arc::new(template);
        self.templates
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(template.name.clone(), Arc::clone(&template));
        Ok(template)
    }

    /// The named template, or the default receipt template when the name is unknown.
    pub fn get(&self, name: &str) -> Arc<DocumentTemplate> {
        let templates = self.templates.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(t) = templates.get(name) {
            return Arc::clone(t);
        }
        debug!(requested = name, "Unknown template, using {DEFAULT_TEMPLATE}");
        templates
            .get(DEFAULT_TEMPLATE)
            .cloned()
            .unwrap_or_else(|| Arc::new(DocumentTemplate::romanian_receipt()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .templates
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

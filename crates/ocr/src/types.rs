use std::collections::BTreeMap;

use chrono::NaiveDate;
use docscan_core::Money;
use serde::{Deserialize, Serialize};

/// Pixel rectangle reported by the recognizer, relative to the image it was given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// A word that survived confidence filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWord {
    pub text: String,
    /// Normalized to 0.0–1.0.
    pub confidence: f32,
    pub bbox: BBox,
}

/// Text recognized inside one template region (or the whole page).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionExtraction {
    pub text: String,
    /// Mean confidence of the surviving words (0.0–1.0), 0.0 when none survive.
    pub confidence: f32,
    pub word_count: usize,
    pub raw_words: Vec<RawWord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegionExtraction {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A zero-confidence result recording why recognition failed.
    pub fn failed(error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Self::default() }
    }

    /// Build from surviving words; text keeps the recognizer's line breaks.
    pub fn from_words(words: Vec<(RawWord, u32)>) -> Self {
        if words.is_empty() {
            return Self::empty();
        }
        let mut text = String::new();
        let mut current_line = None;
        for (word, line) in &words {
            match current_line {
                None => {}
                Some(prev) if prev == *line => text.push(' '),
                Some(_) => text.push('\n'),
            }
            text.push_str(&word.text);
            current_line = Some(*line);
        }
        let raw_words: Vec<RawWord> = words.into_iter().map(|(w, _)| w).collect();
        let confidence = raw_words.iter().map(|w| w.confidence).sum::<f32>() / raw_words.len() as f32;
        Self {
            text,
            confidence: confidence.clamp(0.0, 1.0),
            word_count: raw_words.len(),
            raw_words,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Cash,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Cash => write!(f, "cash"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,
    pub price: Money,
}

/// Structured fields recovered from a receipt or invoice.
///
/// Every field is independently optional: a missing date never prevents the
/// total from being reported and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    pub vendor_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub total: Option<Money>,
    pub subtotal: Option<Money>,
    pub tax: Option<Money>,
    pub tax_rate: Option<u8>,
    pub currency: String,
    pub receipt_number: Option<String>,
    pub fiscal_code: Option<String>,
    pub client_name: Option<String>,
    pub client_cui: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub items: Vec<LineItem>,
}

impl Default for ParsedReceipt {
    fn default() -> Self {
        Self {
            vendor_name: None,
            date: None,
            time: None,
            total: None,
            subtotal: None,
            tax: None,
            tax_rate: None,
            currency: "RON".to_string(),
            receipt_number: None,
            fiscal_code: None,
            client_name: None,
            client_cui: None,
            payment_method: None,
            items: Vec::new(),
        }
    }
}

/// Which rule produced a parsed field, and how much that rule is trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub rule: String,
    pub confidence: f32,
}

impl FieldProvenance {
    pub fn new(rule: &str, confidence: f32) -> Self {
        Self { rule: rule.to_string(), confidence: confidence.clamp(0.0, 1.0) }
    }
}

/// Parser output: the record plus per-field provenance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub receipt: ParsedReceipt,
    pub provenance: BTreeMap<String, FieldProvenance>,
}

/// Everything produced for a successfully decoded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub template: String,
    pub document_type: String,
    pub image_size: ImageSize,
    #[serde(with = "ordered_map")]
    pub regions: Vec<(String, RegionExtraction)>,
    pub overall_confidence: f32,
    pub parsed_data: ParsedReceipt,
    pub field_provenance: BTreeMap<String, FieldProvenance>,
    pub full_text: String,
}

impl DocumentExtraction {
    pub fn region(&self, name: &str) -> Option<&RegionExtraction> {
        self.regions.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }
}

/// Result contract for one document. Failures carry `error` and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub success: bool,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extraction: Option<DocumentExtraction>,
}

impl DocumentResult {
    pub fn succeeded(file: impl Into<String>, extraction: DocumentExtraction) -> Self {
        Self { success: true, file: file.into(), error: None, extraction: Some(extraction) }
    }

    pub fn failed(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self { success: false, file: file.into(), error: Some(error.into()), extraction: None }
    }

    pub fn overall_confidence(&self) -> f32 {
        self.extraction.as_ref().map_or(0.0, |e| e.overall_confidence)
    }

    /// Whether a human should look at this result before it is trusted.
    pub fn needs_review(&self) -> bool {
        !self.success || self.overall_confidence() < 0.7
    }
}

/// Serde adapter writing `Vec<(String, V)>` as a JSON object in vector order.
pub(crate) mod ordered_map {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;
    use std::marker::PhantomData;

    pub fn serialize<S, V>(entries: &[(String, V)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = Vec<(String, V)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of named entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of value a document region is expected to hold.
///
/// Drives both the recognizer character whitelist and text cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Text,
    Number,
    Date,
    Currency,
    Phone,
}

impl DataType {
    /// Characters a recognizer should restrict itself to, if any.
    pub fn char_whitelist(self) -> Option<&'static str> {
        match self {
            DataType::Text => None,
            DataType::Number => Some("0123456789.,"),
            DataType::Currency => Some("0123456789.,RONLEIEUR "),
            DataType::Date => Some("0123456789./-"),
            DataType::Phone => Some("0123456789+()- "),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Text => write!(f, "text"),
            DataType::Number => write!(f, "number"),
            DataType::Date => write!(f, "date"),
            DataType::Currency => write!(f, "currency"),
            DataType::Phone => write!(f, "phone"),
        }
    }
}

impl std::str::FromStr for DataType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(DataType::Text),
            "number" => Ok(DataType::Number),
            "date" => Ok(DataType::Date),
            "currency" => Ok(DataType::Currency),
            "phone" => Ok(DataType::Phone),
            other => Err(format!("Unknown data type: '{other}'")),
        }
    }
}

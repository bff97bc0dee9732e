use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A two-decimal monetary amount. Currency is tracked separately by callers.
///
/// Serialized as a plain JSON number (`125.5`), which is what downstream
/// consumers of extraction results expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::from(100)).round().to_i64().unwrap_or(i64::MAX)
    }

    fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    /// True when the amount has no fractional part (`2025.00`).
    pub fn is_whole(self) -> bool {
        self.0.fract().is_zero()
    }

    /// Integer part, truncated toward zero.
    pub fn whole_part(self) -> i64 {
        self.0.trunc().to_i64().unwrap_or(i64::MAX)
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Parse an amount as printed on a receipt.
    ///
    /// The last `.` or `,` is the decimal separator; any earlier separators are
    /// thousands grouping (`1.234,56`, `1,234.56`). Whitespace is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return None;
        }
        let normalized = match compact.rfind(['.', ',']) {
            Some(idx) => {
                let (int_part, frac_part) = compact.split_at(idx);
                let int_digits: String = int_part.chars().filter(|c| *c != '.' && *c != ',').collect();
                format!("{int_digits}.{}", &frac_part[1..])
            }
            None => compact,
        };
        if !normalized.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
            return None;
        }
        Decimal::from_str(&normalized).ok().map(Money::from_decimal)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Decimal::from_f64(value)
            .map(Money::from_decimal)
            .ok_or_else(|| serde::de::Error::custom(format!("amount out of range: {value}")))
    }
}

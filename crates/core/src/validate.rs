use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::data_type::DataType;

/// Sanity checks shared by the field parser and API callers.
pub struct DataValidator;

impl DataValidator {
    /// True iff `date` is a real calendar date in `YYYY-MM-DD` form.
    pub fn validate_date(date: &str) -> bool {
        !date.is_empty() && NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
    }

    /// Range check applied to every date candidate found on a receipt.
    pub fn is_plausible_date(year: i32, month: u32, day: u32) -> bool {
        (2000..=2030).contains(&year) && (1..=12).contains(&month) && (1..=31).contains(&day)
    }

    /// True iff `amount` parses as a plain decimal number.
    pub fn validate_amount(amount: &str) -> bool {
        let trimmed = amount.trim();
        !trimmed.is_empty() && Decimal::from_str(trimmed).is_ok()
    }

    /// Strip characters that cannot belong to a value of `data_type`.
    pub fn clean_text(text: &str, data_type: DataType) -> String {
        let keep = |allowed: &str| -> String {
            text.chars()
                .filter(|c| c.is_ascii_digit() || allowed.contains(*c))
                .collect()
        };
        match data_type {
            DataType::Number | DataType::Currency => keep(".,"),
            DataType::Date => keep("./-"),
            DataType::Phone => keep("+()-"),
            DataType::Text => text.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

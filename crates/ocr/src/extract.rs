use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use docscan_core::{DataValidator, Money};
use regex::{Captures, Regex};

use crate::template::FULL_TEXT_REGION;
use crate::types::{FieldProvenance, LineItem, ParseOutcome, ParsedReceipt, PaymentMethod, RegionExtraction};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

/// Decimal amount with two fraction digits, optionally thousands-grouped.
macro_rules! amount {
    () => {
        r"(\d{1,3}(?:[.,]\d{3})+[.,]\d{2}|\d{1,6}[.,]\d{2})\b"
    };
}

re!(re_amount, amount!());
re!(re_numeric_line, r"^[\d\s.,:/-]+$");

re!(re_vendor_legal_form, r"(?i)\bS\.?C\.?\s+([A-Z ]+(?:S\.?R\.?L\.?|S\.?A\.?))");
re!(re_vendor_retailer, r"(?i)\b(OMV|PETROM|KAUFLAND|LIDL|MEGA *IMAGE|CARREFOUR|PROFI|PENNY)\b");
re!(re_vendor_suffix_line, r"(?im)^([A-Z][A-Z ]{3,}(?:S\.?R\.?L\b\.?|S\.?A\b\.?|INC\b|CO\b))");

re!(re_fiscal_cif, r"(?i)\bC\.?I\.?F\.?[:\s]*(?:R[O0])?(\d{6,10})");
re!(re_fiscal_cui, r"(?i)\bCUI[:\s]*(?:R[O0])?(\d{6,10})");
re!(re_fiscal_cod, r"(?i)\bCOD\s+FISCAL[:\s]*(?:R[O0])?(\d{6,10})");
re!(re_fiscal_bare, r"(?i)\bR[O0](\d{8})\b");

re!(re_client_name, r"(?i)\b(?:NUME\s+)?CLIENT\b[: ]*([A-Z ]+(?:S\.?R\.?L\.?|S\.?A\.?)?)");
re!(re_client_code, r"(?i)\bCLIENT\s+C\.?(?:U\.?I|I\.?F)\.?[:\s/]*(?:R[O0])?(\d{6,10})");

re!(re_date_dmy, r"(\d{2})[./-](\d{2})[./-](\d{4})");
re!(re_date_ymd, r"(\d{4})[./-](\d{2})[./-](\d{2})");
re!(re_date_dropped_digit, r"0?(\d{2,3})[.\s]+(\d{1,2})[.\s]+(\d{2})\s+\d{1,2}");
re!(re_date_dropped_digit_short, r"0(\d{2})[.\s]+(\d{1,2})\.(\d{2})\b");
re!(re_date_spaced_dmy, r"(\d{1,2})[./-]\s*(\d{1,2})[./-]\s*20(\d{2})");
re!(re_date_spaced_ymd, r"20(\d{2})[.\s]+(\d{1,2})[.\s]+(\d{1,2})");

re!(re_time, r"(\d{1,2}):(\d{2})(?::(\d{2}))?");

re!(re_total_label, concat!(r"(?i)\bTOTAL[S:\s]*", amount!(), r"\s*(?:RON|LEI|A)?"));
re!(re_total_de_plata, concat!(r"(?i)\bTOTAL\s+(?:DE\s+)?PLATA[:\s]*", amount!()));
re!(re_total_card, concat!(r"(?i)\bCARTE\s+CREDIT[:\s]*", amount!()));
re!(re_total_suma, concat!(r"(?i)\bSUMA[:\s]*", amount!()));
re!(re_total_due, concat!(r"(?i)\bDE\s+PLATA[:\s]*", amount!()));
// Leading guard keeps the tail of `1234,50` or `1.234,50` from matching on its own.
re!(re_total_currency_suffix, r"(?i)(?:^|[^\d.,])(\d{2,3}[.,]\d{2})\s*(?:RON|LEI|A)\b");
re!(re_total_near_quantity, r"(?:^|[^\d.,])(\d{2,3}[.,]\d{2})\s*[xX*]\s*\d");

re!(re_subtotal, concat!(r"(?i)\bSUBTOTAL[:\s]*", amount!()));
re!(re_subtotal_fara_tva, concat!(r"(?i)\bTOTAL\s+FARA\s+TVA[:\s]*", amount!()));

re!(re_tax_total_taxe, concat!(r"(?i)\bTOTAL\s+TAXE[:\s]*", amount!()));
re!(re_tax_tva, concat!(r"(?i)\bTVA[:\s]*", amount!()));
re!(re_tax_tva_dotted, concat!(r"(?i)\bT\.?V\.?A\.?[:\s]*", amount!()));
re!(re_tax_vat_class, concat!(r"(?i)\bA-\d+[.,]?\d*%[:\s]*", amount!()));

re!(re_rate_vat_class, r"(?i)\bA-(\d{1,2})[.,]?\d*%");
re!(re_rate_before_tva, r"(?i)\b(\d{1,2})\s*%\s*TVA");
re!(re_rate_after_tva, r"(?i)\bTVA\s*(\d{1,2})\s*%");

re!(re_receipt_transaction, r"(?i)\bNUMAR\s+TRANZACTIE[:\s]*(\d+)");
re!(re_receipt_pos, r"(?i)\bNR\.?\s*POS[:\s]*(\d+)");
re!(re_receipt_bon, r"(?i)\bBON\s+FISCAL\s*#?\s*(\d+)");
re!(re_receipt_nr, r"(?i)\b(?:NR|NUMAR)[.:\s]*(\d{4,})");

re!(re_currency, r"(?i)\b(RON|LEI|EUR|USD)\b");

re!(re_payment_card, r"(?i)\b(VISA|MASTERCARD|CONTACTLESS|CARD|POS|CREDIT)\b");
re!(re_payment_cash, r"(?i)\b(NUMERAR|CASH|BANI)\b");

re!(re_item_quantity, r"^\*?\s*\d*\s*([A-Z][A-Z ]+?)\s+(\d+[.,]\d+)\s*L?\s*[xX*]\s*(\d+[.,]\d+)\s+(\d+[.,]\d+)");
re!(re_item_priced, r"^([A-Za-z][A-Za-z ]{2,30}?) +(\d{1,6}[.,]\d{2})\s*$");

// ── Rule tables ──────────────────────────────────────────────────────────────

/// One step of a field cascade: every match of `pattern` is offered to
/// `parse`; the first value it accepts wins the field.
struct Rule<T> {
    name: &'static str,
    confidence: f32,
    pattern: fn() -> &'static Regex,
    parse: fn(&Captures) -> Option<T>,
}

impl<T> Rule<T> {
    fn first(&self, text: &str) -> Option<T> {
        (self.pattern)().captures_iter(text).find_map(|c| (self.parse)(&c))
    }

    fn all<'a>(&'a self, text: &'a str) -> impl Iterator<Item = T> + 'a
    where
        T: 'a,
    {
        (self.pattern)().captures_iter(text).filter_map(|c| (self.parse)(&c))
    }
}

static VENDOR_RULES: &[Rule<String>] = &[
    Rule { name: "legal_form", confidence: 0.90, pattern: re_vendor_legal_form, parse: trimmed_group },
    Rule { name: "known_retailer", confidence: 0.85, pattern: re_vendor_retailer, parse: trimmed_group },
    Rule { name: "legal_suffix_line", confidence: 0.75, pattern: re_vendor_suffix_line, parse: trimmed_group },
];

static FISCAL_CODE_RULES: &[Rule<String>] = &[
    Rule { name: "cif_label", confidence: 0.95, pattern: re_fiscal_cif, parse: trimmed_group },
    Rule { name: "cui_label", confidence: 0.95, pattern: re_fiscal_cui, parse: trimmed_group },
    Rule { name: "cod_fiscal_label", confidence: 0.90, pattern: re_fiscal_cod, parse: trimmed_group },
    Rule { name: "ro_prefix", confidence: 0.70, pattern: re_fiscal_bare, parse: trimmed_group },
];

static CLIENT_NAME_RULES: &[Rule<String>] = &[
    Rule { name: "client_label", confidence: 0.70, pattern: re_client_name, parse: client_name },
];

static CLIENT_CODE_RULES: &[Rule<String>] = &[
    Rule { name: "client_code_label", confidence: 0.90, pattern: re_client_code, parse: trimmed_group },
];

/// Exact patterns first; the fragment patterns only run when none validate.
static DATE_RULES: &[Rule<NaiveDate>] = &[
    Rule { name: "dmy", confidence: 0.95, pattern: re_date_dmy, parse: date_dmy },
    Rule { name: "ymd", confidence: 0.90, pattern: re_date_ymd, parse: date_ymd },
    Rule { name: "dropped_year_digit", confidence: 0.60, pattern: re_date_dropped_digit, parse: date_two_digit_year },
    Rule { name: "dropped_year_digit_short", confidence: 0.55, pattern: re_date_dropped_digit_short, parse: date_two_digit_year },
    Rule { name: "spaced_dmy", confidence: 0.65, pattern: re_date_spaced_dmy, parse: date_spaced_dmy },
    Rule { name: "spaced_ymd", confidence: 0.60, pattern: re_date_spaced_ymd, parse: date_two_digit_year },
];

static TIME_RULES: &[Rule<String>] = &[
    Rule { name: "clock", confidence: 0.90, pattern: re_time, parse: clock_time },
];

static TOTAL_RULES: &[Rule<Money>] = &[
    Rule { name: "total_label", confidence: 0.90, pattern: re_total_label, parse: total_amount },
    Rule { name: "total_de_plata", confidence: 0.90, pattern: re_total_de_plata, parse: total_amount },
    Rule { name: "card_payment", confidence: 0.85, pattern: re_total_card, parse: total_amount },
    Rule { name: "suma", confidence: 0.80, pattern: re_total_suma, parse: total_amount },
    Rule { name: "de_plata", confidence: 0.80, pattern: re_total_due, parse: total_amount },
    Rule { name: "currency_suffix", confidence: 0.60, pattern: re_total_currency_suffix, parse: total_amount },
    Rule { name: "near_quantity", confidence: 0.50, pattern: re_total_near_quantity, parse: total_amount },
];

static SUBTOTAL_RULES: &[Rule<Money>] = &[
    Rule { name: "subtotal_label", confidence: 0.85, pattern: re_subtotal, parse: tax_amount },
    Rule { name: "total_fara_tva", confidence: 0.80, pattern: re_subtotal_fara_tva, parse: tax_amount },
];

static TAX_RULES: &[Rule<Money>] = &[
    Rule { name: "total_taxe", confidence: 0.85, pattern: re_tax_total_taxe, parse: tax_amount },
    Rule { name: "tva_label", confidence: 0.85, pattern: re_tax_tva, parse: tax_amount },
    Rule { name: "tva_dotted", confidence: 0.80, pattern: re_tax_tva_dotted, parse: tax_amount },
    Rule { name: "vat_class", confidence: 0.70, pattern: re_tax_vat_class, parse: tax_amount },
];

static TAX_RATE_RULES: &[Rule<u8>] = &[
    Rule { name: "vat_class", confidence: 0.85, pattern: re_rate_vat_class, parse: tax_rate },
    Rule { name: "percent_before_tva", confidence: 0.80, pattern: re_rate_before_tva, parse: tax_rate },
    Rule { name: "percent_after_tva", confidence: 0.80, pattern: re_rate_after_tva, parse: tax_rate },
];

static RECEIPT_NUMBER_RULES: &[Rule<String>] = &[
    Rule { name: "transaction_number", confidence: 0.85, pattern: re_receipt_transaction, parse: trimmed_group },
    Rule { name: "pos_number", confidence: 0.80, pattern: re_receipt_pos, parse: trimmed_group },
    Rule { name: "bon_fiscal", confidence: 0.80, pattern: re_receipt_bon, parse: trimmed_group },
    Rule { name: "nr_label", confidence: 0.50, pattern: re_receipt_nr, parse: trimmed_group },
];

static CURRENCY_RULES: &[Rule<String>] = &[
    Rule { name: "currency_code", confidence: 0.90, pattern: re_currency, parse: currency_code },
];

static PAYMENT_RULES: &[Rule<PaymentMethod>] = &[
    Rule { name: "card_vocabulary", confidence: 0.80, pattern: re_payment_card, parse: card_payment },
    Rule { name: "cash_vocabulary", confidence: 0.80, pattern: re_payment_cash, parse: cash_payment },
];

const TOTAL_RANGE: (i64, i64) = (50, 999_999);
const TAX_RANGE: (i64, i64) = (1, 9_999_999);
const ITEM_RANGE: (i64, i64) = (1, 999_999);
const TAX_RATE_RANGE: std::ops::RangeInclusive<u8> = 1..=30;

const EXCLUDED_ITEM_WORDS: &[&str] = &[
    "TOTAL", "TVA", "SUMA", "PLATA", "REST", "TAXE", "SUBTOTAL", "CREDIT", "DEBIT", "CASIER", "NUMERAR",
    "CARD", "BON", "FISCAL",
];

// ── Public extraction API ─────────────────────────────────────────────────────

pub struct Extractor;

impl Extractor {
    /// The text the parser should see: the full-text region when it has any,
    /// otherwise every region's text in template order.
    pub fn parser_input(regions: &[(String, RegionExtraction)]) -> String {
        if let Some((_, full)) = regions.iter().find(|(name, _)| name == FULL_TEXT_REGION) {
            if !full.text.trim().is_empty() {
                return full.text.clone();
            }
        }
        regions
            .iter()
            .map(|(_, r)| r.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Undo common glyph confusions next to digits and tidy whitespace.
    ///
    /// `l` and `|` touching a digit become `1`, `O` touching a digit becomes
    /// `0`, repeated until nothing changes. Horizontal whitespace collapses to
    /// one space and blank lines are dropped; line breaks survive.
    pub fn normalize(text: &str) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        loop {
            let mut changed = false;
            for i in 0..chars.len() {
                let replacement = match chars[i] {
                    'l' | '|' => '1',
                    'O' => '0',
                    _ => continue,
                };
                let touches_digit = (i > 0 && chars[i - 1].is_ascii_digit())
                    || chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
                if touches_digit {
                    chars[i] = replacement;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        let fixed: String = chars.into_iter().collect();
        fixed
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse raw recognized text into a receipt record. Every field is best-effort.
    pub fn parse(raw_text: &str) -> ParseOutcome {
        let text = Self::normalize(raw_text);
        let mut provenance = BTreeMap::new();
        let mut receipt = ParsedReceipt::default();

        receipt.vendor_name = cascade(&text, VENDOR_RULES, "vendor_name", &mut provenance)
            .or_else(|| Self::vendor_from_first_lines(&text, &mut provenance));
        receipt.fiscal_code = cascade(&text, FISCAL_CODE_RULES, "fiscal_code", &mut provenance);
        receipt.client_name = cascade(&text, CLIENT_NAME_RULES, "client_name", &mut provenance);
        receipt.client_cui = cascade(&text, CLIENT_CODE_RULES, "client_cui", &mut provenance);
        receipt.date = cascade(&text, DATE_RULES, "date", &mut provenance);
        receipt.time = cascade(&text, TIME_RULES, "time", &mut provenance);
        receipt.total = Self::extract_total(&text, &mut provenance);
        receipt.subtotal = cascade(&text, SUBTOTAL_RULES, "subtotal", &mut provenance);
        receipt.tax = cascade(&text, TAX_RULES, "tax", &mut provenance);
        receipt.tax_rate = cascade(&text, TAX_RATE_RULES, "tax_rate", &mut provenance);
        receipt.receipt_number = cascade(&text, RECEIPT_NUMBER_RULES, "receipt_number", &mut provenance);
        if let Some(currency) = cascade(&text, CURRENCY_RULES, "currency", &mut provenance) {
            receipt.currency = currency;
        }
        receipt.payment_method = cascade(&text, PAYMENT_RULES, "payment_method", &mut provenance);
        receipt.items = Self::extract_items(&text);
        if !receipt.items.is_empty() {
            provenance.insert("items".to_string(), FieldProvenance::new("line_patterns", 0.6));
        }

        ParseOutcome { receipt, provenance }
    }

    // ── Vendor ────────────────────────────────────────────────────────────────

    fn vendor_from_first_lines(text: &str, provenance: &mut BTreeMap<String, FieldProvenance>) -> Option<String> {
        let line = text
            .lines()
            .take(5)
            .find(|l| l.chars().count() > 5 && !re_numeric_line().is_match(l))?;
        provenance.insert("vendor_name".to_string(), FieldProvenance::new("first_line", 0.4));
        Some(line.chars().take(50).collect())
    }

    // ── Total ─────────────────────────────────────────────────────────────────

    /// Every rule contributes candidates; the winner is chosen by [`pick_total`].
    fn extract_total(text: &str, provenance: &mut BTreeMap<String, FieldProvenance>) -> Option<Money> {
        let mut candidates: Vec<(Money, &'static str, f32)> = TOTAL_RULES
            .iter()
            .flat_map(|rule| rule.all(text).map(move |amount| (amount, rule.name, rule.confidence)))
            .collect();

        if candidates.is_empty() {
            candidates = unlabeled_amounts(text)
                .into_iter()
                .map(|amount| (amount, "any_amount", 0.4))
                .collect();
        }

        let amounts: Vec<Money> = candidates.iter().map(|(a, _, _)| *a).collect();
        let total = pick_total(&amounts)?;
        if let Some((_, rule, confidence)) = candidates.iter().find(|(a, _, _)| *a == total) {
            provenance.insert("total".to_string(), FieldProvenance::new(rule, *confidence));
        }
        Some(total)
    }

    // ── Line items ────────────────────────────────────────────────────────────

    fn extract_items(text: &str) -> Vec<LineItem> {
        let mut items = Vec::new();
        for line in text.lines() {
            if let Some(c) = re_item_quantity().captures(line) {
                let name = c[1].trim().to_string();
                let quantity = c[2].replace(',', ".").parse::<f64>().ok();
                let unit_price = Money::parse(&c[3]);
                if let Some(price) = Money::parse(&c[4]) {
                    if !is_excluded_item(&name) {
                        items.push(LineItem { name, quantity, unit_price, price });
                    }
                }
                continue;
            }
            if let Some(c) = re_item_priced().captures(line) {
                let name = c[1].trim().to_string();
                if let Some(price) = Money::parse(&c[2]).filter(|p| in_range(*p, ITEM_RANGE)) {
                    if !is_excluded_item(&name) {
                        items.push(LineItem { name, quantity: None, unit_price: None, price });
                    }
                }
            }
        }
        items
    }
}

fn cascade<T>(
    text: &str,
    rules: &[Rule<T>],
    field: &str,
    provenance: &mut BTreeMap<String, FieldProvenance>,
) -> Option<T> {
    rules.iter().find_map(|rule| {
        let value = rule.first(text)?;
        provenance.insert(field.to_string(), FieldProvenance::new(rule.name, rule.confidence));
        Some(value)
    })
}

/// Tie-break: a value that recurs wins (earliest on equal counts); otherwise
/// the largest in [10, 9999.99]; otherwise the largest.
pub fn pick_total(candidates: &[Money]) -> Option<Money> {
    let mut counts: Vec<(Money, usize)> = Vec::new();
    for amount in candidates {
        match counts.iter_mut().find(|(a, _)| a == amount) {
            Some((_, n)) => *n += 1,
            None => counts.push((*amount, 1)),
        }
    }
    let mut most_common: Option<(Money, usize)> = None;
    for &(amount, n) in &counts {
        if most_common.map_or(true, |(_, best)| n > best) {
            most_common = Some((amount, n));
        }
    }
    match most_common {
        None => None,
        Some((amount, n)) if n > 1 => Some(amount),
        Some(_) => candidates
            .iter()
            .copied()
            .filter(|a| in_range(*a, (1_000, 999_999)))
            .max()
            .or_else(|| candidates.iter().copied().max()),
    }
}

/// Integer-valued amounts that read as a calendar year or a long numeric id.
pub fn is_year_or_id(amount: Money) -> bool {
    if !amount.is_whole() {
        return false;
    }
    let whole = amount.whole_part();
    (1900..=2099).contains(&whole) || whole >= 100_000
}

/// Decimal tokens in the total range that are not pieces of a date.
fn unlabeled_amounts(text: &str) -> Vec<Money> {
    let is_sep = |c: char| matches!(c, '.' | '/' | '-');
    re_amount()
        .find_iter(text)
        .filter(|m| {
            let mut before = text[..m.start()].chars().rev();
            let joined_before = before.next().is_some_and(is_sep) && before.next().is_some_and(|c| c.is_ascii_digit());
            let mut after = text[m.end()..].chars();
            let joined_after = after.next().is_some_and(is_sep) && after.next().is_some_and(|c| c.is_ascii_digit());
            !joined_before && !joined_after
        })
        .filter_map(|m| Money::parse(m.as_str()))
        .filter(|a| in_range(*a, TOTAL_RANGE) && !is_year_or_id(*a))
        .collect()
}

fn in_range(amount: Money, (min_cents, max_cents): (i64, i64)) -> bool {
    (min_cents..=max_cents).contains(&amount.to_cents())
}

fn is_excluded_item(name: &str) -> bool {
    let upper = name.to_uppercase();
    EXCLUDED_ITEM_WORDS.iter().any(|w| upper.contains(w))
}

// ── Capture parsers ───────────────────────────────────────────────────────────

fn trimmed_group(c: &Captures) -> Option<String> {
    let value = c.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn client_name(c: &Captures) -> Option<String> {
    let name = trimmed_group(c)?;
    let first_word = name.split_whitespace().next().unwrap_or_default().to_uppercase();
    if name.len() < 2 || matches!(first_word.as_str(), "C" | "CUI" | "CIF") {
        return None;
    }
    Some(name)
}

fn total_amount(c: &Captures) -> Option<Money> {
    Money::parse(c.get(1)?.as_str()).filter(|a| in_range(*a, TOTAL_RANGE) && !is_year_or_id(*a))
}

fn tax_amount(c: &Captures) -> Option<Money> {
    Money::parse(c.get(1)?.as_str()).filter(|a| in_range(*a, TAX_RANGE))
}

fn tax_rate(c: &Captures) -> Option<u8> {
    c.get(1)?.as_str().parse::<u8>().ok().filter(|r| TAX_RATE_RANGE.contains(r))
}

fn currency_code(c: &Captures) -> Option<String> {
    match c.get(1)?.as_str().to_uppercase().as_str() {
        "LEI" | "RON" => Some("RON".to_string()),
        other => Some(other.to_string()),
    }
}

fn card_payment(_: &Captures) -> Option<PaymentMethod> {
    Some(PaymentMethod::Card)
}

fn cash_payment(_: &Captures) -> Option<PaymentMethod> {
    Some(PaymentMethod::Cash)
}

fn clock_time(c: &Captures) -> Option<String> {
    let hour: u32 = c.get(1)?.as_str().parse().ok()?;
    let minute: u32 = c.get(2)?.as_str().parse().ok()?;
    (hour <= 23 && minute <= 59).then(|| c[0].to_string())
}

fn number(c: &Captures, i: usize) -> Option<u32> {
    c.get(i)?.as_str().parse().ok()
}

fn valid_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !DataValidator::is_plausible_date(year, month, day) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn date_dmy(c: &Captures) -> Option<NaiveDate> {
    valid_date(number(c, 3)? as i32, number(c, 2)?, number(c, 1)?)
}

fn date_ymd(c: &Captures) -> Option<NaiveDate> {
    valid_date(number(c, 1)? as i32, number(c, 2)?, number(c, 3)?)
}

/// `25. 11.07` style fragments: the year keeps only its last two digits.
fn date_two_digit_year(c: &Captures) -> Option<NaiveDate> {
    let year_digits = c.get(1)?.as_str();
    let short_year: i32 = year_digits[year_digits.len().saturating_sub(2)..].parse().ok()?;
    valid_date(2000 + short_year, number(c, 2)?, number(c, 3)?)
}

fn date_spaced_dmy(c: &Captures) -> Option<NaiveDate> {
    valid_date(2000 + number(c, 3)? as i32, number(c, 2)?, number(c, 1)?)
}

// 🧾 Receipt Parser Framework - structured receipt text → validated line items
//
// Three input shapes reach us: JSON emitted by an upstream extractor (often
// wrapped in a fenced code block), CSV exports, and plain "product price"
// lines. Whatever the shape, items are validated here once and trusted
// downstream.

use crate::categories::{normalize_category, Categorizer, CategoryDelta};
use crate::error::{ensure_positive_amount, EngineError, EngineResult};
use crate::ingestion::ReceiptEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

// ============================================================================
// CORE TYPES
// ============================================================================

/// One validated receipt line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub product: String,
    pub price: f64,
    pub category: String,
}

impl ParsedItem {
    /// Apply defaults and validation to loosely-typed upstream fields
    pub fn from_parts(
        product: Option<&str>,
        price: Option<f64>,
        category: Option<&str>,
    ) -> EngineResult<Self> {
        let product = product
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("Unknown")
            .to_string();

        let price = price.unwrap_or(0.0);
        if !price.is_finite() || price < 0.0 {
            return Err(EngineError::InvalidAmount(price));
        }

        let category = normalize_category(category.unwrap_or_default()).to_string();

        Ok(ParsedItem {
            product,
            price,
            category,
        })
    }
}

/// Price as upstream extractors emit it: a number or a numeric string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Number(f64),
    Text(String),
}

impl RawPrice {
    fn value(&self) -> EngineResult<f64> {
        match self {
            RawPrice::Number(n) => Ok(*n),
            RawPrice::Text(s) => parse_price(s).ok_or(EngineError::InvalidAmount(f64::NAN)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default, alias = "name")]
    product: Option<String>,
    #[serde(default)]
    price: Option<RawPrice>,
    #[serde(default)]
    category: Option<String>,
}

impl RawItem {
    fn validate(self) -> EngineResult<ParsedItem> {
        let price = self.price.as_ref().map(RawPrice::value).transpose()?;
        ParsedItem::from_parts(self.product.as_deref(), price, self.category.as_deref())
    }
}

/// Parse "1.50", "1,50", "€1.50", "1.50 €", "1.50EUR"
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned = text
        .trim()
        .trim_start_matches('€')
        .trim_end_matches("EUR")
        .trim_end_matches("eur")
        .trim_end_matches('€')
        .trim()
        .replace(',', ".");

    cleaned.parse::<f64>().ok().filter(|p| p.is_finite())
}

// ============================================================================
// PARSER TRAIT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptFormat {
    Json,
    Csv,
    Lines,
}

pub trait ReceiptParser {
    fn format(&self) -> ReceiptFormat;

    /// Extract raw items; an empty result is reported as NoItemsFound by `parse`
    fn extract(&self, text: &str) -> EngineResult<Vec<ParsedItem>>;

    fn parse(&self, text: &str) -> EngineResult<Vec<ParsedItem>> {
        let items = self.extract(text)?;
        if items.is_empty() {
            debug!(format = ?self.format(), "parser produced no items");
            return Err(EngineError::NoItemsFound);
        }
        debug!(format = ?self.format(), count = items.len(), "parsed receipt items");
        Ok(items)
    }
}

/// Guess the input shape from its first meaningful characters
pub fn detect_format(text: &str) -> ReceiptFormat {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') || trimmed.starts_with("```") {
        return ReceiptFormat::Json;
    }

    let first_line = trimmed.lines().next().unwrap_or_default().to_lowercase();
    let header: Vec<&str> = first_line.split(',').map(str::trim).collect();
    if header.len() >= 2
        && (header.contains(&"product") || header.contains(&"name"))
        && header.contains(&"price")
    {
        return ReceiptFormat::Csv;
    }

    ReceiptFormat::Lines
}

pub fn get_parser(format: ReceiptFormat) -> Box<dyn ReceiptParser> {
    match format {
        ReceiptFormat::Json => Box::new(JsonItemsParser),
        ReceiptFormat::Csv => Box::new(CsvItemsParser),
        ReceiptFormat::Lines => Box::new(LineItemParser),
    }
}

pub fn detect_parser(text: &str) -> Box<dyn ReceiptParser> {
    get_parser(detect_format(text))
}

/// Detect the format and parse in one go
pub fn parse_receipt(text: &str) -> EngineResult<Vec<ParsedItem>> {
    if text.trim().is_empty() {
        return Err(EngineError::NoItemsFound);
    }
    detect_parser(text).parse(text)
}

// ============================================================================
// JSON PARSER
// ============================================================================

pub struct JsonItemsParser;

impl JsonItemsParser {
    /// Array of items, or an object carrying an "items" array
    fn items_from_value(value: serde_json::Value) -> Option<Vec<serde_json::Value>> {
        match value {
            serde_json::Value::Array(items) => Some(items),
            serde_json::Value::Object(mut map) => match map.remove("items") {
                Some(serde_json::Value::Array(items)) => Some(items),
                _ => None,
            },
            _ => None,
        }
    }

    /// Candidate JSON bodies: fenced blocks first, then the whole text
    fn candidates(text: &str) -> Vec<&str> {
        let mut candidates = Vec::new();

        if text.contains("```") {
            for part in text.split("```") {
                let part = part.trim();
                let part = part.strip_prefix("json").unwrap_or(part).trim();
                if part.starts_with('[') || part.starts_with('{') {
                    candidates.push(part);
                }
            }
        }

        candidates.push(text.trim());
        candidates
    }
}

impl ReceiptParser for JsonItemsParser {
    fn format(&self) -> ReceiptFormat {
        ReceiptFormat::Json
    }

    fn extract(&self, text: &str) -> EngineResult<Vec<ParsedItem>> {
        for candidate in Self::candidates(text) {
            let value: serde_json::Value = match serde_json::from_str(candidate) {
                Ok(value) => value,
                Err(e) => {
                    debug!(error = %e, "skipping non-JSON candidate");
                    continue;
                }
            };

            let Some(raw_items) = Self::items_from_value(value) else {
                continue;
            };

            // One bad item fails the receipt; dropping it would understate the total
            return raw_items
                .into_iter()
                .enumerate()
                .map(|(index, raw)| {
                    serde_json::from_value::<RawItem>(raw)
                        .map_err(|e| EngineError::MalformedReceipt(format!("item {}: {}", index + 1, e)))
                        .and_then(RawItem::validate)
                })
                .collect();
        }

        Ok(Vec::new())
    }
}

// ============================================================================
// CSV PARSER
// ============================================================================

pub struct CsvItemsParser;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "name")]
    product: String,
    price: String,
    #[serde(default)]
    category: Option<String>,
}

impl ReceiptParser for CsvItemsParser {
    fn format(&self) -> ReceiptFormat {
        ReceiptFormat::Csv
    }

    fn extract(&self, text: &str) -> EngineResult<Vec<ParsedItem>> {
        // Header names are matched case-insensitively
        let mut lines = text.trim_start().lines();
        let header = lines.next().unwrap_or_default().to_lowercase();
        let body: Vec<&str> = lines.collect();
        let normalized = format!("{}\n{}", header, body.join("\n"));

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(normalized.as_bytes());

        let mut items = Vec::new();
        for (index, result) in rdr.deserialize::<CsvRow>().enumerate() {
            let row = result
                .map_err(|e| EngineError::MalformedReceipt(format!("row {}: {}", index + 1, e)))?;

            let price = parse_price(&row.price).ok_or(EngineError::InvalidAmount(f64::NAN))?;
            items.push(ParsedItem::from_parts(
                Some(&row.product),
                Some(price),
                row.category.as_deref(),
            )?);
        }

        Ok(items)
    }
}

// ============================================================================
// PLAIN LINE PARSER
// ============================================================================

/// Summary lines printed on receipts that are not items
const SUMMARY_LABELS: &[&str] = &["total", "subtotal", "sum", "spolu", "suma", "celkom", "vat", "dph"];

pub struct LineItemParser;

impl LineItemParser {
    fn parse_line(line: &str) -> Option<(String, f64)> {
        let line = line
            .trim()
            .trim_end_matches('€')
            .trim_end_matches("EUR")
            .trim_end();
        let (product, price) = line.rsplit_once(char::is_whitespace)?;
        let product = product.trim().trim_end_matches(':').trim();
        if product.is_empty() {
            return None;
        }

        let lower = product.to_lowercase();
        if SUMMARY_LABELS.iter().any(|label| lower == *label) {
            return None;
        }

        let price = parse_price(price)?;
        if price < 0.0 {
            return None;
        }

        Some((product.to_string(), price))
    }
}

impl ReceiptParser for LineItemParser {
    fn format(&self) -> ReceiptFormat {
        ReceiptFormat::Lines
    }

    fn extract(&self, text: &str) -> EngineResult<Vec<ParsedItem>> {
        text.lines()
            .filter_map(Self::parse_line)
            .map(|(product, price)| ParsedItem::from_parts(Some(&product), Some(price), None))
            .collect()
    }
}

// ============================================================================
// RECEIPT ASSEMBLY
// ============================================================================

/// Item with the deltas its category contributed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedItem {
    pub product: String,
    pub price: f64,
    pub category: String,
    pub health_delta: i32,
    pub happiness_delta: i32,
}

/// Receipt ready to be submitted, plus the item detail kept for history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptDraft {
    pub event: ReceiptEvent,
    pub items: Vec<CategorizedItem>,
    pub source_hash: String,
}

impl ReceiptDraft {
    /// Total and deltas are summed over items; the first item names the receipt category
    pub fn build<C: Categorizer + ?Sized>(
        items: &[ParsedItem],
        raw_text: &str,
        categorizer: &C,
        occurred_at: DateTime<Utc>,
    ) -> EngineResult<ReceiptDraft> {
        let first = items.first().ok_or(EngineError::NoItemsFound)?;

        let categorized: Vec<CategorizedItem> = items
            .iter()
            .map(|item| {
                let delta = categorizer.deltas(&item.category);
                CategorizedItem {
                    product: item.product.clone(),
                    price: item.price,
                    category: item.category.clone(),
                    health_delta: delta.health,
                    happiness_delta: delta.happiness,
                }
            })
            .collect();

        let total = round_cents(items.iter().map(|item| item.price).sum());
        let total = ensure_positive_amount(total)?;

        let delta: CategoryDelta = categorized
            .iter()
            .map(|item| CategoryDelta::new(item.health_delta, item.happiness_delta))
            .sum();

        let event = ReceiptEvent::new(
            uuid::Uuid::new_v4().to_string(),
            total,
            first.category.clone(),
            delta.health,
            delta.happiness,
            occurred_at,
        )?;

        Ok(ReceiptDraft {
            event,
            items: categorized,
            source_hash: compute_source_hash(raw_text),
        })
    }
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// SHA-256 of the raw receipt text; equal hashes mean the same receipt was submitted again
pub fn compute_source_hash(raw_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_text.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

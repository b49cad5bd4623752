//! Validation pass over sanitized model output
//!
//! The extraction prompt asks for a strict shape, but models drift: numbers
//! arrive as strings, types as "debit", categories as "Groceries", dates in
//! local formats. Everything here is lenient and ends in a well-typed
//! `ParsedDocument`; only a transaction without a usable amount is dropped.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::models::{
    normalize_currency, parse_amount, parse_date, Category, ContentKind, DocType, ParsedDocument,
    Transaction, TransactionType,
};

/// Model reply before validation
///
/// Accepts either the requested object or a bare list of transactions.
/// The list variant comes first: a struct would also accept a sequence.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawReply {
    Transactions(Vec<Value>),
    Document(RawDocument),
}

impl RawReply {
    pub fn into_document(self) -> RawDocument {
        match self {
            RawReply::Document(doc) => doc,
            RawReply::Transactions(items) => RawDocument {
                transactions: Some(Value::Array(items)),
                ..RawDocument::default()
            },
        }
    }
}

/// Document-level fields as the model sent them
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub doc_type: Option<Value>,
    #[serde(default)]
    pub currency: Option<Value>,
    #[serde(default)]
    pub summary: Option<Value>,
    #[serde(default)]
    pub transactions: Option<Value>,
}

/// Transaction fields as the model sent them
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub date: Option<Value>,
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub currency: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default, rename = "type")]
    pub kind: Option<Value>,
}

/// What the normalizer needs to know about the call
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub content: ContentKind,
    pub home_currency: String,
    pub today: NaiveDate,
}

impl NormalizeContext {
    pub fn new(content: ContentKind, home_currency: &str) -> Self {
        Self {
            content,
            home_currency: normalize_currency(home_currency),
            today: crate::models::today(),
        }
    }
}

/// Turn a sanitized model reply into a `ParsedDocument`
pub fn normalize_document(raw: RawDocument, ctx: &NormalizeContext) -> ParsedDocument {
    let doc_type = text(&raw.doc_type)
        .and_then(|s| DocType::parse_lenient(&s))
        .unwrap_or_else(|| ctx.content.default_doc_type());

    let currency = text(&raw.currency)
        .map(|c| normalize_currency(&c))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| ctx.home_currency.clone());

    let items = match raw.transactions {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!("Ignoring non-list transactions field: {}", other);
            Vec::new()
        }
    };

    let mut transactions = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let raw_tx = match serde_json::from_value::<RawTransaction>(item) {
            Ok(tx) => tx,
            Err(e) => {
                warn!("Dropping transaction {}: not an object ({})", index, e);
                continue;
            }
        };
        match normalize_transaction(raw_tx, &currency, ctx.today) {
            Some(tx) => transactions.push(tx),
            None => warn!("Dropping transaction {}: missing or unparseable amount", index),
        }
    }

    let summary = text(&raw.summary)
        .unwrap_or_else(|| format!("{} with {} transactions", doc_type, transactions.len()));

    ParsedDocument {
        doc_type,
        currency,
        summary,
        transactions,
    }
}

fn normalize_transaction(
    raw: RawTransaction,
    doc_currency: &str,
    today: NaiveDate,
) -> Option<Transaction> {
    let signed = raw.amount.as_ref().and_then(amount_from_value)?;

    let kind = text(&raw.kind).and_then(|k| TransactionType::parse_lenient(&k));
    let date = text(&raw.date)
        .and_then(|d| parse_date(&d))
        .unwrap_or(today);
    let category = text(&raw.category)
        .map(|c| Category::from_label(&c))
        .unwrap_or(Category::Other);
    let currency = text(&raw.currency)
        .map(|c| normalize_currency(&c))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| doc_currency.to_string());
    let description = text(&raw.description).unwrap_or_default();

    Some(Transaction::new(
        date,
        description,
        signed,
        kind,
        currency,
        category,
    ))
}

/// Non-empty string form of a scalar JSON value
fn text(value: &Option<Value>) -> Option<String> {
    let s = match value.as_ref()? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Amount from a JSON number or a numeric string such as "1 245,50",
/// "$12.50" or "1,234.50 SEK"
fn amount_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let kept: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '-' | ',' | '.'))
                .collect();
            parse_amount(&unify_separators(kept.trim_end_matches([',', '.']))?)
        }
        _ => None,
    }
}

/// Rewrite grouped digits so only the decimal separator is left.
///
/// With both `,` and `.` present the last one is the decimal separator and
/// must occur once. A single separator repeated is digit grouping.
fn unify_separators(kept: &str) -> Option<String> {
    let decimal = match (kept.rfind(','), kept.rfind('.')) {
        (Some(c), Some(d)) => {
            if c > d {
                ','
            } else {
                '.'
            }
        }
        (Some(_), None) if kept.matches(',').count() > 1 => return Some(kept.replace(',', "")),
        (None, Some(_)) if kept.matches('.').count() > 1 => return Some(kept.replace('.', "")),
        _ => return Some(kept.to_string()),
    };
    if kept.matches(decimal).count() > 1 {
        return None;
    }
    let grouping = if decimal == ',' { '.' } else { ',' };
    Some(kept.replace(grouping, ""))
}

//! Data models for Tally

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Classify from a signed amount (negative means money out)
    pub fn from_sign(amount: f64) -> Self {
        if amount < 0.0 {
            Self::Expense
        } else {
            Self::Income
        }
    }

    /// Lenient parse that also understands common bank wording
    pub fn parse_lenient(value: &str) -> Option<Self> {
        let v = value.trim().to_lowercase();
        match v.as_str() {
            "income" | "credit" | "deposit" | "refund" | "inflow" | "in" => Some(Self::Income),
            "expense" | "debit" | "debet" | "payment" | "purchase" | "withdrawal" | "outflow"
            | "out" => Some(Self::Expense),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

/// Fixed spending/income categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Food,
    Transport,
    Shopping,
    Health,
    Education,
    Entertainment,
    Housing,
    Salary,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "Food",
            Self::Transport => "Transport",
            Self::Shopping => "Shopping",
            Self::Health => "Health",
            Self::Education => "Education",
            Self::Entertainment => "Entertainment",
            Self::Housing => "Housing",
            Self::Salary => "Salary",
            Self::Other => "Other",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Self::Food,
            Self::Transport,
            Self::Shopping,
            Self::Health,
            Self::Education,
            Self::Entertainment,
            Self::Housing,
            Self::Salary,
            Self::Other,
        ]
    }

    /// Map an arbitrary label (AI output, bank category column) onto the fixed set
    ///
    /// Exact names match case-insensitively; otherwise a small synonym table is
    /// consulted. Anything unrecognized is `Other`.
    pub fn from_label(label: &str) -> Self {
        let l = label.trim().to_lowercase();
        if l.is_empty() {
            return Self::Other;
        }

        if let Some(exact) = Self::all().iter().find(|c| c.as_str().to_lowercase() == l) {
            return *exact;
        }

        const SYNONYMS: &[(&[&str], Category)] = &[
            (
                &["grocer", "restaurant", "dining", "cafe", "coffee", "mat", "livsmedel"],
                Category::Food,
            ),
            (
                &["transit", "fuel", "gas station", "taxi", "uber", "parking", "travel", "resa"],
                Category::Transport,
            ),
            (&["clothing", "retail", "store", "kläder"], Category::Shopping),
            (
                &["pharmacy", "medical", "doctor", "dental", "apotek", "hälsa"],
                Category::Health,
            ),
            (&["school", "tuition", "course", "book", "utbildning"], Category::Education),
            (
                &["streaming", "movie", "cinema", "music", "game", "nöje"],
                Category::Entertainment,
            ),
            (
                &["rent", "mortgage", "utilities", "electricity", "hyra", "boende"],
                Category::Housing,
            ),
            (&["payroll", "wage", "income", "lön"], Category::Salary),
        ];

        let words: Vec<&str> = l
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        SYNONYMS
            .iter()
            .find(|(keys, _)| keys.iter().any(|k| contains_phrase(&words, k)))
            .map(|(_, cat)| *cat)
            .unwrap_or(Self::Other)
    }
}

/// Whole-word match of `phrase` in `words`, allowing plural endings
fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    const ENDINGS: &[&str] = &["", "s", "es", "ies", "y"];

    let keys: Vec<&str> = phrase.split(' ').collect();
    words.windows(keys.len()).any(|window| {
        window.iter().zip(&keys).all(|(word, key)| {
            word.strip_prefix(*key)
                .is_some_and(|rest| ENDINGS.contains(&rest))
        })
    })
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Invoice,
    BankStatement,
    Receipt,
    Csv,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::BankStatement => "bank_statement",
            Self::Receipt => "receipt",
            Self::Csv => "csv",
        }
    }

    /// Case-insensitive parse accepting spaces or dashes instead of underscores
    pub fn parse_lenient(value: &str) -> Option<Self> {
        let v = value.trim().to_lowercase().replace([' ', '-'], "_");
        match v.as_str() {
            "invoice" => Some(Self::Invoice),
            "bank_statement" | "statement" => Some(Self::BankStatement),
            "receipt" => Some(Self::Receipt),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What kind of content entered the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Image,
    Pdf,
    Text,
    Csv,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Csv => "csv",
        }
    }

    /// Document type assumed when a provider does not report a usable one
    pub fn default_doc_type(&self) -> DocType {
        match self {
            Self::Image => DocType::Receipt,
            Self::Csv => DocType::Csv,
            Self::Pdf | Self::Text => DocType::Invoice,
        }
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "pdf" => Ok(Self::Pdf),
            "text" | "txt" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            _ => Err(format!("Unknown content kind: {}", s)),
        }
    }
}

/// A normalized transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    /// Always non-negative; direction lives in `kind`
    pub amount: f64,
    pub currency: String,
    pub category: Category,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_currency: Option<String>,
}

impl Transaction {
    /// Build a transaction from a possibly signed amount
    ///
    /// The stored amount is the absolute value. When no explicit type is
    /// given, a negative amount means expense.
    pub fn new(
        date: NaiveDate,
        description: impl Into<String>,
        signed_amount: f64,
        kind: Option<TransactionType>,
        currency: impl Into<String>,
        category: Category,
    ) -> Self {
        let description = description.into();
        let description = if description.trim().is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            description.trim().to_string()
        };

        Self {
            date,
            description,
            amount: signed_amount.abs(),
            currency: currency.into(),
            category,
            kind: kind.unwrap_or_else(|| TransactionType::from_sign(signed_amount)),
            original_amount: None,
            original_currency: None,
        }
    }

    pub fn is_income(&self) -> bool {
        self.kind == TransactionType::Income
    }

    pub fn is_expense(&self) -> bool {
        self.kind == TransactionType::Expense
    }
}

/// Description used when the source has none
pub const DEFAULT_DESCRIPTION: &str = "Transaction";

/// Result of any extraction path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub doc_type: DocType,
    pub currency: String,
    pub summary: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// Speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// Image bytes with a sniffed MIME type
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageInput {
    /// Wrap raw bytes, detecting PNG/JPEG/GIF/WEBP from magic bytes
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime_type = sniff_image_mime(&data).to_string();
        Self { data, mime_type }
    }

    pub fn with_mime(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }
}

fn sniff_image_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Today's date on the local clock
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a date in any of the formats commonly found in statements
///
/// Returns None for empty or unrecognized input so the caller can apply
/// its own default.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d", "%d-%m-%Y",
    ];

    for fmt in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date);
        }
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }

    // ISO timestamps with offsets or fractional seconds: keep the date part
    value
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Parse a decimal amount, tolerating comma decimal separators and spaces
pub fn parse_amount(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Upper-case and trim a currency code
pub fn normalize_currency(code: &str) -> String {
    code.trim().to_uppercase()
}

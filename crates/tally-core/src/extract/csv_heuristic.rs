//! Heuristic CSV extraction for arbitrary bank exports
//!
//! Columns are found by keyword fragments in the header (English, Swedish
//! and Spanish names). When the date or amount column cannot be found the
//! extractor declines and the caller hands the file to the AI path.

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::models::{
    normalize_currency, parse_amount, parse_date, today, Category, DocType, ParsedDocument,
    Transaction, TransactionType,
};

const DATE_KEYS: &[&str] = &["date", "datum", "fecha"];
const DESCRIPTION_KEYS: &[&str] = &["desc", "detail", "merchant", "payee", "beskrivning"];
const AMOUNT_KEYS: &[&str] = &["amount", "value", "sum", "belopp", "cantidad"];
const TYPE_KEYS: &[&str] = &["type", "typ"];
const CATEGORY_KEYS: &[&str] = &["category", "kategori"];

/// Type-column values meaning money out
const EXPENSE_MARKERS: &[&str] = &["expense", "debit", "debet"];

/// Why the heuristics gave up on a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclineReason {
    /// Empty input or no readable header row
    Unreadable,
    /// Header lacks a date or an amount column
    MissingColumns {
        date: bool,
        amount: bool,
        headers: Vec<String>,
    },
}

/// Result of heuristic extraction
#[derive(Debug, Clone, PartialEq)]
pub enum CsvOutcome {
    Parsed(ParsedDocument),
    Declined(DeclineReason),
}

/// Column positions detected from the header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ColumnMap {
    date: Option<usize>,
    description: Option<usize>,
    amount: Option<usize>,
    kind: Option<usize>,
    category: Option<usize>,
}

impl ColumnMap {
    fn detect(headers: &[String]) -> Self {
        let find = |keys: &[&str]| {
            headers
                .iter()
                .position(|h| keys.iter().any(|k| h.contains(k)))
        };
        Self {
            date: find(DATE_KEYS),
            description: find(DESCRIPTION_KEYS),
            amount: find(AMOUNT_KEYS),
            kind: find(TYPE_KEYS),
            category: find(CATEGORY_KEYS),
        }
    }
}

/// Pick the delimiter that occurs most often in the header line
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    let count = |c: char| header.matches(c).count();
    let (commas, semicolons, tabs) = (count(','), count(';'), count('\t'));

    if semicolons > commas && semicolons >= tabs {
        b';'
    } else if tabs > commas && tabs > semicolons {
        b'\t'
    } else {
        b','
    }
}

/// Extract transactions from CSV text without calling a model
///
/// Never fails: unreadable rows are skipped and unusable files come back as
/// `CsvOutcome::Declined`.
pub fn extract_from_csv(text: &str, home_currency: &str) -> CsvOutcome {
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return CsvOutcome::Declined(DeclineReason::Unreadable);
    }

    let delimiter = sniff_delimiter(text);
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = match rdr.headers() {
        Ok(h) => h.iter().map(|h| h.trim().to_lowercase()).collect(),
        Err(e) => {
            debug!("CSV header unreadable: {}", e);
            return CsvOutcome::Declined(DeclineReason::Unreadable);
        }
    };

    if headers.iter().all(|h| h.is_empty()) {
        return CsvOutcome::Declined(DeclineReason::Unreadable);
    }

    let columns = ColumnMap::detect(&headers);
    let (Some(date_col), Some(amount_col)) = (columns.date, columns.amount) else {
        debug!("CSV heuristics declined, headers: {:?}", headers);
        return CsvOutcome::Declined(DeclineReason::MissingColumns {
            date: columns.date.is_some(),
            amount: columns.amount.is_some(),
            headers,
        });
    };

    let home = normalize_currency(home_currency);
    let fallback_date = today();
    let mut transactions = Vec::new();

    for (index, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!("Skipping unreadable CSV row {}: {}", index + 1, e);
                continue;
            }
        };

        let Some(signed) = record.get(amount_col).and_then(parse_amount) else {
            debug!(
                "Skipping CSV row {}: unparseable amount {:?}",
                index + 1,
                record.get(amount_col)
            );
            continue;
        };

        let kind = columns.kind.map(|col| {
            let value = cell(&record, Some(col)).to_lowercase();
            if EXPENSE_MARKERS.iter().any(|m| value.contains(m)) {
                TransactionType::Expense
            } else {
                TransactionType::Income
            }
        });

        let date = parse_date(cell(&record, Some(date_col))).unwrap_or(fallback_date);
        let category = Category::from_label(cell(&record, columns.category));

        transactions.push(Transaction::new(
            date,
            cell(&record, columns.description),
            signed,
            kind,
            home.clone(),
            category,
        ));
    }

    debug!(
        "CSV heuristics parsed {} transactions (delimiter {:?})",
        transactions.len(),
        delimiter as char
    );

    CsvOutcome::Parsed(ParsedDocument {
        doc_type: DocType::Csv,
        currency: home,
        summary: format!("CSV with {} transactions", transactions.len()),
        transactions,
    })
}

fn cell(record: &StringRecord, col: Option<usize>) -> &str {
    col.and_then(|c| record.get(c)).unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn parsed(outcome: CsvOutcome) -> ParsedDocument {
        match outcome {
            CsvOutcome::Parsed(doc) => doc,
            CsvOutcome::Declined(reason) => panic!("declined: {:?}", reason),
        }
    }

    #[test]
    fn test_minimal_date_amount() {
        let doc = parsed(extract_from_csv(
            "date,amount\n2024-01-01,-50\n2024-01-02,100",
            "SEK",
        ));
        assert_eq!(doc.doc_type, DocType::Csv);
        assert_eq!(doc.currency, "SEK");
        assert_eq!(doc.summary, "CSV with 2 transactions");
        assert_eq!(doc.transactions.len(), 2);

        let first = &doc.transactions[0];
        assert_eq!(first.amount, 50.0);
        assert_eq!(first.kind, TransactionType::Expense);
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(first.description, "Transaction");
        assert_eq!(first.category, Category::Other);

        let second = &doc.transactions[1];
        assert_eq!(second.amount, 100.0);
        assert_eq!(second.kind, TransactionType::Income);
    }

    #[test]
    fn test_swedish_semicolon_export() {
        let csv = "Datum;Beskrivning;Belopp;Kategori\n\
                   2024-03-01;ICA Maxi;-1 245,50;Mat\n\
                   2024-03-25;Lön;32 000,00;Lön\n";
        let doc = parsed(extract_from_csv(csv, "sek"));
        assert_eq!(doc.currency, "SEK");
        assert_eq!(doc.transactions.len(), 2);
        assert_eq!(doc.transactions[0].amount, 1245.5);
        assert_eq!(doc.transactions[0].description, "ICA Maxi");
        assert_eq!(doc.transactions[0].category, Category::Food);
        assert_eq!(doc.transactions[1].kind, TransactionType::Income);
        assert_eq!(doc.transactions[1].category, Category::Salary);
    }

    #[test]
    fn test_type_column_overrides_sign() {
        let csv = "Date,Merchant,Amount,Type\n\
                   2024-01-05,Spotify,99,Debit\n\
                   2024-01-06,Refund,-20,credit\n\
                   2024-01-07,Rent,9000,EXPENSE\n";
        let doc = parsed(extract_from_csv(csv, "SEK"));
        let kinds: Vec<_> = doc.transactions.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionType::Expense,
                TransactionType::Income,
                TransactionType::Expense
            ]
        );
        assert_eq!(doc.transactions[1].amount, 20.0);
    }

    #[test]
    fn test_bad_rows_skipped() {
        let csv = "date,amount,description\n\
                   2024-01-01,abc,broken\n\
                   2024-01-02,12.5,ok\n\
                   2024-01-03,,empty\n";
        let doc = parsed(extract_from_csv(csv, "SEK"));
        assert_eq!(doc.transactions.len(), 1);
        assert_eq!(doc.transactions[0].description, "ok");
        assert_eq!(doc.summary, "CSV with 1 transactions");
    }

    #[test]
    fn test_unparseable_date_becomes_today() {
        let doc = parsed(extract_from_csv("date,amount\nsometime,5", "SEK"));
        assert_eq!(doc.transactions[0].date, today());
    }

    #[test]
    fn test_tab_delimited() {
        let doc = parsed(extract_from_csv(
            "Fecha\tCantidad\tPayee\n2024-02-02\t-7,25\tMetro\n",
            "EUR",
        ));
        assert_eq!(doc.transactions[0].amount, 7.25);
        assert_eq!(doc.transactions[0].description, "Metro");
        assert_eq!(doc.transactions[0].currency, "EUR");
    }

    #[test]
    fn test_declines_without_amount() {
        let outcome = extract_from_csv("when,what,how much\n2024-01-01,x,5", "SEK");
        match outcome {
            CsvOutcome::Declined(DeclineReason::MissingColumns {
                date,
                amount,
                headers,
            }) => {
                assert!(!date);
                assert!(!amount);
                assert_eq!(headers, vec!["when", "what", "how much"]);
            }
            other => panic!("expected decline, got {:?}", other),
        }
    }

    #[test]
    fn test_declines_empty() {
        assert_eq!(
            extract_from_csv("  \n", "SEK"),
            CsvOutcome::Declined(DeclineReason::Unreadable)
        );
    }

    #[test]
    fn test_header_only() {
        let doc = parsed(extract_from_csv("Date,Amount\n", "SEK"));
        assert!(doc.transactions.is_empty());
        assert_eq!(doc.summary, "CSV with 0 transactions");
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a,b,c"), b',');
        assert_eq!(sniff_delimiter("a;b;c"), b';');
        assert_eq!(sniff_delimiter("a\tb\tc"), b'\t');
        assert_eq!(sniff_delimiter("a;b,c"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }
}

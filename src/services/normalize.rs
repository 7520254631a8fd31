//! Normalisation of raw TWSE records into canonical trade rows
//!
//! Parsing here never fails loudly: malformed input degrades to `None`, and
//! records without a code or trade date are dropped. Lenient ingestion is the
//! intended policy for this dataset.

use crate::db::sqlite::WarrantTradeRow;
use crate::feed::RawWarrantRecord;
use chrono::NaiveDate;

/// Offset between the ROC (Minguo) calendar year and the Gregorian year
const ROC_YEAR_OFFSET: i32 = 1911;

/// Parse a `YYYMMDD` ROC-calendar date such as `1130115` (2024-01-15).
///
/// Exactly seven ASCII digits are required after trimming. A zero year, month
/// or day, or a combination that is not a real calendar date, yields `None`.
pub fn parse_roc_date(text: &str) -> Option<NaiveDate> {
    let s = text.trim();
    if s.len() != 7 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let roc_year: i32 = s[0..3].parse().ok()?;
    let month: u32 = s[3..5].parse().ok()?;
    let day: u32 = s[5..7].parse().ok()?;
    if roc_year == 0 || month == 0 || day == 0 {
        return None;
    }

    NaiveDate::from_ymd_opt(roc_year + ROC_YEAR_OFFSET, month, day)
}

/// Parse loosely formatted numeric text (`"1,234"`, `" 56.7 "`).
///
/// Absent, empty, non-numeric and non-finite input all yield `None`.
pub fn coerce_number(text: Option<&str>) -> Option<f64> {
    let cleaned: String = text?.chars().filter(|c| *c != ',').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Map one raw record into a canonical row, or drop it
pub fn normalize_record(raw: &RawWarrantRecord) -> Option<WarrantTradeRow> {
    let warrant_code = raw.warrant_code.as_deref().map(str::trim).unwrap_or_default();
    if warrant_code.is_empty() {
        return None;
    }

    let trade_date = raw.trade_date.as_deref().and_then(parse_roc_date)?;
    let out_date = raw
        .out_date
        .as_deref()
        .and_then(parse_roc_date)
        .unwrap_or(trade_date);

    let warrant_name = raw
        .warrant_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Some(WarrantTradeRow {
        out_date,
        trade_date,
        warrant_code: warrant_code.to_string(),
        warrant_name,
        turnover: coerce_number(raw.turnover.as_deref()),
        volume: coerce_number(raw.volume.as_deref()),
        raw_out_date_text: non_blank(raw.out_date.as_deref()),
        raw_trade_date_text: non_blank(raw.trade_date.as_deref()),
    })
}

/// Normalise a batch, preserving source order and dropping invalid records
pub fn normalize_records(records: &[RawWarrantRecord]) -> Vec<WarrantTradeRow> {
    records.iter().filter_map(normalize_record).collect()
}

/// Trade date reported for a batch: the first record's trade date, falling
/// back to its output date
pub fn resolve_batch_trade_date(records: &[RawWarrantRecord]) -> Option<NaiveDate> {
    let first = records.first()?;
    first
        .trade_date
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or(first.out_date.as_deref())
        .and_then(parse_roc_date)
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.filter(|s| !s.trim().is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(code: &str, trade: &str, out: &str) -> RawWarrantRecord {
        RawWarrantRecord {
            out_date: Some(out.to_string()),
            trade_date: Some(trade.to_string()),
            warrant_code: Some(code.to_string()),
            warrant_name: Some(" 台積電元大31購01 ".to_string()),
            turnover: Some("1,234,500".to_string()),
            volume: Some("321".to_string()),
        }
    }

    #[test]
    fn test_parse_roc_date_valid() {
        assert_eq!(parse_roc_date("1130115").unwrap().to_string(), "2024-01-15");
        assert_eq!(parse_roc_date(" 1130115 ").unwrap().to_string(), "2024-01-15");
        assert_eq!(parse_roc_date("0010101").unwrap().to_string(), "1912-01-01");
        assert_eq!(parse_roc_date("1130229").unwrap().to_string(), "2024-02-29");
    }

    #[test]
    fn test_parse_roc_date_rejects_malformed() {
        assert_eq!(parse_roc_date("113115"), None);
        assert_eq!(parse_roc_date("11301150"), None);
        assert_eq!(parse_roc_date("113/01/15"), None);
        assert_eq!(parse_roc_date("113-0115"), None);
        assert_eq!(parse_roc_date(""), None);
        assert_eq!(parse_roc_date("abcdefg"), None);
        assert_eq!(parse_roc_date("１１３０１１５"), None);
    }

    #[test]
    fn test_parse_roc_date_rejects_zero_and_impossible_components() {
        assert_eq!(parse_roc_date("0000115"), None);
        assert_eq!(parse_roc_date("1130015"), None);
        assert_eq!(parse_roc_date("1130100"), None);
        assert_eq!(parse_roc_date("1131301"), None);
        assert_eq!(parse_roc_date("1120229"), None);
    }

    #[test]
    fn test_parse_roc_date_matches_digit_arithmetic() {
        for text in ["0990101", "1001231", "1120630", "1141001"] {
            let year: i32 = text[0..3].parse::<i32>().unwrap() + 1911;
            let expected = format!("{}-{}-{}", year, &text[3..5], &text[5..7]);
            assert_eq!(parse_roc_date(text).unwrap().to_string(), expected);
        }
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(Some("1,234")), Some(1234.0));
        assert_eq!(coerce_number(Some(" 1,234,567.5 ")), Some(1_234_567.5));
        assert_eq!(coerce_number(Some("0")), Some(0.0));
        assert_eq!(coerce_number(Some("")), None);
        assert_eq!(coerce_number(Some("   ")), None);
        assert_eq!(coerce_number(None), None);
        assert_eq!(coerce_number(Some("abc")), None);
        assert_eq!(coerce_number(Some("inf")), None);
        assert_eq!(coerce_number(Some("NaN")), None);
        assert_eq!(coerce_number(Some("--")), None);
    }

    #[test]
    fn test_normalize_record_full() {
        let row = normalize_record(&raw(" 030001 ", "1130115", "1130116")).unwrap();
        assert_eq!(row.warrant_code, "030001");
        assert_eq!(row.trade_date.to_string(), "2024-01-15");
        assert_eq!(row.out_date.to_string(), "2024-01-16");
        assert_eq!(row.warrant_name.as_deref(), Some("台積電元大31購01"));
        assert_eq!(row.turnover, Some(1_234_500.0));
        assert_eq!(row.volume, Some(321.0));
        assert_eq!(row.raw_trade_date_text.as_deref(), Some("1130115"));
        assert_eq!(row.raw_out_date_text.as_deref(), Some("1130116"));
    }

    #[test]
    fn test_out_date_falls_back_to_trade_date() {
        let row = normalize_record(&raw("030001", "1130115", "bad")).unwrap();
        assert_eq!(row.out_date, row.trade_date);
        assert_eq!(row.raw_out_date_text.as_deref(), Some("bad"));
    }

    #[test]
    fn test_invalid_records_dropped() {
        let records = vec![
            raw("030001", "1130115", "1130115"),
            raw("   ", "1130115", "1130115"),
            raw("030003", "113115", "1130115"),
            RawWarrantRecord::default(),
            raw("030005", "1130115", ""),
        ];

        let rows = normalize_records(&records);
        let codes: Vec<&str> = rows.iter().map(|r| r.warrant_code.as_str()).collect();
        assert_eq!(codes, vec!["030001", "030005"]);
        assert_eq!(rows[1].raw_out_date_text, None);
    }

    #[test]
    fn test_blank_name_becomes_absent() {
        let mut record = raw("030001", "1130115", "1130115");
        record.warrant_name = Some("  ".to_string());
        assert_eq!(normalize_record(&record).unwrap().warrant_name, None);
    }

    #[test]
    fn test_resolve_batch_trade_date() {
        let records = vec![raw("030001", "1130115", "1130116")];
        assert_eq!(
            resolve_batch_trade_date(&records).unwrap().to_string(),
            "2024-01-15"
        );

        let mut missing_trade = raw("030001", "", "1130116");
        missing_trade.trade_date = None;
        assert_eq!(
            resolve_batch_trade_date(&[missing_trade]).unwrap().to_string(),
            "2024-01-16"
        );

        assert_eq!(resolve_batch_trade_date(&[]), None);
    }
}

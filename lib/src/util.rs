use crate::{ArcStr, NOT_INFORMED};
use serde::{Deserialize, Deserializer};
use std::{fs, io, path::Path};
use term_data_table::{Cell, Row, Table};

/// Converts a not found error to Ok(false)
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Tokens that the extract uses to mean "no value".
const NULL_TOKENS: &[&str] = &["NA", "N/A", "NaN", "nan", "NULL", "null", "None"];

pub fn is_null_token(s: &str) -> bool {
    s.is_empty() || NULL_TOKENS.contains(&s)
}

// Helpers for serde to parse fields with quirks.

/// Parse a string, but map null tokens to `None` (in addition to the default "" -> None mapping)
pub fn optional_string<'de, D>(d: D) -> Result<Option<ArcStr>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(d)?;
    Ok(s.and_then(|s| {
        let s = s.trim();
        if is_null_token(s) {
            None
        } else {
            Some(s.into())
        }
    }))
}

/// Parse a number, mapping anything that isn't a finite number to `None` rather than failing.
pub fn lenient_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(d)?;
    Ok(s.and_then(|s| parse_f64(&s)))
}

/// Parse a year-month code. Accepts float-formatted integers (`202503.0`), rejects negatives.
pub fn lenient_year_month<'de, D>(d: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(d)?;
    Ok(s.and_then(|s| parse_year_month(&s)))
}

pub fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_year_month(s: &str) -> Option<u32> {
    let v = parse_f64(s)?;
    if v < 0. || v != v.floor() || v > u32::MAX as f64 {
        return None;
    }
    Some(v as u32)
}

// Console output

pub fn header(header: &str) {
    let len = header.chars().count();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}

pub fn subheader(header: &str) {
    let len = header.chars().count();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("-");
    }
    println!()
}

/// A table with a single header row.
pub fn table_with_header(headers: &[&str]) -> Table<'static> {
    Table::new().with_row(
        headers
            .iter()
            .fold(Row::new(), |row, h| row.with_cell(Cell::from(h.to_string()))),
    )
}

pub fn row<I>(cells: I) -> Row<'static>
where
    I: IntoIterator<Item = String>,
{
    cells
        .into_iter()
        .fold(Row::new(), |row, cell| row.with_cell(Cell::from(cell)))
}

/// Format a currency amount, e.g. `R$ 1,234.56`.
pub fn money(value: f64) -> String {
    let sign = if value < 0. { "-" } else { "" };
    let cents = (value.abs() * 100.).round() as u64;
    let (units, cents) = (cents / 100, cents % 100);
    let digits = units.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}R$ {}.{:02}", sign, grouped, cents)
}

pub fn percent(value: f64) -> String {
    format!("{:.2}%", value)
}

/// `part` as a percentage of `whole`, 0 when `whole` is 0.
pub fn share(part: f64, whole: f64) -> f64 {
    if whole == 0. {
        0.
    } else {
        part / whole * 100.
    }
}

/// Shorten text to at most `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Show a description that may be missing.
pub fn describe(text: Option<&str>, max: usize) -> String {
    truncate(text.unwrap_or(NOT_INFORMED), max)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn money_groups_thousands() {
        assert_eq!(money(1234.5), "R$ 1,234.50");
        assert_eq!(money(0.), "R$ 0.00");
        assert_eq!(money(-1234567.891), "-R$ 1,234,567.89");
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijk", 8), "abcde...");
        assert_eq!(describe(None, 50), NOT_INFORMED);
    }

    #[test]
    fn year_month_parsing() {
        assert_eq!(parse_year_month("202503"), Some(202503));
        assert_eq!(parse_year_month("202503.0"), Some(202503));
        assert_eq!(parse_year_month("-1"), None);
        assert_eq!(parse_year_month("abc"), None);
    }
}

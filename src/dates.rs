use chrono::NaiveDate;

/// Key format written to `tasks.json`.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d";
/// Key format of older files. Accepted on read, never written.
pub const LEGACY_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Canonical,
    Legacy,
}

pub fn format_date_key(date: NaiveDate) -> String {
    date.format(CANONICAL_FORMAT).to_string()
}

/// Parses a date key in either format and reports which one matched.
pub fn parse_date_key(raw: &str) -> Option<(NaiveDate, KeyFormat)> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, CANONICAL_FORMAT) {
        return Some((date, KeyFormat::Canonical));
    }
    NaiveDate::parse_from_str(raw, LEGACY_FORMAT)
        .ok()
        .map(|date| (date, KeyFormat::Legacy))
}

/// Parses a `dueDate` value. Only the canonical format is valid there.
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), CANONICAL_FORMAT).ok()
}

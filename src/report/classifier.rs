use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

/// Timestamp layout of the `Start Date:` / `End Date:` summary lines.
pub const REPORT_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const IGNORED_LINES: &[&str] = &[
    "--------------------------------------",
    "----------- SCAN SUMMARY -----------",
    "",
];

const CLAMD_UNREACHABLE: &str = "ERROR: Could not connect to clamd";

/// Report fields a summary line can update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportField {
    ReportStatus,
    InfectedFiles,
    TotalErrors,
    ScanDuration,
    ScanStartTime,
    ScanEndTime,
}

impl ReportField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportField::ReportStatus => "report status",
            ReportField::InfectedFiles => "infected files",
            ReportField::TotalErrors => "total errors",
            ReportField::ScanDuration => "scan duration",
            ReportField::ScanStartTime => "scan start time",
            ReportField::ScanEndTime => "scan end time",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    ReportStatus(bool),
    InfectedFiles(u64),
    TotalErrors(u64),
    ScanDuration(Duration),
    ScanStartTime(DateTime<Utc>),
    ScanEndTime(DateTime<Utc>),
}

/// A recognised line whose value did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldParseError {
    pub field: ReportField,
    pub value: String,
}

impl std::fmt::Display for FieldParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} value {:?}", self.field.as_str(), self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Ignored,
    /// Still counted as parsed when the value is malformed; the field just
    /// keeps its previous value.
    Parsed(Result<FieldUpdate, FieldParseError>),
    Unknown,
}

const PREFIXES: &[(&str, ReportField)] = &[
    ("/host-fs: ", ReportField::ReportStatus),
    ("Infected files: ", ReportField::InfectedFiles),
    ("Total errors: ", ReportField::TotalErrors),
    ("Time: ", ReportField::ScanDuration),
    ("Start Date: ", ReportField::ScanStartTime),
    ("End Date: ", ReportField::ScanEndTime),
];

/// Classifies one report line, line terminator already stripped.
pub fn classify(line: &str) -> LineOutcome {
    if IGNORED_LINES.contains(&line) || line.contains(CLAMD_UNREACHABLE) {
        return LineOutcome::Ignored;
    }

    for (prefix, field) in PREFIXES {
        if let Some(value) = line.strip_prefix(prefix) {
            return LineOutcome::Parsed(parse_field(*field, value));
        }
    }

    LineOutcome::Unknown
}

fn parse_field(field: ReportField, value: &str) -> Result<FieldUpdate, FieldParseError> {
    let trimmed = value.trim();
    let update = match field {
        ReportField::ReportStatus => Some(FieldUpdate::ReportStatus(trimmed == "OK")),
        ReportField::InfectedFiles => trimmed.parse().ok().map(FieldUpdate::InfectedFiles),
        ReportField::TotalErrors => trimmed.parse().ok().map(FieldUpdate::TotalErrors),
        // "3609.617 sec (60 m 9 s)"
        ReportField::ScanDuration => trimmed
            .split(' ')
            .next()
            .and_then(parse_seconds)
            .map(FieldUpdate::ScanDuration),
        ReportField::ScanStartTime => parse_report_date(trimmed).map(FieldUpdate::ScanStartTime),
        ReportField::ScanEndTime => parse_report_date(trimmed).map(FieldUpdate::ScanEndTime),
    };

    update.ok_or_else(|| FieldParseError {
        field,
        value: value.to_string(),
    })
}

/// Parses a decimal seconds value such as `3609.617` without going through
/// floating point, so millisecond values survive exactly.
fn parse_seconds(token: &str) -> Option<Duration> {
    let (whole, fraction) = match token.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (token, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let secs: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let nanos = fraction
        .bytes()
        .chain(std::iter::repeat(b'0'))
        .take(9)
        .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'));

    Some(Duration::new(secs, nanos))
}

fn parse_report_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, REPORT_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

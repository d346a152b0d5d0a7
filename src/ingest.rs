//! Tick export ingestion.
//!
//! Turns the raw CSV text of a tick export into validated [`Tick`]s.
//! The whole document is either accepted or rejected: a login page, an
//! error page, or a table with a different header never yields ticks.
//! Individual bad rows inside an accepted document are dropped.

use csv::{QuoteStyle, ReaderBuilder, StringRecord, Trim, WriterBuilder};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{is_valid_route, sort_ticks_desc, Tick};

/// Header line every tick export starts with.
pub const EXPECTED_HEADER: &str = r#"Date,Route,Rating,Notes,URL,Pitches,Location,"Avg Stars","Your Stars",Style,"Lead Style","Route Type","Your Rating",Length,"Rating Code""#;

/// Rows shorter than this are not ticks.
const MIN_FIELDS: usize = 4;

const MARKUP_MARKERS: [&str; 2] = ["<!doctype html", "<html"];

/// Reasons a whole export is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Received an HTML page instead of tick data (user data may be private or require authentication)")]
    MarkupDocument,

    #[error("Tick export header does not match expected format, got: {found}")]
    HeaderMismatch { found: String },

    #[error("Tick export is empty")]
    Empty,
}

impl ParseError {
    /// Whether the source refused access rather than sending bad data.
    pub fn is_authentication_or_privacy(&self) -> bool {
        matches!(self, ParseError::MarkupDocument)
    }
}

/// Parse a tick export into ticks, most recent first.
pub fn parse_tick_export(content: &str) -> Result<Vec<Tick>, ParseError> {
    if looks_like_markup(content) {
        warn!("Received HTML instead of CSV - user data may be private or require authentication");
        return Err(ParseError::MarkupDocument);
    }

    let (header, body) = split_header(content).ok_or(ParseError::Empty)?;
    if header != EXPECTED_HEADER {
        warn!("CSV header does not match expected format. Got: {}", header);
        return Err(ParseError::HeaderMismatch {
            found: header.to_string(),
        });
    }

    let mut ticks = Vec::new();
    let mut dropped = 0usize;
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match read_row(line) {
            Ok(Some(record)) => match tick_from_record(&record) {
                Some(tick) => ticks.push(tick),
                None => dropped += 1,
            },
            Ok(None) => dropped += 1,
            Err(e) => {
                debug!("Skipping unreadable row: {}", e);
                dropped += 1;
            }
        }
    }

    sort_ticks_desc(&mut ticks);
    debug!("Parsed {} valid ticks from CSV ({} rows dropped)", ticks.len(), dropped);
    Ok(ticks)
}

/// Render ticks back into the export format.
pub fn render_tick_export(ticks: &[Tick]) -> String {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    for tick in ticks {
        // Writing to a Vec cannot fail
        let _ = writer.write_record(tick_fields(tick));
    }

    let rows = writer
        .into_inner()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();

    format!("{}\n{}", EXPECTED_HEADER, rows)
}

fn looks_like_markup(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    MARKUP_MARKERS.iter().any(|m| lower.contains(m))
}

/// Split off the first non-empty line (trimmed) and return it with the rest.
fn split_header(content: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Some((trimmed, &content[offset..]));
        }
    }
    None
}

/// Parse one physical line. A row never spans lines, so an unbalanced
/// quote only costs the row it appears in.
fn read_row(line: &str) -> Result<Option<StringRecord>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(line.as_bytes());

    let mut record = StringRecord::new();
    if reader.read_record(&mut record)? {
        Ok(Some(record))
    } else {
        Ok(None)
    }
}

fn tick_from_record(record: &StringRecord) -> Option<Tick> {
    if record.len() < MIN_FIELDS {
        return None;
    }

    let route = record.get(1).unwrap_or_default();
    if !is_valid_route(route) {
        return None;
    }

    let field = |i: usize| {
        record
            .get(i)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Some(Tick {
        date: record.get(0).unwrap_or_default().to_string(),
        route: route.to_string(),
        rating: field(2),
        notes: field(3),
        url: field(4),
        pitches: field(5),
        location: field(6),
        avg_stars: field(7),
        your_stars: field(8),
        style: field(9),
        lead_style: field(10),
        route_type: field(11),
        your_rating: field(12),
        length: field(13),
        rating_code: field(14),
    })
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn tick_fields(tick: &Tick) -> [&str; 15] {
    [
        tick.date.as_str(),
        tick.route.as_str(),
        opt(&tick.rating),
        opt(&tick.notes),
        opt(&tick.url),
        opt(&tick.pitches),
        opt(&tick.location),
        opt(&tick.avg_stars),
        opt(&tick.your_stars),
        opt(&tick.style),
        opt(&tick.lead_style),
        opt(&tick.route_type),
        opt(&tick.your_rating),
        opt(&tick.length),
        opt(&tick.rating_code),
    ]
}

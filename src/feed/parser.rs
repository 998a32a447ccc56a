//! Normalizes RSS v2 and Atom documents into [`Item`]s.
//!
//! The document is scanned once with `quick-xml`. Every `channel/item`
//! (RSS v2) and every top-level `entry` (Atom) becomes a raw record of
//! field texts, which is then mapped to the canonical item by the
//! schema-specific step. Both schemas may appear in the same document.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use super::item::{Item, SchemaKind};
use super::source::Source;

/// RFC 1123 layouts tried in order, after the weekday and zone are split off.
/// The first requires a two-digit day, the second allows `2 Jan 2006`.
const RFC1123_LAYOUTS: [&str; 2] = ["%d %b %Y %H:%M:%S", "%-d %b %Y %H:%M:%S"];

/// SEC-003: Maximum element nesting depth accepted in a feed document.
const MAX_XML_DEPTH: usize = 64;

/// Errors reported for a single document.
///
/// Neither variant affects other sources of the same cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The document is not well-formed XML or is nested too deeply. No items were produced.
    #[error("XML parse error: {0}")]
    Malformed(String),

    /// Some entries had dates that could not be parsed. Atom entries with a
    /// bad `updated` are dropped. An Atom entry with a bad `published` keeps
    /// its `updated` date when it has one. Other items are kept undated.
    #[error(
        "{dropped} entries dropped, {undated} items undated, \
         {fell_back} dated from updated: {detail}"
    )]
    ItemDates {
        dropped: usize,
        undated: usize,
        fell_back: usize,
        detail: String,
    },
}

/// Result of normalizing one document.
#[derive(Debug, Default)]
pub struct Parsed {
    pub items: Vec<Item>,
    pub error: Option<ParseError>,
}

/// Parses one source document into items.
///
/// Malformed XML yields no items and [`ParseError::Malformed`]. A well-formed
/// document with neither `channel` nor `entry` elements yields no items and
/// no error.
pub fn parse(bytes: &[u8], source: &Arc<Source>) -> Parsed {
    let records = match scan(bytes) {
        Ok(records) => records,
        Err(detail) => {
            return Parsed {
                items: Vec::new(),
                error: Some(ParseError::Malformed(detail)),
            }
        }
    };

    if records.is_empty() {
        tracing::debug!(source = %source.path, "No RSS channel items or Atom entries in document");
    }

    let mut items = Vec::with_capacity(records.len());
    let mut dropped = 0;
    let mut undated = 0;
    let mut fell_back = 0;
    let mut first_issue: Option<String> = None;

    for (position, raw) in records.into_iter().enumerate() {
        let (item, issue) = match raw.schema {
            SchemaKind::RssV2 => {
                let (item, issue) = rss_item(raw, source, position);
                (Some(item), issue)
            }
            SchemaKind::Atom => match atom_item(raw, source, position) {
                Ok((item, issue)) => (Some(item), issue),
                Err(detail) => (None, Some(detail)),
            },
        };

        if let Some(detail) = issue {
            tracing::debug!(source = %source.path, position, detail = %detail, "Unparseable item date");
            match &item {
                None => dropped += 1,
                Some(item) if item.date.is_none() => undated += 1,
                Some(_) => fell_back += 1,
            }
            first_issue.get_or_insert(detail);
        }
        items.extend(item);
    }

    let error = first_issue.map(|detail| ParseError::ItemDates {
        dropped,
        undated,
        fell_back,
        detail,
    });

    Parsed { items, error }
}

/// Parses an RSS `pubDate`.
///
/// Tries the fixed-width RFC 1123 layout, then the single-digit-day
/// variant. The leading weekday is not checked against the date. Zones may
/// be numeric (`+0200`) or an abbreviation; US abbreviations use their RFC
/// 822 offsets and other alphabetic zones are read as UTC.
pub fn parse_rss_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let body = match raw.split_once(',') {
        Some((_, rest)) => rest.trim_start(),
        None => raw,
    };
    let (stamp, zone) = body.rsplit_once(' ')?;
    let offset = zone_offset(zone)?;

    RFC1123_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(stamp.trim(), layout).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses an Atom date construct as strict RFC 3339.
pub fn parse_atom_date(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw.trim()).map(|dt| dt.with_timezone(&Utc))
}

/// Atom content: the summary, replaced by `content` when that is non-empty.
pub fn content_precedence(summary: String, content: String) -> String {
    if content.is_empty() {
        summary
    } else {
        content
    }
}

/// Atom date: `updated`, replaced by `published` when that is set.
pub fn date_precedence(
    updated: Option<DateTime<Utc>>,
    published: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    published.or(updated)
}

fn zone_offset(zone: &str) -> Option<FixedOffset> {
    let zone = zone.trim();
    let seconds = match zone.to_ascii_uppercase().as_str() {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EDT" => -4 * 3600,
        "EST" | "CDT" => -5 * 3600,
        "CST" | "MDT" => -6 * 3600,
        "MST" | "PDT" => -7 * 3600,
        "PST" => -8 * 3600,
        numeric if numeric.starts_with(['+', '-']) => numeric_offset(numeric)?,
        alpha if !alpha.is_empty() && alpha.chars().all(|c| c.is_ascii_alphabetic()) => 0,
        _ => return None,
    };
    FixedOffset::east_opt(seconds)
}

fn numeric_offset(zone: &str) -> Option<i32> {
    let (sign, digits) = zone.split_at(1);
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    let seconds = hours * 3600 + minutes * 60;
    Some(if sign == "-" { -seconds } else { seconds })
}

// ============================================================================
// Schema steps
// ============================================================================

fn rss_item(raw: RawRecord, source: &Arc<Source>, position: usize) -> (Item, Option<String>) {
    let mut item = Item::new(SchemaKind::RssV2, source, position);
    item.title = raw.title.trim().to_string();
    item.link = raw.link.trim().to_string();
    item.description = raw.description.trim().to_string();
    item.content = content_precedence(
        raw.content.trim().to_string(),
        raw.encoded.trim().to_string(),
    );
    item.creator = raw.creator.trim().to_string();

    let pub_date = raw.published.trim();
    let mut issue = None;
    if !pub_date.is_empty() {
        item.date = parse_rss_date(pub_date);
        if item.date.is_none() {
            issue = Some(format!("invalid pubDate '{pub_date}'"));
        }
    }
    (item, issue)
}

fn atom_item(
    raw: RawRecord,
    source: &Arc<Source>,
    position: usize,
) -> Result<(Item, Option<String>), String> {
    let updated = match raw.updated.trim() {
        "" => None,
        text => Some(
            parse_atom_date(text).map_err(|e| format!("invalid updated '{text}': {e}"))?,
        ),
    };

    let mut issue = None;
    let published = match raw.published.trim() {
        "" => None,
        text => match parse_atom_date(text) {
            Ok(dt) => Some(dt),
            Err(e) => {
                issue = Some(format!("invalid published '{text}': {e}"));
                None
            }
        },
    };

    let mut item = Item::new(SchemaKind::Atom, source, position);
    item.title = raw.title.trim().to_string();
    item.link = raw.link.trim().to_string();
    item.description = raw.description.trim().to_string();
    item.content = content_precedence(
        raw.summary.trim().to_string(),
        raw.content.trim().to_string(),
    );
    item.creator = raw.creator.trim().to_string();
    item.date = date_precedence(updated, published);
    Ok((item, issue))
}

// ============================================================================
// Document scan
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    Content,
    Encoded,
    Summary,
    Creator,
    Published,
    Updated,
}

/// Field texts of one `item` or `entry`, before any interpretation.
#[derive(Debug)]
struct RawRecord {
    schema: SchemaKind,
    title: String,
    link: String,
    description: String,
    content: String,
    encoded: String,
    summary: String,
    creator: String,
    published: String,
    updated: String,
}

impl RawRecord {
    fn new(schema: SchemaKind) -> Self {
        Self {
            schema,
            title: String::new(),
            link: String::new(),
            description: String::new(),
            content: String::new(),
            encoded: String::new(),
            summary: String::new(),
            creator: String::new(),
            published: String::new(),
            updated: String::new(),
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::Content => &mut self.content,
            Field::Encoded => &mut self.encoded,
            Field::Summary => &mut self.summary,
            Field::Creator => &mut self.creator,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
        }
    }
}

/// Maps an element path relative to the record element to the field it
/// feeds, along with the length of that field's own path. Text nested
/// deeper inside a field element (e.g. XHTML content) belongs to the field.
fn locate(schema: SchemaKind, rel: &[Vec<u8>]) -> Option<(Field, usize)> {
    let field = match (schema, rel.first()?.as_slice()) {
        (_, b"title") => Field::Title,
        (_, b"description") => Field::Description,
        (_, b"content") => Field::Content,
        (SchemaKind::RssV2, b"link") => Field::Link,
        (SchemaKind::RssV2, b"encoded") => Field::Encoded,
        (SchemaKind::RssV2, b"author" | b"creator") => Field::Creator,
        (SchemaKind::RssV2, b"pubDate") => Field::Published,
        (SchemaKind::Atom, b"id") => Field::Link,
        (SchemaKind::Atom, b"summary") => Field::Summary,
        (SchemaKind::Atom, b"published") => Field::Published,
        (SchemaKind::Atom, b"updated") => Field::Updated,
        (SchemaKind::Atom, b"author") => {
            return match rel.get(1).map(Vec::as_slice) {
                Some(b"name") => Some((Field::Creator, 2)),
                _ => None,
            };
        }
        _ => return None,
    };
    Some((field, 1))
}

/// Which record, if any, the element at the top of `stack` opens.
fn record_schema(stack: &[Vec<u8>]) -> Option<SchemaKind> {
    match stack {
        [_, channel, item] if channel == b"channel" && item == b"item" => Some(SchemaKind::RssV2),
        [_, entry] if entry == b"entry" => Some(SchemaKind::Atom),
        _ => None,
    }
}

fn scan(bytes: &[u8]) -> Result<Vec<RawRecord>, String> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations; only
    // the five predefined entities are resolved by `unescape()`.
    let mut reader = Reader::from_reader(bytes);

    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    // Open record and the stack depth of its element.
    let mut open: Option<(RawRecord, usize)> = None;
    let mut records = Vec::new();
    let mut saw_root = false;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                return Err(format!("at byte {}: {e}", reader.error_position()));
            }
        };

        match event {
            Event::Start(e) => {
                if stack.is_empty() {
                    if saw_root {
                        return Err("more than one root element".to_string());
                    }
                    saw_root = true;
                }
                stack.push(e.local_name().as_ref().to_vec());
                // SEC-003: Reject pathologically nested documents
                if stack.len() > MAX_XML_DEPTH {
                    return Err(format!("nesting depth exceeds {MAX_XML_DEPTH} levels"));
                }

                match &mut open {
                    Some((record, depth)) => {
                        let rel = &stack[*depth..];
                        if let Some((field, len)) = locate(record.schema, rel) {
                            // A repeated field element replaces the earlier value.
                            if len == rel.len() {
                                record.field_mut(field).clear();
                            }
                        }
                    }
                    None => {
                        if let Some(schema) = record_schema(&stack) {
                            open = Some((RawRecord::new(schema), stack.len()));
                        }
                    }
                }
            }
            Event::Empty(e) => {
                if stack.is_empty() {
                    if saw_root {
                        return Err("more than one root element".to_string());
                    }
                    saw_root = true;
                }
                if open.is_none() {
                    stack.push(e.local_name().as_ref().to_vec());
                    if let Some(schema) = record_schema(&stack) {
                        records.push(RawRecord::new(schema));
                    }
                    stack.pop();
                }
            }
            Event::End(_) => {
                if matches!(&open, Some((_, depth)) if *depth == stack.len()) {
                    if let Some((record, _)) = open.take() {
                        records.push(record);
                    }
                }
                stack.pop();
            }
            Event::Text(e) => {
                if stack.is_empty() {
                    let stray = String::from_utf8_lossy(&e);
                    if !stray
                        .trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
                        .is_empty()
                    {
                        return Err("text outside the root element".to_string());
                    }
                } else if let Some((record, depth)) = &mut open {
                    if let Some((field, _)) = locate(record.schema, &stack[*depth..]) {
                        let text = e
                            .unescape()
                            .map_err(|err| format!("at byte {}: {err}", reader.buffer_position()))?;
                        record.field_mut(field).push_str(&text);
                    }
                }
            }
            Event::CData(e) => {
                if let Some((record, depth)) = &mut open {
                    if let Some((field, _)) = locate(record.schema, &stack[*depth..]) {
                        let raw = e.into_inner();
                        record.field_mut(field).push_str(&String::from_utf8_lossy(&raw));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(unclosed) = stack.last() {
        return Err(format!(
            "unexpected end of document inside <{}>",
            String::from_utf8_lossy(unclosed)
        ));
    }
    if !saw_root {
        return Err("document has no root element".to_string());
    }

    Ok(records)
}

//! Archive decoding: container sniffing, row splitting and projection of rows
//! into [`Event`]s through a [`RecordSchema`].
//!
//! Severity filtering happens here, row by row, so a large archive never has
//! to be materialized before the threshold is applied.

use flate2::read::MultiGzDecoder;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

use crate::archive::Compression;
use crate::event::{display_name, Event};
use crate::logging::{log, log_parse_summary, obj, v_str, Domain, Level, ProfileScope};
use crate::schema::{resolve_category, Field, RecordSchema, Row};

pub const DELIMITER: char = '\t';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooShort,
    SeverityMissing,
    AboveThreshold,
    MissingCoordinates,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub too_short: u64,
    pub severity_missing: u64,
    pub above_threshold: u64,
    pub missing_coordinates: u64,
}

impl SkipCounts {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::TooShort => self.too_short += 1,
            SkipReason::SeverityMissing => self.severity_missing += 1,
            SkipReason::AboveThreshold => self.above_threshold += 1,
            SkipReason::MissingCoordinates => self.missing_coordinates += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.too_short + self.severity_missing + self.above_threshold + self.missing_coordinates
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub events: Vec<Event>,
    pub rows_seen: u64,
    pub skipped: SkipCounts,
    /// The stream ended on a read or decompression error.
    pub truncated: bool,
}

/// Project one raw row into an event, or say why it was dropped.
pub fn parse_row(line: &str, schema: &RecordSchema, threshold: f64) -> Result<Event, SkipReason> {
    let row = Row::split(line, DELIMITER);
    if row.len() < schema.min_width() {
        return Err(SkipReason::TooShort);
    }

    let scale = row
        .float(schema, Field::GoldsteinScale)
        .ok_or(SkipReason::SeverityMissing)?;
    if scale > threshold {
        return Err(SkipReason::AboveThreshold);
    }

    let (Some(lat), Some(lng)) = (
        row.float(schema, Field::ActionGeoLat),
        row.float(schema, Field::ActionGeoLong),
    ) else {
        return Err(SkipReason::MissingCoordinates);
    };

    let event_code = row.string(schema, Field::EventCode);
    let quad = row.int(schema, Field::QuadClass);
    let actor1 = row.optional_string(schema, Field::Actor1Name);
    let actor2 = row.optional_string(schema, Field::Actor2Name);

    Ok(Event {
        global_event_id: row.string(schema, Field::GlobalEventId),
        event_date: row.string(schema, Field::SqlDate),
        category: resolve_category(&event_code, quad),
        quad_class: quad.filter(|q| (1..=4).contains(q)).map(|q| q as u8),
        event_code,
        name: display_name(actor1.as_deref(), actor2.as_deref()),
        actor1,
        actor1_country: row.optional_string(schema, Field::Actor1CountryCode),
        actor2,
        actor2_country: row.optional_string(schema, Field::Actor2CountryCode),
        lat,
        lng,
        location: row.string(schema, Field::ActionGeoFullName),
        country_code: row.string(schema, Field::ActionGeoCountryCode),
        adm1_code: row.string(schema, Field::ActionGeoAdm1Code),
        scale,
        avg_tone: row.float(schema, Field::AvgTone).unwrap_or(0.0),
        num_articles: row.count(schema, Field::NumArticles),
        num_mentions: row.count(schema, Field::NumMentions),
        num_sources: row.count(schema, Field::NumSources),
        url: row.string(schema, Field::SourceUrl),
    })
}

/// Fold a line stream into events, stopping once `max_events` are collected.
/// Invalid UTF-8 is replaced, never fatal.
pub fn parse_lines<R: BufRead + ?Sized>(
    reader: &mut R,
    schema: &RecordSchema,
    threshold: f64,
    max_events: usize,
) -> ParseOutcome {
    let mut out = ParseOutcome::default();
    if max_events == 0 {
        return out;
    }

    let truncated = for_each_line(reader, |line| {
        out.rows_seen += 1;
        match parse_row(line, schema, threshold) {
            Ok(event) => {
                out.events.push(event);
                out.events.len() < max_events
            }
            Err(reason) => {
                out.skipped.record(reason);
                true
            }
        }
    });
    out.truncated = truncated;
    out
}

/// Feed each non-blank line, stripped of its terminator, to `f` until it
/// returns `false`. Returns whether the stream ended on a read error.
fn for_each_line<R: BufRead + ?Sized>(reader: &mut R, mut f: impl FnMut(&str) -> bool) -> bool {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return false,
            Ok(_) => {}
            Err(_) => return true,
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }
        if !f(line) {
            return false;
        }
    }
}

/// First event in the archive, at any severity, accepted by `pred`.
pub fn find_event(
    path: &Path,
    schema: &RecordSchema,
    mut pred: impl FnMut(&Event) -> bool,
) -> io::Result<Option<Event>> {
    with_reader(path, |reader| {
        let mut found = None;
        for_each_line(reader, |line| match parse_row(line, schema, f64::INFINITY) {
            Ok(event) if pred(&event) => {
                found = Some(event);
                false
            }
            _ => true,
        });
        found
    })
}

fn zip_io(err: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Index of the delimited member: the first `.csv` entry, else the first entry.
fn member_index<R: Read + Seek>(archive: &mut ZipArchive<R>) -> usize {
    (0..archive.len())
        .find(|&i| {
            archive
                .by_index(i)
                .map(|f| f.name().to_ascii_lowercase().ends_with(".csv"))
                .unwrap_or(false)
        })
        .unwrap_or(0)
}

/// Open `path` according to its sniffed container and hand a line reader to `f`.
pub fn with_reader<T>(path: &Path, f: impl FnOnce(&mut dyn BufRead) -> T) -> io::Result<T> {
    match Compression::sniff(path)? {
        Compression::None => {
            let mut reader = BufReader::new(File::open(path)?);
            Ok(f(&mut reader))
        }
        Compression::Gzip => {
            let mut reader = BufReader::new(MultiGzDecoder::new(File::open(path)?));
            Ok(f(&mut reader))
        }
        Compression::Zip => {
            let mut archive = ZipArchive::new(File::open(path)?).map_err(zip_io)?;
            let idx = member_index(&mut archive);
            let member = archive.by_index(idx).map_err(zip_io)?;
            let mut reader = BufReader::new(member);
            Ok(f(&mut reader))
        }
    }
}

/// Parse with full skip accounting. Only open/container errors are returned.
pub fn parse_archive_report(
    path: &Path,
    schema: &RecordSchema,
    threshold: f64,
    max_events: usize,
) -> io::Result<ParseOutcome> {
    with_reader(path, |reader| parse_lines(reader, schema, threshold, max_events))
}

/// Parse an archive into events at or below `threshold`.
///
/// Never fails: an unreadable archive is logged and yields no events. A stream
/// that breaks off mid-archive is logged at warn level and yields the rows
/// read before the break.
pub fn parse_archive(
    path: &Path,
    schema: &RecordSchema,
    threshold: f64,
    max_events: usize,
) -> Vec<Event> {
    let display = path.display().to_string();
    let _scope = ProfileScope::with_context("parse_archive", &[("archive", v_str(&display))]);
    match parse_archive_report(path, schema, threshold, max_events) {
        Ok(outcome) => {
            log_parse_summary(
                &display,
                outcome.rows_seen,
                outcome.events.len(),
                &outcome.skipped,
                outcome.truncated,
            );
            outcome.events
        }
        Err(err) => {
            log(
                Level::Error,
                Domain::Parse,
                "archive_unreadable",
                obj(&[("archive", v_str(&display)), ("msg", v_str(&err.to_string()))]),
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Category;
    use crate::schema::{SchemaVersion, MIN_ROW_WIDTH};
    use std::io::Cursor;

    fn row(cells: &[(usize, &str)]) -> String {
        let mut cols = vec![String::new(); MIN_ROW_WIDTH];
        for (i, v) in cells {
            cols[*i] = v.to_string();
        }
        cols.join("\t")
    }

    fn full_row(scale: &str, lat: &str, lng: &str) -> String {
        row(&[
            (0, "1001"),
            (1, "20240105"),
            (6, "POLICE"),
            (7, "USA"),
            (16, "PROTESTER"),
            (26, "190"),
            (29, "4"),
            (30, scale),
            (31, "12"),
            (32, "3"),
            (33, "10"),
            (34, "-6.25"),
            (52, "Portland, Oregon, United States"),
            (53, "US"),
            (54, "USOR"),
            (56, lat),
            (57, lng),
            (60, "https://news.example.com/a"),
        ])
    }

    #[test]
    fn row_projects_every_field() {
        let schema = RecordSchema::new(SchemaVersion::V2);
        let e = parse_row(&full_row("-10", "45.5", "-122.6"), &schema, -5.0).unwrap();
        assert_eq!(e.global_event_id, "1001");
        assert_eq!(e.event_date, "20240105");
        assert_eq!(e.event_code, "190");
        assert_eq!(e.quad_class, Some(4));
        assert_eq!(e.category, Category::MaterialConflict);
        assert_eq!(e.name, "POLICE - PROTESTER");
        assert_eq!(e.actor1_country.as_deref(), Some("USA"));
        assert_eq!(e.actor2_country, None);
        assert_eq!(e.num_mentions, 12);
        assert_eq!(e.num_sources, 3);
        assert_eq!(e.num_articles, 10);
        assert_eq!(e.avg_tone, -6.25);
        assert_eq!(e.location, "Portland, Oregon, United States");
        assert_eq!(e.country_code, "US");
        assert_eq!(e.adm1_code, "USOR");
        assert_eq!((e.lat, e.lng), (45.5, -122.6));
        assert_eq!(e.url, "https://news.example.com/a");
    }

    #[test]
    fn row_skip_reasons() {
        let schema = RecordSchema::default();
        assert_eq!(parse_row("a\tb", &schema, -5.0), Err(SkipReason::TooShort));
        assert_eq!(
            parse_row(&full_row("", "1", "2"), &schema, -5.0),
            Err(SkipReason::SeverityMissing)
        );
        assert_eq!(
            parse_row(&full_row("oops", "1", "2"), &schema, -5.0),
            Err(SkipReason::SeverityMissing)
        );
        assert_eq!(
            parse_row(&full_row("-2", "1", "2"), &schema, -5.0),
            Err(SkipReason::AboveThreshold)
        );
        assert_eq!(
            parse_row(&full_row("-7", "1", ""), &schema, -5.0),
            Err(SkipReason::MissingCoordinates)
        );
        assert_eq!(
            parse_row(&full_row("-7", "north", "2"), &schema, -5.0),
            Err(SkipReason::MissingCoordinates)
        );
    }

    #[test]
    fn threshold_is_inclusive() {
        let schema = RecordSchema::default();
        assert!(parse_row(&full_row("-5.0", "1", "2"), &schema, -5.0).is_ok());
    }

    #[test]
    fn legacy_schema_reads_shifted_columns() {
        let legacy = RecordSchema::new(SchemaVersion::Legacy);
        let line = row(&[
            (1, "20240105"),
            (27, "145"),
            (30, "-9"),
            (51, "UP"),
            (56, "50.45"),
            (57, "30.52"),
            (58, "Kyiv, Ukraine"),
        ]);
        let e = parse_row(&line, &legacy, -5.0).unwrap();
        assert_eq!(e.event_code, "145");
        // Quad class column is blank, so the code range decides.
        assert_eq!(e.category, Category::MaterialConflict);
        assert_eq!(e.country_code, "UP");
        assert_eq!(e.location, "Kyiv, Ukraine");
    }

    #[test]
    fn lines_stop_at_max_and_count_skips() {
        let schema = RecordSchema::default();
        let body = [
            full_row("-7", "1", "2"),
            "garbage".to_string(),
            String::new(),
            full_row("-1", "1", "2"),
            full_row("-8", "1", "2"),
            full_row("-9", "1", "2"),
        ]
        .join("\r\n");
        let mut cursor = Cursor::new(body.into_bytes());
        let out = parse_lines(&mut cursor, &schema, -5.0, 2);
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.rows_seen, 4);
        assert_eq!(out.skipped.too_short, 1);
        assert_eq!(out.skipped.above_threshold, 1);
        assert_eq!(out.skipped.total(), 2);
        assert!(!out.truncated);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let schema = RecordSchema::default();
        let mut bytes = full_row("-7", "1", "2").into_bytes();
        let at = bytes.len() - 1;
        bytes.splice(at..at, [0xff, 0xfe]);
        let mut cursor = Cursor::new(bytes);
        let out = parse_lines(&mut cursor, &schema, -5.0, 10);
        assert_eq!(out.events.len(), 1);
        assert!(out.events[0].url.contains('\u{fffd}'));
    }

    #[test]
    fn zero_budget_reads_nothing() {
        let schema = RecordSchema::default();
        let mut cursor = Cursor::new(full_row("-7", "1", "2").into_bytes());
        let out = parse_lines(&mut cursor, &schema, -5.0, 0);
        assert!(out.events.is_empty());
        assert_eq!(out.rows_seen, 0);
    }

    #[test]
    fn unreadable_archive_yields_nothing() {
        let schema = RecordSchema::default();
        let events = parse_archive(Path::new("/nonexistent/x.export.CSV"), &schema, -5.0, 10);
        assert!(events.is_empty());
    }

    #[test]
    fn cut_off_gzip_is_flagged_truncated() {
        use flate2::write::GzEncoder;
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("20240105120000.export.CSV.gz");
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
        for i in 0..5000 {
            let line = full_row("-7", "1", "2").replacen("1001", &i.to_string(), 1);
            writeln!(enc, "{}", line).unwrap();
        }
        let bytes = enc.finish().unwrap();
        let schema = RecordSchema::default();

        std::fs::write(&path, &bytes).unwrap();
        let whole = parse_archive_report(&path, &schema, -5.0, usize::MAX).unwrap();
        assert!(!whole.truncated);
        assert_eq!(whole.events.len(), 5000);

        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        let cut = parse_archive_report(&path, &schema, -5.0, usize::MAX).unwrap();
        assert!(cut.truncated);
        assert!(cut.events.len() < 5000);
        let events = parse_archive(&path, &schema, -5.0, usize::MAX);
        assert_eq!(events.len(), cut.events.len());
    }

    #[test]
    fn find_event_ignores_severity() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("20240105.export.CSV");
        let mild = full_row("3.4", "1", "2").replace("news.example.com/a", "news.example.com/port-strike");
        let body = format!("{}\n{}\n", full_row("-7", "1", "2"), mild);
        std::fs::write(&path, body).unwrap();

        let schema = RecordSchema::default();
        let hit = find_event(&path, &schema, |e| e.url.contains("port-strike")).unwrap();
        assert_eq!(hit.map(|e| e.scale), Some(3.4));
        let miss = find_event(&path, &schema, |e| e.url.contains("airport")).unwrap();
        assert!(miss.is_none());
    }
}

//! Print every mapped field of the first row of an archive, so column offsets
//! can be checked by eye against a known-good sample.
//!
//! Usage: verify_schema <archive> [legacy|v2]

use geoalerts::parser::{with_reader, DELIMITER};
use geoalerts::schema::{Field, RecordSchema, Row, SchemaVersion};
use serde_json::json;
use std::env;
use std::io::BufRead;
use std::path::PathBuf;

fn main() {
    let Some(path) = env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: verify_schema <archive> [legacy|v2]");
        std::process::exit(1);
    };
    let version = match env::args().nth(2) {
        Some(raw) => match SchemaVersion::parse(&raw) {
            Some(v) => v,
            None => {
                eprintln!("unknown schema version: {}", raw);
                std::process::exit(1);
            }
        },
        None => SchemaVersion::default(),
    };
    let schema = RecordSchema::new(version);

    let first = with_reader(&path, |reader| {
        reader
            .lines()
            .map_while(Result::ok)
            .find(|l| !l.trim().is_empty())
    });
    let line = match first {
        Ok(Some(line)) => line,
        Ok(None) => {
            eprintln!("{}: no rows", path.display());
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{}: {}", path.display(), err);
            std::process::exit(2);
        }
    };

    let row = Row::split(&line, DELIMITER);
    let fields: Vec<_> = Field::ALL
        .iter()
        .map(|f| {
            json!({
                "field": f.as_str(),
                "offset": schema.offset(*f),
                "value": row.raw(&schema, *f),
            })
        })
        .collect();
    let other = match version {
        SchemaVersion::Legacy => RecordSchema::new(SchemaVersion::V2),
        SchemaVersion::V2 => RecordSchema::new(SchemaVersion::Legacy),
    };

    let report = json!({
        "archive": path.display().to_string(),
        "version": version.as_str(),
        "columns": row.len(),
        "min_width": schema.min_width(),
        "width_ok": row.len() >= schema.min_width(),
        "fields": fields,
        "differs_from": {
            "version": other.version().as_str(),
            "changes": schema.diff(&other),
        },
    });
    match serde_json::to_string_pretty(&report) {
        Ok(s) => println!("{}", s),
        Err(err) => {
            eprintln!("encode failed: {}", err);
            std::process::exit(1);
        }
    }

    if row.len() < schema.min_width() {
        std::process::exit(3);
    }
}

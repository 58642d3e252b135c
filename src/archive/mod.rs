//! On-disk archive layout: `<root>/events/<YYYYMMDD>/<archive-file>`.

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub mod fetch;

pub const EVENTS_DIR: &str = "events";
/// Suffix of in-flight downloads; never treated as an archive.
pub const PART_SUFFIX: &str = ".part";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    None,
    Gzip,
    /// Zip container holding a single delimited member.
    Zip,
}

impl Compression {
    /// Sniff the container from its magic bytes.
    pub fn sniff(path: &Path) -> io::Result<Compression> {
        let mut head = [0u8; 4];
        let mut file = File::open(path)?;
        let mut filled = 0;
        while filled < head.len() {
            let n = file.read(&mut head[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(Self::from_magic(&head[..filled]))
    }

    pub fn from_magic(head: &[u8]) -> Compression {
        if head.starts_with(b"PK\x03\x04") {
            Compression::Zip
        } else if head.starts_with(&[0x1f, 0x8b]) {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveReference {
    pub date: NaiveDate,
    pub path: PathBuf,
    pub compression: Compression,
}

impl ArchiveReference {
    fn locate(date: NaiveDate, path: PathBuf) -> Option<Self> {
        let compression = Compression::sniff(&path).ok()?;
        Some(Self {
            date,
            path,
            compression,
        })
    }
}

pub fn events_dir(root: &Path) -> PathBuf {
    root.join(EVENTS_DIR)
}

pub fn date_dir(root: &Path, date: NaiveDate) -> PathBuf {
    events_dir(root).join(dir_name(date))
}

pub fn dir_name(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parse an 8-digit `YYYYMMDD` directory name.
pub fn parse_dir_date(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(name, "%Y%m%d").ok()
}

pub fn is_archive_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(PART_SUFFIX) {
        return false;
    }
    lower.ends_with(".export.csv")
        || lower.ends_with(".export.csv.zip")
        || lower.ends_with(".export.csv.gz")
}

/// Dated subdirectories under `<root>/events`, newest first. Directories whose
/// name is not a date are not returned. A missing root yields an empty list.
pub fn list_date_dirs(root: &Path) -> Vec<(NaiveDate, PathBuf)> {
    let Ok(entries) = fs::read_dir(events_dir(root)) else {
        return Vec::new();
    };
    let mut dirs: Vec<(NaiveDate, PathBuf)> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name();
            parse_dir_date(name.to_str()?).map(|d| (d, e.path()))
        })
        .collect();
    dirs.sort_by(|a, b| b.0.cmp(&a.0));
    dirs
}

/// Recognized archive files in one directory, newest name first.
pub fn archives_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| e.file_name().to_str().map(is_archive_name).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    files
}

/// Newest archive in the newest dated directory that has one.
pub fn find_latest_archive(root: &Path) -> Option<ArchiveReference> {
    list_date_dirs(root).into_iter().find_map(|(date, dir)| {
        archives_in(&dir)
            .into_iter()
            .next()
            .and_then(|path| ArchiveReference::locate(date, path))
    })
}

/// Direct lookup of a single day, no scanning of other days.
pub fn find_archive_by_date(root: &Path, date: NaiveDate) -> Option<ArchiveReference> {
    archives_in(&date_dir(root, date))
        .into_iter()
        .next()
        .and_then(|path| ArchiveReference::locate(date, path))
}

pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

use crate::archive::{events_dir, parse_dir_date};
use crate::logging::{log, log_cleanup, obj, v_str, Domain, Level};
use crate::store::ArchiveStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub kept: usize,
    /// Directories whose name is not a `YYYYMMDD` date. Never removed.
    pub ignored: usize,
    /// Expired directories that could not be removed. Retried next run.
    pub failed: usize,
}

/// Oldest date that survives a cleanup on `today` keeping `keep_days` days.
/// `keep_days` of zero is treated as one so today's data is never removed.
pub fn cutoff(today: NaiveDate, keep_days: u32) -> NaiveDate {
    let keep = i64::from(keep_days.max(1));
    today - Duration::days(keep - 1)
}

/// Remove dated directories older than the retention window.
///
/// Holds the store's write lock so no parse observes a half-removed directory.
/// A missing storage root is not an error. A directory that cannot be removed
/// is logged and counted in `failed`; the scan continues past it.
pub fn cleanup(store: &ArchiveStore, keep_days: u32, today: NaiveDate) -> io::Result<CleanupReport> {
    cleanup_with(store, keep_days, today, |dir| fs::remove_dir_all(dir))
}

fn cleanup_with(
    store: &ArchiveStore,
    keep_days: u32,
    today: NaiveDate,
    mut remove: impl FnMut(&Path) -> io::Result<()>,
) -> io::Result<CleanupReport> {
    let _guard = store.write();
    let oldest = cutoff(today, keep_days);
    let mut report = CleanupReport::default();

    let entries = match fs::read_dir(events_dir(store.root())) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log_cleanup(0, 0, 0, 0);
            return Ok(report);
        }
        Err(err) => return Err(err),
    };

    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        match parse_dir_date(&name) {
            Some(date) if date < oldest => match remove(&entry.path()) {
                Ok(()) => report.removed += 1,
                Err(err) => {
                    log(
                        Level::Warn,
                        Domain::Retention,
                        "remove_failed",
                        obj(&[("dir", v_str(&name)), ("msg", v_str(&err.to_string()))]),
                    );
                    report.failed += 1;
                }
            },
            Some(_) => report.kept += 1,
            None => {
                log(
                    Level::Warn,
                    Domain::Retention,
                    "ignored_directory",
                    obj(&[("dir", v_str(&name))]),
                );
                report.ignored += 1;
            }
        }
    }

    log_cleanup(report.removed, report.kept, report.ignored, report.failed);
    Ok(report)
}

pub fn cleanup_now(store: &ArchiveStore, keep_days: u32) -> io::Result<CleanupReport> {
    cleanup(store, keep_days, Utc::now().date_naive())
}

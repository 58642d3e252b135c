//! Query surface over the local archive store.
//!
//! Everything here is synchronous; parses are blocking and callers on an async
//! runtime should move them to a blocking thread.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::archive::{archives_in, find_archive_by_date, find_latest_archive, list_date_dirs};
use crate::cache::AlertCache;
use crate::config::Config;
use crate::error::QueryError;
use crate::event::Event;
use crate::filter::{self, QueryParameters};
use crate::logging::{log_query, ProfileScope};
use crate::parser::{find_event, parse_archive};
use crate::schema::RecordSchema;
use crate::stats::{self, CategoryStats, CountryStats, DayStats};
use crate::store::ArchiveStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertsResult {
    pub alerts: Vec<Event>,
    pub count: usize,
    pub computed_at: String,
    /// Archive the alerts came from; `None` when no archive was found.
    pub archive: Option<String>,
    pub filters: QueryParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

impl AlertsResult {
    fn new(alerts: Vec<Event>, archive: Option<String>, filters: &QueryParameters) -> Self {
        Self {
            count: alerts.len(),
            alerts,
            computed_at: Utc::now().to_rfc3339(),
            archive,
            filters: filters.clone(),
            date_range: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryReport {
    pub stats: Vec<CountryStats>,
    pub total_events: usize,
    pub total_countries: usize,
    pub archive: Option<String>,
    pub computed_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryReport {
    pub stats: Vec<CategoryStats>,
    pub total_events: usize,
    pub total_categories: usize,
    pub archive: Option<String>,
    pub computed_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub trends: BTreeMap<NaiveDate, DayStats>,
    pub total_days: usize,
    pub date_range: DateRange,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub date: NaiveDate,
    pub archive: String,
    pub event: Event,
}

/// Parse a `YYYY-MM-DD` query date.
pub fn parse_query_date(field: &'static str, value: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| QueryError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

pub struct AlertService {
    config: Config,
    schema: RecordSchema,
    store: ArchiveStore,
    cache: AlertCache<AlertsResult>,
}

impl AlertService {
    pub fn new(config: Config) -> Self {
        let store = ArchiveStore::new(config.storage_root.clone());
        Self::with_store(config, store)
    }

    /// Build over an existing store handle so fetch and cleanup share its lock.
    pub fn with_store(config: Config, store: ArchiveStore) -> Self {
        Self {
            schema: RecordSchema::new(config.schema_version),
            cache: AlertCache::new(config.cache_ttl()),
            config,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    pub fn cache(&self) -> &AlertCache<AlertsResult> {
        &self.cache
    }

    /// Parameters carrying the configured threshold and result cap.
    pub fn default_params(&self) -> QueryParameters {
        QueryParameters {
            severity_threshold: self.config.default_threshold,
            max_events: self.config.default_max_events,
            ..Default::default()
        }
    }

    /// Latest archive's events at or below the threshold, filtered and ordered.
    ///
    /// The parse cap applies before filtering, so a filtered result can hold
    /// fewer than `max_events` even when more matching rows exist further in.
    pub fn latest_alerts(&self, params: &QueryParameters) -> AlertsResult {
        let (events, archive) = self.parse_latest(params);
        let alerts = filter::apply(events, params);
        log_query("latest_alerts", alerts.len(), archive.as_deref());
        AlertsResult::new(alerts, archive, params)
    }

    pub fn cached_alerts(&self, params: &QueryParameters) -> Arc<AlertsResult> {
        self.cache.get_or_compute(params, |p| self.latest_alerts(p))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Alerts across `start..=end` (`YYYY-MM-DD`), oldest day first.
    ///
    /// Each day is parsed with whatever budget remains; days without an archive
    /// are skipped silently. A reversed range is empty, not an error.
    pub fn alerts_by_date_range(
        &self,
        start: &str,
        end: &str,
        params: &QueryParameters,
    ) -> Result<AlertsResult, QueryError> {
        let range = self.validate_range(start, end)?;
        let _scope = ProfileScope::new("alerts_by_date_range");

        let mut collected: Vec<Event> = Vec::new();
        {
            let _guard = self.store.read();
            for day in stats::days_between(range.start, range.end) {
                let budget = params.max_events.saturating_sub(collected.len());
                if budget == 0 {
                    break;
                }
                if let Some(found) = find_archive_by_date(self.store.root(), day) {
                    collected.extend(parse_archive(
                        &found.path,
                        &self.schema,
                        params.severity_threshold,
                        budget,
                    ));
                }
            }
        }

        let alerts = filter::apply(collected, params);
        log_query("alerts_by_date_range", alerts.len(), None);
        let mut result = AlertsResult::new(alerts, None, params);
        result.date_range = Some(range);
        Ok(result)
    }

    pub fn stats_by_country(&self, params: &QueryParameters) -> CountryReport {
        let (events, archive) = self.parse_latest_filtered(params);
        let stats = stats::stats_by_country(&events);
        log_query("stats_by_country", stats.len(), archive.as_deref());
        CountryReport {
            total_events: events.len(),
            total_countries: stats.len(),
            stats,
            archive,
            computed_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn stats_by_category(&self, params: &QueryParameters) -> CategoryReport {
        let (events, archive) = self.parse_latest_filtered(params);
        let stats = stats::stats_by_category(&events);
        log_query("stats_by_category", stats.len(), archive.as_deref());
        CategoryReport {
            total_events: events.len(),
            total_categories: stats.len(),
            stats,
            archive,
            computed_at: Utc::now().to_rfc3339(),
        }
    }

    /// Per-day rollups over `start..=end`; days without an archive are absent.
    pub fn trends(&self, start: &str, end: &str, threshold: f64) -> Result<TrendReport, QueryError> {
        let range = self.validate_range(start, end)?;
        let _scope = ProfileScope::new("trends");
        let trends = stats::trends(&self.store, &self.schema, range.start, range.end, threshold);
        log_query("trends", trends.len(), None);
        Ok(TrendReport {
            total_days: trends.len(),
            trends,
            date_range: range,
            threshold,
        })
    }

    /// First row, at any severity, whose source URL contains `keyword`
    /// (case-insensitive), searching the newest `max_days` dated directories.
    pub fn search_url(&self, keyword: &str, max_days: usize) -> Option<SearchHit> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let _scope = ProfileScope::new("search_url");
        let _guard = self.store.read();

        let hit = list_date_dirs(self.store.root())
            .into_iter()
            .take(max_days)
            .find_map(|(date, dir)| {
                archives_in(&dir).into_iter().find_map(|path| {
                    let event = find_event(&path, &self.schema, |e| {
                        e.url.to_lowercase().contains(&needle)
                    })
                    .ok()??;
                    Some(SearchHit {
                        date,
                        archive: path.display().to_string(),
                        event,
                    })
                })
            });
        log_query(
            "search_url",
            usize::from(hit.is_some()),
            hit.as_ref().map(|h| h.archive.as_str()),
        );
        hit
    }

    fn validate_range(&self, start: &str, end: &str) -> Result<DateRange, QueryError> {
        let start = parse_query_date("start_date", start)?;
        let end = parse_query_date("end_date", end)?;
        if let Some(limit) = self.config.max_range_days {
            let days = (end - start).num_days() + 1;
            if days > limit {
                return Err(QueryError::RangeTooLarge { days, limit });
            }
        }
        Ok(DateRange { start, end })
    }

    fn parse_latest(&self, params: &QueryParameters) -> (Vec<Event>, Option<String>) {
        let _guard = self.store.read();
        match find_latest_archive(self.store.root()) {
            Some(found) => (
                parse_archive(
                    &found.path,
                    &self.schema,
                    params.severity_threshold,
                    params.max_events,
                ),
                Some(found.path.display().to_string()),
            ),
            None => (Vec::new(), None),
        }
    }

    fn parse_latest_filtered(&self, params: &QueryParameters) -> (Vec<Event>, Option<String>) {
        let (events, archive) = self.parse_latest(params);
        let events = filter::filter(
            events,
            params.country.as_deref(),
            params.category.as_deref(),
            params.min_articles,
        );
        (events, archive)
    }
}

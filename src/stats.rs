//! Rollups over parsed events: per country, per category and per day.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::archive::find_archive_by_date;
use crate::event::Event;
use crate::parser::parse_archive;
use crate::schema::RecordSchema;
use crate::store::ArchiveStore;

/// Bucket for events without an action-geo country code.
pub const UNKNOWN_COUNTRY: &str = "UNKNOWN";

#[derive(Debug, Default)]
struct Bucket {
    count: usize,
    severity_sum: f64,
    tone_sum: f64,
    articles: u64,
    categories: BTreeMap<String, usize>,
    countries: BTreeSet<String>,
}

impl Bucket {
    fn add(&mut self, e: &Event) {
        self.count += 1;
        self.severity_sum += e.scale;
        self.tone_sum += e.avg_tone;
        self.articles += u64::from(e.num_articles);
        *self.categories.entry(e.category.as_str().to_string()).or_insert(0) += 1;
        if !e.country_code.is_empty() {
            self.countries.insert(e.country_code.clone());
        }
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            sum / self.count as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryStats {
    pub country: String,
    pub count: usize,
    pub mean_severity: f64,
    pub mean_tone: f64,
    pub total_articles: u64,
    pub categories: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub category: String,
    pub count: usize,
    pub mean_severity: f64,
    pub mean_tone: f64,
    pub total_articles: u64,
    pub distinct_countries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStats {
    pub date: NaiveDate,
    pub count: usize,
    pub mean_severity: f64,
    pub mean_tone: f64,
    pub total_articles: u64,
    pub categories: BTreeMap<String, usize>,
}

fn group_by<F>(events: &[Event], key: F) -> HashMap<String, Bucket>
where
    F: Fn(&Event) -> String,
{
    let mut groups: HashMap<String, Bucket> = HashMap::new();
    for e in events {
        groups.entry(key(e)).or_default().add(e);
    }
    groups
}

/// Per-country rollup, largest first; ties ordered by country code.
pub fn stats_by_country(events: &[Event]) -> Vec<CountryStats> {
    let mut out: Vec<CountryStats> = group_by(events, |e| {
        if e.country_code.is_empty() {
            UNKNOWN_COUNTRY.to_string()
        } else {
            e.country_code.clone()
        }
    })
    .into_iter()
    .map(|(country, b)| CountryStats {
        country,
        count: b.count,
        mean_severity: b.mean(b.severity_sum),
        mean_tone: b.mean(b.tone_sum),
        total_articles: b.articles,
        categories: b.categories,
    })
    .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.country.cmp(&b.country)));
    out
}

/// Per-category rollup, largest first; ties ordered by label.
pub fn stats_by_category(events: &[Event]) -> Vec<CategoryStats> {
    let mut out: Vec<CategoryStats> = group_by(events, |e| e.category.as_str().to_string())
        .into_iter()
        .map(|(category, b)| CategoryStats {
            category,
            count: b.count,
            mean_severity: b.mean(b.severity_sum),
            mean_tone: b.mean(b.tone_sum),
            total_articles: b.articles,
            distinct_countries: b.countries.len(),
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    out
}

pub fn day_stats(date: NaiveDate, events: &[Event]) -> DayStats {
    let mut b = Bucket::default();
    for e in events {
        b.add(e);
    }
    DayStats {
        date,
        count: b.count,
        mean_severity: b.mean(b.severity_sum),
        mean_tone: b.mean(b.tone_sum),
        total_articles: b.articles,
        categories: b.categories,
    }
}

/// Calendar days from `start` through `end`, inclusive. Empty when reversed.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

fn trend_for_day(
    store: &ArchiveStore,
    schema: &RecordSchema,
    date: NaiveDate,
    threshold: f64,
) -> Option<DayStats> {
    let _guard = store.read();
    let archive = find_archive_by_date(store.root(), date)?;
    let events = parse_archive(&archive.path, schema, threshold, usize::MAX);
    Some(day_stats(date, &events))
}

/// Day-bucketed series over `start..=end`. Days without an archive are absent.
///
/// Days are parsed on up to one worker thread per CPU.
pub fn trends(
    store: &ArchiveStore,
    schema: &RecordSchema,
    start: NaiveDate,
    end: NaiveDate,
    threshold: f64,
) -> BTreeMap<NaiveDate, DayStats> {
    let days = days_between(start, end);
    if days.is_empty() {
        return BTreeMap::new();
    }
    let workers = num_cpus::get().clamp(1, days.len());

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|w| {
                let mine: Vec<NaiveDate> = days.iter().copied().skip(w).step_by(workers).collect();
                scope.spawn(move || {
                    mine.into_iter()
                        .filter_map(|d| trend_for_day(store, schema, d, threshold))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_default())
            .map(|s| (s.date, s))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::fixtures::event;
    use crate::event::Category;

    fn sample() -> Vec<Event> {
        let mut c = event("20240104", "FR", -6.0, -1.0, 4);
        c.category = Category::VerbalConflict;
        vec![
            event("20240101", "US", -8.0, -4.0, 10),
            event("20240102", "US", -6.0, -2.0, 2),
            event("20240103", "", -10.0, -6.0, 1),
            c,
        ]
    }

    #[test]
    fn country_rollup_orders_by_count() {
        let stats = stats_by_country(&sample());
        let order: Vec<&str> = stats.iter().map(|s| s.country.as_str()).collect();
        assert_eq!(order, vec!["US", "FR", UNKNOWN_COUNTRY]);

        let us = &stats[0];
        assert_eq!(us.count, 2);
        assert_eq!(us.mean_severity, -7.0);
        assert_eq!(us.mean_tone, -3.0);
        assert_eq!(us.total_articles, 12);
        assert_eq!(us.categories.get("Material Conflict"), Some(&2));
    }

    #[test]
    fn category_rollup_counts_distinct_countries() {
        let stats = stats_by_category(&sample());
        assert_eq!(stats[0].category, "Material Conflict");
        assert_eq!(stats[0].count, 3);
        // The blank country code is not counted.
        assert_eq!(stats[0].distinct_countries, 1);
        assert_eq!(stats[1].category, "Verbal Conflict");
        assert_eq!(stats[1].distinct_countries, 1);
    }

    #[test]
    fn empty_input_has_no_buckets() {
        assert!(stats_by_country(&[]).is_empty());
        assert!(stats_by_category(&[]).is_empty());
        let d = day_stats(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), &[]);
        assert_eq!(d.count, 0);
        assert_eq!(d.mean_severity, 0.0);
    }

    #[test]
    fn day_range_is_inclusive() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(days_between(start, end).len(), 4);
        assert_eq!(days_between(start, start).len(), 1);
        assert!(days_between(end, start).is_empty());
    }
}

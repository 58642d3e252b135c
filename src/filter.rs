use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Articles + mentions, descending.
    Importance,
    /// `YYYYMMDD` text, descending.
    #[default]
    Date,
    /// Average tone, ascending.
    Tone,
    /// Goldstein scale, ascending.
    Scale,
}

impl SortKey {
    /// Unknown keys fall back to `Date`.
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "importance" => SortKey::Importance,
            "date" => SortKey::Date,
            "tone" => SortKey::Tone,
            "scale" => SortKey::Scale,
            _ => SortKey::Date,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Importance => "importance",
            SortKey::Date => "date",
            SortKey::Tone => "tone",
            SortKey::Scale => "scale",
        }
    }
}

/// Every input of an alert query. Also the cache key: identical tuples are
/// interchangeable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    pub severity_threshold: f64,
    pub max_events: usize,
    pub country: Option<String>,
    pub category: Option<String>,
    pub min_articles: Option<u32>,
    /// `None` keeps archive order.
    pub sort_by: Option<SortKey>,
}

impl Default for QueryParameters {
    fn default() -> Self {
        Self {
            severity_threshold: -5.0,
            max_events: 1000,
            country: None,
            category: None,
            min_articles: None,
            sort_by: None,
        }
    }
}

impl QueryParameters {
    /// Present fields as canonical `name -> value` pairs, in name order.
    /// Country is upper-cased since it matches case-insensitively.
    pub fn key_fields(&self) -> BTreeMap<&'static str, String> {
        let mut fields = BTreeMap::new();
        fields.insert("severity_threshold", format!("{:?}", self.severity_threshold));
        fields.insert("max_events", self.max_events.to_string());
        if let Some(c) = &self.country {
            fields.insert("country", c.trim().to_ascii_uppercase());
        }
        if let Some(c) = &self.category {
            fields.insert("category", c.clone());
        }
        if let Some(n) = self.min_articles {
            fields.insert("min_articles", n.to_string());
        }
        if let Some(s) = self.sort_by {
            fields.insert("sort_by", s.as_str().to_string());
        }
        fields
    }
}

fn matches_country(event: &Event, country: &str) -> bool {
    let wanted = country.trim();
    event.countries().any(|c| c.eq_ignore_ascii_case(wanted))
}

/// Keep events passing every present predicate. Absent predicates pass all.
pub fn filter(
    events: Vec<Event>,
    country: Option<&str>,
    category: Option<&str>,
    min_articles: Option<u32>,
) -> Vec<Event> {
    events
        .into_iter()
        .filter(|e| country.map_or(true, |c| matches_country(e, c)))
        .filter(|e| category.map_or(true, |c| e.category.as_str() == c))
        .filter(|e| min_articles.map_or(true, |n| e.num_articles >= n))
        .collect()
}

/// Stable sort by `key`; equal elements keep their relative order.
pub fn sort(mut events: Vec<Event>, key: SortKey) -> Vec<Event> {
    match key {
        SortKey::Importance => events.sort_by(|a, b| b.importance().cmp(&a.importance())),
        SortKey::Date => events.sort_by(|a, b| b.event_date.cmp(&a.event_date)),
        SortKey::Tone => events.sort_by(|a, b| a.avg_tone.total_cmp(&b.avg_tone)),
        SortKey::Scale => events.sort_by(|a, b| a.scale.total_cmp(&b.scale)),
    }
    events
}

/// Filter, then order, then cap at `max_events`.
pub fn apply(events: Vec<Event>, params: &QueryParameters) -> Vec<Event> {
    let filtered = filter(
        events,
        params.country.as_deref(),
        params.category.as_deref(),
        params.min_articles,
    );
    let mut ordered = match params.sort_by {
        Some(key) => sort(filtered, key),
        None => filtered,
    };
    ordered.truncate(params.max_events);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::fixtures::event;
    use crate::event::Category;

    fn sample() -> Vec<Event> {
        let mut a = event("20240103", "US", -7.0, -2.0, 5);
        a.num_mentions = 1;
        let mut b = event("20240105", "UP", -9.0, -8.0, 1);
        b.actor1_country = Some("RUS".to_string());
        b.num_mentions = 1;
        let mut c = event("20240104", "FR", -5.5, -4.0, 20);
        c.category = Category::VerbalConflict;
        c.num_mentions = 30;
        vec![a, b, c]
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.event_date.as_str()).collect()
    }

    #[test]
    fn country_matches_any_code_case_insensitively() {
        assert_eq!(ids(&filter(sample(), Some("rus"), None, None)), vec!["20240105"]);
        assert_eq!(ids(&filter(sample(), Some("us"), None, None)), vec!["20240103"]);
        assert!(filter(sample(), Some("DE"), None, None).is_empty());
    }

    #[test]
    fn category_is_exact_label() {
        let out = filter(sample(), None, Some("Verbal Conflict"), None);
        assert_eq!(ids(&out), vec!["20240104"]);
        assert!(filter(sample(), None, Some("verbal conflict"), None).is_empty());
    }

    #[test]
    fn min_articles_is_inclusive() {
        assert_eq!(ids(&filter(sample(), None, None, Some(5))), vec!["20240103", "20240104"]);
    }

    #[test]
    fn absent_predicates_pass_everything() {
        assert_eq!(filter(sample(), None, None, None).len(), 3);
    }

    #[test]
    fn sort_keys() {
        assert_eq!(
            ids(&sort(sample(), SortKey::Importance)),
            vec!["20240104", "20240103", "20240105"]
        );
        assert_eq!(
            ids(&sort(sample(), SortKey::Date)),
            vec!["20240105", "20240104", "20240103"]
        );
        assert_eq!(
            ids(&sort(sample(), SortKey::Tone)),
            vec!["20240105", "20240104", "20240103"]
        );
        assert_eq!(
            ids(&sort(sample(), SortKey::Scale)),
            vec!["20240105", "20240103", "20240104"]
        );
    }

    #[test]
    fn date_sort_is_textual() {
        let mut short = event("2024011", "US", -7.0, 0.0, 1);
        short.global_event_id = "short".to_string();
        let long = event("20240102", "US", -7.0, 0.0, 1);
        let out = sort(vec![short, long], SortKey::Date);
        // "2024011" > "20240102" as text even though it is not a real date.
        assert_eq!(out[0].event_date, "2024011");
    }

    #[test]
    fn unknown_sort_key_means_date() {
        assert_eq!(SortKey::parse_or_default("loudness"), SortKey::Date);
        assert_eq!(SortKey::parse_or_default("Tone"), SortKey::Tone);
    }

    #[test]
    fn apply_caps_after_sorting() {
        let params = QueryParameters {
            max_events: 1,
            sort_by: Some(SortKey::Scale),
            ..Default::default()
        };
        assert_eq!(ids(&apply(sample(), &params)), vec!["20240105"]);
    }

    #[test]
    fn key_fields_skip_absent_values() {
        let params = QueryParameters {
            country: Some("us".to_string()),
            ..Default::default()
        };
        let fields = params.key_fields();
        assert_eq!(fields.get("country").map(String::as_str), Some("US"));
        assert!(!fields.contains_key("category"));
        assert_eq!(fields.get("severity_threshold").map(String::as_str), Some("-5.0"));
    }
}

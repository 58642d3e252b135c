//! Column layout of the event export format.
//!
//! The feed ships tab-delimited rows with at least 61 columns. Several column
//! offsets were wrong in the first revision of this mapping; both revisions are
//! kept as explicit [`SchemaVersion`]s so archives decoded under the old layout
//! can still be audited, and the default is the corrected one.

use serde::{Deserialize, Serialize};

use crate::event::Category;

/// Rows narrower than this are skipped outright.
pub const MIN_ROW_WIDTH: usize = 61;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    GlobalEventId,
    SqlDate,
    Actor1Name,
    Actor1CountryCode,
    Actor2Name,
    Actor2CountryCode,
    EventCode,
    QuadClass,
    GoldsteinScale,
    NumMentions,
    NumSources,
    NumArticles,
    AvgTone,
    ActionGeoFullName,
    ActionGeoCountryCode,
    ActionGeoAdm1Code,
    ActionGeoLat,
    ActionGeoLong,
    SourceUrl,
}

impl Field {
    pub const ALL: [Field; 19] = [
        Field::GlobalEventId,
        Field::SqlDate,
        Field::Actor1Name,
        Field::Actor1CountryCode,
        Field::Actor2Name,
        Field::Actor2CountryCode,
        Field::EventCode,
        Field::QuadClass,
        Field::GoldsteinScale,
        Field::NumMentions,
        Field::NumSources,
        Field::NumArticles,
        Field::AvgTone,
        Field::ActionGeoFullName,
        Field::ActionGeoCountryCode,
        Field::ActionGeoAdm1Code,
        Field::ActionGeoLat,
        Field::ActionGeoLong,
        Field::SourceUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::GlobalEventId => "global_event_id",
            Field::SqlDate => "sql_date",
            Field::Actor1Name => "actor1_name",
            Field::Actor1CountryCode => "actor1_country_code",
            Field::Actor2Name => "actor2_name",
            Field::Actor2CountryCode => "actor2_country_code",
            Field::EventCode => "event_code",
            Field::QuadClass => "quad_class",
            Field::GoldsteinScale => "goldstein_scale",
            Field::NumMentions => "num_mentions",
            Field::NumSources => "num_sources",
            Field::NumArticles => "num_articles",
            Field::AvgTone => "avg_tone",
            Field::ActionGeoFullName => "action_geo_full_name",
            Field::ActionGeoCountryCode => "action_geo_country_code",
            Field::ActionGeoAdm1Code => "action_geo_adm1_code",
            Field::ActionGeoLat => "action_geo_lat",
            Field::ActionGeoLong => "action_geo_long",
            Field::SourceUrl => "source_url",
        }
    }

    /// Resolve a logical field name. Accepts the snake_case names above, the
    /// same names with spaces or dashes, and a few descriptive aliases.
    pub fn from_name(name: &str) -> Option<Field> {
        let normalized: String = name
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        let alias = match normalized.as_str() {
            "event_date" | "date" => Some(Field::SqlDate),
            "severity" | "severity_scale" => Some(Field::GoldsteinScale),
            "action_geo_latitude" | "latitude" => Some(Field::ActionGeoLat),
            "action_geo_longitude" | "longitude" => Some(Field::ActionGeoLong),
            "tone" => Some(Field::AvgTone),
            _ => None,
        };
        alias.or_else(|| Field::ALL.iter().copied().find(|f| f.as_str() == normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVersion {
    /// First revision: event code, quad class, mention/source counts and the
    /// action-geo location columns point one or more columns off.
    Legacy,
    #[default]
    V2,
}

impl SchemaVersion {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "v1" => Some(SchemaVersion::Legacy),
            "v2" => Some(SchemaVersion::V2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::Legacy => "legacy",
            SchemaVersion::V2 => "v2",
        }
    }
}

/// Column index of `field` under `version`.
pub const fn field_offset(field: Field, version: SchemaVersion) -> usize {
    match (field, version) {
        (Field::GlobalEventId, _) => 0,
        (Field::SqlDate, _) => 1,
        (Field::Actor1Name, _) => 6,
        (Field::Actor1CountryCode, _) => 7,
        (Field::Actor2Name, _) => 16,
        (Field::Actor2CountryCode, _) => 17,
        (Field::EventCode, SchemaVersion::Legacy) => 27,
        (Field::EventCode, SchemaVersion::V2) => 26,
        (Field::QuadClass, SchemaVersion::Legacy) => 28,
        (Field::QuadClass, SchemaVersion::V2) => 29,
        (Field::GoldsteinScale, _) => 30,
        (Field::NumMentions, SchemaVersion::Legacy) => 32,
        (Field::NumMentions, SchemaVersion::V2) => 31,
        (Field::NumSources, SchemaVersion::Legacy) => 31,
        (Field::NumSources, SchemaVersion::V2) => 32,
        (Field::NumArticles, _) => 33,
        (Field::AvgTone, _) => 34,
        (Field::ActionGeoFullName, SchemaVersion::Legacy) => 58,
        (Field::ActionGeoFullName, SchemaVersion::V2) => 52,
        (Field::ActionGeoCountryCode, SchemaVersion::Legacy) => 51,
        (Field::ActionGeoCountryCode, SchemaVersion::V2) => 53,
        (Field::ActionGeoAdm1Code, SchemaVersion::Legacy) => 52,
        (Field::ActionGeoAdm1Code, SchemaVersion::V2) => 54,
        (Field::ActionGeoLat, _) => 56,
        (Field::ActionGeoLong, _) => 57,
        (Field::SourceUrl, _) => 60,
    }
}

/// Name-based lookup, for callers holding field names as strings.
pub fn field_offset_by_name(name: &str, version: SchemaVersion) -> Option<usize> {
    Field::from_name(name).map(|f| field_offset(f, version))
}

/// An immutable, versioned column mapping handed to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RecordSchema {
    version: SchemaVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffsetChange {
    pub field: Field,
    pub from: usize,
    pub to: usize,
}

impl RecordSchema {
    pub const fn new(version: SchemaVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn offset(&self, field: Field) -> usize {
        field_offset(field, self.version)
    }

    pub fn min_width(&self) -> usize {
        MIN_ROW_WIDTH
    }

    pub fn max_offset(&self) -> usize {
        Field::ALL.iter().map(|f| self.offset(*f)).max().unwrap_or(0)
    }

    /// Fields whose column moved between `self` and `other`.
    pub fn diff(&self, other: &RecordSchema) -> Vec<OffsetChange> {
        Field::ALL
            .iter()
            .filter_map(|f| {
                let from = self.offset(*f);
                let to = other.offset(*f);
                (from != to).then_some(OffsetChange { field: *f, from, to })
            })
            .collect()
    }
}

// =============================================================================
// Safe accessors
// =============================================================================

/// Finite float or absent. Empty and non-numeric input are absent.
pub fn safe_float(raw: &str) -> Option<f64> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn safe_int(raw: &str) -> Option<i64> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<i64>().ok()
}

pub fn safe_string(raw: &str) -> String {
    raw.trim().to_string()
}

/// One split source row. Lookups past the end of the row are absent.
#[derive(Debug, Clone)]
pub struct Row<'a> {
    cols: Vec<&'a str>,
}

impl<'a> Row<'a> {
    pub fn split(line: &'a str, delimiter: char) -> Self {
        Self {
            cols: line.split(delimiter).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    pub fn raw(&self, schema: &RecordSchema, field: Field) -> Option<&'a str> {
        self.cols.get(schema.offset(field)).copied()
    }

    pub fn float(&self, schema: &RecordSchema, field: Field) -> Option<f64> {
        self.raw(schema, field).and_then(safe_float)
    }

    pub fn int(&self, schema: &RecordSchema, field: Field) -> Option<i64> {
        self.raw(schema, field).and_then(safe_int)
    }

    pub fn count(&self, schema: &RecordSchema, field: Field) -> u32 {
        self.int(schema, field)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    }

    pub fn string(&self, schema: &RecordSchema, field: Field) -> String {
        self.raw(schema, field).map(safe_string).unwrap_or_default()
    }

    pub fn optional_string(&self, schema: &RecordSchema, field: Field) -> Option<String> {
        Some(self.string(schema, field)).filter(|s| !s.is_empty())
    }
}

// =============================================================================
// Category resolution
// =============================================================================

/// Quad class decides when present; otherwise the numeric event code range
/// is used for older records that lack it.
pub fn resolve_category(event_code: &str, quad_class: Option<i64>) -> Category {
    match quad_class {
        Some(1) => return Category::VerbalCooperation,
        Some(2) => return Category::MaterialCooperation,
        Some(3) => return Category::VerbalConflict,
        Some(4) => return Category::MaterialConflict,
        _ => {}
    }
    match safe_int(event_code) {
        Some(100..=199) => Category::MaterialConflict,
        Some(200..=299) => Category::VerbalConflict,
        Some(300..=399) => Category::MaterialCooperation,
        Some(400..=499) => Category::VerbalCooperation,
        _ => Category::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a known-good 61 column row where each cell names its own index,
    /// except for the cells the test overrides.
    fn fixture_row(overrides: &[(usize, &str)]) -> String {
        let mut cols: Vec<String> = (0..MIN_ROW_WIDTH).map(|i| format!("c{}", i)).collect();
        for (idx, value) in overrides {
            cols[*idx] = value.to_string();
        }
        cols.join("\t")
    }

    #[test]
    fn v2_offsets_match_codebook_fixture() {
        let line = fixture_row(&[]);
        let row = Row::split(&line, '\t');
        let schema = RecordSchema::new(SchemaVersion::V2);
        let expected = [
            (Field::GlobalEventId, "c0"),
            (Field::SqlDate, "c1"),
            (Field::Actor1Name, "c6"),
            (Field::Actor1CountryCode, "c7"),
            (Field::Actor2Name, "c16"),
            (Field::Actor2CountryCode, "c17"),
            (Field::EventCode, "c26"),
            (Field::QuadClass, "c29"),
            (Field::GoldsteinScale, "c30"),
            (Field::NumMentions, "c31"),
            (Field::NumSources, "c32"),
            (Field::NumArticles, "c33"),
            (Field::AvgTone, "c34"),
            (Field::ActionGeoFullName, "c52"),
            (Field::ActionGeoCountryCode, "c53"),
            (Field::ActionGeoAdm1Code, "c54"),
            (Field::ActionGeoLat, "c56"),
            (Field::ActionGeoLong, "c57"),
            (Field::SourceUrl, "c60"),
        ];
        assert_eq!(expected.len(), Field::ALL.len());
        for (field, cell) in expected {
            assert_eq!(row.raw(&schema, field), Some(cell), "{:?}", field);
        }
    }

    #[test]
    fn legacy_offsets_match_fixture() {
        let line = fixture_row(&[]);
        let row = Row::split(&line, '\t');
        let schema = RecordSchema::new(SchemaVersion::Legacy);
        let expected = [
            (Field::EventCode, "c27"),
            (Field::QuadClass, "c28"),
            (Field::NumMentions, "c32"),
            (Field::NumSources, "c31"),
            (Field::ActionGeoFullName, "c58"),
            (Field::ActionGeoCountryCode, "c51"),
            (Field::ActionGeoAdm1Code, "c52"),
            (Field::GoldsteinScale, "c30"),
            (Field::SourceUrl, "c60"),
        ];
        for (field, cell) in expected {
            assert_eq!(row.raw(&schema, field), Some(cell), "{:?}", field);
        }
    }

    #[test]
    fn diff_lists_moved_columns() {
        let legacy = RecordSchema::new(SchemaVersion::Legacy);
        let v2 = RecordSchema::new(SchemaVersion::V2);
        let moved: Vec<Field> = legacy.diff(&v2).into_iter().map(|c| c.field).collect();
        assert_eq!(
            moved,
            vec![
                Field::EventCode,
                Field::QuadClass,
                Field::NumMentions,
                Field::NumSources,
                Field::ActionGeoFullName,
                Field::ActionGeoCountryCode,
                Field::ActionGeoAdm1Code,
            ]
        );
        assert!(v2.diff(&v2).is_empty());
    }

    #[test]
    fn every_offset_fits_minimum_width() {
        for version in [SchemaVersion::Legacy, SchemaVersion::V2] {
            assert!(RecordSchema::new(version).max_offset() < MIN_ROW_WIDTH);
        }
    }

    #[test]
    fn name_lookup_accepts_aliases() {
        assert_eq!(field_offset_by_name("event code", SchemaVersion::V2), Some(26));
        assert_eq!(field_offset_by_name("goldstein-scale", SchemaVersion::V2), Some(30));
        assert_eq!(field_offset_by_name("action geo latitude", SchemaVersion::V2), Some(56));
        assert_eq!(field_offset_by_name("event_code", SchemaVersion::Legacy), Some(27));
        assert_eq!(field_offset_by_name("no such field", SchemaVersion::V2), None);
    }

    #[test]
    fn short_row_access_is_absent() {
        let row = Row::split("a\tb\tc", '\t');
        let schema = RecordSchema::default();
        assert_eq!(row.raw(&schema, Field::SourceUrl), None);
        assert_eq!(row.float(&schema, Field::ActionGeoLat), None);
        assert_eq!(row.count(&schema, Field::NumArticles), 0);
        assert_eq!(row.string(&schema, Field::Actor2Name), "");
        assert_eq!(row.optional_string(&schema, Field::Actor1Name), None);
    }

    #[test]
    fn safe_accessors_tolerate_garbage() {
        assert_eq!(safe_float(" -7.5 "), Some(-7.5));
        assert_eq!(safe_float(""), None);
        assert_eq!(safe_float("abc"), None);
        assert_eq!(safe_float("NaN"), None);
        assert_eq!(safe_int("42"), Some(42));
        assert_eq!(safe_int("4.2"), None);
        assert_eq!(safe_int("  "), None);
        assert_eq!(safe_string("  Kyiv \r"), "Kyiv");
    }

    #[test]
    fn quad_class_wins_over_event_code() {
        assert_eq!(resolve_category("042", Some(4)), Category::MaterialConflict);
        assert_eq!(resolve_category("190", Some(1)), Category::VerbalCooperation);
        assert_eq!(resolve_category("", Some(2)), Category::MaterialCooperation);
        assert_eq!(resolve_category("", Some(3)), Category::VerbalConflict);
    }

    #[test]
    fn event_code_ranges_apply_without_quad_class() {
        assert_eq!(resolve_category("150", None), Category::MaterialConflict);
        assert_eq!(resolve_category("250", None), Category::VerbalConflict);
        assert_eq!(resolve_category("350", None), Category::MaterialCooperation);
        assert_eq!(resolve_category("450", None), Category::VerbalCooperation);
        assert_eq!(resolve_category("050", None), Category::Unknown);
        assert_eq!(resolve_category("abc", None), Category::Unknown);
        // Out-of-range quad class falls through to the code ranges.
        assert_eq!(resolve_category("150", Some(9)), Category::MaterialConflict);
    }
}

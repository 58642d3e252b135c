use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Verbal Cooperation")]
    VerbalCooperation,
    #[serde(rename = "Material Cooperation")]
    MaterialCooperation,
    #[serde(rename = "Verbal Conflict")]
    VerbalConflict,
    #[serde(rename = "Material Conflict")]
    MaterialConflict,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::VerbalCooperation,
        Category::MaterialCooperation,
        Category::VerbalConflict,
        Category::MaterialConflict,
        Category::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::VerbalCooperation => "Verbal Cooperation",
            Category::MaterialCooperation => "Material Cooperation",
            Category::VerbalConflict => "Verbal Conflict",
            Category::MaterialConflict => "Material Conflict",
            Category::Unknown => "Unknown",
        }
    }

    /// Exact label match.
    pub fn from_label(label: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.as_str() == label)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized record. Only built when latitude, longitude and the
/// goldstein scale were all present and numeric in the source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub global_event_id: String,
    /// `YYYYMMDD`, kept as text; ordering by date is lexicographic.
    pub event_date: String,
    pub event_code: String,
    pub category: Category,
    pub quad_class: Option<u8>,
    pub name: String,
    pub actor1: Option<String>,
    pub actor1_country: Option<String>,
    pub actor2: Option<String>,
    pub actor2_country: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub location: String,
    pub country_code: String,
    pub adm1_code: String,
    /// Goldstein scale, -10..10; lower is more severe.
    pub scale: f64,
    pub avg_tone: f64,
    pub num_articles: u32,
    pub num_mentions: u32,
    pub num_sources: u32,
    pub url: String,
}

impl Event {
    pub fn importance(&self) -> u64 {
        u64::from(self.num_articles) + u64::from(self.num_mentions)
    }

    /// Every country code attached to the event, blank ones excluded.
    pub fn countries(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.country_code.as_str())
            .chain(self.actor1_country.as_deref())
            .chain(self.actor2_country.as_deref())
            .filter(|c| !c.is_empty())
    }
}

pub fn display_name(actor1: Option<&str>, actor2: Option<&str>) -> String {
    format!("{} - {}", actor1.unwrap_or(""), actor2.unwrap_or(""))
}

//! Point-of-interest ("spot") record model and partial-update payloads.
//!
//! A spot carries a canonical name, coordinates, and a set of optional
//! attributes that the enrichment pipeline fills in over many runs. Nothing in
//! here talks to a store or a provider; conversions to and from JSON rows are
//! kept here so every backend agrees on column names.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

/// Minimum description length (in characters) for a locale pair to count as filled.
pub const MIN_DESCRIPTION_CHARS: usize = 10;

/// Fixed category enumeration for spots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Landmark,
    Nature,
    History,
    Modern,
    Science,
    Art,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Landmark,
        Category::Nature,
        Category::History,
        Category::Modern,
        Category::Science,
        Category::Art,
    ];

    /// Baseline value assigned at ingestion; still counts as unclassified.
    pub const PLACEHOLDER: Category = Category::Landmark;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landmark => "landmark",
            Self::Nature => "nature",
            Self::History => "history",
            Self::Modern => "modern",
            Self::Science => "science",
            Self::Art => "art",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writing system a localized name is expected to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Latin,
    Japanese,
    Han,
    Hangul,
    Thai,
}

impl Script {
    /// Returns `true` when `ch` counts as written in this script. Latin-script
    /// locales accept any character, so only the other scripts constrain names.
    pub fn contains_char(self, ch: char) -> bool {
        let code = ch as u32;
        let han = matches!(code, 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF);
        match self {
            Self::Latin => true,
            Self::Japanese => han || matches!(code, 0x3040..=0x309F | 0x30A0..=0x30FF),
            Self::Han => han,
            Self::Hangul => matches!(code, 0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF),
            Self::Thai => matches!(code, 0x0E00..=0x0E7F),
        }
    }
}

/// Supported content locales. Each one maps to a `name_<code>` and
/// `description_<code>` column pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Ja,
    Zh,
    Ko,
    Es,
    Fr,
    De,
    It,
    Pt,
    Th,
}

impl Locale {
    pub const ALL: [Locale; 10] = [
        Locale::En,
        Locale::Ja,
        Locale::Zh,
        Locale::Ko,
        Locale::Es,
        Locale::Fr,
        Locale::De,
        Locale::It,
        Locale::Pt,
        Locale::Th,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ja => "ja",
            Self::Zh => "zh",
            Self::Ko => "ko",
            Self::Es => "es",
            Self::Fr => "fr",
            Self::De => "de",
            Self::It => "it",
            Self::Pt => "pt",
            Self::Th => "th",
        }
    }

    /// English language name, used when phrasing inference instructions.
    pub fn language_name(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Ja => "Japanese",
            Self::Zh => "Simplified Chinese",
            Self::Ko => "Korean",
            Self::Es => "Spanish",
            Self::Fr => "French",
            Self::De => "German",
            Self::It => "Italian",
            Self::Pt => "Portuguese",
            Self::Th => "Thai",
        }
    }

    pub fn script(self) -> Script {
        match self {
            Self::Ja => Script::Japanese,
            Self::Zh => Script::Han,
            Self::Ko => Script::Hangul,
            Self::Th => Script::Thai,
            Self::En | Self::Es | Self::Fr | Self::De | Self::It | Self::Pt => Script::Latin,
        }
    }

    pub fn name_column(self) -> String {
        format!("name_{}", self.code())
    }

    pub fn description_column(self) -> String {
        format!("description_{}", self.code())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Stored per-locale name/description, either side possibly missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedText {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A freshly computed, complete name/description pair for one locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedPair {
    pub name: String,
    pub description: String,
}

/// Historical era used when a year is expressed as a magnitude plus era marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Era {
    Bc,
    Ad,
}

impl Era {
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .chars()
            .filter(|ch| ch.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "BC" | "BCE" => Some(Self::Bc),
            "AD" | "CE" => Some(Self::Ad),
            _ => None,
        }
    }
}

/// Converts an era plus magnitude into the signed storage convention
/// (BC is negative, AD is positive).
pub fn year_from_era(era: Era, magnitude: u32) -> i32 {
    let magnitude = i32::try_from(magnitude).unwrap_or(i32::MAX);
    match era {
        Era::Bc => -magnitude,
        Era::Ad => magnitude,
    }
}

/// Human-readable label for a signed year, e.g. `BC 2500` or `AD 1603`.
pub fn year_label(year: i32) -> String {
    if year < 0 {
        format!("BC {}", year.unsigned_abs())
    } else {
        format!("AD {year}")
    }
}

/// Returns the trimmed value when it holds any non-whitespace text.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

/// One point-of-interest record.
#[derive(Debug, Clone, PartialEq)]
pub struct Spot {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub category: Option<Category>,
    /// Stored category text outside the known set, kept as-is and never overwritten.
    pub unrecognized_category: Option<String>,
    pub year: Option<i32>,
    pub country: Option<String>,
    pub country_ja: Option<String>,
    pub image_url: Option<String>,
    pub localized: BTreeMap<Locale, LocalizedText>,
}

impl Spot {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lat,
            lon,
            category: None,
            unrecognized_category: None,
            year: None,
            country: None,
            country_ja: None,
            image_url: None,
            localized: BTreeMap::new(),
        }
    }

    /// Display name with any `#tag` suffixes removed.
    pub fn base_name(&self) -> &str {
        self.name.split('#').next().unwrap_or_default().trim()
    }

    /// Categorical `#tag` annotations appended after the base name.
    pub fn tags(&self) -> Vec<&str> {
        self.name
            .split('#')
            .skip(1)
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .collect()
    }

    pub fn localized(&self, locale: Locale) -> Option<&LocalizedText> {
        self.localized.get(&locale)
    }

    pub fn with_localized(
        mut self,
        locale: Locale,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Self {
        self.localized.insert(
            locale,
            LocalizedText {
                name: name.map(str::to_string),
                description: description.map(str::to_string),
            },
        );
        self
    }

    /// Records a category as read from a store column.
    pub fn set_stored_category(&mut self, stored: Option<&str>) {
        let stored = stored.map(str::trim).filter(|value| !value.is_empty());
        self.category = stored.and_then(Category::parse);
        self.unrecognized_category = match (stored, self.category) {
            (Some(value), None) => Some(value.to_string()),
            _ => None,
        };
    }

    /// Builds a spot from a JSON row as returned by a table API.
    ///
    /// Numeric ids are rendered to their decimal form. Category strings
    /// outside the known set land in `unrecognized_category`.
    pub fn from_json_row(row: &Map<String, Value>) -> Result<Self, String> {
        let id = match row.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err("row is missing an id".to_string()),
        };
        let text = |key: &str| row.get(key).and_then(Value::as_str).map(str::to_string);
        let number = |key: &str| row.get(key).and_then(Value::as_f64).unwrap_or(0.0);

        let mut spot = Spot::new(id, text("name").unwrap_or_default(), number("lat"), number("lon"));
        spot.set_stored_category(row.get("category").and_then(Value::as_str));
        spot.year = row
            .get("year")
            .and_then(Value::as_i64)
            .and_then(|year| i32::try_from(year).ok());
        spot.country = text("country");
        spot.country_ja = text("country_ja");
        spot.image_url = text("image_url");
        for locale in Locale::ALL {
            let name = text(&locale.name_column());
            let description = text(&locale.description_column());
            if name.is_some() || description.is_some() {
                spot.localized
                    .insert(locale, LocalizedText { name, description });
            }
        }
        Ok(spot)
    }

    /// Applies a patch in memory with the same partial-merge rules a store uses.
    pub fn apply_patch(&mut self, patch: &SpotPatch) {
        if let Some(country) = &patch.country {
            self.country = Some(country.clone());
        }
        if let Some(country_ja) = &patch.country_ja {
            self.country_ja = Some(country_ja.clone());
        }
        if let Some(image_url) = &patch.image_url {
            self.image_url = Some(image_url.clone());
        }
        if let Some(year) = patch.year {
            self.year = Some(year);
        }
        if let Some(category) = patch.category {
            self.category = Some(category);
            self.unrecognized_category = None;
        }
        for (locale, pair) in &patch.localized {
            self.localized.insert(
                *locale,
                LocalizedText {
                    name: Some(pair.name.clone()),
                    description: Some(pair.description.clone()),
                },
            );
        }
    }
}

/// Partial update payload: only `Some` fields (and listed locales) are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotPatch {
    pub country: Option<String>,
    pub country_ja: Option<String>,
    pub image_url: Option<String>,
    pub year: Option<i32>,
    pub category: Option<Category>,
    pub localized: BTreeMap<Locale, LocalizedPair>,
}

impl SpotPatch {
    pub fn is_empty(&self) -> bool {
        self.columns().is_empty()
    }

    /// Column name/value pairs in a stable order.
    pub fn columns(&self) -> Vec<(String, Value)> {
        let mut columns = Vec::new();
        if let Some(country) = &self.country {
            columns.push(("country".to_string(), Value::from(country.as_str())));
        }
        if let Some(country_ja) = &self.country_ja {
            columns.push(("country_ja".to_string(), Value::from(country_ja.as_str())));
        }
        if let Some(image_url) = &self.image_url {
            columns.push(("image_url".to_string(), Value::from(image_url.as_str())));
        }
        if let Some(year) = self.year {
            columns.push(("year".to_string(), Value::from(year)));
        }
        if let Some(category) = self.category {
            columns.push(("category".to_string(), Value::from(category.as_str())));
        }
        for (locale, pair) in &self.localized {
            columns.push((locale.name_column(), Value::from(pair.name.as_str())));
            columns.push((
                locale.description_column(),
                Value::from(pair.description.as_str()),
            ));
        }
        columns
    }

    pub fn field_names(&self) -> Vec<String> {
        self.columns().into_iter().map(|(name, _)| name).collect()
    }

    pub fn to_json_map(&self) -> Map<String, Value> {
        self.columns().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        year_from_era, year_label, Category, Era, Locale, LocalizedPair, Script, Spot, SpotPatch,
    };

    #[test]
    fn test_year_sign_round_trip_for_both_eras() {
        assert_eq!(year_from_era(Era::Bc, 2500), -2500);
        assert_eq!(year_from_era(Era::Ad, 1603), 1603);
        assert_eq!(year_label(-2500), "BC 2500");
        assert_eq!(year_label(1603), "AD 1603");
    }

    #[test]
    fn test_era_parse_accepts_common_spellings() {
        assert_eq!(Era::parse("BC"), Some(Era::Bc));
        assert_eq!(Era::parse("b.c.e."), Some(Era::Bc));
        assert_eq!(Era::parse("CE"), Some(Era::Ad));
        assert_eq!(Era::parse("A.D."), Some(Era::Ad));
        assert_eq!(Era::parse("sometime"), None);
    }

    #[test]
    fn test_base_name_and_tags_split_on_hash() {
        let spot = Spot::new("1", "Tokyo Tower #tower #night view", 35.65, 139.74);
        assert_eq!(spot.base_name(), "Tokyo Tower");
        assert_eq!(spot.tags(), vec!["tower", "night view"]);

        let untagged = Spot::new("2", "Kinkaku-ji", 35.03, 135.72);
        assert_eq!(untagged.base_name(), "Kinkaku-ji");
        assert!(untagged.tags().is_empty());
    }

    #[test]
    fn test_category_parse_is_case_insensitive_and_rejects_unknown() {
        assert_eq!(Category::parse(" Nature "), Some(Category::Nature));
        assert_eq!(Category::parse("ART"), Some(Category::Art));
        assert_eq!(Category::parse("food"), None);
    }

    #[test]
    fn test_script_membership_per_locale() {
        assert!(Locale::Ja.script().contains_char('東'));
        assert!(Locale::Ja.script().contains_char('カ'));
        assert!(!Locale::Ja.script().contains_char('a'));
        assert!(Locale::Ko.script().contains_char('서'));
        assert!(Locale::Th.script().contains_char('ก'));
        assert!(Script::Latin.contains_char('7'));
        assert!(Script::Latin.contains_char('東'));
        assert!(!Script::Hangul.contains_char('a'));
    }

    #[test]
    fn test_from_json_row_reads_numeric_id_and_locale_columns() {
        let row = json!({
            "id": 42,
            "name": "Colosseum #ruins",
            "lat": 41.89,
            "lon": 12.49,
            "category": "history",
            "year": 80,
            "country": "Italy",
            "name_ja": "コロッセオ",
            "description_ja": null,
            "image_url": null
        });
        let spot = Spot::from_json_row(row.as_object().expect("object row")).expect("valid row");
        assert_eq!(spot.id, "42");
        assert_eq!(spot.category, Some(Category::History));
        assert_eq!(spot.year, Some(80));
        assert_eq!(spot.country.as_deref(), Some("Italy"));
        assert_eq!(spot.image_url, None);
        let ja = spot.localized(Locale::Ja).expect("ja pair");
        assert_eq!(ja.name.as_deref(), Some("コロッセオ"));
        assert_eq!(ja.description, None);
        assert!(spot.localized(Locale::En).is_none());
    }

    #[test]
    fn test_from_json_row_keeps_unrecognized_category() {
        let row = json!({ "id": "7", "name": "Ramen Alley", "category": "Food" });
        let spot = Spot::from_json_row(row.as_object().expect("object row")).expect("valid row");
        assert_eq!(spot.category, None);
        assert_eq!(spot.unrecognized_category.as_deref(), Some("Food"));
    }

    #[test]
    fn test_from_json_row_rejects_missing_id() {
        let row = json!({ "name": "Nowhere" });
        assert!(Spot::from_json_row(row.as_object().expect("object row")).is_err());
    }

    #[test]
    fn test_patch_columns_only_contain_set_fields() {
        let mut patch = SpotPatch {
            country: Some("Japan".to_string()),
            ..SpotPatch::default()
        };
        patch.localized.insert(
            Locale::Ko,
            LocalizedPair {
                name: "도쿄 타워".to_string(),
                description: "도쿄의 상징적인 전파탑입니다.".to_string(),
            },
        );
        assert_eq!(
            patch.field_names(),
            vec!["country", "name_ko", "description_ko"]
        );
        assert!(!patch.is_empty());
        assert!(SpotPatch::default().is_empty());
    }

    #[test]
    fn test_apply_patch_leaves_unpatched_fields_alone() {
        let mut spot = Spot::new("1", "Eiffel Tower", 48.85, 2.29).with_localized(
            Locale::En,
            Some("Eiffel Tower"),
            Some("Wrought-iron lattice tower in Paris."),
        );
        spot.apply_patch(&SpotPatch {
            country: Some("France".to_string()),
            ..SpotPatch::default()
        });
        assert_eq!(spot.country.as_deref(), Some("France"));
        let en = spot.localized(Locale::En).expect("en pair");
        assert_eq!(en.name.as_deref(), Some("Eiffel Tower"));
        assert_eq!(
            en.description.as_deref(),
            Some("Wrought-iron lattice tower in Paris.")
        );
    }
}

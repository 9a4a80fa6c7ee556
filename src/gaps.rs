//! Field gap detection: which attributes of a spot are still missing or too weak.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::spot::{non_blank, Category, Locale, LocalizedText, Spot, MIN_DESCRIPTION_CHARS};

/// One missing or weak field on a spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gap {
    Image,
    Country,
    Year,
    Category,
    Locale(Locale),
}

/// Gap kind without the locale payload; used to scope a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GapKind {
    Image,
    Country,
    Year,
    Category,
    Locale,
}

pub type GapSet = BTreeSet<Gap>;

impl Gap {
    pub fn kind(self) -> GapKind {
        match self {
            Self::Image => GapKind::Image,
            Self::Country => GapKind::Country,
            Self::Year => GapKind::Year,
            Self::Category => GapKind::Category,
            Self::Locale(_) => GapKind::Locale,
        }
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Country => f.write_str("country"),
            Self::Year => f.write_str("year"),
            Self::Category => f.write_str("category"),
            Self::Locale(locale) => write!(f, "locale:{locale}"),
        }
    }
}

impl GapKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Some(Self::Image),
            "country" => Some(Self::Country),
            "year" => Some(Self::Year),
            "category" => Some(Self::Category),
            "locale" => Some(Self::Locale),
            _ => None,
        }
    }
}

/// Returns `true` when a stored locale pair is present and strong: both sides
/// non-empty, a long enough description, and for non-Latin locales a name
/// written at least partly in that locale's script.
pub fn is_strong_pair(text: Option<&LocalizedText>, locale: Locale) -> bool {
    let Some(text) = text else {
        return false;
    };
    let (Some(name), Some(description)) = (
        non_blank(text.name.as_deref()),
        non_blank(text.description.as_deref()),
    ) else {
        return false;
    };
    if description.chars().count() < MIN_DESCRIPTION_CHARS {
        return false;
    }
    let script = locale.script();
    name.chars().any(|ch| script.contains_char(ch))
}

/// Computes the gaps of `spot` for the given locale set.
pub fn detect_gaps(spot: &Spot, locales: &[Locale]) -> GapSet {
    let mut gaps = GapSet::new();
    if non_blank(spot.image_url.as_deref()).is_none() {
        gaps.insert(Gap::Image);
    }
    if non_blank(spot.country.as_deref()).is_none()
        && non_blank(spot.country_ja.as_deref()).is_none()
    {
        gaps.insert(Gap::Country);
    }
    if spot.year.is_none() {
        gaps.insert(Gap::Year);
    }
    let category_missing = match spot.category {
        Some(category) => category == Category::PLACEHOLDER,
        None => spot.unrecognized_category.is_none(),
    };
    if category_missing {
        gaps.insert(Gap::Category);
    }
    for &locale in locales {
        if !is_strong_pair(spot.localized(locale), locale) {
            gaps.insert(Gap::Locale(locale));
        }
    }
    gaps
}

/// Gap totals over a scanned data set, logged before enrichment starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapCensus {
    pub spots: usize,
    pub spots_with_gaps: usize,
    pub by_gap: BTreeMap<Gap, usize>,
}

impl GapCensus {
    pub fn record(&mut self, gaps: &GapSet) {
        self.spots += 1;
        if !gaps.is_empty() {
            self.spots_with_gaps += 1;
        }
        for gap in gaps {
            *self.by_gap.entry(*gap).or_insert(0) += 1;
        }
    }

    pub fn total_gaps(&self) -> usize {
        self.by_gap.values().sum()
    }

    pub fn summary_line(&self) -> String {
        let parts: Vec<String> = self
            .by_gap
            .iter()
            .map(|(gap, count)| format!("{gap}={count}"))
            .collect();
        format!(
            "{} of {} spots have gaps ({} total): {}",
            self.spots_with_gaps,
            self.spots,
            self.total_gaps(),
            if parts.is_empty() {
                "none".to_string()
            } else {
                parts.join(", ")
            }
        )
    }
}

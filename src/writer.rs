//! Persists enrichment results as partial updates.

use log::{debug, info, warn};

use crate::gaps::{detect_gaps, Gap, GapSet};
use crate::spot::{non_blank, Locale, Spot, SpotPatch};
use crate::store::SpotStore;

/// Outcome of handing one patch to the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Patch written; carries the column names sent.
    Written(Vec<String>),
    /// Dry run; carries the column names that would have been sent.
    DryRun(Vec<String>),
    /// Nothing left to write after filtering.
    Skipped,
    Failed,
}

pub struct PersistenceWriter<'a> {
    store: &'a dyn SpotStore,
    dry_run: bool,
}

impl<'a> PersistenceWriter<'a> {
    pub fn new(store: &'a dyn SpotStore, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    /// Writes `patch` for `spot`, keeping only fields that are still gaps on
    /// the record as read and carry a non-empty value.
    pub fn write(&self, spot: &Spot, patch: SpotPatch) -> WriteOutcome {
        let patch = retain_gap_fields(spot, patch);
        if patch.is_empty() {
            debug!("Writer: nothing to write for spot {}", spot.id);
            return WriteOutcome::Skipped;
        }
        let fields = patch.field_names();
        if self.dry_run {
            info!(
                "Writer: dry run, would update spot {} ({}): {}",
                spot.id,
                spot.base_name(),
                serde_json::Value::Object(patch.to_json_map())
            );
            return WriteOutcome::DryRun(fields);
        }
        match self.store.update_fields(&spot.id, &patch) {
            Ok(()) => {
                info!(
                    "Writer: updated spot {} ({}): {}",
                    spot.id,
                    spot.base_name(),
                    fields.join(", ")
                );
                WriteOutcome::Written(fields)
            }
            Err(error) => {
                warn!("Writer: failed to update spot {}: {}", spot.id, error);
                WriteOutcome::Failed
            }
        }
    }
}

fn keep_text(value: Option<String>, is_gap: bool) -> Option<String> {
    if !is_gap {
        return None;
    }
    non_blank(value.as_deref()).map(str::to_string)
}

/// Drops patch fields that would overwrite present data or write blanks.
fn retain_gap_fields(spot: &Spot, patch: SpotPatch) -> SpotPatch {
    let gaps: GapSet = detect_gaps(spot, &Locale::ALL);
    let country_gap = gaps.contains(&Gap::Country);
    SpotPatch {
        country: keep_text(patch.country, country_gap),
        country_ja: keep_text(patch.country_ja, country_gap),
        image_url: keep_text(patch.image_url, gaps.contains(&Gap::Image)),
        year: patch.year.filter(|_| gaps.contains(&Gap::Year)),
        category: patch.category.filter(|_| gaps.contains(&Gap::Category)),
        localized: patch
            .localized
            .into_iter()
            .filter(|(locale, pair)| {
                gaps.contains(&Gap::Locale(*locale))
                    && !pair.name.trim().is_empty()
                    && !pair.description.trim().is_empty()
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{PersistenceWriter, WriteOutcome};
    use crate::spot::{Category, Locale, LocalizedPair, Spot, SpotPatch};
    use crate::store::sqlite::SqliteSpotStore;
    use crate::test_support::MemoryStore;

    fn english_pair() -> LocalizedPair {
        LocalizedPair {
            name: "Himeji Castle".to_string(),
            description: "A hilltop castle complex in Hyogo.".to_string(),
        }
    }

    #[test]
    fn test_empty_patch_makes_no_store_call() {
        let store = MemoryStore::new(vec![Spot::new("1", "Himeji Castle", 34.8, 134.7)]);
        let writer = PersistenceWriter::new(&store, false);
        let spot = store.spot("1");
        assert_eq!(writer.write(&spot, SpotPatch::default()), WriteOutcome::Skipped);
        assert!(store.updates().is_empty());
    }

    #[test]
    fn test_present_fields_are_never_overwritten() {
        let mut spot = Spot::new("1", "Himeji Castle", 34.8, 134.7);
        spot.country = Some("Japan".to_string());
        spot.year = Some(1609);
        let store = MemoryStore::new(vec![spot.clone()]);
        let writer = PersistenceWriter::new(&store, false);
        let patch = SpotPatch {
            country: Some("Nippon".to_string()),
            year: Some(1346),
            image_url: Some("  ".to_string()),
            category: Some(Category::History),
            ..SpotPatch::default()
        };
        assert_eq!(
            writer.write(&spot, patch),
            WriteOutcome::Written(vec!["category".to_string()])
        );
        let stored = store.spot("1");
        assert_eq!(stored.country.as_deref(), Some("Japan"));
        assert_eq!(stored.year, Some(1609));
        assert_eq!(stored.category, Some(Category::History));
    }

    #[test]
    fn test_unrecognized_stored_category_is_not_replaced() {
        let mut spot = Spot::new("1", "Ramen Alley", 35.7, 139.7);
        spot.set_stored_category(Some("food"));
        let store = MemoryStore::new(vec![spot.clone()]);
        let writer = PersistenceWriter::new(&store, false);
        let patch = SpotPatch {
            category: Some(Category::Modern),
            ..SpotPatch::default()
        };
        assert_eq!(writer.write(&spot, patch), WriteOutcome::Skipped);
        assert!(store.updates().is_empty());
    }

    #[test]
    fn test_dry_run_does_not_touch_store() {
        let store = MemoryStore::new(vec![Spot::new("1", "Himeji Castle", 34.8, 134.7)]);
        let writer = PersistenceWriter::new(&store, true);
        let spot = store.spot("1");
        let mut patch = SpotPatch::default();
        patch.localized.insert(Locale::En, english_pair());
        assert!(matches!(writer.write(&spot, patch), WriteOutcome::DryRun(_)));
        assert!(store.updates().is_empty());
    }

    #[test]
    fn test_partial_merge_on_sqlite_keeps_other_columns() {
        let store = SqliteSpotStore::open_in_memory().expect("in-memory store");
        let spot = Spot::new("7", "Himeji Castle #castle", 34.8, 134.7).with_localized(
            Locale::Ja,
            Some("姫路城"),
            Some("兵庫県姫路市にある白く美しい城です。"),
        );
        store.insert_spot(&spot).expect("seed");
        let writer = PersistenceWriter::new(&store, false);
        let mut patch = SpotPatch {
            year: Some(1609),
            ..SpotPatch::default()
        };
        patch.localized.insert(Locale::En, english_pair());
        assert!(matches!(writer.write(&spot, patch), WriteOutcome::Written(_)));

        let stored = store.get_spot("7").expect("read").expect("row");
        assert_eq!(stored.year, Some(1609));
        assert_eq!(
            stored.localized(Locale::En).and_then(|text| text.name.as_deref()),
            Some("Himeji Castle")
        );
        assert_eq!(
            stored.localized(Locale::Ja).and_then(|text| text.name.as_deref()),
            Some("姫路城")
        );
        assert_eq!(stored.name, "Himeji Castle #castle");
    }

    #[test]
    fn test_store_failure_is_reported_not_raised() {
        let store = MemoryStore::new(Vec::new());
        let writer = PersistenceWriter::new(&store, false);
        let spot = Spot::new("missing", "Nowhere", 0.0, 0.0);
        let patch = SpotPatch {
            year: Some(1900),
            ..SpotPatch::default()
        };
        assert_eq!(writer.write(&spot, patch), WriteOutcome::Failed);
    }
}

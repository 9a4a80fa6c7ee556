//! Enrichment run: scan, detect gaps, drain a per-batch work queue against
//! the providers, and hand merged patches to the writer.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use log::{debug, info, warn};

use crate::context::PipelineContext;
use crate::error::{ProviderError, StoreError};
use crate::gaps::{detect_gaps, Gap, GapCensus, GapSet};
use crate::inference::{classify_categories, infer_years, translate};
use crate::providers::{ImageQuery, TextInference, UNKNOWN_COUNTRY, UNKNOWN_COUNTRY_JA};
use crate::scanner::scan_all;
use crate::spot::{non_blank, year_label, Locale, Spot, SpotPatch};
use crate::writer::{PersistenceWriter, WriteOutcome};

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub spots_scanned: usize,
    pub spots_with_gaps: usize,
    pub spots_processed: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub rate_limit_hits: usize,
    /// Units dropped after repeated rate limiting.
    pub units_exhausted: usize,
    /// Successful units that found nothing to fill.
    pub no_results: usize,
    pub writes: usize,
    pub write_failures: usize,
    pub fields_written: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned={} with_gaps={} processed={} units_ok={} units_failed={} \
             rate_limited={} exhausted={} no_result={} writes={} write_failures={} fields={}",
            self.spots_scanned,
            self.spots_with_gaps,
            self.spots_processed,
            self.units_succeeded,
            self.units_failed,
            self.rate_limit_hits,
            self.units_exhausted,
            self.no_results,
            self.writes,
            self.write_failures,
            self.fields_written
        )
    }
}

/// One provider call's worth of work. Indices point into the current batch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Unit {
    Category { indices: Vec<usize> },
    Year { indices: Vec<usize> },
    Locale { locale: Locale, indices: Vec<usize> },
    Country { index: usize, locale: Locale },
    Image { index: usize },
}

impl Unit {
    fn describe(&self, batch: &[Spot]) -> String {
        let ids = |indices: &[usize]| {
            indices
                .iter()
                .map(|index| batch[*index].id.as_str())
                .collect::<Vec<_>>()
                .join(",")
        };
        match self {
            Self::Category { indices } => format!("category[{}]", ids(indices)),
            Self::Year { indices } => format!("year[{}]", ids(indices)),
            Self::Locale { locale, indices } => format!("locale:{locale}[{}]", ids(indices)),
            Self::Country { index, locale } => {
                format!("country:{locale}[{}]", batch[*index].id)
            }
            Self::Image { index } => format!("image[{}]", batch[*index].id),
        }
    }
}

struct PendingUnit {
    unit: Unit,
    attempts: u32,
}

/// Runs one full enrichment pass over the store.
///
/// Only a failure to read the store aborts the run. Provider and write
/// failures are counted and their gaps are left for the next run.
pub fn run(ctx: &PipelineContext) -> Result<RunSummary, StoreError> {
    let spots = scan_all(ctx.store.as_ref(), ctx.page_size)?;

    let mut census = GapCensus::default();
    let mut pending: Vec<(Spot, GapSet)> = Vec::new();
    for spot in spots {
        let gaps = detect_gaps(&spot, &ctx.run.locales);
        census.record(&gaps);
        let gaps: GapSet = gaps
            .into_iter()
            .filter(|gap| ctx.run.includes(gap.kind()))
            .collect();
        if !gaps.is_empty() {
            pending.push((spot, gaps));
        }
    }
    info!("Gap census: {}", census.summary_line());

    let mut summary = RunSummary {
        spots_scanned: census.spots,
        spots_with_gaps: census.spots_with_gaps,
        ..RunSummary::default()
    };
    if let Some(max_spots) = ctx.run.max_spots {
        if pending.len() > max_spots {
            info!(
                "Limiting run to {} of {} spots with gaps",
                max_spots,
                pending.len()
            );
            pending.truncate(max_spots);
        }
    }

    let writer = PersistenceWriter::new(ctx.store.as_ref(), ctx.run.dry_run);
    let batch_size = ctx.run.batch_size.max(1);
    let batch_count = pending.len().div_ceil(batch_size);
    for (batch_index, chunk) in pending.chunks(batch_size).enumerate() {
        info!(
            "Batch {}/{}: {} spots",
            batch_index + 1,
            batch_count,
            chunk.len()
        );
        let (batch, gaps): (Vec<Spot>, Vec<GapSet>) = chunk.iter().cloned().unzip();
        let patches = process_batch(ctx, &batch, &gaps, &mut summary);
        for (spot, patch) in batch.iter().zip(patches) {
            summary.spots_processed += 1;
            match writer.write(spot, patch) {
                WriteOutcome::Written(fields) | WriteOutcome::DryRun(fields) => {
                    summary.writes += 1;
                    summary.fields_written += fields.len();
                }
                WriteOutcome::Skipped => {}
                WriteOutcome::Failed => summary.write_failures += 1,
            }
        }
    }

    info!("Run complete: {}", summary);
    Ok(summary)
}

fn plan_units(ctx: &PipelineContext, gaps: &[GapSet]) -> VecDeque<PendingUnit> {
    let with_gap = |gap: Gap| -> Vec<usize> {
        gaps.iter()
            .enumerate()
            .filter(|(_, set)| set.contains(&gap))
            .map(|(index, _)| index)
            .collect()
    };

    let mut units = Vec::new();
    if ctx.text.is_some() {
        let indices = with_gap(Gap::Category);
        if !indices.is_empty() {
            units.push(Unit::Category { indices });
        }
        let indices = with_gap(Gap::Year);
        if !indices.is_empty() {
            units.push(Unit::Year { indices });
        }
        for &locale in &ctx.run.locales {
            let indices = with_gap(Gap::Locale(locale));
            if !indices.is_empty() {
                units.push(Unit::Locale { locale, indices });
            }
        }
    } else if gaps.iter().any(|set| {
        set.iter()
            .any(|gap| matches!(gap, Gap::Category | Gap::Year | Gap::Locale(_)))
    }) {
        debug!("No text-inference provider; leaving text gaps for a later run");
    }
    // Images go last so their query can use names translated in this batch.
    for index in with_gap(Gap::Country) {
        units.push(Unit::Country {
            index,
            locale: Locale::En,
        });
        units.push(Unit::Country {
            index,
            locale: Locale::Ja,
        });
    }
    for index in with_gap(Gap::Image) {
        units.push(Unit::Image { index });
    }

    units
        .into_iter()
        .map(|unit| PendingUnit { unit, attempts: 0 })
        .collect()
}

/// Drains the batch's work queue and returns one patch per spot.
fn process_batch(
    ctx: &PipelineContext,
    batch: &[Spot],
    gaps: &[GapSet],
    summary: &mut RunSummary,
) -> Vec<SpotPatch> {
    let mut patches = vec![SpotPatch::default(); batch.len()];
    let mut queue = plan_units(ctx, gaps);

    while let Some(mut pending) = queue.pop_front() {
        let label = pending.unit.describe(batch);
        match execute(ctx, &pending.unit, batch, &mut patches) {
            Ok(0) => {
                debug!("{}: no result", label);
                summary.units_succeeded += 1;
                summary.no_results += 1;
            }
            Ok(filled) => {
                debug!("{}: filled {} fields", label, filled);
                summary.units_succeeded += 1;
            }
            Err(error) if error.is_rate_limited() => {
                summary.rate_limit_hits += 1;
                pending.attempts += 1;
                if ctx.policy.allows_retry(pending.attempts) {
                    let cooldown = ctx.policy.cooldown_for_attempt(pending.attempts);
                    warn!(
                        "{}: {}; cooling down for {:.1}s before attempt {}",
                        label,
                        error,
                        cooldown.as_secs_f64(),
                        pending.attempts + 1
                    );
                    ctx.pause.pause(cooldown);
                    queue.push_front(pending);
                } else {
                    warn!(
                        "{}: still rate limited after {} attempts; skipping",
                        label, pending.attempts
                    );
                    summary.units_exhausted += 1;
                }
            }
            Err(error) => {
                warn!("{}: {}; skipping", label, error);
                summary.units_failed += 1;
            }
        }
    }
    patches
}

/// Runs one unit and merges its results; returns the number of fields filled.
fn execute(
    ctx: &PipelineContext,
    unit: &Unit,
    batch: &[Spot],
    patches: &mut [SpotPatch],
) -> Result<usize, ProviderError> {
    match unit {
        Unit::Category { indices } => {
            let text = text_provider(ctx)?;
            let found = classify_categories(text, &select(batch, indices))?;
            Ok(merge_by_id(batch, indices, patches, found, |patch, category| {
                debug!("category -> {}", category);
                patch.category = Some(category);
            }))
        }
        Unit::Year { indices } => {
            let text = text_provider(ctx)?;
            let found = infer_years(text, &select(batch, indices))?;
            Ok(merge_by_id(batch, indices, patches, found, |patch, year| {
                debug!("year -> {}", year_label(year));
                patch.year = Some(year);
            }))
        }
        Unit::Locale { locale, indices } => {
            let text = text_provider(ctx)?;
            let found = translate(text, &select(batch, indices), *locale)?;
            Ok(merge_by_id(batch, indices, patches, found, |patch, pair| {
                patch.localized.insert(*locale, pair);
            }))
        }
        Unit::Country { index, locale } => {
            let spot = &batch[*index];
            let country = ctx.geocoder.country_at(spot.lat, spot.lon, *locale)?;
            let patch = &mut patches[*index];
            let value = match (country, locale) {
                (Some(country), _) => country,
                (None, Locale::Ja) => UNKNOWN_COUNTRY_JA.to_string(),
                (None, _) => UNKNOWN_COUNTRY.to_string(),
            };
            debug!("country:{} [{}] -> {}", locale, spot.id, value);
            if *locale == Locale::Ja {
                patch.country_ja = Some(value);
            } else {
                patch.country = Some(value);
            }
            Ok(1)
        }
        Unit::Image { index } => {
            let spot = &batch[*index];
            let query = image_query(spot, &patches[*index]);
            match ctx.images.find_image(&query)? {
                Some(url) => {
                    patches[*index].image_url = Some(url);
                    Ok(1)
                }
                None => Ok(0),
            }
        }
    }
}

fn text_provider(ctx: &PipelineContext) -> Result<&dyn TextInference, ProviderError> {
    ctx.text
        .as_deref()
        .ok_or_else(|| ProviderError::transient("TextInference", "no provider configured"))
}

fn select<'a>(batch: &'a [Spot], indices: &[usize]) -> Vec<&'a Spot> {
    indices.iter().map(|index| &batch[*index]).collect()
}

fn merge_by_id<T>(
    batch: &[Spot],
    indices: &[usize],
    patches: &mut [SpotPatch],
    mut found: BTreeMap<String, T>,
    mut apply: impl FnMut(&mut SpotPatch, T),
) -> usize {
    let mut filled = 0;
    for &index in indices {
        if let Some(value) = found.remove(&batch[index].id) {
            apply(&mut patches[index], value);
            filled += 1;
        }
    }
    filled
}

/// Search terms for the image chain: base name, strong localized names (fresh
/// translations first), and the category as a content hint.
fn image_query(spot: &Spot, patch: &SpotPatch) -> ImageQuery {
    let mut localized_names = BTreeMap::new();
    for (locale, text) in &spot.localized {
        if let Some(name) = non_blank(text.name.as_deref()) {
            localized_names.insert(*locale, name.to_string());
        }
    }
    for (locale, pair) in &patch.localized {
        localized_names.insert(*locale, pair.name.clone());
    }
    ImageQuery {
        base_name: spot.base_name().to_string(),
        localized_names,
        hint: patch
            .category
            .or(spot.category)
            .map(|category| category.as_str().to_string()),
    }
}

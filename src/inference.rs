//! Text-inference tasks over small batches of spots: category classification,
//! per-locale translation, and founding-year lookup.
//!
//! Each task sends one request for the whole batch and expects a JSON object
//! keyed by spot id. Ids the model leaves out or answers with `null` are
//! simply absent from the result; ids that were not asked for are ignored.

use std::collections::{BTreeMap, HashSet};

use log::{debug, warn};
use serde_json::{json, Map, Value};

use crate::error::ProviderError;
use crate::gaps::is_strong_pair;
use crate::providers::response_schema::{parse_payload, ResponseSchema};
use crate::providers::{InferenceRequest, TextInference};
use crate::spot::{
    non_blank, year_from_era, Category, Era, Locale, LocalizedPair, LocalizedText, Spot,
    MIN_DESCRIPTION_CHARS,
};

/// Largest year magnitude accepted from the model.
const MAX_YEAR_MAGNITUDE: u32 = 20_000;

#[derive(Debug, serde::Deserialize)]
struct CategoryAnswer(BTreeMap<String, Option<String>>);

impl ResponseSchema for CategoryAnswer {
    fn validate(&self) -> Result<(), String> {
        for (id, category) in &self.0 {
            let Some(category) = category else {
                continue;
            };
            if Category::parse(category).is_none() {
                return Err(format!("unknown category '{category}' for id {id}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TranslationEntry {
    name: String,
    description: String,
}

#[derive(Debug, serde::Deserialize)]
struct TranslationAnswer(BTreeMap<String, Option<TranslationEntry>>);

impl ResponseSchema for TranslationAnswer {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct YearEntry {
    era: String,
    year: u32,
}

#[derive(Debug, serde::Deserialize)]
struct YearAnswer(BTreeMap<String, Option<YearEntry>>);

impl ResponseSchema for YearAnswer {
    fn validate(&self) -> Result<(), String> {
        for (id, entry) in &self.0 {
            let Some(entry) = entry else {
                continue;
            };
            if Era::parse(&entry.era).is_none() {
                return Err(format!("unknown era '{}' for id {id}", entry.era));
            }
            if entry.year == 0 || entry.year > MAX_YEAR_MAGNITUDE {
                return Err(format!("year {} out of range for id {id}", entry.year));
            }
        }
        Ok(())
    }
}

/// Structured description of one spot handed to the model.
fn spot_context(spot: &Spot) -> Value {
    let mut entry = Map::new();
    entry.insert("id".to_string(), Value::from(spot.id.as_str()));
    entry.insert("name".to_string(), Value::from(spot.base_name()));
    entry.insert("lat".to_string(), json!(spot.lat));
    entry.insert("lon".to_string(), json!(spot.lon));
    let tags = spot.tags();
    if !tags.is_empty() {
        entry.insert("tags".to_string(), json!(tags));
    }
    if let Some(country) = non_blank(spot.country.as_deref()) {
        entry.insert("country".to_string(), Value::from(country));
    }
    for (locale, text) in &spot.localized {
        if !is_strong_pair(Some(text), *locale) {
            continue;
        }
        let LocalizedText { name, description } = text;
        entry.insert(locale.name_column(), json!(name));
        entry.insert(locale.description_column(), json!(description));
    }
    Value::Object(entry)
}

fn batch_request(instruction: String, spots: &[&Spot]) -> InferenceRequest {
    InferenceRequest {
        instruction,
        context: Some(Value::Array(spots.iter().map(|spot| spot_context(spot)).collect())),
    }
}

fn requested_ids<'a>(spots: &'a [&Spot]) -> HashSet<&'a str> {
    spots.iter().map(|spot| spot.id.as_str()).collect()
}

fn keep_requested<T>(
    provider: &dyn TextInference,
    requested: &HashSet<&str>,
    entries: impl IntoIterator<Item = (String, T)>,
) -> Vec<(String, T)> {
    entries
        .into_iter()
        .filter(|(id, _)| {
            let known = requested.contains(id.as_str());
            if !known {
                debug!("{}: ignoring unrequested id {}", provider.label(), id);
            }
            known
        })
        .collect()
}

/// Assigns one category per spot.
pub fn classify_categories(
    provider: &dyn TextInference,
    spots: &[&Spot],
) -> Result<BTreeMap<String, Category>, ProviderError> {
    let options: Vec<&str> = Category::ALL.iter().map(|category| category.as_str()).collect();
    let request = batch_request(
        format!(
            "Classify each place into exactly one category from: {}. \
             Reply with a JSON object that maps each id to its category, or to null \
             when no category fits.",
            options.join(", ")
        ),
        spots,
    );
    let text = provider.complete(&request)?;
    let answer: CategoryAnswer = parse_payload(provider.label(), &text)?;
    let requested = requested_ids(spots);
    Ok(keep_requested(provider, &requested, answer.0)
        .into_iter()
        .filter_map(|(id, category)| {
            let category = Category::parse(category.as_deref()?)?;
            Some((id, category))
        })
        .collect())
}

/// Produces a localized name and description per spot.
///
/// Pairs that would still fail the strength check (too short, wrong script)
/// are dropped so the spot stays a gap rather than storing a weak value.
pub fn translate(
    provider: &dyn TextInference,
    spots: &[&Spot],
    locale: Locale,
) -> Result<BTreeMap<String, LocalizedPair>, ProviderError> {
    let language = locale.language_name();
    let request = batch_request(
        format!(
            "For each place, give its commonly used name in {language} and a description in \
             {language} of one or two sentences (at least {MIN_DESCRIPTION_CHARS} characters). \
             Reply with a JSON object that maps each id to {{\"name\": ..., \"description\": ...}}."
        ),
        spots,
    );
    let text = provider.complete(&request)?;
    let answer: TranslationAnswer = parse_payload(provider.label(), &text)?;
    let requested = requested_ids(spots);
    let mut pairs = BTreeMap::new();
    for (id, entry) in keep_requested(provider, &requested, answer.0) {
        let Some(entry) = entry else {
            debug!("{}: no {} text for spot {}", provider.label(), locale, id);
            continue;
        };
        let candidate = LocalizedText {
            name: Some(entry.name.trim().to_string()),
            description: Some(entry.description.trim().to_string()),
        };
        if !is_strong_pair(Some(&candidate), locale) {
            warn!(
                "{}: discarding weak {} text for spot {}",
                provider.label(),
                locale,
                id
            );
            continue;
        }
        pairs.insert(
            id,
            LocalizedPair {
                name: entry.name.trim().to_string(),
                description: entry.description.trim().to_string(),
            },
        );
    }
    Ok(pairs)
}

/// Looks up founding/construction years; unknown years are left out.
pub fn infer_years(
    provider: &dyn TextInference,
    spots: &[&Spot],
) -> Result<BTreeMap<String, i32>, ProviderError> {
    let request = batch_request(
        "For each place, give the year it was founded or built. Reply with a JSON object that \
         maps each id to {\"era\": \"BC\" or \"AD\", \"year\": positive integer}, or to null \
         when the year is unknown."
            .to_string(),
        spots,
    );
    let text = provider.complete(&request)?;
    let answer: YearAnswer = parse_payload(provider.label(), &text)?;
    let requested = requested_ids(spots);
    Ok(keep_requested(provider, &requested, answer.0)
        .into_iter()
        .filter_map(|(id, entry)| {
            let entry = entry?;
            let era = Era::parse(&entry.era)?;
            Some((id, year_from_era(era, entry.year)))
        })
        .collect())
}

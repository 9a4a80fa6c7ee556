//! In-memory fakes for the store and provider traits.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{ProviderError, StoreError};
use crate::providers::{ImageQuery, ImageSource, InferenceRequest, ReverseGeocoder, TextInference};
use crate::spot::{Locale, Spot, SpotPatch};
use crate::store::SpotStore;
use crate::throttle::Pause;

#[derive(Default)]
struct MemoryState {
    spots: Vec<Spot>,
    updates: Vec<(String, SpotPatch)>,
    page_reads: usize,
}

/// Shared-handle store; clones see the same rows.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryStore {
    pub fn new(mut spots: Vec<Spot>) -> Self {
        spots.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            state: Rc::new(RefCell::new(MemoryState {
                spots,
                ..MemoryState::default()
            })),
        }
    }

    pub fn spot(&self, id: &str) -> Spot {
        self.state
            .borrow()
            .spots
            .iter()
            .find(|spot| spot.id == id)
            .cloned()
            .expect("spot present in memory store")
    }

    pub fn updates(&self) -> Vec<(String, SpotPatch)> {
        self.state.borrow().updates.clone()
    }

    pub fn page_reads(&self) -> usize {
        self.state.borrow().page_reads
    }
}

impl SpotStore for MemoryStore {
    fn read_page(&self, offset: usize, limit: usize) -> Result<Vec<Spot>, StoreError> {
        let mut state = self.state.borrow_mut();
        state.page_reads += 1;
        Ok(state.spots.iter().skip(offset).take(limit).cloned().collect())
    }

    fn update_fields(&self, id: &str, patch: &SpotPatch) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        let spot = state
            .spots
            .iter_mut()
            .find(|spot| spot.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        spot.apply_patch(patch);
        state.updates.push((id.to_string(), patch.clone()));
        Ok(())
    }
}

/// Replays canned answers in order; fails transiently once they run out.
#[derive(Clone)]
pub struct ScriptedText {
    responses: Rc<RefCell<VecDeque<Result<String, ProviderError>>>>,
    requests: Rc<RefCell<Vec<InferenceRequest>>>,
}

impl ScriptedText {
    pub fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: Rc::new(RefCell::new(responses.into())),
            requests: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.borrow().clone()
    }
}

impl TextInference for ScriptedText {
    fn label(&self) -> &'static str {
        "Scripted"
    }

    fn complete(&self, request: &InferenceRequest) -> Result<String, ProviderError> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::transient("Scripted", "no scripted response")))
    }
}

/// Answers every lookup with the same country, localized by a simple table.
#[derive(Clone)]
pub struct FixedGeocoder {
    countries: Vec<(Locale, Option<String>)>,
    calls: Rc<Cell<usize>>,
}

impl FixedGeocoder {
    pub fn new(countries: &[(Locale, Option<&str>)]) -> Self {
        Self {
            countries: countries
                .iter()
                .map(|(locale, name)| (*locale, name.map(str::to_string)))
                .collect(),
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ReverseGeocoder for FixedGeocoder {
    fn label(&self) -> &'static str {
        "FixedGeocoder"
    }

    fn country_at(
        &self,
        _lat: f64,
        _lon: f64,
        locale: Locale,
    ) -> Result<Option<String>, ProviderError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self
            .countries
            .iter()
            .find(|(candidate, _)| *candidate == locale)
            .and_then(|(_, name)| name.clone()))
    }
}

/// Image source returning one fixed answer and recording the queries it saw.
#[derive(Clone)]
pub struct FixedImageSource {
    label: &'static str,
    url: Option<String>,
    queries: Rc<RefCell<Vec<ImageQuery>>>,
}

impl FixedImageSource {
    pub fn new(label: &'static str, url: Option<&str>) -> Self {
        Self {
            label,
            url: url.map(str::to_string),
            queries: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn queries(&self) -> Vec<ImageQuery> {
        self.queries.borrow().clone()
    }
}

impl ImageSource for FixedImageSource {
    fn label(&self) -> &'static str {
        self.label
    }

    fn find_image(&self, query: &ImageQuery) -> Result<Option<String>, ProviderError> {
        self.queries.borrow_mut().push(query.clone());
        Ok(self.url.clone())
    }
}

/// Records pauses instead of sleeping.
#[derive(Clone, Default)]
pub struct RecordingPause {
    pauses: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingPause {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.borrow().clone()
    }
}

impl Pause for RecordingPause {
    fn pause(&self, duration: Duration) {
        self.pauses.borrow_mut().push(duration);
    }
}

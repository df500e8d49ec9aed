use std::sync::Arc;

use crate::core::config::Settings;
use crate::repositories::ScoreStore;
use crate::services::scoring::{ScoreService, ScoringPolicy};

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn ScoreStore>,
    scores: ScoreService,
}

impl AppState {
    pub(crate) fn new(settings: Settings, store: Arc<dyn ScoreStore>) -> Self {
        let policy = ScoringPolicy::from_settings(&settings);
        let scores = ScoreService::new(store.clone(), policy);
        Self { inner: Arc::new(InnerState { settings, store, scores }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn ScoreStore> {
        &self.inner.store
    }

    pub(crate) fn scores(&self) -> &ScoreService {
        &self.inner.scores
    }
}

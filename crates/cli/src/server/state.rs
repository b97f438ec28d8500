use std::path::Path;
use std::sync::Arc;

use curator_core::config::AppConfig;
use curator_core::BatchCoordinator;
use providers::{ScoreProvider, ScorerManager};
use storage::DatasetLayout;

/// Shared application state available to all axum handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    layout: DatasetLayout,
    coordinator: BatchCoordinator,
    scorer: Arc<dyn ScoreProvider>,
}

impl AppState {
    /// State for the dataset rooted at `root`, with real scorer processes.
    pub fn new(config: AppConfig, root: &Path) -> Self {
        let layout = config.layout(root);
        let scorer = Arc::new(ScorerManager::new(config.scorer.settings()));
        Self::with_scorer(config, layout, scorer)
    }

    pub fn with_scorer(
        config: AppConfig,
        layout: DatasetLayout,
        scorer: Arc<dyn ScoreProvider>,
    ) -> Self {
        let coordinator = BatchCoordinator::new(
            layout.clone(),
            scorer.clone(),
            config.scorer.default_threshold,
        );
        Self {
            inner: Arc::new(AppStateInner {
                config,
                layout,
                coordinator,
                scorer,
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.inner.layout
    }

    pub fn coordinator(&self) -> &BatchCoordinator {
        &self.inner.coordinator
    }

    /// Stops any running job and the scorer process.
    pub async fn shutdown(&self) {
        let _ = self.inner.coordinator.cancel().await;
        self.inner.scorer.shutdown().await;
    }
}

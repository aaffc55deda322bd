//! Application state shared across request handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::runner::ClusterLifecycleRunner;
use crate::store::AgentStateStore;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<AgentStateStore>,
    runner: ClusterLifecycleRunner,
    token_file: PathBuf,
    install_config_path: PathBuf,
}

impl AppState {
    pub fn new(
        store: Arc<AgentStateStore>,
        runner: ClusterLifecycleRunner,
        token_file: impl Into<PathBuf>,
        install_config_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                runner,
                token_file: token_file.into(),
                install_config_path: install_config_path.into(),
            }),
        }
    }

    pub fn store(&self) -> &AgentStateStore {
        &self.inner.store
    }

    pub fn runner(&self) -> &ClusterLifecycleRunner {
        &self.inner.runner
    }

    /// File holding the expected token. Read per request, never cached.
    pub fn token_file(&self) -> &Path {
        &self.inner.token_file
    }

    pub fn install_config_path(&self) -> &Path {
        &self.inner.install_config_path
    }
}

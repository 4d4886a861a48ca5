use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::controller::MutationCoordinator;
use crate::datastore::Storage;
use crate::query::QueryClient;
use crate::ui_state::{UiStateError, UiStateStore};

/// Everything the screens share, owned by the application root.
pub struct TodoContext<S> {
    pub cache: Arc<CacheStore>,
    pub queries: QueryClient<S>,
    pub mutations: MutationCoordinator<S>,
    pub ui: Arc<UiStateStore>,
    config: Config,
}

impl<S: Storage> TodoContext<S> {
    pub fn new(config: Config, storage: Arc<S>) -> Self {
        let cache = Arc::new(CacheStore::new(config.cache.event_capacity));
        let queries = QueryClient::new(cache.clone(), storage);
        let mutations = MutationCoordinator::new(queries.clone());
        Self {
            cache,
            queries,
            mutations,
            ui: Arc::new(UiStateStore::new()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Restores the persisted UI state, if a state file is configured.
    pub fn restore_session(&self) -> Result<bool, UiStateError> {
        match &self.config.ui.state_file {
            Some(path) => self.ui.load(path),
            None => Ok(false),
        }
    }

    pub fn save_session(&self) -> Result<(), UiStateError> {
        match &self.config.ui.state_file {
            Some(path) => {
                self.ui.save(path)?;
                info!(path = %path.display(), "Session saved.");
                Ok(())
            }
            None => {
                warn!("No ui state file configured, session not saved.");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TaskView;
    use crate::config::testdata::test_config;
    use crate::datastore::MemoryStorage;
    use crate::model::{NewList, NewTask};
    use crate::query::QueryState;

    #[tokio::test]
    async fn test_context_wires_queries_and_mutations() {
        // GIVEN
        let storage = Arc::new(MemoryStorage::new());
        storage.seed_list(NewList::new("Groceries"));
        let ctx = TodoContext::new(Config::default(), storage);
        let mut view = ctx.queries.tasks(TaskView::ByList(1));
        assert_eq!(view.settled().await, QueryState::Data(vec![]));

        // WHEN
        let created = ctx
            .mutations
            .create_task(NewTask::new("Buy milk", 1))
            .await
            .unwrap();

        // THEN
        assert_eq!(view.state().data().unwrap()[0], created);
        assert!(ctx.cache.is_observed(view.key()));
    }

    #[test]
    fn test_session_round_trip() {
        let mut config = test_config();
        let path = std::env::temp_dir().join(format!(
            "todocache-session-{}.json",
            crate::model::CorrelationId::new()
        ));
        config.ui.state_file = Some(path.clone());
        let ctx = TodoContext::new(config, Arc::new(MemoryStorage::new()));
        ctx.ui.select_list(Some(5));

        ctx.save_session().unwrap();
        ctx.ui.reset_all();
        assert!(ctx.restore_session().unwrap());
        std::fs::remove_file(path).unwrap();

        assert_eq!(ctx.ui.selected_list(), Some(5));
        assert_eq!(ctx.config().cache.event_capacity, 64);
    }
}

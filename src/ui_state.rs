use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::TaskView;
use crate::model::{EntityKind, Priority, Status};

#[derive(Debug, Error)]
pub enum UiStateError {
    #[error("io error {0} on the ui state file")]
    IoError(#[from] std::io::Error),
    #[error("format error {0} in the ui state file")]
    FormatError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modal {
    CreateTask,
    EditTask,
    CreateList,
    EditList,
    ConfirmDelete,
}

/// Filter the task screen was last left on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFilter {
    #[default]
    All,
    Status(Status),
    Priority(Priority),
    Upcoming,
    Completed,
}

impl TaskFilter {
    /// The cache view showing this filter, inside `list_id` when given.
    pub fn view(&self, list_id: Option<i64>) -> TaskView {
        match (self, list_id) {
            (TaskFilter::All, Some(list_id)) => TaskView::ByList(list_id),
            (TaskFilter::All, None) => TaskView::All,
            (TaskFilter::Status(status), _) => TaskView::ByStatus(*status),
            (TaskFilter::Priority(priority), _) => TaskView::ByPriority(*priority),
            (TaskFilter::Upcoming, _) => TaskView::Upcoming,
            (TaskFilter::Completed, _) => TaskView::Completed,
        }
    }
}

/// The part of the UI state that outlives a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PersistedUiState {
    pub selected_list: Option<i64>,
    #[serde(default)]
    pub task_filter: TaskFilter,
}

#[derive(Debug, Default)]
struct UiState {
    open_modals: HashSet<Modal>,
    loading: HashSet<EntityKind>,
    selected_task: Option<i64>,
    selected_list: Option<i64>,
    task_filter: TaskFilter,
}

/// Modal, loading and selection flags of the screens.
#[derive(Debug, Default)]
pub struct UiStateStore {
    state: RwLock<UiState>,
}

impl UiStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_modal(&self, modal: Modal) {
        self.state.write().open_modals.insert(modal);
    }

    pub fn close_modal(&self, modal: Modal) {
        self.state.write().open_modals.remove(&modal);
    }

    pub fn is_modal_open(&self, modal: Modal) -> bool {
        self.state.read().open_modals.contains(&modal)
    }

    pub fn set_loading(&self, kind: EntityKind, loading: bool) {
        let mut state = self.state.write();
        if loading {
            state.loading.insert(kind);
        } else {
            state.loading.remove(&kind);
        }
    }

    pub fn is_loading(&self, kind: EntityKind) -> bool {
        self.state.read().loading.contains(&kind)
    }

    pub fn select_task(&self, id: Option<i64>) {
        self.state.write().selected_task = id;
    }

    pub fn selected_task(&self) -> Option<i64> {
        self.state.read().selected_task
    }

    pub fn select_list(&self, id: Option<i64>) {
        self.state.write().selected_list = id;
    }

    pub fn selected_list(&self) -> Option<i64> {
        self.state.read().selected_list
    }

    pub fn set_task_filter(&self, filter: TaskFilter) {
        self.state.write().task_filter = filter;
    }

    pub fn task_filter(&self) -> TaskFilter {
        self.state.read().task_filter
    }

    /// The task view the screen should show for the current selection.
    pub fn task_view(&self) -> TaskView {
        let state = self.state.read();
        state.task_filter.view(state.selected_list)
    }

    pub fn reset_all(&self) {
        *self.state.write() = UiState::default();
        debug!("ui state reset");
    }

    pub fn persisted(&self) -> PersistedUiState {
        let state = self.state.read();
        PersistedUiState {
            selected_list: state.selected_list,
            task_filter: state.task_filter,
        }
    }

    pub fn restore(&self, persisted: PersistedUiState) {
        let mut state = self.state.write();
        state.selected_list = persisted.selected_list;
        state.task_filter = persisted.task_filter;
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), UiStateError> {
        let contents = serde_json::to_vec_pretty(&self.persisted())?;
        fs::write(path.as_ref(), contents)?;
        debug!(path = %path.as_ref().display(), "ui state saved");
        Ok(())
    }

    /// Restores the state saved by [`UiStateStore::save`]. A missing file
    /// leaves the defaults in place and returns `false`.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<bool, UiStateError> {
        let contents = match fs::read(path.as_ref()) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.as_ref().display(), "No saved ui state.");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };
        self.restore(serde_json::from_slice(&contents)?);
        Ok(true)
    }
}

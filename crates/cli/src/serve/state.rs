//! Application state shared across request handlers.

use rfidgate_core::ToggleWorkflow;
use rfidgate_sqlite::SqliteStorage;

pub(crate) struct AppState {
    pub(crate) workflow: ToggleWorkflow<SqliteStorage>,
}

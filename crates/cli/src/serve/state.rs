//! Application state.

use crate::inspect::Sources;

/// Application state shared across request handlers.
pub(crate) struct AppState {
    /// Local store and mirror the handlers read from.
    pub(crate) sources: Sources,
}

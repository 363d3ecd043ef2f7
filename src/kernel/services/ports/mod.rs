//! Service ports: traits + data contracts.

pub mod editor;
pub mod search;
pub mod settings;

pub use editor::{BufferId, ConfirmDialog, EditorBuffers, ReplaceEvent};
pub use search::{ScanMessage, ScanResult, SearchError, SearchQuery};
pub use settings::{SearchSettings, Settings};

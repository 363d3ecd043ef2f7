//! Service adapters: OS/runtime specific implementations (IO/async).

pub mod editor;
pub mod paths;
pub mod replace;
pub mod runtime;
pub mod search;
pub mod settings;

pub use editor::{normalize_path, EditorBuffer, MemoryBuffers};
pub use paths::{ensure_log_dir, get_log_dir};
pub use replace::{
    FileReplacement, LineReplacement, PreviewLine, PreviewLineKind, ReplaceError, ReplacePreview,
    ReplaceService,
};
pub use runtime::AsyncRuntime;
pub use search::{MatchPattern, ScanService, ScanTask};
pub use settings::{ensure_settings_file, get_settings_path, load_settings, load_settings_from};

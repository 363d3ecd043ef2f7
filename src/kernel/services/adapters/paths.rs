//! 应用目录
//!
//! | 用途 | Linux | macOS | Windows |
//! |---|---|---|---|
//! | 日志 | `$XDG_DATA_HOME/zsearch/logs` 或 `~/.local/share/zsearch/logs` | `~/Library/Application Support/zsearch/logs` | `%APPDATA%\zsearch\logs` |
//! | 设置 | `$XDG_CACHE_HOME` 或 `~/.cache` | `~/Library/Caches` | `%LOCALAPPDATA%` 或 `%APPDATA%` |

use std::path::PathBuf;

pub(crate) const APP_NAME: &str = "zsearch";
const LOG_DIR: &str = "logs";

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn home_join(rel: &str) -> Option<PathBuf> {
    env_path("HOME").map(|home| home.join(rel))
}

/// 平台数据目录（不含应用名）
fn data_base_dir() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        home_join("Library/Application Support")
    } else if cfg!(target_os = "windows") {
        env_path("APPDATA")
    } else if cfg!(unix) {
        env_path("XDG_DATA_HOME").or_else(|| home_join(".local/share"))
    } else {
        None
    }
}

pub(crate) fn get_cache_dir() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        home_join("Library/Caches")
    } else if cfg!(target_os = "windows") {
        env_path("LOCALAPPDATA").or_else(|| env_path("APPDATA"))
    } else if cfg!(unix) {
        env_path("XDG_CACHE_HOME").or_else(|| home_join(".cache"))
    } else {
        None
    }
}

pub fn get_log_dir() -> Option<PathBuf> {
    data_base_dir().map(|base| base.join(APP_NAME).join(LOG_DIR))
}

/// 确保日志目录存在
pub fn ensure_log_dir() -> std::io::Result<PathBuf> {
    let dir = get_log_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Cannot determine log directory",
        )
    })?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

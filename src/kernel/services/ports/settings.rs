use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub search: SearchSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// 输入停止多久之后才开始搜索
    pub debounce_ms: u64,
    /// 按目录名跳过
    pub ignored_dirs: Vec<String>,
    /// 只搜索这些扩展名（不带点，不区分大小写）
    pub extensions: Vec<String>,
    pub max_preview_width: usize,
    pub preview_context_lines: usize,
    pub max_messages_per_tick: usize,
    pub channel_capacity: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            ignored_dirs: [
                ".git",
                "__pycache__",
                "node_modules",
                "target",
                ".vscode",
                ".idea",
                "venv",
                "env",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            extensions: ["rs", "py", "toml", "lock", "txt", "md", "json"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_preview_width: 120,
            preview_context_lines: 2,
            max_messages_per_tick: 512,
            channel_capacity: 1024,
        }
    }
}

impl SearchSettings {
    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignored_dirs.iter().any(|d| d == name)
    }

    pub fn has_allowed_extension(&self, file_name: &str) -> bool {
        let Some((_, ext)) = file_name.rsplit_once('.') else {
            return false;
        };
        self.extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}

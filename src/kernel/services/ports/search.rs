use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug)]
pub enum SearchError {
    InvalidRegex(regex::Error),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::InvalidRegex(e) => write!(f, "Invalid regex: {}", e),
        }
    }
}

impl std::error::Error for SearchError {}

impl From<regex::Error> for SearchError {
    fn from(e: regex::Error) -> Self {
        SearchError::InvalidRegex(e)
    }
}

/// 一次扫描的输入；扫描开始后不可变，新的查询会取消旧的扫描
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchQuery {
    pub pattern_text: String,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub use_regex: bool,
    pub root_path: PathBuf,
}

impl SearchQuery {
    pub fn new(pattern_text: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            pattern_text: pattern_text.into(),
            root_path: root_path.into(),
            ..Self::default()
        }
    }

    pub fn case_sensitive(mut self, on: bool) -> Self {
        self.case_sensitive = on;
        self
    }

    pub fn whole_word(mut self, on: bool) -> Self {
        self.whole_word = on;
        self
    }

    pub fn regex(mut self, on: bool) -> Self {
        self.use_regex = on;
        self
    }
}

/// 一行命中：同一行多个匹配只产生一条结果，但 `occurrences` 记录全部次数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub file_path: PathBuf,
    /// 1-based
    pub line_number: usize,
    pub raw_line_text: String,
    pub occurrences: usize,
}

impl ScanResult {
    pub fn new(
        file_path: impl Into<PathBuf>,
        line_number: usize,
        raw_line_text: impl Into<String>,
        occurrences: usize,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line_number,
            raw_line_text: raw_line_text.into(),
            occurrences,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

#[derive(Debug, Clone)]
pub enum ScanMessage {
    LineMatch {
        scan_id: u64,
        result: ScanResult,
    },
    Progress {
        scan_id: u64,
        files_searched: usize,
        files_with_matches: usize,
    },
    Complete {
        scan_id: u64,
        files_searched: usize,
        total_matches: usize,
    },
    Cancelled {
        scan_id: u64,
    },
    InvalidPattern {
        scan_id: u64,
        message: String,
    },
}

impl ScanMessage {
    pub fn scan_id(&self) -> u64 {
        match self {
            ScanMessage::LineMatch { scan_id, .. }
            | ScanMessage::Progress { scan_id, .. }
            | ScanMessage::Complete { scan_id, .. }
            | ScanMessage::Cancelled { scan_id }
            | ScanMessage::InvalidPattern { scan_id, .. } => *scan_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanMessage::Complete { .. }
                | ScanMessage::Cancelled { .. }
                | ScanMessage::InvalidPattern { .. }
        )
    }
}

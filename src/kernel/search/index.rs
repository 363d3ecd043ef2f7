//! 搜索结果索引
//!
//! 三张表只能通过这里的方法修改：
//! - `search_results`: 文件 → 命中行（发现顺序）
//! - `per_file_counts`: 文件 → 匹配次数（不是行数）
//! - `line_occurrence_next`: (文件, 行) → 下一个 occurrence 序号
//!
//! 任何一次修改之后 `per_file_counts` 之和都等于所有命中行剩余匹配次数之和。

use crate::kernel::services::ports::search::ScanResult;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// 1-based
    pub line_number: usize,
    /// 原始行文本（未截断，不含换行）
    pub text: String,
    /// 这一行上还剩几个匹配
    pub occurrences: usize,
    pub occurrence_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultItem {
    FileHeader {
        file_index: usize,
    },
    MatchLine {
        file_index: usize,
        match_index: usize,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSummary {
    pub total_matches: usize,
    pub file_count: usize,
}

impl SearchSummary {
    pub fn is_empty(&self) -> bool {
        self.total_matches == 0
    }

    /// 页脚状态文字
    pub fn status_text(&self) -> String {
        format!(
            "Found {} match{} in {} file{}",
            self.total_matches,
            if self.total_matches == 1 { "" } else { "es" },
            self.file_count,
            if self.file_count == 1 { "" } else { "s" },
        )
    }
}

impl fmt::Display for SearchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} result{} in {} file{}",
            self.total_matches,
            if self.total_matches == 1 { "" } else { "s" },
            self.file_count,
            if self.file_count == 1 { "" } else { "s" },
        )
    }
}

/// (文件, 行号)，文件头的行号为 None
type RowKey = (PathBuf, Option<usize>);

#[derive(Debug, Default)]
pub struct ResultIndex {
    order: Vec<PathBuf>,
    search_results: FxHashMap<PathBuf, Vec<LineMatch>>,
    per_file_counts: FxHashMap<PathBuf, usize>,
    line_occurrence_next: FxHashMap<(PathBuf, usize), usize>,
    collapsed: FxHashSet<PathBuf>,
    rows: Vec<ResultItem>,
    selected_index: usize,
}

impl ResultIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: ScanResult) {
        let ScanResult {
            file_path,
            line_number,
            raw_line_text,
            occurrences,
        } = result;
        let occurrences = occurrences.max(1);
        let selected = self.selected_key();

        if !self.search_results.contains_key(&file_path) {
            self.order.push(file_path.clone());
        }

        let key = (file_path.clone(), line_number);
        let occurrence_index = self.line_occurrence_next.get(&key).copied().unwrap_or(0);
        self.line_occurrence_next.insert(key, occurrence_index + 1);

        *self.per_file_counts.entry(file_path.clone()).or_insert(0) += occurrences;
        self.search_results
            .entry(file_path)
            .or_default()
            .push(LineMatch {
                line_number,
                text: raw_line_text,
                occurrences,
                occurrence_index,
            });

        self.rebuild_rows(selected);
    }

    /// 从结果里去掉一行（关闭单条结果），扣掉该行全部匹配
    pub fn remove_match(&mut self, path: &Path, line_number: usize) -> bool {
        let selected = self.selected_key();
        let Some(lines) = self.search_results.get_mut(path) else {
            return false;
        };
        let Some(pos) = lines.iter().position(|l| l.line_number == line_number) else {
            return false;
        };

        let removed = lines.remove(pos);
        self.line_occurrence_next
            .remove(&(path.to_path_buf(), line_number));
        self.decrement(path, removed.occurrences);
        self.rebuild_rows(selected);
        true
    }

    /// 单行替换成功后调用：该行少了一个匹配。
    /// 行上没有剩余匹配时删除该行，否则更新为替换后的文本。
    pub fn consume_occurrence(&mut self, path: &Path, line_number: usize, new_text: &str) -> bool {
        let selected = self.selected_key();
        let Some(lines) = self.search_results.get_mut(path) else {
            return false;
        };
        let Some(pos) = lines.iter().position(|l| l.line_number == line_number) else {
            return false;
        };

        let line = &mut lines[pos];
        line.occurrences = line.occurrences.saturating_sub(1);
        if line.occurrences == 0 {
            lines.remove(pos);
            self.line_occurrence_next
                .remove(&(path.to_path_buf(), line_number));
        } else {
            line.text = new_text.to_string();
        }

        self.decrement(path, 1);
        self.rebuild_rows(selected);
        true
    }

    pub fn remove_file(&mut self, path: &Path) -> bool {
        let selected = self.selected_key();
        if self.search_results.remove(path).is_none() {
            return false;
        }
        self.forget_file(path);
        self.rebuild_rows(selected);
        true
    }

    pub fn reset(&mut self) {
        self.order.clear();
        self.search_results.clear();
        self.per_file_counts.clear();
        self.line_occurrence_next.clear();
        self.collapsed.clear();
        self.rows.clear();
        self.selected_index = 0;
    }

    pub fn summary(&self) -> SearchSummary {
        SearchSummary {
            total_matches: self.total_matches(),
            file_count: self.per_file_counts.len(),
        }
    }

    pub fn total_matches(&self) -> usize {
        self.per_file_counts.values().sum()
    }

    pub fn file_count(&self) -> usize {
        self.per_file_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.search_results.contains_key(path)
    }

    pub fn count_for(&self, path: &Path) -> usize {
        self.per_file_counts.get(path).copied().unwrap_or(0)
    }

    pub fn lines(&self, path: &Path) -> &[LineMatch] {
        self.search_results
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn line(&self, path: &Path, line_number: usize) -> Option<&LineMatch> {
        self.lines(path)
            .iter()
            .find(|l| l.line_number == line_number)
    }

    /// 文件按发现顺序
    pub fn files(&self) -> &[PathBuf] {
        &self.order
    }

    pub fn occurrence_counter(&self, path: &Path, line_number: usize) -> usize {
        self.line_occurrence_next
            .get(&(path.to_path_buf(), line_number))
            .copied()
            .unwrap_or(0)
    }

    pub fn rows(&self) -> &[ResultItem] {
        &self.rows
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn selected_item(&self) -> Option<ResultItem> {
        self.rows.get(self.selected_index).copied()
    }

    pub fn resolve(&self, item: ResultItem) -> Option<(&Path, Option<&LineMatch>)> {
        match item {
            ResultItem::FileHeader { file_index } => {
                let path = self.order.get(file_index)?;
                Some((path.as_path(), None))
            }
            ResultItem::MatchLine {
                file_index,
                match_index,
            } => {
                let path = self.order.get(file_index)?;
                let line = self.search_results.get(path)?.get(match_index)?;
                Some((path.as_path(), Some(line)))
            }
        }
    }

    /// 当前选中的命中行
    pub fn selected_match(&self) -> Option<(&Path, &LineMatch)> {
        let (path, line) = self.resolve(self.selected_item()?)?;
        Some((path, line?))
    }

    pub fn move_selection(&mut self, delta: isize) -> bool {
        if self.rows.is_empty() || delta == 0 {
            return false;
        }

        let prev = self.selected_index;
        let len = self.rows.len();

        if delta < 0 {
            if self.selected_index > 0 {
                self.selected_index -= 1;
            } else {
                self.selected_index = len - 1;
            }
        } else if self.selected_index + 1 < len {
            self.selected_index += 1;
        } else {
            self.selected_index = 0;
        }

        self.selected_index != prev
    }

    pub fn select_row(&mut self, row: usize) -> bool {
        if row >= self.rows.len() || row == self.selected_index {
            return false;
        }
        self.selected_index = row;
        true
    }

    /// 选中第一个文件下的第一条命中
    pub fn select_first_match(&mut self) -> bool {
        let Some(row) = self
            .rows
            .iter()
            .position(|r| matches!(r, ResultItem::MatchLine { .. }))
        else {
            return false;
        };
        self.selected_index = row;
        true
    }

    pub fn is_expanded(&self, path: &Path) -> bool {
        !self.collapsed.contains(path)
    }

    pub fn toggle_expanded(&mut self, path: &Path) -> bool {
        if !self.search_results.contains_key(path) {
            return false;
        }
        let selected = self.selected_key();
        if !self.collapsed.remove(path) {
            self.collapsed.insert(path.to_path_buf());
        }
        self.rebuild_rows(selected);
        true
    }

    fn decrement(&mut self, path: &Path, by: usize) {
        let remaining = match self.per_file_counts.get_mut(path) {
            Some(count) => {
                *count = count.saturating_sub(by);
                *count
            }
            None => 0,
        };

        if remaining == 0 {
            self.search_results.remove(path);
            self.forget_file(path);
        }
    }

    fn forget_file(&mut self, path: &Path) {
        self.per_file_counts.remove(path);
        self.line_occurrence_next.retain(|(p, _), _| p != path);
        self.collapsed.remove(path);
        self.order.retain(|p| p != path);
    }

    fn selected_key(&self) -> Option<RowKey> {
        self.selected_item().and_then(|item| self.row_key(item))
    }

    fn rebuild_rows(&mut self, selected: Option<RowKey>) {
        self.rows.clear();
        for (file_index, path) in self.order.iter().enumerate() {
            self.rows.push(ResultItem::FileHeader { file_index });
            if self.collapsed.contains(path) {
                continue;
            }
            let count = self.search_results.get(path).map_or(0, Vec::len);
            self.rows.extend((0..count).map(|match_index| ResultItem::MatchLine {
                file_index,
                match_index,
            }));
        }

        // 尽量保持原来选中的那一行
        let restored = selected.and_then(|key| {
            self.rows
                .iter()
                .position(|&item| self.row_key(item).as_ref() == Some(&key))
        });
        self.selected_index = restored
            .unwrap_or(self.selected_index)
            .min(self.rows.len().saturating_sub(1));
    }

    fn row_key(&self, item: ResultItem) -> Option<RowKey> {
        let (path, line) = self.resolve(item)?;
        Some((path.to_path_buf(), line.map(|l| l.line_number)))
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/kernel/search/index.rs"]
mod tests;

//! 搜索面板的控制器：查询编辑、防抖、扫描生命周期、替换流程
//!
//! 整个 session 只在拥有它的线程上被修改；扫描线程只通过 channel 送消息回来。
//! 同一时刻最多一个扫描任务：新扫描开始前先取消旧任务、丢弃它的 receiver 并等它退出。

use super::index::{LineMatch, ResultIndex, ResultItem, SearchSummary};
use super::presentation::{render_match_line, truncate_line, Segment};
use crate::core::Service;
use crate::kernel::services::adapters::replace::{ReplaceError, ReplacePreview, ReplaceService};
use crate::kernel::services::adapters::search::{MatchPattern, ScanService, ScanTask};
use crate::kernel::services::ports::editor::{ConfirmDialog, EditorBuffers, ReplaceEvent};
use crate::kernel::services::ports::search::{ScanMessage, SearchQuery};
use crate::kernel::services::ports::settings::SearchSettings;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

const STATUS_IDLE: &str = "Type to search across files";
const STATUS_NO_ROOT: &str = "No folder opened. Please open a folder first.";
const STATUS_SEARCHING: &str = "Searching…";
const STATUS_NO_RESULTS: &str = "No results found";
const STATUS_NO_PATTERN: &str = "No search text specified";
const STATUS_NOTHING_TO_REPLACE: &str = "No matches to replace";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplacePhase {
    #[default]
    Idle,
    PreviewShown(ReplacePreview),
}

#[derive(Debug, Default)]
pub struct ReplaceAllReport {
    pub files_changed: usize,
    pub total_replaced: usize,
    /// 写入失败的文件仍保留在结果里
    pub failures: Vec<ReplaceError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedRow {
    File {
        path: PathBuf,
        /// 相对搜索根目录的路径
        label: String,
        count: usize,
        expanded: bool,
        selected: bool,
    },
    Match {
        path: PathBuf,
        line_number: usize,
        segments: Vec<Segment>,
        selected: bool,
    },
}

pub struct SearchSession {
    scanner: ScanService,
    replacer: ReplaceService,
    settings: SearchSettings,
    query: SearchQuery,
    replace_text: String,
    /// 当前查询编译后的模式，用于高亮和替换
    pattern: Option<MatchPattern>,
    index: ResultIndex,
    task: Option<ScanTask>,
    rx: Option<Receiver<ScanMessage>>,
    active_scan_id: Option<u64>,
    searching: bool,
    pending_deadline: Option<Instant>,
    files_searched: usize,
    last_total: usize,
    status: String,
    phase: ReplacePhase,
    subscribers: Vec<Sender<ReplaceEvent>>,
}

impl SearchSession {
    pub fn new(scanner: ScanService) -> Self {
        let settings = scanner.settings().clone();
        Self {
            replacer: ReplaceService::new(settings.preview_context_lines),
            scanner,
            settings,
            query: SearchQuery::default(),
            replace_text: String::new(),
            pattern: None,
            index: ResultIndex::new(),
            task: None,
            rx: None,
            active_scan_id: None,
            searching: false,
            pending_deadline: None,
            files_searched: 0,
            last_total: 0,
            status: STATUS_IDLE.to_string(),
            phase: ReplacePhase::Idle,
            subscribers: Vec::new(),
        }
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn replace_text(&self) -> &str {
        &self.replace_text
    }

    pub fn index(&self) -> &ResultIndex {
        &self.index
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// 没有结果时不显示
    pub fn summary(&self) -> Option<SearchSummary> {
        let summary = self.index.summary();
        (!summary.is_empty()).then_some(summary)
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn files_searched(&self) -> usize {
        self.files_searched
    }

    /// 最近一次完成的扫描报告的匹配总数
    pub fn last_total(&self) -> usize {
        self.last_total
    }

    pub fn phase(&self) -> &ReplacePhase {
        &self.phase
    }

    pub fn has_pending_search(&self) -> bool {
        self.pending_deadline.is_some()
    }

    // ---- 查询编辑 ----

    pub fn set_root_path(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        if self.query.root_path == root {
            return;
        }
        self.query.root_path = root;
        self.on_query_changed();
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.query.pattern_text == text {
            return;
        }
        self.query.pattern_text = text;
        self.on_query_changed();
    }

    /// 替换串只影响显示和替换，不会触发重新搜索
    pub fn set_replace_text(&mut self, text: impl Into<String>) {
        self.replace_text = text.into();
    }

    pub fn toggle_case_sensitive(&mut self) {
        self.query.case_sensitive = !self.query.case_sensitive;
        self.on_query_changed();
    }

    pub fn toggle_whole_word(&mut self) {
        self.query.whole_word = !self.query.whole_word;
        self.on_query_changed();
    }

    pub fn toggle_regex(&mut self) {
        self.query.use_regex = !self.query.use_regex;
        self.on_query_changed();
    }

    /// 查询一变，旧结果和旧模式立即作废：旧扫描的消息不能再进入结果，替换也不能用旧模式
    fn on_query_changed(&mut self) {
        self.stop_scan();
        self.pattern = None;
        self.index.reset();
        self.phase = ReplacePhase::Idle;
        self.files_searched = 0;
        self.last_total = 0;

        if self.query.pattern_text.is_empty() {
            self.pending_deadline = None;
            self.status = STATUS_IDLE.to_string();
            return;
        }

        self.pending_deadline =
            Some(Instant::now() + Duration::from_millis(self.settings.debounce_ms));
        self.status = STATUS_SEARCHING.to_string();
    }

    // ---- 扫描生命周期 ----

    /// 手动搜索：跳过防抖立即开始
    pub fn submit(&mut self) {
        self.start_scan();
    }

    /// 事件循环每帧调用一次，返回界面是否需要重绘
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;

        if self.pending_deadline.is_some_and(|deadline| now >= deadline) {
            self.start_scan();
            changed = true;
        }

        changed |= self.poll_scan();
        changed
    }

    /// 阻塞直到当前扫描结束（CLI 和测试用）。超时返回 false。
    pub fn finish_scan(&mut self, timeout: Duration) -> bool {
        if self.pending_deadline.is_some() {
            self.start_scan();
        }

        let deadline = Instant::now() + timeout;
        while self.searching {
            let Some(rx) = self.rx.as_ref() else {
                break;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            match rx.recv_timeout(remaining) {
                Ok(msg) => {
                    let terminal = msg.is_terminal() && Some(msg.scan_id()) == self.active_scan_id;
                    self.apply_message(msg);
                    if terminal {
                        self.finish_task();
                    }
                }
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => {
                    self.finish_task();
                    break;
                }
            }
        }

        true
    }

    fn start_scan(&mut self) {
        self.stop_scan();
        self.pending_deadline = None;
        self.phase = ReplacePhase::Idle;
        self.index.reset();
        self.files_searched = 0;
        self.last_total = 0;
        self.pattern = MatchPattern::try_compile(&self.query);

        if self.query.pattern_text.is_empty() {
            self.status = STATUS_IDLE.to_string();
            return;
        }
        if !self.query.root_path.is_dir() {
            self.status = STATUS_NO_ROOT.to_string();
            return;
        }

        let (tx, rx) = mpsc::sync_channel(self.settings.channel_capacity.max(1));
        let task = self.scanner.scan(self.query.clone(), tx);

        tracing::info!(
            service = self.scanner.name(),
            scan_id = task.id(),
            root = %self.query.root_path.display(),
            "search started"
        );

        self.active_scan_id = Some(task.id());
        self.task = Some(task);
        self.rx = Some(rx);
        self.searching = true;
        self.status = STATUS_SEARCHING.to_string();
    }

    /// 取消并等待旧任务。先丢 receiver，worker 卡在满 channel 上时 send 会立刻失败。
    fn stop_scan(&mut self) {
        self.rx = None;
        if let Some(mut task) = self.task.take() {
            task.cancel_and_wait();
            tracing::debug!(scan_id = task.id(), "previous scan stopped");
        }
        self.active_scan_id = None;
        self.searching = false;
    }

    fn finish_task(&mut self) {
        self.rx = None;
        if let Some(mut task) = self.task.take() {
            task.wait();
        }
        self.searching = false;
    }

    fn poll_scan(&mut self) -> bool {
        let Some(rx) = self.rx.take() else {
            return false;
        };

        let limit = self.settings.max_messages_per_tick.max(1);
        let mut changed = false;
        let mut done = false;
        let mut disconnected = false;
        let mut drained = 0usize;

        loop {
            if drained >= limit {
                break;
            }
            match rx.try_recv() {
                Ok(msg) => {
                    drained += 1;
                    done = msg.is_terminal() && Some(msg.scan_id()) == self.active_scan_id;
                    changed |= self.apply_message(msg);
                    if done {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        if done || disconnected {
            drop(rx);
            self.finish_task();
            changed = true;
        } else {
            self.rx = Some(rx);
        }

        changed
    }

    fn apply_message(&mut self, msg: ScanMessage) -> bool {
        if Some(msg.scan_id()) != self.active_scan_id {
            return false;
        }

        match msg {
            ScanMessage::LineMatch { result, .. } => {
                self.index.add(result);
                true
            }
            ScanMessage::Progress { files_searched, .. } => {
                self.files_searched = files_searched;
                false
            }
            ScanMessage::Complete {
                scan_id,
                files_searched,
                total_matches,
            } => {
                self.searching = false;
                self.files_searched = files_searched;
                self.last_total = total_matches;
                tracing::info!(scan_id, files_searched, total_matches, "search finished");
                self.status = if self.index.is_empty() {
                    STATUS_NO_RESULTS.to_string()
                } else {
                    self.index.summary().status_text()
                };
                true
            }
            ScanMessage::Cancelled { .. } => {
                self.searching = false;
                true
            }
            ScanMessage::InvalidPattern { message, .. } => {
                self.searching = false;
                self.status = format!("Invalid pattern: {}", message);
                true
            }
        }
    }

    // ---- 结果操作 ----

    /// 关闭单条结果（不改文件）
    pub fn remove_match(&mut self, path: &Path, line_number: usize) -> bool {
        if !self.index.remove_match(path, line_number) {
            return false;
        }
        self.refresh_status();
        true
    }

    /// 关闭某个文件的全部结果（不改文件）
    pub fn close_file_results(&mut self, path: &Path) -> bool {
        if !self.index.remove_file(path) {
            return false;
        }
        self.refresh_status();
        true
    }

    pub fn move_selection(&mut self, delta: isize) -> bool {
        self.index.move_selection(delta)
    }

    pub fn select_row(&mut self, row: usize) -> bool {
        self.index.select_row(row)
    }

    pub fn select_first_match(&mut self) -> bool {
        self.index.select_first_match()
    }

    /// 折叠/展开只改显示，计数不变
    pub fn toggle_expanded(&mut self, path: &Path) -> bool {
        self.index.toggle_expanded(path)
    }

    fn refresh_status(&mut self) {
        self.status = if self.index.is_empty() {
            "No results".to_string()
        } else {
            self.index.summary().status_text()
        };
    }

    // ---- 替换 ----

    pub fn subscribe(&mut self) -> Receiver<ReplaceEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// 只读预览，进入 PreviewShown。没有可用模式时返回 None。
    pub fn show_preview(
        &mut self,
        path: &Path,
        line_number: usize,
    ) -> Result<Option<ReplacePreview>, ReplaceError> {
        let Some(pattern) = self.pattern.clone() else {
            self.status = STATUS_NO_PATTERN.to_string();
            return Ok(None);
        };

        let result = self
            .replacer
            .preview(path, line_number, &pattern, &self.replace_text);
        let preview = self.checked(result)?;

        self.phase = ReplacePhase::PreviewShown(preview.clone());
        Ok(Some(preview))
    }

    pub fn cancel_preview(&mut self) -> bool {
        let shown = matches!(self.phase, ReplacePhase::PreviewShown(_));
        self.phase = ReplacePhase::Idle;
        shown
    }

    /// 确认预览：替换预览里那一行。无论成功失败都回到 Idle。
    pub fn confirm_preview(
        &mut self,
        editors: &mut dyn EditorBuffers,
    ) -> Result<usize, ReplaceError> {
        let ReplacePhase::PreviewShown(preview) = std::mem::take(&mut self.phase) else {
            return Ok(0);
        };
        self.replace_one(&preview.path, preview.line_number, editors)
    }

    /// 替换选中的命中行
    pub fn replace_selected(
        &mut self,
        editors: &mut dyn EditorBuffers,
    ) -> Result<usize, ReplaceError> {
        let Some((path, line)) = self
            .index
            .selected_match()
            .map(|(path, line)| (path.to_path_buf(), line.line_number))
        else {
            return Ok(0);
        };
        self.replace_one(&path, line, editors)
    }

    /// 只替换该行第一个匹配。失败时结果不变。
    pub fn replace_one(
        &mut self,
        path: &Path,
        line_number: usize,
        editors: &mut dyn EditorBuffers,
    ) -> Result<usize, ReplaceError> {
        self.phase = ReplacePhase::Idle;
        let Some(pattern) = self.pattern.clone() else {
            self.status = STATUS_NO_PATTERN.to_string();
            return Ok(0);
        };

        let result = self
            .replacer
            .replace_line(path, line_number, &pattern, &self.replace_text);
        let replaced = self.checked(result)?;

        self.index
            .consume_occurrence(path, line_number, &replaced.new_line);
        self.notify(ReplaceEvent::FileWritten {
            path: path.to_path_buf(),
            replaced: 1,
        });
        self.reload_open_buffer(path, &replaced.content, Some(line_number), editors);
        self.status = format!("Replaced in {}", file_name(path));
        Ok(1)
    }

    /// 替换一个文件里的全部匹配，需要确认。结果里没有该文件的匹配时直接返回 0。
    pub fn replace_all_in_file(
        &mut self,
        path: &Path,
        editors: &mut dyn EditorBuffers,
        confirm: &mut dyn ConfirmDialog,
    ) -> Result<usize, ReplaceError> {
        let count = self.index.count_for(path);
        if count == 0 {
            return Ok(0);
        }
        let Some(pattern) = self.pattern.clone() else {
            self.status = STATUS_NO_PATTERN.to_string();
            return Ok(0);
        };

        let name = file_name(path);
        let message = format!("Replace all {} occurrences in {}?", count, name);
        if !confirm.confirm("Replace All in File", &message) {
            return Ok(0);
        }

        self.phase = ReplacePhase::Idle;
        let result = self
            .replacer
            .replace_in_file(path, &pattern, &self.replace_text);
        let outcome = self.checked(result)?;

        self.index.remove_file(path);
        if outcome.changed {
            self.notify(ReplaceEvent::FileWritten {
                path: path.to_path_buf(),
                replaced: outcome.replaced,
            });
            self.reload_open_buffer(path, &outcome.content, None, editors);
        }
        self.status = format!("Replaced {} occurrences in {}", outcome.replaced, name);
        Ok(outcome.replaced)
    }

    /// 替换结果里所有文件。全部成功时清空结果；有失败时只保留失败的文件。
    pub fn replace_all(
        &mut self,
        editors: &mut dyn EditorBuffers,
        confirm: &mut dyn ConfirmDialog,
    ) -> ReplaceAllReport {
        let mut report = ReplaceAllReport::default();

        let total = self.index.total_matches();
        if total == 0 {
            self.status = STATUS_NOTHING_TO_REPLACE.to_string();
            return report;
        }
        let Some(pattern) = self.pattern.clone() else {
            self.status = STATUS_NO_PATTERN.to_string();
            return report;
        };

        let message = format!("Replace all {} occurrences?", total);
        if !confirm.confirm("Replace All", &message) {
            return report;
        }

        let files = self.index.files().to_vec();
        let mut succeeded = Vec::with_capacity(files.len());
        for path in files {
            match self
                .replacer
                .replace_in_file(&path, &pattern, &self.replace_text)
            {
                Ok(outcome) => {
                    if outcome.changed {
                        report.files_changed += 1;
                        report.total_replaced += outcome.replaced;
                        self.notify(ReplaceEvent::FileWritten {
                            path: path.clone(),
                            replaced: outcome.replaced,
                        });
                        self.reload_open_buffer(&path, &outcome.content, None, editors);
                    }
                    succeeded.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "replace all: file skipped");
                    report.failures.push(e);
                }
            }
        }

        self.phase = ReplacePhase::Idle;
        if report.failures.is_empty() {
            self.index.reset();
        } else {
            for path in &succeeded {
                self.index.remove_file(path);
            }
        }

        tracing::info!(
            files_changed = report.files_changed,
            total_replaced = report.total_replaced,
            failures = report.failures.len(),
            "replace all finished"
        );

        self.status = match report.failures.first() {
            None => format!(
                "Replaced {} occurrences in {} file(s)",
                report.total_replaced, report.files_changed
            ),
            Some(e) => format!(
                "Replaced {} occurrences in {} file(s), {} failed: {}",
                report.total_replaced,
                report.files_changed,
                report.failures.len(),
                e
            ),
        };
        report
    }

    fn reload_open_buffer(
        &mut self,
        path: &Path,
        content: &str,
        keep_line_visible: Option<usize>,
        editors: &mut dyn EditorBuffers,
    ) {
        if !editors.is_file_open(path) {
            return;
        }
        let Some(buffer) = editors.get_buffer(path) else {
            return;
        };

        editors.reload_buffer(buffer, content, keep_line_visible);
        tracing::debug!(path = %path.display(), buffer = buffer.0, "open buffer reloaded");
        self.notify(ReplaceEvent::FileReloaded {
            path: path.to_path_buf(),
            buffer,
            keep_line_visible,
        });
    }

    fn notify(&mut self, event: ReplaceEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// 失败写到状态栏，结果原样返回
    fn checked<T>(&mut self, result: Result<T, ReplaceError>) -> Result<T, ReplaceError> {
        if let Err(e) = &result {
            tracing::warn!(
                service = self.replacer.name(),
                path = %e.path().display(),
                error = %e,
                "replace failed"
            );
            self.status = format!("Failed to replace: {}", e);
        }
        result
    }

    // ---- 显示 ----

    pub fn render_rows(&self) -> Vec<RenderedRow> {
        let selected = self.index.selected_index();
        self.index
            .rows()
            .iter()
            .enumerate()
            .filter_map(|(row, &item)| {
                let (path, line) = self.index.resolve(item)?;
                let is_selected = row == selected;
                Some(match (item, line) {
                    (ResultItem::MatchLine { .. }, Some(line)) => RenderedRow::Match {
                        path: path.to_path_buf(),
                        line_number: line.line_number,
                        segments: self.render_line(line),
                        selected: is_selected,
                    },
                    _ => RenderedRow::File {
                        path: path.to_path_buf(),
                        label: self.relative_label(path),
                        count: self.index.count_for(path),
                        expanded: self.index.is_expanded(path),
                        selected: is_selected,
                    },
                })
            })
            .collect()
    }

    fn render_line(&self, line: &LineMatch) -> Vec<Segment> {
        let truncated = truncate_line(
            &line.text,
            self.pattern.as_ref(),
            line.occurrence_index,
            self.settings.max_preview_width,
        );
        render_match_line(
            line.line_number,
            &truncated.text,
            self.pattern.as_ref(),
            &self.replace_text,
        )
    }

    fn relative_label(&self, path: &Path) -> String {
        path.strip_prefix(&self.query.root_path)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        self.stop_scan();
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
#[path = "../../../tests/unit/kernel/search/session.rs"]
mod tests;

//! 跨文件扫描服务
//!
//! - 顺序遍历（ignore crate，关闭 .gitignore 等标准过滤，只用目录黑名单 + 扩展名白名单）
//! - 按文件名排序，同样的目录内容每次扫描结果一致
//! - 逐行匹配：一行只发一条结果，匹配次数全部计入总数
//! - 每个文件、每一行都检查取消标记

use super::pattern::MatchPattern;
use crate::core::Service;
use crate::kernel::services::ports::search::{ScanMessage, ScanResult, SearchQuery};
use crate::kernel::services::ports::settings::SearchSettings;
use ignore::WalkBuilder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;

static SCAN_ID: AtomicU64 = AtomicU64::new(1);

fn next_scan_id() -> u64 {
    SCAN_ID.fetch_add(1, Ordering::Relaxed)
}

const BINARY_SNIFF_LEN: usize = 8192;
const PROGRESS_EVERY_FILES: usize = 100;

pub struct ScanTask {
    id: u64,
    cancelled: Arc<AtomicBool>,
    /// worker 结束时 sender 被 drop，recv 返回 Err
    done: Option<Receiver<()>>,
}

impl ScanTask {
    fn new() -> (Self, mpsc::Sender<()>) {
        let (done_tx, done_rx) = mpsc::channel();
        let task = Self {
            id: next_scan_id(),
            cancelled: Arc::new(AtomicBool::new(false)),
            done: Some(done_rx),
        };
        (task, done_tx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// 阻塞直到 worker 退出。调用前应先 drop 掉结果 receiver，
    /// 否则 worker 可能一直卡在满的 channel 上。
    pub fn wait(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.recv();
        }
    }

    pub fn cancel_and_wait(&mut self) {
        self.cancel();
        self.wait();
    }

    fn cancelled_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

pub struct ScanService {
    runtime: tokio::runtime::Handle,
    settings: Arc<SearchSettings>,
}

impl ScanService {
    pub fn new(runtime: tokio::runtime::Handle, settings: SearchSettings) -> Self {
        Self {
            runtime,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn scan(&self, query: SearchQuery, tx: SyncSender<ScanMessage>) -> ScanTask {
        let (task, done_tx) = ScanTask::new();
        let scan_id = task.id();
        let cancelled = task.cancelled_flag();
        let settings = self.settings.clone();

        tracing::debug!(
            scan_id,
            root = %query.root_path.display(),
            use_regex = query.use_regex,
            "scan requested"
        );

        self.runtime.spawn(async move {
            if query.pattern_text.is_empty() || !query.root_path.is_dir() {
                let _ = tx.send(ScanMessage::Complete {
                    scan_id,
                    files_searched: 0,
                    total_matches: 0,
                });
                drop(done_tx);
                return;
            }

            // 只编译一次
            let pattern = match MatchPattern::compile(&query) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(scan_id, error = %e, "scan pattern rejected");
                    let _ = tx.send(ScanMessage::InvalidPattern {
                        scan_id,
                        message: e.to_string(),
                    });
                    drop(done_tx);
                    return;
                }
            };

            let cancelled_for_blocking = cancelled.clone();
            let tx_for_blocking = tx.clone();
            let result = tokio::task::spawn_blocking(move || {
                let _done = done_tx;
                scan_dir(
                    &query.root_path,
                    &pattern,
                    &settings,
                    scan_id,
                    &cancelled_for_blocking,
                    &tx_for_blocking,
                )
            })
            .await;

            if let Err(e) = result {
                tracing::error!(scan_id, error = %e, "scan task failed");
                let _ = tx.send(ScanMessage::Cancelled { scan_id });
            }
        });

        task
    }
}

impl Service for ScanService {
    fn name(&self) -> &'static str {
        "ScanService"
    }
}

fn is_likely_binary(content: &[u8]) -> bool {
    memchr::memchr(0, &content[..content.len().min(BINARY_SNIFF_LEN)]).is_some()
}

fn scan_dir(
    root: &Path,
    pattern: &MatchPattern,
    settings: &SearchSettings,
    scan_id: u64,
    cancelled: &AtomicBool,
    tx: &SyncSender<ScanMessage>,
) {
    let mut files_searched = 0usize;
    let mut files_with_matches = 0usize;
    let mut total_matches = 0usize;

    let filter = settings.clone();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if !is_dir {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !filter.is_ignored_dir(&name)
        })
        .build();

    for entry in walker {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }

        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        if !settings.has_allowed_extension(&name) {
            continue;
        }

        files_searched += 1;
        let (found, closed) = match scan_file(path, pattern, scan_id, cancelled, tx) {
            Ok(found) => found,
            Err(e) => {
                tracing::trace!(path = %path.display(), error = %e, "skip unreadable file");
                continue;
            }
        };
        if closed {
            // 接收端已丢弃：这次扫描已经被新的查询取代
            return;
        }

        if found > 0 {
            files_with_matches += 1;
            total_matches += found;
        }

        if files_searched % PROGRESS_EVERY_FILES == 0
            && tx
                .send(ScanMessage::Progress {
                    scan_id,
                    files_searched,
                    files_with_matches,
                })
                .is_err()
        {
            return;
        }
    }

    if cancelled.load(Ordering::Relaxed) {
        tracing::debug!(scan_id, files_searched, "scan cancelled");
        let _ = tx.send(ScanMessage::Cancelled { scan_id });
    } else {
        tracing::debug!(scan_id, files_searched, total_matches, "scan complete");
        let _ = tx.send(ScanMessage::Complete {
            scan_id,
            files_searched,
            total_matches,
        });
    }
}

/// 返回 (匹配次数, channel 是否已关闭)
fn scan_file(
    path: &Path,
    pattern: &MatchPattern,
    scan_id: u64,
    cancelled: &AtomicBool,
    tx: &SyncSender<ScanMessage>,
) -> std::io::Result<(usize, bool)> {
    let mut file = File::open(path)?;

    let mut preview = [0u8; BINARY_SNIFF_LEN];
    let preview_len = file.read(&mut preview)?;
    if preview_len == 0 || is_likely_binary(&preview[..preview_len]) {
        return Ok((0, false));
    }

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    let mut found = 0usize;

    loop {
        if cancelled.load(Ordering::Relaxed) {
            return Ok((found, false));
        }

        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        line_no += 1;

        let trimmed = buf.strip_suffix(b"\n").unwrap_or(&buf);
        let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
        let line = String::from_utf8_lossy(trimmed);

        let occurrences = pattern.count(&line);
        if occurrences == 0 {
            continue;
        }
        found += occurrences;

        let msg = ScanMessage::LineMatch {
            scan_id,
            result: ScanResult::new(path, line_no, line.into_owned(), occurrences),
        };
        if tx.send(msg).is_err() {
            return Ok((found, true));
        }
    }

    Ok((found, false))
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/search/scanner.rs"]
mod tests;

//! 内存中的打开文件表
//!
//! `EditorBuffers` 的默认实现：每个缓冲区是一个 Rope，带光标、滚动位置和修改标记。
//! CLI 和测试都用它，真正的编辑器可以换成自己的实现。

use crate::kernel::services::ports::editor::{BufferId, EditorBuffers};
use ropey::Rope;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

const DEFAULT_VIEW_HEIGHT: usize = 20;

#[derive(Debug, Clone)]
pub struct EditorBuffer {
    pub path: PathBuf,
    pub rope: Rope,
    /// char 偏移
    pub cursor: usize,
    /// 视口第一行（0-based）
    pub scroll_top: usize,
    pub view_height: usize,
    pub modified: bool,
}

impl EditorBuffer {
    pub fn new(path: PathBuf, content: &str) -> Self {
        Self {
            path,
            rope: Rope::from_str(content),
            cursor: 0,
            scroll_top: 0,
            view_height: DEFAULT_VIEW_HEIGHT,
            modified: false,
        }
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// 光标所在行（0-based）
    pub fn cursor_line(&self) -> usize {
        self.rope.char_to_line(self.cursor.min(self.rope.len_chars()))
    }

    pub fn insert(&mut self, text: &str) {
        let at = self.cursor.min(self.rope.len_chars());
        self.rope.insert(at, text);
        self.cursor = at + text.chars().count();
        self.modified = true;
    }

    pub fn set_cursor(&mut self, char_idx: usize) {
        self.cursor = char_idx.min(self.rope.len_chars());
    }

    pub fn scroll_to(&mut self, top_line: usize) {
        self.scroll_top = top_line.min(self.max_scroll());
    }

    fn max_scroll(&self) -> usize {
        self.rope.len_lines().saturating_sub(1)
    }

    fn reload(&mut self, content: &str, keep_line_visible: Option<usize>) {
        let cursor = self.cursor;
        let scroll_top = self.scroll_top;

        self.rope = Rope::from_str(content);

        match keep_line_visible {
            Some(line) => {
                let line = line.saturating_sub(1).min(self.max_scroll());
                self.cursor = self.rope.line_to_char(line);
                self.scroll_top = line.saturating_sub(self.view_height / 2);
            }
            None => {
                self.cursor = cursor.min(self.rope.len_chars());
                self.scroll_top = scroll_top.min(self.max_scroll());
            }
        }

        // 从磁盘加载的内容不算用户编辑
        self.modified = false;
    }
}

#[derive(Debug, Default)]
pub struct MemoryBuffers {
    buffers: FxHashMap<BufferId, EditorBuffer>,
    by_path: FxHashMap<PathBuf, BufferId>,
    next_id: u64,
}

impl MemoryBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, path: impl AsRef<Path>, content: &str) -> BufferId {
        let path = normalize_path(path.as_ref());
        if let Some(id) = self.by_path.get(&path) {
            return *id;
        }

        self.next_id += 1;
        let id = BufferId(self.next_id);
        self.buffers
            .insert(id, EditorBuffer::new(path.clone(), content));
        self.by_path.insert(path, id);
        id
    }

    pub fn close(&mut self, id: BufferId) -> Option<EditorBuffer> {
        let buffer = self.buffers.remove(&id)?;
        self.by_path.remove(&buffer.path);
        Some(buffer)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&EditorBuffer> {
        self.buffers.get(&id)
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> Option<&mut EditorBuffer> {
        self.buffers.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl EditorBuffers for MemoryBuffers {
    fn is_file_open(&self, path: &Path) -> bool {
        self.by_path.contains_key(&normalize_path(path))
    }

    fn get_buffer(&self, path: &Path) -> Option<BufferId> {
        self.by_path.get(&normalize_path(path)).copied()
    }

    fn reload_buffer(&mut self, buffer: BufferId, content: &str, keep_line_visible: Option<usize>) {
        let Some(buf) = self.buffers.get_mut(&buffer) else {
            tracing::debug!(buffer = buffer.0, "reload for unknown buffer ignored");
            return;
        };
        buf.reload(content, keep_line_visible);
    }
}

/// 打开的文件和扫描结果用绝对路径比较
pub fn normalize_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
#[path = "../../../../tests/unit/kernel/services/adapters/editor.rs"]
mod tests;

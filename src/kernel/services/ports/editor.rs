//! 宿主编辑器提供的能力：打开的缓冲区、确认对话框
//!
//! 搜索/替换引擎只通过这里的 trait 接触编辑器，从不直接修改缓冲区内容

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

pub trait EditorBuffers {
    fn is_file_open(&self, path: &Path) -> bool;

    fn get_buffer(&self, path: &Path) -> Option<BufferId>;

    /// 用磁盘上的新内容刷新缓冲区，并清除修改标记。
    /// `keep_line_visible` 为 1-based 行号：给出时把该行居中显示，
    /// 否则尽量恢复原来的光标和滚动位置。
    fn reload_buffer(&mut self, buffer: BufferId, content: &str, keep_line_visible: Option<usize>);
}

pub trait ConfirmDialog {
    fn confirm(&mut self, title: &str, message: &str) -> bool;
}

impl<F> ConfirmDialog for F
where
    F: FnMut(&str, &str) -> bool,
{
    fn confirm(&mut self, title: &str, message: &str) -> bool {
        self(title, message)
    }
}

/// 替换引擎对外广播的事件，订阅者通过 channel 接收
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceEvent {
    FileWritten {
        path: PathBuf,
        replaced: usize,
    },
    FileReloaded {
        path: PathBuf,
        buffer: BufferId,
        keep_line_visible: Option<usize>,
    },
}

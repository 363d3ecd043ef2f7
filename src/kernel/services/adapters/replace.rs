//! 替换的文件读写部分
//!
//! 每次写入都是“整文件读 → 整体变换 → 临时文件 + rename”，调用方看不到写了一半的文件。
//! 读取要求 UTF-8：扫描时可以宽松解码，但写回时不能把无法解码的字节替换掉。

use super::search::MatchPattern;
use crate::core::Service;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, ReplaceError>;

#[derive(Debug)]
pub enum ReplaceError {
    Io { path: PathBuf, source: io::Error },
    NotUtf8 { path: PathBuf },
    LineOutOfRange { path: PathBuf, line: usize },
    NoMatchOnLine { path: PathBuf, line: usize },
}

impl ReplaceError {
    pub fn path(&self) -> &Path {
        match self {
            ReplaceError::Io { path, .. }
            | ReplaceError::NotUtf8 { path }
            | ReplaceError::LineOutOfRange { path, .. }
            | ReplaceError::NoMatchOnLine { path, .. } => path,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::InvalidData {
            return ReplaceError::NotUtf8 {
                path: path.to_path_buf(),
            };
        }
        ReplaceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl fmt::Display for ReplaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplaceError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            ReplaceError::NotUtf8 { path } => {
                write!(f, "{}: file is not valid UTF-8", path.display())
            }
            ReplaceError::LineOutOfRange { path, line } => {
                write!(f, "{}: line {} does not exist", path.display(), line)
            }
            ReplaceError::NoMatchOnLine { path, line } => {
                write!(f, "{}: line {} no longer matches", path.display(), line)
            }
        }
    }
}

impl std::error::Error for ReplaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReplaceError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReplacement {
    /// 替换后的整行（不含换行符）
    pub new_line: String,
    /// 替换后的完整文件内容，用于刷新编辑器
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReplacement {
    pub replaced: usize,
    pub changed: bool,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewLineKind {
    Context,
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewLine {
    pub number: usize,
    pub kind: PreviewLineKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacePreview {
    pub path: PathBuf,
    pub line_number: usize,
    pub lines: Vec<PreviewLine>,
}

impl fmt::Display for ReplacePreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.path.display())?;
        writeln!(f, "Line {}:", self.line_number)?;
        writeln!(f)?;
        for line in &self.lines {
            let marker = match line.kind {
                PreviewLineKind::Context => ' ',
                PreviewLineKind::Before => '-',
                PreviewLineKind::After => '+',
            };
            writeln!(f, "{} {}: {}", marker, line.number, line.text)?;
        }
        Ok(())
    }
}

pub struct ReplaceService {
    context_lines: usize,
}

impl ReplaceService {
    pub fn new(context_lines: usize) -> Self {
        Self { context_lines }
    }

    /// 只替换 1-based 第 `line_number` 行上的第一个匹配
    pub fn replace_line(
        &self,
        path: &Path,
        line_number: usize,
        pattern: &MatchPattern,
        replacement: &str,
    ) -> Result<LineReplacement> {
        let content = read_text(path)?;
        let mut lines: Vec<&str> = content.split_inclusive('\n').collect();

        let Some(idx) = line_number.checked_sub(1).filter(|&i| i < lines.len()) else {
            return Err(ReplaceError::LineOutOfRange {
                path: path.to_path_buf(),
                line: line_number,
            });
        };

        let (body, ending) = split_line_ending(lines[idx]);
        if !pattern.is_match(body) {
            return Err(ReplaceError::NoMatchOnLine {
                path: path.to_path_buf(),
                line: line_number,
            });
        }

        let new_line = pattern.replace_first(body, replacement).into_owned();
        let rebuilt = format!("{}{}", new_line, ending);
        lines[idx] = &rebuilt;
        let new_content = lines.concat();

        write_atomic(path, &new_content)?;
        tracing::info!(path = %path.display(), line = line_number, "replaced single occurrence");

        Ok(LineReplacement {
            new_line,
            content: new_content,
        })
    }

    /// 替换整个文件里的所有匹配；内容没变就不写盘
    ///
    /// 和扫描一样逐行匹配，换行符不参与匹配，`^`/`$` 按行锚定。
    pub fn replace_in_file(
        &self,
        path: &Path,
        pattern: &MatchPattern,
        replacement: &str,
    ) -> Result<FileReplacement> {
        let content = read_text(path)?;
        let mut replaced = 0usize;
        let mut new_content = String::with_capacity(content.len());

        for raw in content.split_inclusive('\n') {
            let (body, ending) = split_line_ending(raw);
            let count = pattern.count(body);
            if count == 0 {
                new_content.push_str(raw);
                continue;
            }
            replaced += count;
            new_content.push_str(&pattern.replace_all(body, replacement));
            new_content.push_str(ending);
        }

        let changed = new_content != content;
        if changed {
            write_atomic(path, &new_content)?;
            tracing::info!(path = %path.display(), replaced, "replaced all occurrences in file");
        }

        Ok(FileReplacement {
            replaced: if changed { replaced } else { 0 },
            changed,
            content: new_content,
        })
    }

    /// 只读预览：目标行前后各 `context_lines` 行，目标行显示替换前后两个版本
    pub fn preview(
        &self,
        path: &Path,
        line_number: usize,
        pattern: &MatchPattern,
        replacement: &str,
    ) -> Result<ReplacePreview> {
        let content = read_text(path)?;
        let lines: Vec<&str> = content.lines().collect();

        let Some(idx) = line_number.checked_sub(1).filter(|&i| i < lines.len()) else {
            return Err(ReplaceError::LineOutOfRange {
                path: path.to_path_buf(),
                line: line_number,
            });
        };

        let start = idx.saturating_sub(self.context_lines);
        let end = (idx + self.context_lines + 1).min(lines.len());

        let mut out = Vec::with_capacity(end - start + 1);
        for (i, line) in lines.iter().enumerate().take(end).skip(start) {
            let number = i + 1;
            if i == idx {
                out.push(PreviewLine {
                    number,
                    kind: PreviewLineKind::Before,
                    text: line.to_string(),
                });
                out.push(PreviewLine {
                    number,
                    kind: PreviewLineKind::After,
                    text: pattern.replace_first(line, replacement).into_owned(),
                });
            } else {
                out.push(PreviewLine {
                    number,
                    kind: PreviewLineKind::Context,
                    text: line.to_string(),
                });
            }
        }

        Ok(ReplacePreview {
            path: path.to_path_buf(),
            line_number,
            lines: out,
        })
    }
}

impl Default for ReplaceService {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Service for ReplaceService {
    fn name(&self) -> &'static str {
        "ReplaceService"
    }
}

pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| ReplaceError::io(path, e))
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// 同目录临时文件写完再 rename，崩溃时不会留下截断的文件
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let write = || -> io::Result<()> {
        let permissions = std::fs::metadata(path)?.permissions();
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file().set_permissions(permissions)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    };

    write().map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "write failed");
        ReplaceError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

#[cfg(test)]
#[path = "../../../../tests/unit/kernel/services/adapters/replace.rs"]
mod tests;

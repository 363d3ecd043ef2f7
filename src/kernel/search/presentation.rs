//! 结果行的显示：长行截断、匹配高亮、替换预览（old → new）
//!
//! 宽度按终端单元格计算，所有切分点都落在 UTF-8 字符边界上。

use crate::kernel::services::adapters::search::MatchPattern;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// 匹配前保留多少列上下文
const CONTEXT_BEFORE: usize = 15;
const ELLIPSIS: &str = "...";
const ARROW: &str = " → ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedLine {
    pub text: String,
    pub ellipsis_start: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    LineNumber,
    Text,
    Match,
    Removed,
    Arrow,
    Inserted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub kind: SegmentKind,
}

impl Segment {
    fn new(text: impl Into<String>, kind: SegmentKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// 把一行截到 `max_width` 列以内，并尽量让第 `occurrence_index` 个匹配可见
pub fn truncate_line(
    line: &str,
    pattern: Option<&MatchPattern>,
    occurrence_index: usize,
    max_width: usize,
) -> TruncatedLine {
    let line = line.trim();
    if UnicodeWidthStr::width(line) <= max_width {
        return TruncatedLine {
            text: line.to_string(),
            ellipsis_start: false,
        };
    }

    let Some(span) = pattern.and_then(|p| p.nth_span(line, occurrence_index)) else {
        let end = truncate_to_width(line, max_width);
        return TruncatedLine {
            text: format!("{}{}", &line[..end], ELLIPSIS),
            ellipsis_start: false,
        };
    };

    let start = back_off_width(line, span.start, CONTEXT_BEFORE);
    let ellipsis_start = start > 0;

    let (mut text, end) = if ellipsis_start {
        let available = max_width.saturating_sub(ELLIPSIS.len());
        let end = start + truncate_to_width(&line[start..], available);
        (format!("{}{}", ELLIPSIS, &line[start..end]), end)
    } else {
        let end = truncate_to_width(line, max_width);
        (line[..end].to_string(), end)
    };

    if end < line.len() {
        let limit = max_width.saturating_sub(ELLIPSIS.len());
        if UnicodeWidthStr::width(text.as_str()) > limit {
            let cut = truncate_to_width(&text, limit);
            text.truncate(cut);
        }
        text.push_str(ELLIPSIS);
    }

    TruncatedLine {
        text,
        ellipsis_start,
    }
}

/// `"{line}: "` 前缀 + 正文。没有替换串时高亮第一个匹配，
/// 有替换串时把第一个匹配显示成 `old → new`。
pub fn render_match_line(
    line_number: usize,
    text: &str,
    pattern: Option<&MatchPattern>,
    replacement: &str,
) -> Vec<Segment> {
    let mut segments = vec![Segment::new(format!("{}: ", line_number), SegmentKind::LineNumber)];

    let span = pattern.and_then(|p| p.first_span(text).map(|s| (p, s)));
    let Some((pattern, span)) = span else {
        push_text(&mut segments, text, SegmentKind::Text);
        return segments;
    };

    let before = &text[..span.start];
    let matched = &text[span.clone()];
    let after = &text[span.end..];

    push_text(&mut segments, before, SegmentKind::Text);
    if replacement.is_empty() {
        push_text(&mut segments, matched, SegmentKind::Match);
    } else {
        let inserted = pattern
            .expanded_replacement(text, replacement)
            .unwrap_or_else(|| replacement.to_string());
        push_text(&mut segments, matched, SegmentKind::Removed);
        push_text(&mut segments, ARROW, SegmentKind::Arrow);
        push_text(&mut segments, &inserted, SegmentKind::Inserted);
    }
    push_text(&mut segments, after, SegmentKind::Text);

    segments
}

pub fn plain_text(segments: &[Segment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

fn push_text(segments: &mut Vec<Segment>, text: &str, kind: SegmentKind) {
    if !text.is_empty() {
        segments.push(Segment::new(text, kind));
    }
}

/// `s` 开头有多少字节能放进 `max_width` 列
fn truncate_to_width(s: &str, max_width: usize) -> usize {
    if max_width == 0 || s.is_empty() {
        return 0;
    }

    let mut used = 0usize;
    let mut end = 0usize;
    for (idx, ch) in s.char_indices() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > max_width {
            break;
        }
        used += w;
        end = idx + ch.len_utf8();
    }

    end
}

/// 从 `at` 往回走最多 `cols` 列，返回新的起点
fn back_off_width(s: &str, at: usize, cols: usize) -> usize {
    let mut start = at.min(s.len());
    let mut used = 0usize;
    for (idx, ch) in s[..start].char_indices().rev() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > cols {
            break;
        }
        used += w;
        start = idx;
    }
    start
}

#[cfg(test)]
#[path = "../../../tests/unit/kernel/search/presentation.rs"]
mod tests;

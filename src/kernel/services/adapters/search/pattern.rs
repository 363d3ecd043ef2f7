//! 匹配模式
//!
//! 扫描和替换共用同一个编译结果，保证替换的目标正是扫描找到的内容

use crate::kernel::services::ports::search::{Result, SearchQuery};
use regex::{NoExpand, Regex, RegexBuilder};
use std::borrow::Cow;
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct MatchPattern {
    regex: Regex,
    /// 只有 regex 模式才展开替换串里的 `$1` / `${name}`
    expand_replacement: bool,
}

impl MatchPattern {
    pub fn compile(query: &SearchQuery) -> Result<Self> {
        Self::build(
            &query.pattern_text,
            query.case_sensitive,
            query.whole_word,
            query.use_regex,
        )
    }

    pub fn build(
        pattern_text: &str,
        case_sensitive: bool,
        whole_word: bool,
        use_regex: bool,
    ) -> Result<Self> {
        let source = if use_regex {
            pattern_text.to_string()
        } else {
            let escaped = regex::escape(pattern_text);
            if whole_word {
                format!(r"\b{}\b", escaped)
            } else {
                escaped
            }
        };

        let regex = RegexBuilder::new(&source)
            .case_insensitive(!case_sensitive)
            .build()?;

        Ok(Self {
            regex,
            expand_replacement: use_regex,
        })
    }

    /// 空查询或非法正则都视为“没有可用模式”
    pub fn try_compile(query: &SearchQuery) -> Option<Self> {
        if query.pattern_text.is_empty() {
            return None;
        }
        Self::compile(query).ok()
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn count(&self, text: &str) -> usize {
        self.regex.find_iter(text).count()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn find_spans(&self, text: &str) -> Vec<Range<usize>> {
        self.regex.find_iter(text).map(|m| m.range()).collect()
    }

    pub fn first_span(&self, text: &str) -> Option<Range<usize>> {
        self.regex.find(text).map(|m| m.range())
    }

    pub fn nth_span(&self, text: &str, n: usize) -> Option<Range<usize>> {
        self.regex.find_iter(text).nth(n).map(|m| m.range())
    }

    /// 替换第一个匹配
    pub fn replace_first<'t>(&self, text: &'t str, replacement: &str) -> Cow<'t, str> {
        self.replace_n(text, replacement, 1)
    }

    /// 替换全部匹配
    pub fn replace_all<'t>(&self, text: &'t str, replacement: &str) -> Cow<'t, str> {
        self.replace_n(text, replacement, 0)
    }

    /// 只计算第一个匹配替换后的文本（用于预览里单独显示新片段）
    pub fn expanded_replacement(&self, text: &str, replacement: &str) -> Option<String> {
        let caps = self.regex.captures(text)?;
        if self.expand_replacement {
            let mut dst = String::new();
            caps.expand(replacement, &mut dst);
            Some(dst)
        } else {
            Some(replacement.to_string())
        }
    }

    fn replace_n<'t>(&self, text: &'t str, replacement: &str, limit: usize) -> Cow<'t, str> {
        if self.expand_replacement {
            self.regex.replacen(text, limit, replacement)
        } else {
            self.regex.replacen(text, limit, NoExpand(replacement))
        }
    }
}

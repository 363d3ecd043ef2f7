//! 跨文件搜索 / 替换
//!
//! - `index`: 结果索引（文件 → 命中行 → 匹配次数），所有修改都走它的方法
//! - `presentation`: 结果行截断和高亮
//! - `session`: 面板控制器，把扫描、索引、替换串起来

pub mod index;
pub mod presentation;
pub mod session;

pub use index::{LineMatch, ResultIndex, ResultItem, SearchSummary};
pub use presentation::{
    plain_text, render_match_line, truncate_line, Segment, SegmentKind, TruncatedLine,
};
pub use session::{RenderedRow, ReplaceAllReport, ReplacePhase, SearchSession};

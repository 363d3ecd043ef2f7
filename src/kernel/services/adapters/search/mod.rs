//! 搜索服务模块
//!
//! - MatchPattern: 查询编译结果（扫描与替换共用）
//! - ScanService: 后台跨文件扫描，可取消

mod pattern;
mod scanner;

pub use pattern::MatchPattern;
pub use scanner::{ScanService, ScanTask};

//! zsearch - 跨文件搜索 / 替换引擎
//!
//! 模块结构：
//! - core: 核心抽象（Service）
//! - kernel::services: 端口（查询、扫描消息、编辑器接口、配置）与适配器（扫描、替换、运行时）
//! - kernel::search: 结果索引、显示逻辑、搜索会话

pub mod core;
pub mod kernel;

//! 核心抽象
//!
//! - Service: 服务标识

pub mod service;

pub use service::Service;

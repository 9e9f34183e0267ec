//! 测试辅助工具模块

mod kafka_helper;
mod recording_provider;

pub use kafka_helper::*;
pub use recording_provider::*;

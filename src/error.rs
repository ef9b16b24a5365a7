//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 库内合成链路的错误统一为 `MergeError`；命令行与设置文件等外围逻辑再收敛到
//! 应用级的 `AppError`，避免各处分散的 `.map_err(|e| e.to_string())`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `MergeError` / `io::Error` / `serde_json::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于以 JSON 输出。

use serde::Serialize;

use crate::merge::MergeError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 合成流水线错误（加载 / 对齐 / 写盘）
    #[error("{0}")]
    Merge(#[from] MergeError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 解析或生成失败
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 设置文件不可用
    #[error("设置文件错误: {0}")]
    Settings(String),

    /// 命令行参数不合法
    #[error("参数错误: {0}")]
    Args(String),
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

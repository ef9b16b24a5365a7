//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 合成链路中的所有失败都收敛到 `MergeError`，调用侧可以按分支匹配，
//! 桥接层则通过 `code()` / `stage()` 拿到稳定的机器可读标识。

/// 合成流程统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("参数错误：{0}")]
    InvalidInput(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("纹理不足：{0}")]
    LowTexture(String),

    #[error("对齐失败：{0}")]
    AlignmentFailed(String),

    #[error("输出目录错误：{0}")]
    Output(String),

    #[error("编码错误：{0}")]
    Encode(String),
}

impl MergeError {
    /// 稳定错误码，供桥接层与前端分支处理。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::FileSystem(_) => "io_failure",
            Self::InvalidFormat(_) => "invalid_format",
            Self::Decode(_) => "decode_failure",
            Self::ResourceLimit(_) => "resource_limit",
            Self::LowTexture(_) => "low_texture",
            Self::AlignmentFailed(_) => "alignment_failed",
            Self::Output(_) => "output_failure",
            Self::Encode(_) => "encode_failure",
        }
    }

    /// 出错阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "validate",
            Self::FileSystem(_) | Self::InvalidFormat(_) => "load",
            Self::Decode(_) | Self::ResourceLimit(_) => "decode",
            Self::LowTexture(_) | Self::AlignmentFailed(_) => "align",
            Self::Output(_) | Self::Encode(_) => "write",
        }
    }
}

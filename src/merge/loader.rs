//! # 源图加载模块
//!
//! ## 设计思路
//!
//! 只负责“路径 → 原始字节”，并在读入前后做三道检查：
//! 文件存在且为普通文件、体积不超限、文件签名确实是图片。
//! 解码交给 `pipeline`，这里不解析像素。

use std::path::Path;

use super::source::RawImageData;
use super::{MergeConfig, MergeError, MergeHandler};

impl MergeHandler {
    /// 从本地路径加载图片原始字节。
    pub(super) fn load_from_file(
        &self,
        path: &str,
        source_hint: &'static str,
        config: &MergeConfig,
    ) -> Result<RawImageData, MergeError> {
        log::info!("📁 开始读取源图 - {}: {}", source_hint, path);

        if path.trim().is_empty() {
            return Err(MergeError::InvalidInput(format!("{} 路径为空", source_hint)));
        }

        let file_path = Path::new(path);
        if !file_path.exists() {
            return Err(MergeError::FileSystem(format!("文件不存在：{}", path)));
        }

        let metadata = std::fs::metadata(file_path)
            .map_err(|e| MergeError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if !metadata.is_file() {
            return Err(MergeError::FileSystem(format!("不是普通文件：{}", path)));
        }

        if metadata.len() > config.max_file_size {
            return Err(MergeError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(file_path)
            .map_err(|e| MergeError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData { bytes, source_hint })
    }

    fn validate_image_signature(bytes: &[u8]) -> Result<(), MergeError> {
        if bytes.is_empty() {
            return Err(MergeError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| MergeError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(MergeError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }
}

//! # 输入与中间模型
//!
//! ## 设计思路
//!
//! 将“调用方输入”“流水线中间结果”“对外输出”解耦：
//! - `MergeRequest` / `MaskBuffer` 表示调用方提供的路径与蒙版（借用，不持有）
//! - `OwnedMergeRequest` 用于跨线程（阻塞线程池）传递
//! - `RawImageData` 表示已加载但未解码的字节
//! - `MergeResult` 表示写盘后的结果，可转换为字符串键映射

use std::path::PathBuf;

use serde::Serialize;

use super::MergeError;

/// 单通道 8 位蒙版（0 = 保留底图，255 = 取叠加帧）。
///
/// 只能通过 [`MaskBuffer::new`] 构造，保证 `data.len() == width * height`。
#[derive(Debug, Clone, Copy)]
pub struct MaskBuffer<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> MaskBuffer<'a> {
    /// 校验并借用蒙版缓冲。
    ///
    /// # 示例
    /// ```rust
    /// use addme_merge::merge::MaskBuffer;
    ///
    /// let bytes = vec![0u8; 6];
    /// let mask = MaskBuffer::new(&bytes, 3, 2)?;
    /// assert_eq!(mask.width(), 3);
    /// assert!(MaskBuffer::new(&bytes, 4, 2).is_err());
    /// # Ok::<(), addme_merge::merge::MergeError>(())
    /// ```
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Result<Self, MergeError> {
        if data.is_empty() {
            return Err(MergeError::InvalidInput("蒙版数据为空".to_string()));
        }
        if width == 0 || height == 0 {
            return Err(MergeError::InvalidInput(format!(
                "蒙版尺寸必须为正数：{}x{}",
                width, height
            )));
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| MergeError::InvalidInput("蒙版尺寸溢出".to_string()))?;

        if data.len() != expected {
            return Err(MergeError::InvalidInput(format!(
                "蒙版长度与尺寸不一致：{} 字节，期望 {}x{} = {} 字节",
                data.len(),
                width,
                height,
                expected
            )));
        }

        Ok(Self { data, width, height })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// 一次合成请求。
#[derive(Debug, Clone, Copy)]
pub struct MergeRequest<'a> {
    /// 底图（背景帧）路径。
    pub base_path: &'a str,
    /// 叠加帧（含新增人物）路径。
    pub add_path: &'a str,
    /// 输出目录。
    pub project_dir: &'a str,
    pub mask: MaskBuffer<'a>,
}

/// 拥有所有权的请求，用于移动到阻塞线程池。
#[derive(Debug, Clone)]
pub struct OwnedMergeRequest {
    pub base_path: String,
    pub add_path: String,
    pub project_dir: String,
    pub mask_data: Vec<u8>,
    pub mask_width: u32,
    pub mask_height: u32,
}

impl OwnedMergeRequest {
    /// 借用为 [`MergeRequest`]，同时完成蒙版校验。
    pub fn as_request(&self) -> Result<MergeRequest<'_>, MergeError> {
        Ok(MergeRequest {
            base_path: &self.base_path,
            add_path: &self.add_path,
            project_dir: &self.project_dir,
            mask: MaskBuffer::new(&self.mask_data, self.mask_width, self.mask_height)?,
        })
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 对齐阶段摘要。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlignmentReport {
    pub applied: bool,
    /// RANSAC 内点占比。
    pub confidence: f64,
    pub match_count: usize,
    pub inlier_count: usize,
}

/// 合成结果。
///
/// 序列化为 camelCase 键（`outputPath`、`alignmentConfidence` …）。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub alignment_applied: bool,
    pub alignment_confidence: f64,
    pub match_count: usize,
    pub inlier_count: usize,
    /// 输出中蒙版权重非零的像素占比。
    pub mask_coverage: f64,
    pub elapsed_ms: u64,
}

impl MergeResult {
    /// 转换为字符串键映射，供桥接层直接返回。
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

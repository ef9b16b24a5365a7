//! # 配置模块
//!
//! ## 设计思路
//!
//! 所有“可调策略”集中在 `MergeConfig`：加载限制、对齐参数、蒙版羽化与输出编码。
//! 性能档位（quality / balanced / speed）作为高层语义，映射到对齐阶段的参数组合。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置。
//! - `MergePerformanceProfile` 负责档位字符串解析与反向输出。
//! - `apply_performance_profile` 将档位转换为具体阈值。
//! - `infer_performance_profile` 从当前配置反推档位。

use image::imageops::FilterType;

use super::MergeError;

/// 合成流程配置。
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// 单个源图片文件允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 是否执行特征点对齐。关闭时仅按尺寸比例拉伸叠加帧。
    pub align_frames: bool,
    /// 对齐失败时是否直接报错；为 `false` 时回退到比例变换。
    pub require_alignment: bool,
    /// 对齐工作分辨率的最长边。
    pub align_max_dimension: u32,
    /// FAST 角点阈值。
    pub fast_threshold: u8,
    /// 每帧保留的最大特征点数量。
    pub max_features: usize,
    /// 参与 RANSAC 的最佳匹配数量上限。
    pub max_matches: usize,
    /// 最少匹配数量，不足则判定无法对齐。
    pub min_matches: usize,
    /// RANSAC 迭代次数。
    pub ransac_iterations: u32,
    /// RANSAC 重投影误差阈值（原图像素）。
    pub ransac_threshold: f32,
    /// 随机采样种子，保证同一输入结果可复现。
    pub ransac_seed: u64,
    /// 蒙版二值化阈值；`None` 表示保留软蒙版。
    pub mask_threshold: Option<u8>,
    /// 羽化高斯核标准差，`0.0` 表示不羽化。
    pub feather_sigma: f32,
    /// 缩放滤镜策略（蒙版放大与工作图降采样共用）。
    pub resize_filter: FilterType,
    /// JPEG 输出质量（1~100）。
    pub jpeg_quality: u8,
    /// 输出文件名（位于 project dir 下）。
    pub output_file_name: String,
    /// project dir 不存在时是否自动创建。
    pub create_project_dir: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            align_frames: true,
            require_alignment: true,
            align_max_dimension: 1024,
            fast_threshold: 20,
            max_features: 1000,
            max_matches: 100,
            min_matches: 10,
            ransac_iterations: 500,
            ransac_threshold: 5.0,
            ransac_seed: 0x5eed_add3,
            mask_threshold: Some(153),
            feather_sigma: 10.0,
            resize_filter: FilterType::Triangle,
            jpeg_quality: 92,
            output_file_name: "out.jpg".to_string(),
            create_project_dir: false,
        }
    }
}

/// 合成性能档位。
///
/// - `Quality`：高分辨率对齐，精度优先
/// - `Balanced`：默认
/// - `Speed`：低分辨率对齐，速度优先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePerformanceProfile {
    Quality,
    Balanced,
    Speed,
}

impl MergePerformanceProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use addme_merge::merge::MergePerformanceProfile;
    ///
    /// let p = MergePerformanceProfile::from_str("balanced")?;
    /// assert_eq!(p.as_str(), "balanced");
    /// # Ok::<(), addme_merge::merge::MergeError>(())
    /// ```
    pub(crate) fn from_str(profile: &str) -> Result<Self, MergeError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(MergeError::InvalidInput(format!(
                "未知性能档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

impl MergeConfig {
    /// 基于当前参数反推性能档位。
    pub(crate) fn infer_performance_profile(&self) -> MergePerformanceProfile {
        if self.align_max_dimension >= 2048 && self.max_features >= 2000 {
            return MergePerformanceProfile::Quality;
        }

        if self.align_max_dimension <= 640 || self.max_features <= 500 {
            return MergePerformanceProfile::Speed;
        }

        MergePerformanceProfile::Balanced
    }

    /// 应用指定性能档位到实际参数。
    pub(crate) fn apply_performance_profile(&mut self, profile: MergePerformanceProfile) {
        match profile {
            MergePerformanceProfile::Quality => {
                self.align_max_dimension = 2048;
                self.max_features = 2000;
                self.ransac_iterations = 2000;
                self.resize_filter = FilterType::CatmullRom;
            }
            MergePerformanceProfile::Balanced => {
                self.align_max_dimension = 1024;
                self.max_features = 1000;
                self.ransac_iterations = 500;
                self.resize_filter = FilterType::Triangle;
            }
            MergePerformanceProfile::Speed => {
                self.align_max_dimension = 640;
                self.max_features = 500;
                self.ransac_iterations = 200;
                self.resize_filter = FilterType::Nearest;
            }
        }
    }
}

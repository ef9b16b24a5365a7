//! 设置文件模块
//!
//! # 设计思路
//!
//! 命令行可以通过 `--config settings.json` 覆盖默认合成参数。文件中的每个字段都是可选的，
//! 缺省字段沿用 `MergeConfig::default()`。
//!
//! # 实现思路
//!
//! - 先应用 `profile`（命令行 `--profile` 优先于文件），再逐项覆盖细项参数，最后走与服务层相同的范围校验。
//! - 解析、校验失败统一映射为 `AppError::Settings`。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::merge::{MergeAdvancedConfig, MergeConfig, MergePerformanceProfile};

/// 设置文件内容（camelCase 键）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeSettings {
    pub profile: Option<String>,
    pub max_file_size: Option<u64>,
    pub max_decoded_pixels: Option<u64>,
    /// 解码内存上限（字节，按 RGBA 估算）。
    pub max_decoded_bytes: Option<u64>,
    pub align_frames: Option<bool>,
    pub require_alignment: Option<bool>,
    pub min_matches: Option<usize>,
    pub max_matches: Option<usize>,
    pub ransac_iterations: Option<u32>,
    pub ransac_threshold: Option<f32>,
    /// `0` 表示关闭二值化，保留软蒙版。
    pub mask_threshold: Option<u8>,
    pub feather_sigma: Option<f32>,
    pub jpeg_quality: Option<u8>,
    pub output_file_name: Option<String>,
    pub create_project_dir: Option<bool>,
}

impl MergeSettings {
    /// 将设置覆盖到配置上。
    pub fn apply(&self, config: &mut MergeConfig) -> Result<(), AppError> {
        if let Some(profile) = &self.profile {
            let profile = MergePerformanceProfile::from_str(profile)
                .map_err(|e| AppError::Settings(e.to_string()))?;
            config.apply_performance_profile(profile);
        }

        if let Some(limit) = positive_limit("maxFileSize", self.max_file_size)? {
            config.max_file_size = limit;
        }
        if let Some(limit) = positive_limit("maxDecodedPixels", self.max_decoded_pixels)? {
            config.max_decoded_pixels = limit;
        }
        if let Some(limit) = positive_limit("maxDecodedBytes", self.max_decoded_bytes)? {
            config.max_decoded_bytes = limit;
        }

        let mut advanced = MergeAdvancedConfig::from_config(config);
        if let Some(v) = self.align_frames {
            advanced.align_frames = v;
        }
        if let Some(v) = self.require_alignment {
            advanced.require_alignment = v;
        }
        if let Some(v) = self.min_matches {
            advanced.min_matches = v;
        }
        if let Some(v) = self.max_matches {
            advanced.max_matches = v;
        }
        if let Some(v) = self.ransac_iterations {
            advanced.ransac_iterations = v;
        }
        if let Some(v) = self.ransac_threshold {
            advanced.ransac_threshold = v;
        }
        if let Some(v) = self.mask_threshold {
            advanced.mask_threshold = (v > 0).then_some(v);
        }
        if let Some(v) = self.feather_sigma {
            advanced.feather_sigma = v;
        }
        if let Some(v) = self.jpeg_quality {
            advanced.jpeg_quality = v;
        }
        if let Some(v) = &self.output_file_name {
            advanced.output_file_name = v.clone();
        }
        if let Some(v) = self.create_project_dir {
            advanced.create_project_dir = v;
        }

        advanced
            .validate()
            .map_err(|e| AppError::Settings(e.to_string()))?;
        advanced.apply_to(config);
        Ok(())
    }
}

/// 读取设置文件。
pub fn load_settings(path: &Path) -> Result<MergeSettings, AppError> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::Settings(format!("读取设置文件 '{}' 失败: {}", path.display(), e)))?;

    serde_json::from_str::<MergeSettings>(&content)
        .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))
}

/// 资源上限必须为正数，`0` 会拒绝所有输入。
fn positive_limit(key: &str, value: Option<u64>) -> Result<Option<u64>, AppError> {
    match value {
        Some(0) => Err(AppError::Settings(format!("{} 必须大于 0", key))),
        other => Ok(other),
    }
}

/// 生成最终配置。
///
/// 优先级：档位（命令行 `profile_override` 优先于文件中的 `profile`）→ 文件中的细项参数。
/// 细项参数总是覆盖档位带来的默认值。
pub fn resolve_config(path: Option<&Path>, profile_override: Option<&str>) -> Result<MergeConfig, AppError> {
    let mut settings = match path {
        Some(path) => {
            let settings = load_settings(path)?;
            log::info!("⚙️ 已加载设置文件：{}", path.display());
            settings
        }
        None => MergeSettings::default(),
    };

    if let Some(profile) = profile_override {
        settings.profile = Some(profile.to_string());
    }

    let mut config = MergeConfig::default();
    settings.apply(&mut config)?;
    Ok(config)
}

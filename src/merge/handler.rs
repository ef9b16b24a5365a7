//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `MergeHandler` 只负责流程编排与配置管理，不绑定任何调用层。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 校验输出目录（重活之前失败）
//! 3. 加载并解码底图与叠加帧
//! 4. 对齐（关闭或失败回退时按底图尺寸拉伸）
//! 5. 蒙版放大、投影、羽化
//! 6. 合成并写盘
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<MergeConfig>>` 支持运行时动态切档。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `load/align/mask/blend/write/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use image::RgbImage;

use super::align::{self, Alignment};
use super::homography::Homography;
use super::source::{AlignmentReport, MergeRequest, MergeResult};
use super::{MergeConfig, MergeError, MergePerformanceProfile, blend, mask, pipeline, writer};
use crate::storage;

/// 合成处理器。
pub struct MergeHandler {
    pub(super) config: Arc<RwLock<MergeConfig>>,
}

impl MergeHandler {
    pub fn new(config: MergeConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// 获取配置快照。
    pub(crate) fn config_snapshot(&self) -> Result<MergeConfig, MergeError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| MergeError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 整体替换配置。
    pub(crate) fn replace_config(&self, config: MergeConfig) -> Result<(), MergeError> {
        let mut current = self
            .config
            .write()
            .map_err(|_| MergeError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        *current = config;
        Ok(())
    }

    /// 设置性能档位。
    pub fn set_performance_profile(&self, profile: MergePerformanceProfile) -> Result<(), MergeError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| MergeError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.apply_performance_profile(profile);

        log::info!(
            "⚙️ 已切换合成性能档位：{:?}（align_max_dim={}, max_features={}, iterations={}, filter={:?}）",
            profile,
            config.align_max_dimension,
            config.max_features,
            config.ransac_iterations,
            config.resize_filter
        );

        Ok(())
    }

    /// 获取当前生效档位。
    pub fn get_performance_profile(&self) -> Result<MergePerformanceProfile, MergeError> {
        let config = self
            .config
            .read()
            .map_err(|_| MergeError::ResourceLimit("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_performance_profile())
    }

    /// 处理主入口：一次完整的合成。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use addme_merge::merge::{MaskBuffer, MergeConfig, MergeHandler, MergeRequest};
    ///
    /// let mask_bytes = vec![255u8; 64 * 48];
    /// let handler = MergeHandler::new(MergeConfig::default());
    /// let result = handler.merge(&MergeRequest {
    ///     base_path: "/data/project/a.jpg",
    ///     add_path: "/data/project/b.jpg",
    ///     project_dir: "/data/project",
    ///     mask: MaskBuffer::new(&mask_bytes, 64, 48)?,
    /// })?;
    /// println!("{}", result.output_path.display());
    /// # Ok::<(), addme_merge::merge::MergeError>(())
    /// ```
    pub fn merge(&self, request: &MergeRequest<'_>) -> Result<MergeResult, MergeError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let project_dir = storage::ensure_writable_dir(request.project_dir, config.create_project_dir)?;

        let load_start = Instant::now();
        let base = self.decode_rgb(self.load_from_file(request.base_path, "base", &config)?, &config)?;
        let add = self.decode_rgb(self.load_from_file(request.add_path, "add", &config)?, &config)?;
        let load_elapsed = load_start.elapsed();

        let align_start = Instant::now();
        let (transform, report) = Self::resolve_alignment(&base, &add, &config)?;
        let align_elapsed = align_start.elapsed();

        let mask_start = Instant::now();
        let (width, height) = base.dimensions();
        let overlay_mask = mask::prepare_overlay_mask(&request.mask, add.width(), add.height(), &config)?;
        let (foreground, frame_mask) = match transform {
            Some(homography) => (
                mask::warp_overlay(&add, &homography, width, height)?,
                mask::warp_mask(&overlay_mask, &homography, width, height)?,
            ),
            None => (
                pipeline::resize_rgb(&add, width, height, config.resize_filter),
                pipeline::resize_luma(&overlay_mask, width, height, config.resize_filter),
            ),
        };
        let weights = mask::feather(frame_mask, config.feather_sigma);
        let mask_coverage = mask::coverage(&weights);
        let mask_elapsed = mask_start.elapsed();

        let blend_start = Instant::now();
        let merged = blend::blend(&base, &foreground, &weights)?;
        let blend_elapsed = blend_start.elapsed();

        let write_start = Instant::now();
        let output_path = writer::write_output(&merged, &project_dir, &config)?;
        let write_elapsed = write_start.elapsed();

        let total_elapsed = total_start.elapsed();
        log::info!(
            "✅ 合成完成 - load={}ms align={}ms mask={}ms blend={}ms write={}ms total={}ms",
            load_elapsed.as_millis(),
            align_elapsed.as_millis(),
            mask_elapsed.as_millis(),
            blend_elapsed.as_millis(),
            write_elapsed.as_millis(),
            total_elapsed.as_millis()
        );

        Ok(MergeResult {
            output_path,
            width,
            height,
            alignment_applied: report.applied,
            alignment_confidence: report.confidence,
            match_count: report.match_count,
            inlier_count: report.inlier_count,
            mask_coverage,
            elapsed_ms: total_elapsed.as_millis() as u64,
        })
    }

    /// 返回叠加帧 → 底图的投影变换；`None` 表示不做投影，直接按底图尺寸拉伸。
    fn resolve_alignment(
        base: &RgbImage,
        add: &RgbImage,
        config: &MergeConfig,
    ) -> Result<(Option<Homography>, AlignmentReport), MergeError> {
        if !config.align_frames {
            return Ok((None, AlignmentReport::default()));
        }

        match align::estimate_alignment(base, add, config) {
            Ok(Alignment { homography, report }) => Ok((Some(homography), report)),
            Err(err @ (MergeError::LowTexture(_) | MergeError::AlignmentFailed(_)))
                if !config.require_alignment =>
            {
                log::warn!("⚠️ 对齐失败，回退为按尺寸拉伸：{}", err);
                Ok((None, AlignmentReport::default()))
            }
            Err(err) => Err(err),
        }
    }
}

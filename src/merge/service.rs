//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! 使用 `MergeServiceState` 作为调用层持有的状态，替代全局单例函数。
//! 合成本身是 CPU 密集的同步流程，异步入口统一放到 tokio 阻塞线程池执行，
//! 不占用异步运行时的工作线程。
//!
//! ## 实现思路
//!
//! 对外仅暴露少量稳定 API：
//! - `merge` / `merge_blocking`：执行完整合成链路
//! - `set_performance_profile` / `get_performance_profile`：切换与读取档位
//! - `set_advanced_config` / `get_advanced_config`：按范围校验后更新细项参数

use std::sync::Arc;

use super::source::{MergeRequest, MergeResult, OwnedMergeRequest};
use super::{MergeConfig, MergeError, MergeHandler, MergePerformanceProfile, writer};

/// 可由外部读写的细项参数。
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MergeAdvancedConfig {
    pub align_frames: bool,
    pub require_alignment: bool,
    pub min_matches: usize,
    pub max_matches: usize,
    pub ransac_iterations: u32,
    pub ransac_threshold: f32,
    pub mask_threshold: Option<u8>,
    pub feather_sigma: f32,
    pub jpeg_quality: u8,
    pub output_file_name: String,
    pub create_project_dir: bool,
}

impl MergeAdvancedConfig {
    pub(crate) fn from_config(config: &MergeConfig) -> Self {
        Self {
            align_frames: config.align_frames,
            require_alignment: config.require_alignment,
            min_matches: config.min_matches,
            max_matches: config.max_matches,
            ransac_iterations: config.ransac_iterations,
            ransac_threshold: config.ransac_threshold,
            mask_threshold: config.mask_threshold,
            feather_sigma: config.feather_sigma,
            jpeg_quality: config.jpeg_quality,
            output_file_name: config.output_file_name.clone(),
            create_project_dir: config.create_project_dir,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), MergeError> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(MergeError::InvalidInput("jpeg_quality 必须在 1~100 之间".to_string()));
        }
        if !(0.0..=64.0).contains(&self.feather_sigma) {
            return Err(MergeError::InvalidInput("feather_sigma 必须在 0~64 之间".to_string()));
        }
        if !(1..=10_000).contains(&self.ransac_iterations) {
            return Err(MergeError::InvalidInput("ransac_iterations 必须在 1~10000 之间".to_string()));
        }
        if !(0.5..=50.0).contains(&self.ransac_threshold) {
            return Err(MergeError::InvalidInput("ransac_threshold 必须在 0.5~50 像素之间".to_string()));
        }
        if self.min_matches < 4 {
            return Err(MergeError::InvalidInput("min_matches 不能小于 4".to_string()));
        }
        if self.min_matches > self.max_matches {
            return Err(MergeError::InvalidInput("min_matches 不能大于 max_matches".to_string()));
        }
        writer::validated_file_name(&self.output_file_name)?;
        Ok(())
    }

    pub(crate) fn apply_to(&self, config: &mut MergeConfig) {
        config.align_frames = self.align_frames;
        config.require_alignment = self.require_alignment;
        config.min_matches = self.min_matches;
        config.max_matches = self.max_matches;
        config.ransac_iterations = self.ransac_iterations;
        config.ransac_threshold = self.ransac_threshold;
        config.mask_threshold = self.mask_threshold;
        config.feather_sigma = self.feather_sigma;
        config.jpeg_quality = self.jpeg_quality;
        config.output_file_name = self.output_file_name.trim().to_string();
        config.create_project_dir = self.create_project_dir;
    }
}

/// 合成服务状态，内部持有 `MergeHandler`。
#[derive(Clone)]
pub struct MergeServiceState {
    handler: Arc<MergeHandler>,
}

impl MergeServiceState {
    /// 使用默认配置创建服务状态。
    pub fn new() -> Self {
        Self::with_config(MergeConfig::default())
    }

    /// 使用自定义配置创建服务状态。
    ///
    /// # 示例
    /// ```rust
    /// use addme_merge::merge::{MergeConfig, MergeServiceState};
    ///
    /// let mut config = MergeConfig::default();
    /// config.create_project_dir = true;
    /// let service = MergeServiceState::with_config(config);
    /// assert_eq!(service.get_performance_profile()?, "balanced");
    /// # Ok::<(), addme_merge::merge::MergeError>(())
    /// ```
    pub fn with_config(config: MergeConfig) -> Self {
        Self {
            handler: Arc::new(MergeHandler::new(config)),
        }
    }

    /// 在当前线程执行合成。
    pub fn merge_blocking(&self, request: &MergeRequest<'_>) -> Result<MergeResult, MergeError> {
        self.handler.merge(request)
    }

    /// 在 tokio 阻塞线程池执行合成。
    pub async fn merge(&self, request: OwnedMergeRequest) -> Result<MergeResult, MergeError> {
        let handler = Arc::clone(&self.handler);
        tokio::task::spawn_blocking(move || {
            let request = request.as_request()?;
            handler.merge(&request)
        })
        .await
        .map_err(|e| MergeError::ResourceLimit(format!("合成任务异常退出：{}", e)))?
    }

    pub fn set_performance_profile(&self, profile: &str) -> Result<(), MergeError> {
        let profile = MergePerformanceProfile::from_str(profile)?;
        self.handler.set_performance_profile(profile)
    }

    pub fn get_performance_profile(&self) -> Result<String, MergeError> {
        let profile = self.handler.get_performance_profile()?;
        Ok(profile.as_str().to_string())
    }

    pub fn set_advanced_config(&self, advanced: MergeAdvancedConfig) -> Result<(), MergeError> {
        advanced.validate()?;
        let mut config = self.handler.config_snapshot()?;
        advanced.apply_to(&mut config);
        self.handler.replace_config(config)
    }

    pub fn get_advanced_config(&self) -> Result<MergeAdvancedConfig, MergeError> {
        let config = self.handler.config_snapshot()?;
        Ok(MergeAdvancedConfig::from_config(&config))
    }
}

impl Default for MergeServiceState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn service_set_and_get_profile_roundtrip() {
        let service = MergeServiceState::new();

        for name in ["quality", "speed", "balanced"] {
            service.set_performance_profile(name).expect("set profile should succeed");
            assert_eq!(service.get_performance_profile().expect("get profile"), name);
        }
    }

    #[test]
    fn service_rejects_invalid_profile() {
        let service = MergeServiceState::new();
        let result = service.set_performance_profile("unknown-profile");
        assert!(matches!(result, Err(MergeError::InvalidInput(_))));
    }

    #[test]
    fn service_profile_concurrent_access_stress() {
        let service = MergeServiceState::new();

        let workers = 8;
        let iterations = 200;

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let service = service.clone();
            handles.push(thread::spawn(move || {
                let profiles = ["quality", "balanced", "speed"];

                for i in 0..iterations {
                    let profile = profiles[(worker_id + i) % profiles.len()];
                    service.set_performance_profile(profile).expect("set profile should succeed");

                    let current = service.get_performance_profile().expect("get profile should succeed");
                    assert!(matches!(current.as_str(), "quality" | "balanced" | "speed"));
                }
            }));
        }

        for handle in handles {
            handle.join().expect("worker thread should not panic");
        }
    }

    #[test]
    fn advanced_config_roundtrip() {
        let service = MergeServiceState::new();
        let mut advanced = service.get_advanced_config().expect("read advanced config");
        advanced.jpeg_quality = 80;
        advanced.feather_sigma = 4.5;
        advanced.mask_threshold = None;
        advanced.output_file_name = "merged.jpg".to_string();

        service.set_advanced_config(advanced.clone()).expect("valid config should apply");
        assert_eq!(service.get_advanced_config().expect("read back"), advanced);
    }

    #[test]
    fn advanced_config_rejects_out_of_range_values() {
        let service = MergeServiceState::new();
        let base = service.get_advanced_config().expect("read advanced config");

        let cases: Vec<Box<dyn Fn(&mut MergeAdvancedConfig)>> = vec![
            Box::new(|c| c.jpeg_quality = 0),
            Box::new(|c| c.feather_sigma = -1.0),
            Box::new(|c| c.ransac_iterations = 0),
            Box::new(|c| c.ransac_threshold = 100.0),
            Box::new(|c| c.min_matches = 3),
            Box::new(|c| c.min_matches = c.max_matches + 1),
            Box::new(|c| c.output_file_name = "  ".to_string()),
            Box::new(|c| c.output_file_name = "../x.jpg".to_string()),
            Box::new(|c| c.output_file_name = "sub/out.jpg".to_string()),
            Box::new(|c| c.output_file_name = "..".to_string()),
        ];

        for mutate in cases {
            let mut candidate = base.clone();
            mutate(&mut candidate);
            let result = service.set_advanced_config(candidate);
            assert!(matches!(result, Err(MergeError::InvalidInput(_))));
        }
        assert_eq!(service.get_advanced_config().expect("unchanged"), base);
    }

    #[tokio::test]
    async fn async_merge_reports_invalid_mask() {
        let service = MergeServiceState::new();
        let result = service
            .merge(OwnedMergeRequest {
                base_path: "a.jpg".to_string(),
                add_path: "b.jpg".to_string(),
                project_dir: ".".to_string(),
                mask_data: vec![0; 5],
                mask_width: 2,
                mask_height: 2,
            })
            .await;
        assert!(matches!(result, Err(MergeError::InvalidInput(_))));
    }
}

//! # 合成模块（merge）
//!
//! ## 设计思路
//!
//! 该模块将“加载校验 → 解码 → 对齐 → 蒙版处理 → 混合 → 写盘”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `service`：承载可注入状态（`MergeServiceState`）与同步 / 异步入口
//! - `handler`：编排整条处理流水线
//! - `loader`：负责文件存在性、体积与格式签名校验
//! - `pipeline`：负责解码、像素限制与缩放
//! - `align` / `homography`：特征点匹配与单应矩阵估计
//! - `mask` / `blend`：蒙版二值化、投影、羽化与逐像素混合
//! - `writer`：JPEG 编码与原子写入
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 实现思路
//!
//! 对外仅暴露必要类型，内部细节保持 `mod` 私有。
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! bridge.rs / main.rs（参数适配）
//!    ↓
//! service.rs（状态注入、服务入口）
//!    ↓
//! handler.rs（统一编排 + 阶段耗时日志）
//!    ├─ storage.rs（输出目录可写性）
//!    ├─ loader.rs + pipeline.rs（加载 + 解码 + 像素限制）
//!    ├─ align.rs（FAST + BRIEF + RANSAC → Homography）
//!    ├─ mask.rs（放大 + 投影 + 羽化）
//!    ├─ blend.rs（fg·m + bg·(1−m)）
//!    └─ writer.rs（JPEG + rename）
//!    ↓
//! 返回 MergeResult / MergeError
//! ```

mod align;
mod blend;
mod config;
mod error;
mod handler;
mod homography;
mod loader;
mod mask;
mod pipeline;
mod service;
mod source;
mod writer;

pub use config::{MergeConfig, MergePerformanceProfile};
pub use error::MergeError;
pub use handler::MergeHandler;
pub use service::{MergeAdvancedConfig, MergeServiceState};
pub use source::{AlignmentReport, MaskBuffer, MergeRequest, MergeResult, OwnedMergeRequest};

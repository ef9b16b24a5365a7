//! # AddMe 合成 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │            宿主 App（相机 + 人像分割，产出蒙版）          │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ 方法通道 com.addme/processor（JSON）
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后端 (Rust)                           │
//! │                                                          │
//! │  ┌─ bridge ───── MethodCall → MethodResponse              │
//! │  │                                                       │
//! │  ├─ merge ────── 加载·解码·对齐·蒙版·混合·写盘            │
//! │  │   └─ MergeServiceState (可注入状态 + 阻塞线程池)       │
//! │  │                                                       │
//! │  ├─ storage        输出目录可写性校验 (返回 Result)       │
//! │  ├─ settings       settings.json → MergeConfig            │
//! │  └─ error ──────── AppError (统一错误类型)                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`merge`] | 两帧对齐与蒙版合成，输出 JPEG |
//! | [`bridge`] | 方法通道参数适配，错误码映射 |
//! | [`storage`] | project dir 存在性与可写性检查 |
//! | [`settings`] | 设置文件解析与参数覆盖 |
//! | [`error`] | 应用级错误类型 `AppError` |

pub mod bridge;
pub mod error;
pub mod merge;
pub mod settings;
pub mod storage;

use merge::{MaskBuffer, MergeError, MergeHandler, MergeRequest, MergeResult};

/// 使用默认配置执行一次合成。
///
/// 将 `add_path` 中蒙版覆盖的区域合成到 `base_path` 上，结果写入
/// `project_dir/out.jpg`。蒙版为 `mask_width * mask_height` 字节的单通道数据。
///
/// # 示例
/// ```rust,no_run
/// let mask = vec![255u8; 320 * 240];
/// let result = addme_merge::merge_add_me(
///     "/data/p1/a.jpg",
///     "/data/p1/b.jpg",
///     "/data/p1",
///     &mask,
///     320,
///     240,
/// )?;
/// assert!(result.output_path.ends_with("out.jpg"));
/// # Ok::<(), addme_merge::merge::MergeError>(())
/// ```
pub fn merge_add_me(
    base_path: &str,
    add_path: &str,
    project_dir: &str,
    mask_data: &[u8],
    mask_width: u32,
    mask_height: u32,
) -> Result<MergeResult, MergeError> {
    let request = MergeRequest {
        base_path,
        add_path,
        project_dir,
        mask: MaskBuffer::new(mask_data, mask_width, mask_height)?,
    };
    MergeHandler::new(Default::default()).merge(&request)
}

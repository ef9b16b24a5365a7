//! 输出目录（project dir）管理模块
//!
//! # 设计思路
//!
//! 合成结果写入调用方给定的 project dir。目录问题要在解码、对齐这些重活之前暴露，
//! 因此单独提供“存在 / 是目录 / 可写”三项检查。
//!
//! # 实现思路
//!
//! - 不存在时默认报错；`create_if_missing` 为真时先 `create_dir_all`。
//! - 可写性通过创建并删除一个随机命名的检查文件确认，不依赖平台权限位。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use std::fs;
use std::path::{Path, PathBuf};

use crate::merge::MergeError;

const WRITE_CHECK_PREFIX: &str = ".addme-write-check-";

/// 校验并返回可写的输出目录。
///
/// # 返回
/// - `Ok(PathBuf)` — 可写目录
/// - `Err(MergeError::Output)` — 不存在、不是目录或不可写
pub fn ensure_writable_dir(dir: &str, create_if_missing: bool) -> Result<PathBuf, MergeError> {
    if dir.trim().is_empty() {
        return Err(MergeError::InvalidInput("project dir 路径为空".to_string()));
    }

    let path = PathBuf::from(dir);
    if !path.exists() {
        if !create_if_missing {
            return Err(MergeError::Output(format!("输出目录不存在：{}", dir)));
        }
        fs::create_dir_all(&path)
            .map_err(|e| MergeError::Output(format!("创建输出目录 '{}' 失败: {}", dir, e)))?;
    }

    if !path.is_dir() {
        return Err(MergeError::Output(format!("输出路径不是目录：{}", dir)));
    }

    check_writable(&path)?;
    Ok(path)
}

fn check_writable(dir: &Path) -> Result<(), MergeError> {
    // 随机文件名，并发请求互不干扰；drop 时自动删除
    let marker = tempfile::Builder::new()
        .prefix(WRITE_CHECK_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| MergeError::Output(format!("输出目录不可写 '{}': {}", dir.display(), e)))?;

    if let Err(e) = marker.close() {
        log::warn!("清理写入检查文件失败 '{}': {}", dir.display(), e);
    }
    Ok(())
}

//! # 蒙版处理模块
//!
//! ## 设计思路
//!
//! 调用方传入的是人像分割结果（单通道字节），尺寸通常远小于照片。
//! 这里把它转换成“底图坐标系下的羽化权重图”，交给 `blend` 使用。
//!
//! ## 实现思路
//!
//! 1. 拷贝借用的字节为 `GrayImage`
//! 2. 按 `mask_threshold` 二值化（可选）
//! 3. 放大到叠加帧尺寸
//! 4. 用对齐变换投影到底图坐标，画面外权重为 0
//! 5. 高斯羽化边缘

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{Interpolation, warp_into};

use super::homography::Homography;
use super::pipeline::resize_luma;
use super::source::MaskBuffer;
use super::{MergeConfig, MergeError};

/// 将借用的蒙版字节转换为叠加帧尺寸的权重图。
pub(crate) fn prepare_overlay_mask(
    mask: &MaskBuffer<'_>,
    overlay_width: u32,
    overlay_height: u32,
    config: &MergeConfig,
) -> Result<GrayImage, MergeError> {
    let mut image = GrayImage::from_raw(mask.width(), mask.height(), mask.data().to_vec())
        .ok_or_else(|| MergeError::InvalidInput("蒙版缓冲长度异常".to_string()))?;

    if let Some(threshold) = config.mask_threshold {
        binarize(&mut image, threshold);
    }

    if image.dimensions() != (overlay_width, overlay_height) {
        log::debug!(
            "🧩 蒙版放大：{}x{} -> {}x{}",
            mask.width(),
            mask.height(),
            overlay_width,
            overlay_height
        );
    }

    Ok(resize_luma(&image, overlay_width, overlay_height, config.resize_filter))
}

/// 高于阈值取 255，否则取 0。
pub(crate) fn binarize(image: &mut GrayImage, threshold: u8) {
    for pixel in image.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > threshold { 255 } else { 0 };
    }
}

/// 将蒙版投影到底图坐标系。
pub(crate) fn warp_mask(
    mask: &GrayImage,
    homography: &Homography,
    width: u32,
    height: u32,
) -> Result<GrayImage, MergeError> {
    let projection = homography
        .to_projection()
        .ok_or_else(|| MergeError::AlignmentFailed("对齐变换不可逆".to_string()))?;
    let mut out = GrayImage::new(width, height);
    warp_into(mask, &projection, Interpolation::Bilinear, Luma([0]), &mut out);
    Ok(out)
}

/// 将叠加帧投影到底图坐标系。
pub(crate) fn warp_overlay(
    overlay: &RgbImage,
    homography: &Homography,
    width: u32,
    height: u32,
) -> Result<RgbImage, MergeError> {
    let projection = homography
        .to_projection()
        .ok_or_else(|| MergeError::AlignmentFailed("对齐变换不可逆".to_string()))?;
    let mut out = RgbImage::new(width, height);
    warp_into(overlay, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
    Ok(out)
}

/// 边缘羽化。`sigma` 非正数或 NaN 时原样返回。
pub(crate) fn feather(mask: GrayImage, sigma: f32) -> GrayImage {
    if sigma.is_nan() || sigma <= 0.0 {
        return mask;
    }
    gaussian_blur_f32(&mask, sigma)
}

/// 非零权重像素占比。
pub(crate) fn coverage(mask: &GrayImage) -> f64 {
    let total = mask.width() as u64 * mask.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let covered = mask.pixels().filter(|p| p.0[0] > 0).count() as u64;
    covered as f64 / total as f64
}

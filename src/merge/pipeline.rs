//! # 解码与缩放流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素上限 / 内存上限快速拒绝
//! 3. 完整解码并转换为 RGB8
//! 4. 缩放统一走 `fast_image_resize`，失败时回退 `image::imageops::resize`

use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{GenericImageView, GrayImage, ImageReader, RgbImage};
use std::io::Cursor;

use super::source::RawImageData;
use super::{MergeConfig, MergeError, MergeHandler};

impl MergeHandler {
    /// 将原始字节解码为 RGB8 图像。
    pub(crate) fn decode_rgb(
        &self,
        raw: RawImageData,
        config: &MergeConfig,
    ) -> Result<RgbImage, MergeError> {
        let (header_width, header_height) = Self::inspect_dimensions_from_memory(&raw.bytes)?;
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(config, header_width, header_height)?;

        let decoded = image::load_from_memory(&raw.bytes)
            .map_err(|e| MergeError::Decode(format!("{} 图片解码失败：{}", raw.source_hint, e)))?;

        let (width, height) = decoded.dimensions();
        Self::validate_pixel_limits(config, width, height)?;

        log::info!(
            "✅ 图片解码成功 - 来源: {} 尺寸: {}x{}",
            raw.source_hint,
            width,
            height
        );

        Ok(decoded.to_rgb8())
    }

    /// 仅通过内存中的图片头信息读取宽高。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), MergeError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| MergeError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| MergeError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_pixel_limits(config: &MergeConfig, width: u32, height: u32) -> Result<(), MergeError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| MergeError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels == 0 {
            return Err(MergeError::Decode("图片尺寸为 0".to_string()));
        }

        if pixels > config.max_decoded_pixels {
            return Err(MergeError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &MergeConfig,
        width: u32,
        height: u32,
    ) -> Result<(), MergeError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| MergeError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(MergeError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }
}

/// 将 RGB 图像缩放到目标尺寸。
pub(crate) fn resize_rgb(image: &RgbImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }

    let resized = resize_with_fast_image_resize(
        image.as_raw().clone(),
        image.dimensions(),
        (width, height),
        fr::PixelType::U8x3,
        filter,
    )
    .and_then(|bytes| {
        RgbImage::from_raw(width, height, bytes)
            .ok_or_else(|| MergeError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
    });

    match resized {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 缩放失败，回退 image::imageops::resize：{}", err);
            image::imageops::resize(image, width, height, filter)
        }
    }
}

/// 将单通道图像（蒙版 / 灰度工作图）缩放到目标尺寸。
pub(crate) fn resize_luma(image: &GrayImage, width: u32, height: u32, filter: FilterType) -> GrayImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }

    let resized = resize_with_fast_image_resize(
        image.as_raw().clone(),
        image.dimensions(),
        (width, height),
        fr::PixelType::U8,
        filter,
    )
    .and_then(|bytes| {
        GrayImage::from_raw(width, height, bytes)
            .ok_or_else(|| MergeError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
    });

    match resized {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 缩放失败，回退 image::imageops::resize：{}", err);
            image::imageops::resize(image, width, height, filter)
        }
    }
}

/// 计算把 `(width, height)` 限制到最长边 `max_dimension` 的缩放比例（不放大）。
pub(crate) fn fit_scale(width: u32, height: u32, max_dimension: u32) -> f64 {
    let longest = width.max(height).max(1) as f64;
    (max_dimension.max(1) as f64 / longest).min(1.0)
}

fn resize_with_fast_image_resize(
    bytes: Vec<u8>,
    (src_width, src_height): (u32, u32),
    (target_width, target_height): (u32, u32),
    pixel_type: fr::PixelType,
    filter: FilterType,
) -> Result<Vec<u8>, MergeError> {
    let src_image = fr::images::Image::from_vec_u8(src_width, src_height, bytes, pixel_type)
        .map_err(|e| MergeError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, pixel_type);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| MergeError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    Ok(dst_image.into_vec())
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

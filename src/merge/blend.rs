//! 按蒙版权重合成：`out = fg·m + bg·(1−m)`，`m = mask / 255`。

use image::{GrayImage, RgbImage};

use super::MergeError;

pub(crate) fn blend(
    background: &RgbImage,
    foreground: &RgbImage,
    mask: &GrayImage,
) -> Result<RgbImage, MergeError> {
    if background.dimensions() != foreground.dimensions()
        || background.dimensions() != mask.dimensions()
    {
        return Err(MergeError::InvalidInput(format!(
            "合成尺寸不一致：bg={:?} fg={:?} mask={:?}",
            background.dimensions(),
            foreground.dimensions(),
            mask.dimensions()
        )));
    }

    let mut out = background.clone();
    for ((dst, fg), weight) in out.pixels_mut().zip(foreground.pixels()).zip(mask.pixels()) {
        let m = weight.0[0] as f32 / 255.0;
        if m <= 0.0 {
            continue;
        }
        for (channel, fg_channel) in dst.0.iter_mut().zip(fg.0.iter()) {
            let value = *fg_channel as f32 * m + *channel as f32 * (1.0 - m);
            *channel = value.round().clamp(0.0, 255.0) as u8;
        }
    }

    Ok(out)
}

//! # 帧对齐模块
//!
//! ## 设计思路
//!
//! 两张照片由手持设备先后拍摄，机位会有轻微偏移。这里估计“叠加帧 → 底图”的
//! 投影变换，使新增人物落在底图的正确位置。
//!
//! ## 实现思路
//!
//! 1. 两帧降采样到 `align_max_dimension` 并转灰度
//! 2. FAST-9 角点 + 网格非极大值抑制，保留最强的 `max_features` 个
//! 3. 高斯平滑后计算 256 位 BRIEF 描述子（固定种子采样模式）
//! 4. 底图 → 叠加帧暴力汉明匹配，按距离取前 `max_matches`
//! 5. 固定种子 RANSAC + 内点最小二乘精化
//! 6. 将工作分辨率下的变换映射回原图坐标

use image::{GrayImage, RgbImage};
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

use super::homography::Homography;
use super::pipeline::{fit_scale, resize_luma};
use super::source::AlignmentReport;
use super::{MergeConfig, MergeError};

/// BRIEF 采样块半径（31x31 块）。
const PATCH_RADIUS: i32 = 15;
/// 角点离边界的最小距离。
const BORDER: u32 = PATCH_RADIUS as u32 + 1;
const DESCRIPTOR_BITS: usize = 256;
const PATTERN_SEED: u64 = 0x0b71_ef00;
/// 非极大值抑制网格边长（工作分辨率像素）。
const NMS_CELL: u32 = 8;
const BRIEF_SMOOTH_SIGMA: f32 = 2.0;

type Descriptor = [u64; DESCRIPTOR_BITS / 64];

#[derive(Debug, Clone, Copy)]
struct Keypoint {
    x: u32,
    y: u32,
    descriptor: Descriptor,
}

#[derive(Debug, Clone, Copy)]
struct Match {
    base: (f64, f64),
    add: (f64, f64),
    distance: u32,
}

/// 对齐结果：叠加帧原图坐标 → 底图原图坐标。
#[derive(Debug, Clone, Copy)]
pub(crate) struct Alignment {
    pub(crate) homography: Homography,
    pub(crate) report: AlignmentReport,
}

/// 估计叠加帧到底图的投影变换。
pub(crate) fn estimate_alignment(
    base: &RgbImage,
    add: &RgbImage,
    config: &MergeConfig,
) -> Result<Alignment, MergeError> {
    let base_scale = fit_scale(base.width(), base.height(), config.align_max_dimension);
    let add_scale = fit_scale(add.width(), add.height(), config.align_max_dimension);

    let base_gray = working_gray(base, base_scale, config);
    let add_gray = working_gray(add, add_scale, config);

    let base_keypoints = detect_and_describe(&base_gray, config);
    let add_keypoints = detect_and_describe(&add_gray, config);

    log::debug!(
        "🔍 特征点 - base={} add={}（工作尺寸 {}x{} / {}x{}）",
        base_keypoints.len(),
        add_keypoints.len(),
        base_gray.width(),
        base_gray.height(),
        add_gray.width(),
        add_gray.height()
    );

    if base_keypoints.is_empty() || add_keypoints.is_empty() {
        return Err(MergeError::LowTexture(
            "场景纹理不足，无法提取特征点，请在细节更丰富的场景拍摄".to_string(),
        ));
    }

    let matches = match_descriptors(&base_keypoints, &add_keypoints, config.max_matches);
    if matches.len() < config.min_matches.max(4) {
        return Err(MergeError::AlignmentFailed(format!(
            "匹配点不足：{}（至少 {}），请保持机位稳定",
            matches.len(),
            config.min_matches.max(4)
        )));
    }

    let threshold = config.ransac_threshold as f64 * base_scale;
    let (working, inliers) = ransac(&matches, threshold, config)?;

    let to_add_working = Homography::scale(add_scale, add_scale);
    let from_base_working = Homography::scale(1.0 / base_scale, 1.0 / base_scale);
    let homography = from_base_working
        .then_after(&working)
        .then_after(&to_add_working);

    let report = AlignmentReport {
        applied: true,
        confidence: inliers as f64 / matches.len() as f64,
        match_count: matches.len(),
        inlier_count: inliers,
    };

    log::info!(
        "🎯 对齐完成 - matches={} inliers={} confidence={:.2}",
        report.match_count,
        report.inlier_count,
        report.confidence
    );

    Ok(Alignment { homography, report })
}

fn working_gray(image: &RgbImage, scale: f64, config: &MergeConfig) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    if scale >= 1.0 {
        return gray;
    }
    let width = ((image.width() as f64 * scale).round() as u32).max(1);
    let height = ((image.height() as f64 * scale).round() as u32).max(1);
    resize_luma(&gray, width, height, config.resize_filter)
}

fn detect_and_describe(gray: &GrayImage, config: &MergeConfig) -> Vec<Keypoint> {
    let (width, height) = gray.dimensions();
    if width <= BORDER * 2 || height <= BORDER * 2 {
        return Vec::new();
    }

    let mut corners: Vec<_> = corners_fast9(gray, config.fast_threshold)
        .into_iter()
        .filter(|c| c.x >= BORDER && c.y >= BORDER && c.x < width - BORDER && c.y < height - BORDER)
        .collect();
    corners.sort_by(|a, b| b.score.total_cmp(&a.score));

    let cells_x = width.div_ceil(NMS_CELL) as usize;
    let cells_y = height.div_ceil(NMS_CELL) as usize;
    let mut occupied = vec![false; cells_x * cells_y];

    let smoothed = gaussian_blur_f32(gray, BRIEF_SMOOTH_SIGMA);
    let pattern = brief_pattern();

    let mut keypoints = Vec::with_capacity(config.max_features.min(corners.len()));
    for corner in corners {
        if keypoints.len() >= config.max_features {
            break;
        }
        let cell = (corner.y / NMS_CELL) as usize * cells_x + (corner.x / NMS_CELL) as usize;
        if occupied[cell] {
            continue;
        }
        occupied[cell] = true;

        keypoints.push(Keypoint {
            x: corner.x,
            y: corner.y,
            descriptor: describe(&smoothed, corner.x, corner.y, &pattern),
        });
    }

    keypoints
}

/// 256 组点对偏移，固定种子生成，保证两帧使用同一模式。
fn brief_pattern() -> Vec<[(i32, i32); 2]> {
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    let mut offset = || {
        (
            rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
            rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
        )
    };
    (0..DESCRIPTOR_BITS).map(|_| [offset(), offset()]).collect()
}

fn describe(smoothed: &GrayImage, x: u32, y: u32, pattern: &[[(i32, i32); 2]]) -> Descriptor {
    let intensity = |(dx, dy): (i32, i32)| {
        let px = (x as i32 + dx) as u32;
        let py = (y as i32 + dy) as u32;
        smoothed.get_pixel(px, py).0[0]
    };

    let mut descriptor = [0u64; DESCRIPTOR_BITS / 64];
    for (bit, [p, q]) in pattern.iter().enumerate() {
        if intensity(*p) < intensity(*q) {
            descriptor[bit / 64] |= 1 << (bit % 64);
        }
    }
    descriptor
}

fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

fn match_descriptors(base: &[Keypoint], add: &[Keypoint], max_matches: usize) -> Vec<Match> {
    let mut matches: Vec<Match> = base
        .iter()
        .filter_map(|query| {
            add.iter()
                .map(|train| (hamming(&query.descriptor, &train.descriptor), train))
                .min_by_key(|(distance, _)| *distance)
                .map(|(distance, train)| Match {
                    base: (query.x as f64, query.y as f64),
                    add: (train.x as f64, train.y as f64),
                    distance,
                })
        })
        .collect();

    matches.sort_by_key(|m| m.distance);
    matches.truncate(max_matches);
    matches
}

/// 返回工作分辨率下的变换（叠加帧 → 底图）与内点数量。
fn ransac(
    matches: &[Match],
    threshold: f64,
    config: &MergeConfig,
) -> Result<(Homography, usize), MergeError> {
    let threshold_sq = threshold.max(0.5).powi(2);
    let mut rng = StdRng::seed_from_u64(config.ransac_seed);

    let count_inliers = |h: &Homography| {
        matches
            .iter()
            .filter(|m| h.reprojection_error_sq(m.add, m.base) <= threshold_sq)
            .count()
    };

    let mut best: Option<(Homography, usize)> = None;
    for _ in 0..config.ransac_iterations.max(1) {
        let picked = sample(&mut rng, matches.len(), 4);
        let src = [0, 1, 2, 3].map(|i| matches[picked.index(i)].add);
        let dst = [0, 1, 2, 3].map(|i| matches[picked.index(i)].base);

        let Some(candidate) = Homography::from_four_points(&src, &dst) else {
            continue;
        };

        let inliers = count_inliers(&candidate);
        if best.as_ref().is_none_or(|(_, n)| inliers > *n) {
            best = Some((candidate, inliers));
            if inliers == matches.len() {
                break;
            }
        }
    }

    let (initial, initial_inliers) = best.ok_or_else(|| {
        MergeError::AlignmentFailed("无法从匹配点估计变换，请保持机位稳定".to_string())
    })?;

    if initial_inliers < 4 {
        return Err(MergeError::AlignmentFailed(format!(
            "一致匹配点过少：{}",
            initial_inliers
        )));
    }

    let inlier_pairs: Vec<_> = matches
        .iter()
        .filter(|m| initial.reprojection_error_sq(m.add, m.base) <= threshold_sq)
        .map(|m| (m.add, m.base))
        .collect();

    match Homography::least_squares(&inlier_pairs) {
        Some(refined) => {
            let refined_inliers = count_inliers(&refined);
            if refined_inliers >= initial_inliers {
                Ok((refined, refined_inliers))
            } else {
                Ok((initial, initial_inliers))
            }
        }
        None => Ok((initial, initial_inliers)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// 确定性伪随机块纹理，角点丰富且无重复模式。
    fn textured_scene(width: u32, height: u32) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(7);
        let blocks: Vec<u8> = (0..((width / 6 + 2) * (height / 6 + 2)))
            .map(|_| rng.gen_range(0..=255))
            .collect();
        let stride = width / 6 + 2;
        RgbImage::from_fn(width, height, |x, y| {
            let v = blocks[((y / 6) * stride + x / 6) as usize];
            Rgb([v, v, v])
        })
    }

    /// 将场景平移 `(dx, dy)` 后裁剪为同尺寸帧。
    fn shifted(scene: &RgbImage, dx: u32, dy: u32, width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| *scene.get_pixel(x + dx, y + dy))
    }

    #[test]
    fn flat_frames_report_low_texture() {
        let flat = RgbImage::from_pixel(200, 150, Rgb([128, 128, 128]));
        let result = estimate_alignment(&flat, &flat, &MergeConfig::default());
        assert!(matches!(result, Err(MergeError::LowTexture(_))));
    }

    #[test]
    fn ransac_recovers_known_translation() {
        let scene = textured_scene(360, 300);
        let base = shifted(&scene, 20, 20, 300, 240);
        let add = shifted(&scene, 28, 15, 300, 240);

        let alignment =
            estimate_alignment(&base, &add, &MergeConfig::default()).expect("alignment should succeed");

        // add(x, y) 对应场景 (x+28, y+15)，即 base(x+8, y-5)
        let (x, y) = alignment
            .homography
            .apply((150.0, 120.0))
            .expect("finite projection");
        assert!((x - 158.0).abs() < 1.5, "x = {x}");
        assert!((y - 115.0).abs() < 1.5, "y = {y}");
        assert!(alignment.report.applied);
        assert!(alignment.report.confidence > 0.5);
    }

    #[test]
    fn hamming_counts_bit_differences() {
        let a = [0u64, u64::MAX, 0b1011, 0];
        let b = [0u64, 0, 0b0001, 0];
        assert_eq!(hamming(&a, &b), 64 + 2);
    }

    #[test]
    fn brief_pattern_is_deterministic_and_in_patch() {
        let first = brief_pattern();
        assert_eq!(first, brief_pattern());
        assert!(first
            .iter()
            .flatten()
            .all(|(dx, dy)| dx.abs() <= PATCH_RADIUS && dy.abs() <= PATCH_RADIUS));
    }
}

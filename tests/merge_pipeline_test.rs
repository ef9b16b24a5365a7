// 端到端合成测试：真实文件 → merge_add_me / MergeHandler → out.jpg

use std::fs;
use std::path::{Path, PathBuf};

use addme_merge::merge::{MaskBuffer, MergeConfig, MergeError, MergeHandler, MergeRequest};
use addme_merge::merge_add_me;
use image::{GenericImageView, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn textured_scene(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let stride = width / 6 + 2;
    let blocks: Vec<u8> = (0..(stride * (height / 6 + 2)))
        .map(|_| rng.gen_range(0..=255))
        .collect();
    RgbImage::from_fn(width, height, |x, y| {
        let v = blocks[((y / 6) * stride + x / 6) as usize];
        Rgb([v, v / 2, 255 - v])
    })
}

fn save(dir: &Path, name: &str, image: &RgbImage) -> String {
    let path = dir.join(name);
    image.save(&path).expect("save fixture");
    path.to_string_lossy().to_string()
}

fn dir_str(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

fn unaligned_handler() -> MergeHandler {
    let mut config = MergeConfig::default();
    config.align_frames = false;
    MergeHandler::new(config)
}

#[test]
fn aligned_merge_writes_jpeg_at_base_dimensions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scene = textured_scene(200, 160, 11);
    let base = save(dir.path(), "a.png", &scene);
    let add = save(dir.path(), "b.png", &scene);
    let mask = vec![255u8; 50 * 40];

    let result = merge_add_me(&base, &add, dir_str(dir.path()), &mask, 50, 40).expect("merge should succeed");

    assert_eq!(result.output_path, dir.path().join("out.jpg"));
    assert!(result.alignment_applied);
    assert!(result.alignment_confidence > 0.5, "confidence = {}", result.alignment_confidence);
    assert!(result.inlier_count >= 10);
    let decoded = image::open(&result.output_path).expect("output should decode");
    assert_eq!(decoded.dimensions(), (200, 160));
}

#[test]
fn repeated_merges_overwrite_the_same_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = save(dir.path(), "a.png", &RgbImage::from_pixel(48, 32, Rgb([20, 20, 20])));
    let add = save(dir.path(), "b.png", &RgbImage::from_pixel(48, 32, Rgb([220, 220, 220])));
    let mask = vec![255u8; 12 * 8];
    let handler = unaligned_handler();
    let request = MergeRequest {
        base_path: &base,
        add_path: &add,
        project_dir: dir_str(dir.path()),
        mask: MaskBuffer::new(&mask, 12, 8).expect("valid mask"),
    };

    let first = handler.merge(&request).expect("first merge");
    let second = handler.merge(&request).expect("second merge");

    assert_eq!(first.output_path, second.output_path);
    let jpegs: Vec<PathBuf> = fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "jpg"))
        .collect();
    assert_eq!(jpegs, vec![dir.path().join("out.jpg")]);
}

#[test]
fn concurrent_merges_into_one_project_dir_all_succeed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = save(dir.path(), "a.png", &RgbImage::from_pixel(320, 240, Rgb([40, 40, 40])));
    let add = save(dir.path(), "b.png", &RgbImage::from_pixel(320, 240, Rgb([200, 200, 200])));
    let mask = vec![255u8; 32 * 24];
    let handler = unaligned_handler();
    let request = MergeRequest {
        base_path: &base,
        add_path: &add,
        project_dir: dir_str(dir.path()),
        mask: MaskBuffer::new(&mask, 32, 24).expect("valid mask"),
    };

    for _ in 0..5 {
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| handler.merge(&request))).collect();
            for handle in handles {
                let result = handle.join().expect("merge thread should not panic");
                assert!(result.is_ok(), "{:?}", result.err());
            }
        });
    }

    let decoded = image::open(dir.path().join("out.jpg")).expect("output should decode");
    assert_eq!(decoded.dimensions(), (320, 240));
    let leftovers = fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn zero_mask_reproduces_base() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base_image = RgbImage::from_pixel(40, 40, Rgb([30, 160, 90]));
    let base = save(dir.path(), "a.png", &base_image);
    let add = save(dir.path(), "b.png", &RgbImage::from_pixel(40, 40, Rgb([250, 0, 250])));
    let mask = vec![0u8; 10 * 10];

    let result = unaligned_handler()
        .merge(&MergeRequest {
            base_path: &base,
            add_path: &add,
            project_dir: dir_str(dir.path()),
            mask: MaskBuffer::new(&mask, 10, 10).expect("valid mask"),
        })
        .expect("merge should succeed");

    assert_eq!(result.mask_coverage, 0.0);
    let out = image::open(&result.output_path).expect("decode").to_rgb8();
    for pixel in out.pixels() {
        for (actual, expected) in pixel.0.iter().zip([30u8, 160, 90]) {
            assert!(actual.abs_diff(expected) <= 4, "{:?}", pixel);
        }
    }
}

#[test]
fn missing_sources_fail_without_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let existing = save(dir.path(), "a.png", &RgbImage::new(16, 16));
    let missing = dir.path().join("nope.jpg").to_string_lossy().to_string();
    let mask = vec![255u8; 4];

    for (base, add) in [(&missing, &existing), (&existing, &missing)] {
        let result = merge_add_me(base, add, dir_str(dir.path()), &mask, 2, 2);
        assert!(matches!(result, Err(MergeError::FileSystem(_))));
    }
    assert!(!dir.path().join("out.jpg").exists());
}

#[test]
fn missing_project_dir_is_output_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = save(dir.path(), "a.png", &RgbImage::new(16, 16));
    let project = dir.path().join("project-missing");
    let mask = vec![255u8; 4];

    let result = merge_add_me(&base, &base, dir_str(&project), &mask, 2, 2);
    assert!(matches!(result, Err(MergeError::Output(_))));
    assert!(!project.exists());
}

#[cfg(unix)]
#[test]
fn read_only_project_dir_is_output_error() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let base = save(dir.path(), "a.png", &RgbImage::new(16, 16));
    let project = dir.path().join("ro");
    fs::create_dir(&project).expect("create project dir");
    fs::set_permissions(&project, fs::Permissions::from_mode(0o555)).expect("chmod");

    // root 不受权限位限制，此时写入会成功，跳过断言
    let writable = fs::write(project.join(".write-check"), b"x").is_ok();
    if !writable {
        let mask = vec![255u8; 4];
        let result = merge_add_me(&base, &base, dir_str(&project), &mask, 2, 2);
        assert!(matches!(result, Err(MergeError::Output(_))));
        assert!(!project.join("out.jpg").exists());
    }

    fs::set_permissions(&project, fs::Permissions::from_mode(0o755)).expect("restore permissions");
}

#[test]
fn non_image_source_is_invalid_format() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = dir.path().join("a.jpg");
    fs::write(&fake, b"definitely not an image").expect("write");
    let fake = fake.to_string_lossy().to_string();
    let mask = vec![255u8; 4];

    let result = merge_add_me(&fake, &fake, dir_str(dir.path()), &mask, 2, 2);
    assert!(matches!(result, Err(MergeError::InvalidFormat(_))));
}

proptest::proptest! {
    #[test]
    fn mask_length_must_match_dimensions(width in 1u32..64, height in 1u32..64, len in 0usize..5000) {
        let data = vec![0u8; len];
        let result = MaskBuffer::new(&data, width, height);
        proptest::prop_assert_eq!(result.is_ok(), len == (width * height) as usize);
    }
}

//! # 输出写入模块
//!
//! ## 设计思路
//!
//! 合成结果编码为 JPEG 后写入 project dir。先写同目录临时文件再 `persist`（rename），
//! 调用方读到的 `outputPath` 要么是旧文件，要么是完整的新文件。
//! 临时文件名由 `tempfile` 随机生成，同一目录下的并发合成互不覆盖。

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use super::{MergeConfig, MergeError};

/// 编码并写入输出文件，返回最终路径。
pub(crate) fn write_output(
    image: &RgbImage,
    project_dir: &Path,
    config: &MergeConfig,
) -> Result<PathBuf, MergeError> {
    let file_name = validated_file_name(&config.output_file_name)?;
    let bytes = encode_jpeg(image, config.jpeg_quality)?;

    let final_path = project_dir.join(file_name);
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".part")
        .tempfile_in(project_dir)
        .map_err(|e| MergeError::Output(format!("创建临时文件失败：{}", e)))?;

    temp.write_all(&bytes)
        .map_err(|e| MergeError::Output(format!("写入临时文件失败：{}", e)))?;

    temp.persist(&final_path).map_err(|e| {
        MergeError::Output(format!(
            "重命名输出文件失败 '{}'：{}",
            final_path.display(),
            e.error
        ))
    })?;

    log::info!(
        "💾 已写入合成结果 - {}（{} KB, quality={}）",
        final_path.display(),
        bytes.len() / 1024,
        config.jpeg_quality
    );

    Ok(final_path)
}

pub(crate) fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, MergeError> {
    let mut cursor = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| MergeError::Encode(format!("JPEG 编码失败：{}", e)))?;
    Ok(cursor.into_inner())
}

/// 输出文件名只允许单级文件名，禁止路径分隔符与 `..`。
pub(crate) fn validated_file_name(name: &str) -> Result<&str, MergeError> {
    let trimmed = name.trim();
    let is_plain = !trimmed.is_empty()
        && trimmed != "."
        && trimmed != ".."
        && !trimmed.contains(['/', '\\']);

    if !is_plain {
        return Err(MergeError::InvalidInput(format!("非法输出文件名：{:?}", name)));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn writes_decodable_jpeg_and_cleans_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = RgbImage::from_pixel(64, 48, Rgb([120, 60, 30]));

        let path = write_output(&image, dir.path(), &MergeConfig::default()).expect("write should succeed");

        assert_eq!(path, dir.path().join("out.jpg"));
        let decoded = image::open(&path).expect("output should decode");
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok().map(|e| e.file_name()))
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("out.jpg")]);
    }

    #[test]
    fn concurrent_writes_into_one_dir_all_succeed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = MergeConfig::default();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8u8)
                .map(|i| {
                    let config = &config;
                    let dir = dir.path();
                    scope.spawn(move || {
                        let image = RgbImage::from_pixel(64, 48, Rgb([i * 20, 0, 0]));
                        write_output(&image, dir, config)
                    })
                })
                .collect();

            for handle in handles {
                let result = handle.join().expect("writer thread should not panic");
                assert!(result.is_ok(), "{:?}", result.err());
            }
        });

        let decoded = image::open(dir.path().join("out.jpg")).expect("output should decode");
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn overwrites_previous_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = MergeConfig::default();

        write_output(&RgbImage::new(8, 8), dir.path(), &config).expect("first write");
        let path = write_output(&RgbImage::new(16, 4), dir.path(), &config).expect("second write");

        let decoded = image::open(&path).expect("output should decode");
        assert_eq!((decoded.width(), decoded.height()), (16, 4));
    }

    #[test]
    fn rejects_path_like_file_names() {
        for name in ["", "..", "../escape.jpg", "sub/out.jpg"] {
            assert!(matches!(validated_file_name(name), Err(MergeError::InvalidInput(_))), "{name}");
        }
        assert_eq!(validated_file_name(" merged.jpg ").expect("plain name"), "merged.jpg");
    }

    #[test]
    fn missing_directory_is_output_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("gone");
        let result = write_output(&RgbImage::new(4, 4), &missing, &MergeConfig::default());
        assert!(matches!(result, Err(MergeError::Output(_))));
    }
}

//! 图像处理模块

pub mod compression;
pub mod palette;
pub mod pixel;

pub use palette::BumpPalette;
pub use pixel::Pixel;

use crate::error::{BitmapError, Result};
use std::path::{Path, PathBuf};

/// 按优先级探测的源图片扩展名
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["tif", "tiff", "png", "tga", "bmp"];

/// 在数据目录下查找标签对应的源图片
///
/// 按 [`SUPPORTED_EXTENSIONS`] 的顺序逐个探测，第一个存在的文件胜出。
pub fn find_source_image(data_dir: &Path, tag_path: &str) -> Result<PathBuf> {
    let base = data_dir.join(tag_path);

    for extension in SUPPORTED_EXTENSIONS {
        let candidate = base.with_extension(extension);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(BitmapError::InputNotFound(tag_path.to_string()))
}

/// 解码源图片为自上而下的 RGBA 像素（直通透明度）
pub fn load_source_image(path: &Path) -> Result<(Vec<Pixel>, u32, u32)> {
    tracing::debug!("解码源图片: {:?}", path);

    let decoded = image::open(path)?.to_rgba8();
    let (width, height) = decoded.dimensions();

    let mut pixels = Vec::with_capacity((width * height) as usize);
    for pixel in decoded.pixels() {
        let [r, g, b, a] = pixel.0;
        pixels.push(Pixel::new(a, r, g, b));
    }

    Ok((pixels, width, height))
}

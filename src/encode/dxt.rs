//! DXT 块压缩（委托给 texpresso 的块编码器）

use crate::error::{BitmapError, Result};
use crate::image::Pixel;
use crate::tag::PixelFormat;
use texpresso::{Algorithm, Format, Params};

/// DXT 格式对应的块编码器
fn block_format(format: PixelFormat) -> Option<Format> {
    match format {
        PixelFormat::Dxt1 => Some(Format::Bc1),
        PixelFormat::Dxt3 => Some(Format::Bc2),
        PixelFormat::Dxt5 => Some(Format::Bc3),
        _ => None,
    }
}

/// 一个 DXT 级别的输出字节数（不足 4 的边按 4 计）
pub fn dxt_level_size(format: PixelFormat, width: u32, height: u32) -> usize {
    let container_width = width.max(4) as usize;
    let container_height = height.max(4) as usize;
    container_width * container_height * format.bits_per_pixel() as usize / 8
}

/// 把一层像素编码为 DXT 块
///
/// 不足 4x4 的级别先做边缘延展填充到容器尺寸，块按行优先排列。
pub fn encode_dxt(pixels: &[Pixel], width: u32, height: u32, format: PixelFormat) -> Result<Vec<u8>> {
    let codec = block_format(format)
        .ok_or_else(|| BitmapError::UnsupportedFormat(format!("{format:?} 不是 DXT 格式")))?;

    let container_width = width.max(4);
    let container_height = height.max(4);

    let mut rgba = Vec::with_capacity((container_width * container_height * 4) as usize);
    for y in 0..container_height {
        for x in 0..container_width {
            let p = pixels[(y.min(height - 1) * width + x.min(width - 1)) as usize];
            rgba.extend_from_slice(&[p.r, p.g, p.b, p.a]);
        }
    }

    let params = Params {
        algorithm: Algorithm::IterativeClusterFit,
        ..Params::default()
    };

    let mut output = vec![0u8; dxt_level_size(format, width, height)];
    codec.compress(
        &rgba,
        container_width as usize,
        container_height as usize,
        params,
        &mut output,
    );

    Ok(output)
}

//! 像素格式的选择与编码

pub mod dxt;

use crate::error::{BitmapError, Result};
use crate::image::pixel::is_power_of_two;
use crate::image::{BumpPalette, Pixel};
use crate::plate::{ScannedBitmap, ScannedColorPlate};
use crate::tag::{
    BitmapData, BitmapDataType, BitmapFormat, BitmapType, BitmapUsage, PixelFormat,
    DATA_FLAG_COMPRESSED, DATA_FLAG_PALETTIZED, DATA_FLAG_POWER_OF_TWO,
};
use byteorder::{LittleEndian, WriteBytesExt};

/// 位图透明度的三种特征
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaPresence {
    /// 所有像素都完全不透明
    None,
    /// 只出现 0 和 255（至少一个 0）
    OneBit,
    /// 出现中间值
    MultiBit,
}

/// 对整个位图（含 mipmap）做一遍像素特征分析
#[derive(Debug, Clone, Copy)]
pub struct PixelAnalysis {
    pub alpha: AlphaPresence,
    /// 所有像素 R==G==B
    pub monochrome: bool,
    /// 所有像素的透明度等于亮度
    pub alpha_equals_luminance: bool,
    /// 所有像素 RGB 全黑
    pub all_black: bool,
}

/// 分析像素特征
pub fn analyze_pixels(pixels: &[Pixel]) -> PixelAnalysis {
    let mut alpha = AlphaPresence::None;
    let mut monochrome = true;
    let mut alpha_equals_luminance = true;
    let mut all_black = true;

    for pixel in pixels {
        if pixel.a != 0 && pixel.a != 255 {
            alpha = AlphaPresence::MultiBit;
        } else if pixel.a == 0 && alpha == AlphaPresence::None {
            alpha = AlphaPresence::OneBit;
        }

        if pixel.r != pixel.g || pixel.g != pixel.b {
            monochrome = false;
        }
        if pixel.luminance() != pixel.a {
            alpha_equals_luminance = false;
        }
        if pixel.r != 0 || pixel.g != 0 || pixel.b != 0 {
            all_black = false;
        }
    }

    PixelAnalysis {
        alpha,
        monochrome,
        alpha_equals_luminance,
        all_black,
    }
}

/// 为一个位图选择输出格式
///
/// category 为 None 时自动选择最优无损格式；显式类别按位图的透明度
/// 特征收窄成具体格式。DXT 只在第 0 级两边都 ≥4 且是 4 的倍数时保
/// 留，否则降级为 A8R8G8B8。
pub fn select_format(
    bitmap: &ScannedBitmap,
    category: Option<BitmapFormat>,
    bitmap_type: BitmapType,
    usage: BitmapUsage,
    palettize: bool,
) -> PixelFormat {
    let analysis = analyze_pixels(&bitmap.pixels);
    let has_alpha = analysis.alpha != AlphaPresence::None;

    let chosen = match category {
        Some(BitmapFormat::Dxt1) => PixelFormat::Dxt1,
        Some(BitmapFormat::Dxt3) => {
            if has_alpha {
                PixelFormat::Dxt3
            } else {
                PixelFormat::Dxt1
            }
        }
        Some(BitmapFormat::Dxt5) => {
            if has_alpha {
                PixelFormat::Dxt5
            } else {
                PixelFormat::Dxt1
            }
        }
        Some(BitmapFormat::Sixteen) => match analysis.alpha {
            AlphaPresence::MultiBit => PixelFormat::A4R4G4B4,
            AlphaPresence::OneBit => PixelFormat::A1R5G5B5,
            AlphaPresence::None => PixelFormat::R5G6B5,
        },
        Some(BitmapFormat::ThirtyTwo) => {
            if has_alpha {
                PixelFormat::A8R8G8B8
            } else {
                PixelFormat::X8R8G8B8
            }
        }
        Some(BitmapFormat::Monochrome) => {
            if analysis.alpha == AlphaPresence::None {
                PixelFormat::Y8
            } else if analysis.all_black {
                PixelFormat::A8
            } else if analysis.alpha_equals_luminance {
                PixelFormat::Ay8
            } else {
                PixelFormat::A8Y8
            }
        }
        None => auto_select(&analysis, bitmap_type, usage, palettize),
    };

    if chosen.is_dxt() && !dxt_dimensions_ok(bitmap.width, bitmap.height) {
        tracing::warn!(
            "{}x{} 的位图不满足 DXT 的尺寸要求，降级为 A8R8G8B8",
            bitmap.width,
            bitmap.height
        );
        return PixelFormat::A8R8G8B8;
    }

    chosen
}

/// 自动格式选择表
fn auto_select(
    analysis: &PixelAnalysis,
    bitmap_type: BitmapType,
    usage: BitmapUsage,
    palettize: bool,
) -> PixelFormat {
    if usage == BitmapUsage::HeightMap {
        return if palettize {
            PixelFormat::P8Bump
        } else {
            // 未调色板化的法线图保留完整精度
            PixelFormat::A8R8G8B8
        };
    }

    if analysis.monochrome {
        return match analysis.alpha {
            AlphaPresence::None => PixelFormat::Y8,
            _ => {
                if analysis.alpha_equals_luminance {
                    PixelFormat::Ay8
                } else {
                    PixelFormat::A8Y8
                }
            }
        };
    }

    match analysis.alpha {
        AlphaPresence::MultiBit => {
            if matches!(bitmap_type, BitmapType::Sprites | BitmapType::Interface) {
                PixelFormat::Dxt3
            } else {
                PixelFormat::A8R8G8B8
            }
        }
        AlphaPresence::OneBit | AlphaPresence::None => PixelFormat::Dxt1,
    }
}

/// DXT 要求第 0 级两边都 ≥4 且是 4 的倍数
fn dxt_dimensions_ok(width: u32, height: u32) -> bool {
    width >= 4 && height >= 4 && width % 4 == 0 && height % 4 == 0
}

/// 一个级别（单切片）的输出字节数
pub fn bitmap_data_size(format: PixelFormat, width: u32, height: u32) -> usize {
    if format.is_dxt() {
        dxt::dxt_level_size(format, width, height)
    } else {
        (width * height) as usize * format.bits_per_pixel() as usize / 8
    }
}

/// 标准 4x4 Bayer 抖动矩阵
const BAYER_4X4: [[i32; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

/// 按通道位宽做有序抖动
fn dither_channel(value: u8, bits: u32, x: u32, y: u32) -> u8 {
    if bits == 0 || bits >= 8 {
        return value;
    }
    let step = 255.0 / ((1u32 << bits) - 1) as f32;
    let threshold = (BAYER_4X4[(y % 4) as usize][(x % 4) as usize] as f32 + 0.5) / 16.0 - 0.5;
    (value as f32 + step * threshold).round().clamp(0.0, 255.0) as u8
}

/// 把一层（单切片）像素编码为目标格式
pub fn encode_level(
    pixels: &[Pixel],
    width: u32,
    height: u32,
    format: PixelFormat,
    dithering: bool,
    palette: Option<&BumpPalette>,
    output: &mut Vec<u8>,
) -> Result<()> {
    match format {
        PixelFormat::A8R8G8B8 => {
            for p in pixels {
                output.extend_from_slice(&[p.b, p.g, p.r, p.a]);
            }
        }
        PixelFormat::X8R8G8B8 => {
            for p in pixels {
                output.extend_from_slice(&[p.b, p.g, p.r, 0xFF]);
            }
        }
        PixelFormat::R5G6B5 | PixelFormat::A1R5G5B5 | PixelFormat::A4R4G4B4 => {
            let (a_bits, r_bits, g_bits, b_bits) = match format {
                PixelFormat::R5G6B5 => (0, 5, 6, 5),
                PixelFormat::A1R5G5B5 => (1, 5, 5, 5),
                _ => (4, 4, 4, 4),
            };

            for (index, p) in pixels.iter().enumerate() {
                let packed = if dithering {
                    let x = index as u32 % width;
                    let y = index as u32 / width;
                    Pixel {
                        b: dither_channel(p.b, b_bits, x, y),
                        g: dither_channel(p.g, g_bits, x, y),
                        r: dither_channel(p.r, r_bits, x, y),
                        a: dither_channel(p.a, a_bits, x, y),
                    }
                    .pack_16bit(a_bits, r_bits, g_bits, b_bits)
                } else {
                    p.pack_16bit(a_bits, r_bits, g_bits, b_bits)
                };
                output.write_u16::<LittleEndian>(packed)?;
            }
        }
        PixelFormat::A8 => {
            for p in pixels {
                output.push(p.to_a8());
            }
        }
        PixelFormat::Y8 => {
            for p in pixels {
                output.push(p.to_y8());
            }
        }
        PixelFormat::Ay8 => {
            for p in pixels {
                output.push(p.to_ay8());
            }
        }
        PixelFormat::A8Y8 => {
            for p in pixels {
                output.write_u16::<LittleEndian>(p.to_a8y8())?;
            }
        }
        PixelFormat::P8Bump => {
            let palette = palette
                .ok_or_else(|| BitmapError::UnsupportedFormat("P8 需要凹凸调色板".to_string()))?;
            for p in pixels {
                output.push(palette.find_closest(*p));
            }
        }
        PixelFormat::Dxt1 | PixelFormat::Dxt3 | PixelFormat::Dxt5 => {
            let encoded = dxt::encode_dxt(pixels, width, height, format)?;
            output.extend_from_slice(&encoded);
        }
    }

    Ok(())
}

/// 把处理完的色板编码进像素数据块，并产出每个位图的元数据记录
///
/// 每个位图独立选择格式；级别内逐切片（面/深度）编码，偏移严格递增，
/// 数据块不含任何额外填充（DXT 的块填充除外）。
pub fn write_bitmap_data(
    plate: &ScannedColorPlate,
    pixel_data: &mut Vec<u8>,
    bitmap_data: &mut Vec<BitmapData>,
    usage: BitmapUsage,
    category: Option<BitmapFormat>,
    bitmap_type: BitmapType,
    palettize: bool,
    dithering: bool,
) -> Result<()> {
    let bump_palette = BumpPalette::new();

    for (bitmap_index, bitmap) in plate.bitmaps.iter().enumerate() {
        let format = select_format(bitmap, category, bitmap_type, usage, palettize);

        let mut flags = 0u16;
        if is_power_of_two(bitmap.width) && is_power_of_two(bitmap.height) {
            flags |= DATA_FLAG_POWER_OF_TWO;
        }
        if format.is_dxt() {
            flags |= DATA_FLAG_COMPRESSED;
        }
        if format == PixelFormat::P8Bump {
            flags |= DATA_FLAG_PALETTIZED;
        }

        let data_type = match bitmap_type {
            BitmapType::CubeMap => BitmapDataType::CubeMap,
            BitmapType::ThreeDimensional => BitmapDataType::ThreeDimensional,
            _ => BitmapDataType::TwoDimensional,
        };

        let offset = pixel_data.len() as u32;
        for level in 0..=bitmap.mipmap_count {
            let (level_width, level_height) = bitmap.level_dimensions(level);
            let level_pixels = bitmap.level_pixels(level);
            let slice_size = (level_width * level_height) as usize;

            for slice in level_pixels.chunks(slice_size) {
                encode_level(
                    slice,
                    level_width,
                    level_height,
                    format,
                    dithering,
                    Some(&bump_palette),
                    pixel_data,
                )?;
            }
        }

        bitmap_data.push(BitmapData {
            width: bitmap.width as u16,
            height: bitmap.height as u16,
            depth: bitmap.depth as u16,
            data_type,
            format,
            flags,
            registration_point: (
                bitmap.registration_point.0.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
                bitmap.registration_point.1.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            ),
            mipmap_count: bitmap.mipmap_count as u16,
            pixel_data_offset: offset,
            pixel_data_size: pixel_data.len() as u32 - offset,
            sequence_index: owning_sequence(plate, bitmap_index),
        });

        tracing::debug!(
            "位图 {}: {}x{} {:?}, {} 级 mipmap, {} 字节",
            bitmap_index,
            bitmap.width,
            bitmap.height,
            format,
            bitmap.mipmap_count,
            pixel_data.len() as u32 - offset
        );
    }

    Ok(())
}

/// 位图所属的序列（精灵图集取第一个引用它的序列）
fn owning_sequence(plate: &ScannedColorPlate, bitmap_index: usize) -> u16 {
    for (sequence_index, sequence) in plate.sequences.iter().enumerate() {
        if !sequence.sprites.is_empty() {
            if sequence
                .sprites
                .iter()
                .any(|s| s.bitmap_index == bitmap_index)
            {
                return sequence_index as u16;
            }
        } else if (sequence.first_bitmap..sequence.first_bitmap + sequence.bitmap_count)
            .contains(&bitmap_index)
        {
            return sequence_index as u16;
        }
    }
    0
}

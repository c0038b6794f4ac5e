//! 标签装配
//!
//! 负责把流水线各阶段串起来：从已有标签回收默认值、加载或重新生成
//! 色板像素、扫描、处理、编码，最后合成并写出大端标签文件。目标文件
//! 只在整个流程成功后写入。

use crate::error::{BitmapError, Result};
use crate::image::compression::{compress_color_plate, decompress_color_plate};
use crate::image::{find_source_image, load_source_image, Pixel};
use crate::options::BitmapOptions;
use crate::plate::scan_color_plate;
use crate::process::{process_color_plate, MipmapScaleType, ProcessOptions, SpriteParameters};
use crate::tag::{
    io, sprite_budget_from_enum, sprite_budget_to_enum, BitmapFormat, BitmapTag, BitmapType,
    BitmapUsage, PixelFormat, SpriteUsage, TagSequence, TagSprite, FLAG_DISABLE_HEIGHT_MAP_COMPRESSION,
    FLAG_ENABLE_DITHERING, FLAG_FILTHY_SPRITE_BUG_FIX,
};
use std::path::PathBuf;

/// 回填完成、全部具体化的选项
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub bitmap_type: BitmapType,
    /// None 表示自动选择
    pub format: Option<BitmapFormat>,
    pub usage: BitmapUsage,
    pub max_mipmap_count: u16,
    pub mipmap_scale: MipmapScaleType,
    pub detail_fade: f32,
    pub sprite_usage: SpriteUsage,
    pub sprite_budget: u32,
    pub sprite_budget_count: u32,
    pub sprite_spacing: u16,
    pub force_square_sheets: bool,
    pub palettize: bool,
    pub bump_height: f32,
    pub alpha_bias: f32,
    pub filthy_sprite_bug_fix: bool,
    pub sharpen: Option<f32>,
    pub blur: Option<f32>,
    pub dithering: bool,
    pub allow_non_power_of_two: bool,
}

/// 选项回填：显式值 → 已有标签的值 → 内建默认值
pub fn resolve_options(options: &BitmapOptions, existing: Option<&BitmapTag>) -> ResolvedOptions {
    let mut format = options.format;
    let mut bitmap_type = options.bitmap_type;
    let mut usage = options.usage;
    let mut max_mipmap_count = options.mipmap_count;
    let mut mipmap_fade = options.detail_fade;
    let mut sprite_usage = options.sprite_usage;
    let mut sprite_budget = options.sprite_budget;
    let mut sprite_budget_count = options.sprite_budget_count;
    let mut sprite_spacing = options.sprite_spacing;
    let mut palettize = options.palettize;
    let mut bump_height = options.bump_height;
    let mut alpha_bias = options.alpha_bias;
    let mut filthy = options.filthy_sprite_bug_fix;
    let mut sharpen = options.sharpen;
    let mut blur = options.blur;
    let mut dithering = options.dithering;

    if let Some(tag) = existing {
        tracing::debug!("从已有标签回收未指定的选项");

        if format.is_none() && !options.auto_format {
            format = Some(tag.format);
        }
        if mipmap_fade.is_none() {
            mipmap_fade = Some(tag.detail_fade);
        }
        if bitmap_type.is_none() {
            bitmap_type = Some(tag.bitmap_type);
        }
        if max_mipmap_count.is_none() {
            max_mipmap_count = Some(if tag.mipmap_count == 0 {
                i16::MAX as u16
            } else {
                tag.mipmap_count - 1
            });
        }
        if sprite_usage.is_none() {
            sprite_usage = Some(tag.sprite_usage);
        }
        if sprite_budget.is_none() {
            sprite_budget = Some(sprite_budget_from_enum(tag.sprite_budget_size));
        }
        if sprite_budget_count.is_none() {
            sprite_budget_count = Some(tag.sprite_budget_count as u32);
        }
        if usage.is_none() {
            usage = Some(tag.usage);
        }
        if dithering.is_none() {
            dithering = Some(tag.flags & FLAG_ENABLE_DITHERING != 0);
        }
        if palettize.is_none() {
            palettize = Some(tag.flags & FLAG_DISABLE_HEIGHT_MAP_COMPRESSION == 0);
        }
        if bump_height.is_none() {
            bump_height = Some(tag.bump_height);
        }
        if sharpen.is_none() && tag.sharpen > 0.0 && tag.sharpen <= 1.0 {
            sharpen = Some(tag.sharpen);
        }
        if blur.is_none() && tag.blur_filter_size > 0.0 {
            blur = Some(tag.blur_filter_size);
        }
        if sprite_spacing.is_none() {
            sprite_spacing = Some(tag.sprite_spacing);
        }
        if filthy.is_none() {
            filthy = Some(tag.flags & FLAG_FILTHY_SPRITE_BUG_FIX != 0);
        }
        if alpha_bias.is_none() {
            alpha_bias = Some(tag.alpha_bias);
        }
    }

    ResolvedOptions {
        bitmap_type: bitmap_type.unwrap_or(BitmapType::TwoDimensional),
        format: if options.auto_format { None } else { format },
        usage: usage.unwrap_or(BitmapUsage::Default),
        max_mipmap_count: max_mipmap_count.unwrap_or(i16::MAX as u16),
        mipmap_scale: options.mipmap_scale.unwrap_or(MipmapScaleType::Linear),
        detail_fade: mipmap_fade.unwrap_or(0.0),
        sprite_usage: sprite_usage.unwrap_or(SpriteUsage::BlendAddSubtractMax),
        sprite_budget: sprite_budget.unwrap_or(32),
        sprite_budget_count: sprite_budget_count.unwrap_or(0),
        sprite_spacing: sprite_spacing.unwrap_or(0),
        force_square_sheets: options.force_square_sheets,
        palettize: palettize.unwrap_or(false),
        bump_height: bump_height.unwrap_or(0.026),
        alpha_bias: alpha_bias.unwrap_or(0.0),
        filthy_sprite_bug_fix: filthy.unwrap_or(false),
        sharpen,
        blur,
        dithering: dithering.unwrap_or(false),
        allow_non_power_of_two: options.allow_non_power_of_two,
    }
}

/// 把色板像素按内存顺序摊平成字节
fn plate_to_bytes(pixels: &[Pixel]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pixels.len() * 4);
    for p in pixels {
        bytes.extend_from_slice(&[p.b, p.g, p.r, p.a]);
    }
    bytes
}

/// 从标签内嵌的压缩色板还原像素
pub fn regenerate_pixels(tag: &BitmapTag) -> Result<(Vec<Pixel>, u32, u32)> {
    let width = tag.color_plate_width as u32;
    let height = tag.color_plate_height as u32;
    if width == 0 || height == 0 {
        return Err(BitmapError::NoColorPlateData);
    }

    let bytes = decompress_color_plate(&tag.compressed_color_plate)?;
    if bytes.len() != (width * height * 4) as usize {
        return Err(BitmapError::CompressedSizeMismatch);
    }

    let pixels = bytes
        .chunks_exact(4)
        .map(|c| Pixel {
            b: c[0],
            g: c[1],
            r: c[2],
            a: c[3],
        })
        .collect();

    Ok((pixels, width, height))
}

/// 对一组像素运行完整的编译流水线，产出标签
///
/// `base` 是已有标签（序列等数组会被覆盖），`preserve_plate` 为真时把
/// 输入色板压缩进标签，否则保留 `base` 里已有的压缩色板。
pub fn build_tag(
    pixels: &[Pixel],
    width: u32,
    height: u32,
    resolved: &ResolvedOptions,
    base: BitmapTag,
    preserve_plate: bool,
) -> Result<BitmapTag> {
    let mut tag = base;
    tag.sequences.clear();
    tag.bitmap_data.clear();
    tag.processed_pixel_data.clear();

    let mut plate = scan_color_plate(
        pixels,
        width,
        height,
        resolved.bitmap_type,
        resolved.usage,
        resolved.filthy_sprite_bug_fix,
        resolved.allow_non_power_of_two,
    )?;

    let sprite_parameters = if resolved.bitmap_type == BitmapType::Sprites {
        Some(SpriteParameters {
            sprite_usage: resolved.sprite_usage,
            sprite_budget: resolved.sprite_budget,
            sprite_budget_count: resolved.sprite_budget_count,
            sprite_spacing: resolved.sprite_spacing as u32,
            force_square_sheets: resolved.force_square_sheets,
        })
    } else {
        None
    };

    process_color_plate(
        &mut plate,
        &ProcessOptions {
            bitmap_type: resolved.bitmap_type,
            usage: resolved.usage,
            bump_height: resolved.bump_height,
            palettize: resolved.palettize,
            sprite_parameters,
            max_mipmap_count: resolved.max_mipmap_count,
            mipmap_scale: resolved.mipmap_scale,
            detail_fade: if resolved.usage == BitmapUsage::DetailMap {
                Some(resolved.detail_fade)
            } else {
                None
            },
            sharpen: resolved.sharpen,
            blur: resolved.blur,
            alpha_bias: Some(resolved.alpha_bias),
        },
    )?;

    // 保留原始色板以便将来重新生成
    if preserve_plate {
        if width > i16::MAX as u32 || height > i16::MAX as u32 {
            tracing::warn!(
                "色板尺寸超过 {0}x{0}，标签仍会生成，但以后无法重新生成",
                i16::MAX
            );
            tag.color_plate_width = 0;
            tag.color_plate_height = 0;
            tag.compressed_color_plate = Vec::new();
        } else {
            tag.color_plate_width = width as u16;
            tag.color_plate_height = height as u16;
            tag.compressed_color_plate = compress_color_plate(&plate_to_bytes(pixels))?;
        }
    }

    // 编码像素数据
    crate::encode::write_bitmap_data(
        &plate,
        &mut tag.processed_pixel_data,
        &mut tag.bitmap_data,
        resolved.usage,
        resolved.format,
        resolved.bitmap_type,
        resolved.palettize,
        resolved.dithering,
    )?;

    tracing::info!(
        "像素数据共 {:.3} MiB",
        tag.processed_pixel_data.len() as f32 / 1024.0 / 1024.0
    );

    // 写出序列
    for sequence in &plate.sequences {
        let mut record = TagSequence::default();

        if resolved.bitmap_type == BitmapType::Sprites {
            record.bitmap_count = if sequence.sprites.len() == 1 { 1 } else { 0 };

            let mut first_index: Option<u16> = None;
            for sprite in &sequence.sprites {
                let sheet = &plate.bitmaps[sprite.bitmap_index];
                let (sheet_width, sheet_height) = (sheet.width as f32, sheet.height as f32);

                record.sprites.push(TagSprite {
                    bitmap_index: sprite.bitmap_index as u16,
                    left: sprite.left as f32 / sheet_width,
                    right: sprite.right as f32 / sheet_width,
                    top: sprite.top as f32 / sheet_height,
                    bottom: sprite.bottom as f32 / sheet_height,
                    registration_point: (
                        sprite.registration_x as f32 / sheet_width,
                        sprite.registration_y as f32 / sheet_height,
                    ),
                });

                first_index = Some(match first_index {
                    Some(current) => current.min(sprite.bitmap_index as u16),
                    None => sprite.bitmap_index as u16,
                });
            }

            record.first_bitmap_index = first_index.unwrap_or(0);
        } else {
            record.first_bitmap_index = sequence.first_bitmap as u16;
            record.bitmap_count = sequence.bitmap_count as u16;
        }

        tag.sequences.push(record);
    }

    // 其余头部字段
    tag.bitmap_type = resolved.bitmap_type;
    tag.usage = resolved.usage;
    tag.bump_height = resolved.bump_height;
    tag.detail_fade = resolved.detail_fade;
    tag.format = resolved
        .format
        .unwrap_or_else(|| infer_category(&tag.bitmap_data));
    tag.sharpen = resolved.sharpen.unwrap_or(0.0);
    tag.blur_filter_size = resolved.blur.unwrap_or(0.0);
    tag.alpha_bias = resolved.alpha_bias;
    tag.flags = (tag.flags
        & !FLAG_ENABLE_DITHERING
        & !FLAG_DISABLE_HEIGHT_MAP_COMPRESSION
        & !FLAG_FILTHY_SPRITE_BUG_FIX)
        | if resolved.dithering { FLAG_ENABLE_DITHERING } else { 0 }
        | if resolved.palettize {
            0
        } else {
            FLAG_DISABLE_HEIGHT_MAP_COMPRESSION
        }
        | if resolved.filthy_sprite_bug_fix {
            FLAG_FILTHY_SPRITE_BUG_FIX
        } else {
            0
        };
    tag.mipmap_count = if resolved.max_mipmap_count >= i16::MAX as u16 {
        0
    } else {
        resolved.max_mipmap_count + 1
    };
    tag.sprite_spacing = resolved.sprite_spacing;
    tag.sprite_budget_count = resolved.sprite_budget_count as u16;
    tag.sprite_usage = resolved.sprite_usage;
    tag.sprite_budget_size = sprite_budget_to_enum(resolved.sprite_budget);

    Ok(tag)
}

/// 从产出的位图格式倒推标签头的格式类别（自动模式）
fn infer_category(bitmap_data: &[crate::tag::BitmapData]) -> BitmapFormat {
    match bitmap_data.first().map(|d| d.format) {
        Some(PixelFormat::Dxt1) => BitmapFormat::Dxt1,
        Some(PixelFormat::Dxt3) => BitmapFormat::Dxt3,
        Some(PixelFormat::Dxt5) => BitmapFormat::Dxt5,
        Some(PixelFormat::R5G6B5 | PixelFormat::A1R5G5B5 | PixelFormat::A4R4G4B4) => {
            BitmapFormat::Sixteen
        }
        Some(
            PixelFormat::A8 | PixelFormat::Y8 | PixelFormat::Ay8 | PixelFormat::A8Y8
            | PixelFormat::P8Bump,
        ) => BitmapFormat::Monochrome,
        _ => BitmapFormat::ThirtyTwo,
    }
}

/// 编译一个位图标签并写出文件，返回目标路径
///
/// `tag_path` 是相对标签目录的路径（不带扩展名）。
pub fn compile_tag(tag_path: &str, options: &BitmapOptions) -> Result<PathBuf> {
    let final_path = options.tags_dir.join(tag_path).with_extension("bitmap");

    // 已有标签
    let existing = if !options.ignore_tag_data && final_path.exists() {
        let bytes = std::fs::read(&final_path)?;
        Some(io::read_tag(&bytes)?)
    } else {
        None
    };

    if options.regenerate && existing.is_none() {
        return Err(BitmapError::CannotRegenerate(format!(
            "{} 处没有已存在的标签",
            final_path.display()
        )));
    }

    let resolved = resolve_options(options, existing.as_ref());

    // 色板像素：重新生成走标签内嵌数据，否则从数据目录解码源图片
    let (pixels, width, height) = if options.regenerate {
        regenerate_pixels(existing.as_ref().unwrap_or(&BitmapTag::default()))?
    } else {
        let source = find_source_image(&options.data_dir, tag_path)?;
        load_source_image(&source)?
    };

    let base = existing.unwrap_or_default();
    let tag = build_tag(&pixels, width, height, &resolved, base, !options.regenerate)?;
    let bytes = io::write_tag(&tag)?;

    if let Some(parent) = final_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| BitmapError::TagWriteFailed(format!("{}: {e}", parent.display())))?;
    }
    std::fs::write(&final_path, bytes)
        .map_err(|e| BitmapError::TagWriteFailed(format!("{}: {e}", final_path.display())))?;

    tracing::info!("已写出 {}", final_path.display());
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{BitmapDataType, DATA_FLAG_COMPRESSED};

    fn opaque_square(size: u32) -> Vec<Pixel> {
        (0..size * size)
            .map(|i| Pixel::new(255, (i % 251) as u8, 70, 30))
            .collect()
    }

    fn resolved_defaults() -> ResolvedOptions {
        resolve_options(&BitmapOptions::default(), None)
    }

    #[test]
    fn test_defaults_without_existing_tag() {
        let resolved = resolved_defaults();
        assert_eq!(resolved.bitmap_type, BitmapType::TwoDimensional);
        assert_eq!(resolved.max_mipmap_count, i16::MAX as u16);
        assert_eq!(resolved.sprite_budget, 32);
        assert_eq!(resolved.usage, BitmapUsage::Default);
        assert!((resolved.bump_height - 0.026).abs() < 1e-6);
        assert!(!resolved.palettize);
        assert!(resolved.format.is_none());
    }

    #[test]
    fn test_defaults_recovered_from_tag() {
        let tag = BitmapTag {
            format: BitmapFormat::Sixteen,
            bitmap_type: BitmapType::Interface,
            usage: BitmapUsage::DetailMap,
            detail_fade: 0.5,
            mipmap_count: 4,
            sprite_budget_size: 2,
            sprite_budget_count: 7,
            sprite_spacing: 3,
            sharpen: 0.4,
            blur_filter_size: 2.0,
            alpha_bias: -0.5,
            bump_height: 0.1,
            flags: FLAG_ENABLE_DITHERING | FLAG_FILTHY_SPRITE_BUG_FIX,
            ..BitmapTag::default()
        };

        let resolved = resolve_options(&BitmapOptions::default(), Some(&tag));
        assert_eq!(resolved.format, Some(BitmapFormat::Sixteen));
        assert_eq!(resolved.bitmap_type, BitmapType::Interface);
        assert_eq!(resolved.usage, BitmapUsage::DetailMap);
        assert_eq!(resolved.max_mipmap_count, 3);
        assert_eq!(resolved.sprite_budget, 128);
        assert_eq!(resolved.sprite_budget_count, 7);
        assert_eq!(resolved.sprite_spacing, 3);
        assert_eq!(resolved.sharpen, Some(0.4));
        assert_eq!(resolved.blur, Some(2.0));
        assert!((resolved.alpha_bias + 0.5).abs() < 1e-6);
        assert!(resolved.dithering);
        assert!(resolved.filthy_sprite_bug_fix);
        // 标签没有设置"禁用高度图压缩" → 调色板化为真
        assert!(resolved.palettize);

        // 存储的 mipmap_count 为 0 表示完整链
        let full_chain = BitmapTag::default();
        let resolved = resolve_options(&BitmapOptions::default(), Some(&full_chain));
        assert_eq!(resolved.max_mipmap_count, i16::MAX as u16);
    }

    #[test]
    fn test_explicit_options_win_over_tag() {
        let tag = BitmapTag {
            format: BitmapFormat::Sixteen,
            usage: BitmapUsage::DetailMap,
            ..BitmapTag::default()
        };
        let options = BitmapOptions {
            format: Some(BitmapFormat::Dxt1),
            usage: Some(BitmapUsage::LightMap),
            ..BitmapOptions::default()
        };

        let resolved = resolve_options(&options, Some(&tag));
        assert_eq!(resolved.format, Some(BitmapFormat::Dxt1));
        assert_eq!(resolved.usage, BitmapUsage::LightMap);
    }

    #[test]
    fn test_auto_format_blocks_recovery() {
        let tag = BitmapTag {
            format: BitmapFormat::Sixteen,
            ..BitmapTag::default()
        };
        let options = BitmapOptions {
            auto_format: true,
            ..BitmapOptions::default()
        };
        let resolved = resolve_options(&options, Some(&tag));
        assert!(resolved.format.is_none());
    }

    #[test]
    fn test_opaque_square_scenario() {
        // 64x64 不带色键的不透明方块
        let pixels = opaque_square(64);
        let tag = build_tag(&pixels, 64, 64, &resolved_defaults(), BitmapTag::default(), true)
            .unwrap();

        assert_eq!(tag.sequences.len(), 1);
        assert_eq!(tag.bitmap_data.len(), 1);

        let data = &tag.bitmap_data[0];
        assert_eq!(data.format, PixelFormat::Dxt1);
        assert_eq!(data.data_type, BitmapDataType::TwoDimensional);
        assert_eq!(data.mipmap_count, 6);
        assert_ne!(data.flags & DATA_FLAG_COMPRESSED, 0);

        assert_eq!(tag.color_plate_width, 64);
        assert_eq!(tag.color_plate_height, 64);
        // 上限是 i16::MAX 时 mipmap_count 字段写 0
        assert_eq!(tag.mipmap_count, 0);
        assert_eq!(tag.format, BitmapFormat::Dxt1);

        // DXT1 完整链的字节数: 64..4 各级按半字节，2 和 1 补成一个块
        let expected: usize = [64u32, 32, 16, 8, 4]
            .iter()
            .map(|d| (d * d / 2) as usize)
            .sum::<usize>()
            + 8
            + 8;
        assert_eq!(tag.processed_pixel_data.len(), expected);
    }

    #[test]
    fn test_idempotence() {
        let pixels = opaque_square(32);
        let resolved = resolved_defaults();
        let a = build_tag(&pixels, 32, 32, &resolved, BitmapTag::default(), true).unwrap();
        let b = build_tag(&pixels, 32, 32, &resolved, BitmapTag::default(), true).unwrap();
        assert_eq!(io::write_tag(&a).unwrap(), io::write_tag(&b).unwrap());
    }

    #[test]
    fn test_regeneration_roundtrip() {
        let pixels = opaque_square(64);
        let resolved = resolved_defaults();
        let first = build_tag(&pixels, 64, 64, &resolved, BitmapTag::default(), true).unwrap();

        // 从内嵌色板还原像素后用同样的选项重建
        let (regenerated, width, height) = regenerate_pixels(&first).unwrap();
        assert_eq!((width, height), (64, 64));
        assert_eq!(regenerated, pixels);

        let second =
            build_tag(&regenerated, width, height, &resolved, first.clone(), false).unwrap();
        assert_eq!(io::write_tag(&second).unwrap(), io::write_tag(&first).unwrap());
    }

    #[test]
    fn test_regenerate_without_plate_data() {
        let tag = BitmapTag::default();
        assert!(matches!(
            regenerate_pixels(&tag),
            Err(BitmapError::NoColorPlateData)
        ));

        let tag = BitmapTag {
            color_plate_width: 4,
            color_plate_height: 4,
            compressed_color_plate: vec![0, 0],
            ..BitmapTag::default()
        };
        assert!(matches!(
            regenerate_pixels(&tag),
            Err(BitmapError::NoColorPlateData)
        ));
    }

    #[test]
    fn test_regenerate_size_mismatch() {
        // 压缩数据声明的长度与色板尺寸不符
        let tag = BitmapTag {
            color_plate_width: 4,
            color_plate_height: 4,
            compressed_color_plate: compress_color_plate(&[0u8; 8 * 4]).unwrap(),
            ..BitmapTag::default()
        };
        assert!(matches!(
            regenerate_pixels(&tag),
            Err(BitmapError::CompressedSizeMismatch)
        ));
    }

    #[test]
    fn test_non_power_of_two_policy() {
        // 100x100：默认拒绝
        let pixels = opaque_square(100);
        let resolved = resolved_defaults();
        let result = build_tag(&pixels, 100, 100, &resolved, BitmapTag::default(), true);
        assert!(matches!(result, Err(BitmapError::NonPowerOfTwo(100, 100))));

        // 开启豁免并用界面类型则成功
        let mut resolved = resolved_defaults();
        resolved.allow_non_power_of_two = true;
        resolved.bitmap_type = BitmapType::Interface;
        let tag = build_tag(&pixels, 100, 100, &resolved, BitmapTag::default(), true).unwrap();
        assert_eq!(tag.bitmap_data[0].width, 100);
        // 界面位图没有 mipmap
        assert_eq!(tag.bitmap_data[0].mipmap_count, 0);
    }

    #[test]
    fn test_regenerate_honors_caller_flags() {
        // 用豁免 + 界面类型生成 100x100 的标签，再以严格选项重新生成：
        // 调用者的选项说了算
        let pixels = opaque_square(100);
        let mut resolved = resolved_defaults();
        resolved.allow_non_power_of_two = true;
        resolved.bitmap_type = BitmapType::Interface;
        let first = build_tag(&pixels, 100, 100, &resolved, BitmapTag::default(), true).unwrap();

        let (regenerated, width, height) = regenerate_pixels(&first).unwrap();
        let mut strict = resolved_defaults();
        strict.bitmap_type = BitmapType::Interface;
        strict.allow_non_power_of_two = false;
        let result = build_tag(&regenerated, width, height, &strict, first, false);
        // 界面类型本身豁免 2 的幂检查，因此调用者提供界面类型时仍成功
        assert!(result.is_ok());

        let (regenerated, width, height) =
            regenerate_pixels(&result.as_ref().unwrap().clone()).unwrap();
        let mut strict_2d = resolved_defaults();
        strict_2d.bitmap_type = BitmapType::TwoDimensional;
        let failure = build_tag(
            &regenerated,
            width,
            height,
            &strict_2d,
            result.unwrap(),
            false,
        );
        assert!(matches!(failure, Err(BitmapError::NonPowerOfTwo(100, 100))));
    }

    #[test]
    fn test_oversize_plate_cannot_be_preserved() {
        // 用一个 40000x1 的"色板"触发尺寸上限（左上角非色键 → 整板位图）
        let pixels = vec![Pixel::new(255, 9, 9, 9); 40000];
        let mut resolved = resolved_defaults();
        resolved.allow_non_power_of_two = true;
        resolved.bitmap_type = BitmapType::Interface;
        let tag = build_tag(&pixels, 40000, 1, &resolved, BitmapTag::default(), true).unwrap();

        assert_eq!(tag.color_plate_width, 0);
        assert_eq!(tag.color_plate_height, 0);
        assert!(tag.compressed_color_plate.is_empty());
        assert!(matches!(
            regenerate_pixels(&tag),
            Err(BitmapError::NoColorPlateData)
        ));
    }

    #[test]
    fn test_sprite_sequence_emission() {
        // 品红分隔的精灵色板：两个条带，各一个精灵
        let art = [
            "M".repeat(12),
            "B".repeat(12),
            format!("B{}B", "#".repeat(10)),
            "B".repeat(12),
            "M".repeat(12),
            "B".repeat(12),
            format!("B{}B", "#".repeat(10)),
            "B".repeat(12),
        ];

        let mut pixels = Vec::new();
        for row in &art {
            for c in row.chars() {
                pixels.push(match c {
                    'M' => Pixel::new(255, 255, 0, 255),
                    'B' => Pixel::new(255, 0, 0, 255),
                    _ => Pixel::new(255, 200, 150, 100),
                });
            }
        }

        let mut resolved = resolved_defaults();
        resolved.bitmap_type = BitmapType::Sprites;
        resolved.sprite_budget = 32;
        resolved.sprite_spacing = 1;

        let tag = build_tag(&pixels, 12, 8, &resolved, BitmapTag::default(), true).unwrap();

        assert_eq!(tag.sequences.len(), 2);
        for sequence in &tag.sequences {
            // 每个序列恰好一个精灵 → bitmap_count 为 1
            assert_eq!(sequence.bitmap_count, 1);
            assert_eq!(sequence.sprites.len(), 1);

            let sprite = &sequence.sprites[0];
            assert!(sprite.left >= 0.0 && sprite.left < sprite.right && sprite.right <= 1.0);
            assert!(sprite.top >= 0.0 && sprite.top < sprite.bottom && sprite.bottom <= 1.0);
            assert!(sprite.registration_point.0 >= sprite.left);
            assert!(sprite.registration_point.0 <= sprite.right);
            assert!(sprite.registration_point.1 >= sprite.top);
            assert!(sprite.registration_point.1 <= sprite.bottom);
        }

        assert_eq!(tag.sprite_budget_size, 0);
        assert_eq!(tag.sprite_spacing, 1);
    }

    #[test]
    fn test_height_map_p8_roundtrip() {
        // 128x128 高度图，调色板化开
        let pixels: Vec<Pixel> = (0..128u32 * 128)
            .map(|i| {
                let v = ((i % 128) * 2) as u8;
                Pixel::new(255, v, v, v)
            })
            .collect();

        let mut resolved = resolved_defaults();
        resolved.usage = BitmapUsage::HeightMap;
        resolved.palettize = true;

        let tag = build_tag(&pixels, 128, 128, &resolved, BitmapTag::default(), true).unwrap();
        let data = &tag.bitmap_data[0];
        assert_eq!(data.format, PixelFormat::P8Bump);
        assert_eq!((data.width, data.height), (128, 128));

        // 第 0 级是 128x128 个索引
        assert!(tag.processed_pixel_data.len() >= 128 * 128);

        // 重新生成后索引逐字节一致
        let (regenerated, width, height) = regenerate_pixels(&tag).unwrap();
        let second =
            build_tag(&regenerated, width, height, &resolved, tag.clone(), false).unwrap();
        assert_eq!(second.processed_pixel_data, tag.processed_pixel_data);
        assert_eq!(second.bitmap_data, tag.bitmap_data);
    }

    #[test]
    fn test_compile_tag_end_to_end() {
        let root = std::env::temp_dir().join("bitmap_compiler_e2e");
        let data_dir = root.join("data");
        let tags_dir = root.join("tags");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::create_dir_all(&tags_dir).unwrap();

        // 写一张 16x16 的不透明 PNG
        let mut source = image::RgbaImage::new(16, 16);
        for (x, y, pixel) in source.enumerate_pixels_mut() {
            *pixel = image::Rgba([(x * 16) as u8, (y * 16) as u8, 55, 255]);
        }
        source.save(data_dir.join("glow.png")).unwrap();

        let options = BitmapOptions {
            data_dir: data_dir.clone(),
            tags_dir: tags_dir.clone(),
            ..BitmapOptions::default()
        };

        let path = compile_tag("glow", &options).unwrap();
        assert!(path.exists());

        let first_bytes = std::fs::read(&path).unwrap();
        let parsed = io::read_tag(&first_bytes).unwrap();
        assert_eq!(parsed.bitmap_data.len(), 1);
        assert_eq!(parsed.color_plate_width, 16);

        // 再生模式：字节级一致
        let regenerate = BitmapOptions {
            regenerate: true,
            ..options.clone()
        };
        compile_tag("glow", &regenerate).unwrap();
        let second_bytes = std::fs::read(&path).unwrap();
        assert_eq!(second_bytes, first_bytes);

        // 丢失源图片时报 InputNotFound
        let missing = compile_tag("nothing_here", &options);
        assert!(matches!(missing, Err(BitmapError::InputNotFound(_))));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_regenerate_requires_existing_tag() {
        let options = BitmapOptions {
            regenerate: true,
            tags_dir: std::env::temp_dir().join("bitmap_compiler_missing_tags"),
            ..BitmapOptions::default()
        };
        let result = compile_tag("ghost", &options);
        assert!(matches!(result, Err(BitmapError::CannotRegenerate(_))));
    }
}

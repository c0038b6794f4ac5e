//! 位图处理流水线：滤镜、凹凸准备、精灵打包、mipmap 生成

pub mod bump;
pub mod filters;
pub mod mipmap;
pub mod sprites;

pub use mipmap::MipmapScaleType;
pub use sprites::SpriteParameters;

use crate::error::Result;
use crate::image::BumpPalette;
use crate::plate::ScannedColorPlate;
use crate::tag::{BitmapType, BitmapUsage};

/// 处理流水线的参数
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub bitmap_type: BitmapType,
    pub usage: BitmapUsage,
    /// 高度图的表观高度
    pub bump_height: f32,
    /// 高度图是否做 P8 调色板化
    pub palettize: bool,
    /// 精灵打包参数（仅精灵类型）
    pub sprite_parameters: Option<SpriteParameters>,
    /// mipmap 数量上限，i16::MAX 表示完整链
    pub max_mipmap_count: u16,
    pub mipmap_scale: MipmapScaleType,
    /// 细节淡出因子（仅细节贴图用途）
    pub detail_fade: Option<f32>,
    /// 锐化强度 ∈ (0,1]
    pub sharpen: Option<f32>,
    /// 模糊半径 > 0
    pub blur: Option<f32>,
    /// 透明度偏置 ∈ [-1,1]
    pub alpha_bias: Option<f32>,
}

/// 按固定顺序处理扫描出来的色板：
/// 预滤镜 → 透明度偏置 → 凹凸准备 → 精灵打包 → mipmap → 细节淡出
pub fn process_color_plate(plate: &mut ScannedColorPlate, options: &ProcessOptions) -> Result<()> {
    let bump_palette = if options.usage == BitmapUsage::HeightMap && options.palettize {
        Some(BumpPalette::new())
    } else {
        None
    };

    for bitmap in &mut plate.bitmaps {
        let (width, height) = (bitmap.width, bitmap.height);
        let slice_size = (width * height) as usize;

        for slice in bitmap.pixels.chunks_mut(slice_size) {
            if let Some(blur) = options.blur {
                if blur > 0.0 {
                    filters::gaussian_blur(slice, width, height, blur);
                }
            }
            if let Some(amount) = options.sharpen {
                if amount > 0.0 {
                    filters::sharpen(slice, width, height, amount);
                }
            }
            if let Some(bias) = options.alpha_bias {
                filters::alpha_bias(slice, bias);
            }

            if options.usage == BitmapUsage::HeightMap {
                bump::height_to_normals(slice, width, height, options.bump_height);
                if let Some(palette) = &bump_palette {
                    bump::quantize_to_palette(slice, palette);
                }
            }
        }
    }

    if options.bitmap_type == BitmapType::Sprites {
        if let Some(parameters) = &options.sprite_parameters {
            sprites::pack_sprites(plate, parameters)?;
        }
    }

    // 界面位图不生成 mipmap
    let max_mipmap_count = if options.bitmap_type == BitmapType::Interface {
        0
    } else {
        options.max_mipmap_count
    };

    for bitmap in &mut plate.bitmaps {
        mipmap::generate_mipmaps(bitmap, max_mipmap_count, options.mipmap_scale);

        if options.usage == BitmapUsage::DetailMap {
            if let Some(fade) = options.detail_fade {
                mipmap::fade_to_grey(bitmap, fade);
            }
        }
    }

    Ok(())
}

//! mipmap 链生成与细节淡出

use crate::image::Pixel;
use crate::plate::ScannedBitmap;

/// mipmap 缩小时使用的滤波方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipmapScaleType {
    /// 2x2 盒式平均（预乘透明度空间）
    Linear,
    /// 取每个 2x2 的左上角
    Nearest,
    /// 颜色用线性、透明度用最近邻（保住镂空遮罩）
    NearestAlpha,
}

/// 为位图生成 mipmap 链
///
/// 逐级把宽高折半（向下取整，最小为 1），直到两边都是 1 或者达到
/// max_count。每一级由上一级计算，逐切片（面/深度）处理；切片数在
/// 各级之间保持不变。
pub fn generate_mipmaps(bitmap: &mut ScannedBitmap, max_count: u16, scale: MipmapScaleType) {
    bitmap.mipmap_count = 0;
    bitmap.pixels.truncate(bitmap.level_pixel_count(0));

    let slices = bitmap.slice_count();
    let mut level = 0u32;

    while max_count as u32 > level {
        let (w, h) = bitmap.level_dimensions(level);
        if w == 1 && h == 1 {
            break;
        }

        let (next_w, next_h) = ((w / 2).max(1), (h / 2).max(1));
        let source_offset = bitmap.level_offset(level);
        let mut next = Vec::with_capacity((next_w * next_h * slices) as usize);

        for slice in 0..slices {
            let slice_offset = source_offset + (slice * w * h) as usize;
            let source = &bitmap.pixels[slice_offset..slice_offset + (w * h) as usize];
            downsample(source, w, h, next_w, next_h, scale, &mut next);
        }

        bitmap.pixels.extend_from_slice(&next);
        level += 1;
        bitmap.mipmap_count = level;
    }
}

/// 把一个切片缩小到 next_w × next_h，结果追加到 output
fn downsample(
    source: &[Pixel],
    w: u32,
    h: u32,
    next_w: u32,
    next_h: u32,
    scale: MipmapScaleType,
    output: &mut Vec<Pixel>,
) {
    let sample = |x: u32, y: u32| -> Pixel {
        source[(y.min(h - 1) * w + x.min(w - 1)) as usize]
    };

    for y in 0..next_h {
        for x in 0..next_w {
            let corner = sample(x * 2, y * 2);
            let pixel = match scale {
                MipmapScaleType::Nearest => corner,
                MipmapScaleType::Linear => box_average(x, y, &sample),
                MipmapScaleType::NearestAlpha => {
                    let mut blended = box_average(x, y, &sample);
                    blended.a = corner.a;
                    blended
                }
            };
            output.push(pixel);
        }
    }
}

/// 预乘透明度空间里的 2x2 盒式平均
///
/// 颜色按 Σ(c·a)/Σa 求平均再还原，全透明块的颜色退化为普通平均。
fn box_average(x: u32, y: u32, sample: &dyn Fn(u32, u32) -> Pixel) -> Pixel {
    let block = [
        sample(x * 2, y * 2),
        sample(x * 2 + 1, y * 2),
        sample(x * 2, y * 2 + 1),
        sample(x * 2 + 1, y * 2 + 1),
    ];

    let sum_a: u32 = block.iter().map(|p| p.a as u32).sum();
    let average_alpha = ((sum_a + 2) / 4) as u8;

    let weighted = |select: fn(&Pixel) -> u8| -> u8 {
        if sum_a == 0 {
            let sum: u32 = block.iter().map(|p| select(p) as u32).sum();
            return ((sum + 2) / 4) as u8;
        }
        let sum: u32 = block.iter().map(|p| select(p) as u32 * p.a as u32).sum();
        ((sum + sum_a / 2) / sum_a) as u8
    };

    Pixel {
        b: weighted(|p| p.b),
        g: weighted(|p| p.g),
        r: weighted(|p| p.r),
        a: average_alpha,
    }
}

/// 细节贴图淡出：第 k 级 mipmap 向中性灰 (128,128,128,128) 插值
/// min(1, k·fade)
pub fn fade_to_grey(bitmap: &mut ScannedBitmap, fade: f32) {
    if fade <= 0.0 {
        return;
    }

    for level in 1..=bitmap.mipmap_count {
        let t = (level as f32 * fade).min(1.0);
        let offset = bitmap.level_offset(level);
        let count = bitmap.level_pixel_count(level);

        for pixel in &mut bitmap.pixels[offset..offset + count] {
            let lerp = |v: u8| -> u8 { (v as f32 + (128.0 - v as f32) * t).round() as u8 };
            *pixel = Pixel {
                b: lerp(pixel.b),
                g: lerp(pixel.g),
                r: lerp(pixel.r),
                a: lerp(pixel.a),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_bitmap(width: u32, height: u32, pixel: Pixel) -> ScannedBitmap {
        ScannedBitmap::new(width, height, vec![pixel; (width * height) as usize])
    }

    #[test]
    fn test_full_chain_count() {
        let mut bitmap = solid_bitmap(64, 64, Pixel::white());
        generate_mipmaps(&mut bitmap, i16::MAX as u16, MipmapScaleType::Linear);

        // 64,32,16,8,4,2,1：第 0 级之外 6 级
        assert_eq!(bitmap.mipmap_count, 6);
        assert_eq!(bitmap.level_dimensions(6), (1, 1));
        assert_eq!(bitmap.total_pixel_count(), bitmap.pixels.len());
    }

    #[test]
    fn test_capped_chain() {
        let mut bitmap = solid_bitmap(64, 64, Pixel::white());
        generate_mipmaps(&mut bitmap, 2, MipmapScaleType::Linear);
        assert_eq!(bitmap.mipmap_count, 2);
        assert_eq!(bitmap.level_dimensions(2), (16, 16));
    }

    #[test]
    fn test_non_square_chain_stops_at_one_by_one() {
        let mut bitmap = solid_bitmap(8, 2, Pixel::white());
        generate_mipmaps(&mut bitmap, i16::MAX as u16, MipmapScaleType::Linear);

        // 8x2 → 4x1 → 2x1 → 1x1
        assert_eq!(bitmap.mipmap_count, 3);
        assert_eq!(bitmap.level_dimensions(1), (4, 1));
        assert_eq!(bitmap.level_dimensions(3), (1, 1));
    }

    #[test]
    fn test_linear_averages() {
        let mut bitmap = ScannedBitmap::new(
            2,
            2,
            vec![
                Pixel::new(255, 0, 0, 0),
                Pixel::new(255, 255, 255, 255),
                Pixel::new(255, 255, 255, 255),
                Pixel::new(255, 0, 0, 0),
            ],
        );
        generate_mipmaps(&mut bitmap, i16::MAX as u16, MipmapScaleType::Linear);

        let top = bitmap.level_pixels(1)[0];
        assert_eq!(top.a, 255);
        assert_eq!(top.r, 128);
    }

    #[test]
    fn test_nearest_picks_top_left() {
        let mut bitmap = ScannedBitmap::new(
            2,
            2,
            vec![
                Pixel::new(255, 10, 20, 30),
                Pixel::white(),
                Pixel::white(),
                Pixel::white(),
            ],
        );
        generate_mipmaps(&mut bitmap, i16::MAX as u16, MipmapScaleType::Nearest);
        assert_eq!(bitmap.level_pixels(1)[0], Pixel::new(255, 10, 20, 30));
    }

    #[test]
    fn test_nearest_alpha_mixes() {
        let mut bitmap = ScannedBitmap::new(
            2,
            2,
            vec![
                Pixel::new(0, 100, 100, 100),
                Pixel::new(255, 200, 200, 200),
                Pixel::new(255, 200, 200, 200),
                Pixel::new(255, 200, 200, 200),
            ],
        );
        generate_mipmaps(&mut bitmap, i16::MAX as u16, MipmapScaleType::NearestAlpha);

        let top = bitmap.level_pixels(1)[0];
        // 透明度取左上角（0），颜色按预乘平均（透明像素不贡献颜色）
        assert_eq!(top.a, 0);
        assert_eq!(top.r, 200);
    }

    #[test]
    fn test_premultiplied_ignores_transparent_color() {
        let mut bitmap = ScannedBitmap::new(
            2,
            1,
            vec![Pixel::new(0, 255, 0, 0), Pixel::new(255, 0, 200, 0)],
        );
        generate_mipmaps(&mut bitmap, i16::MAX as u16, MipmapScaleType::Linear);

        let top = bitmap.level_pixels(1)[0];
        // 全透明的红色不应渗进平均值
        assert_eq!(top.r, 0);
        assert_eq!(top.g, 200);
    }

    #[test]
    fn test_cube_faces_mipmapped_per_face() {
        let mut pixels = Vec::new();
        for face in 0..6u8 {
            pixels.extend(vec![Pixel::new(255, face * 40, 0, 0); 4]);
        }
        let mut bitmap = ScannedBitmap::new(2, 2, pixels);
        bitmap.faces = 6;
        generate_mipmaps(&mut bitmap, i16::MAX as u16, MipmapScaleType::Linear);

        assert_eq!(bitmap.mipmap_count, 1);
        let level = bitmap.level_pixels(1);
        assert_eq!(level.len(), 6);
        for face in 0..6usize {
            assert_eq!(level[face].r, face as u8 * 40);
        }
    }

    #[test]
    fn test_fade_to_grey() {
        let mut bitmap = solid_bitmap(8, 8, Pixel::new(255, 0, 0, 0));
        generate_mipmaps(&mut bitmap, i16::MAX as u16, MipmapScaleType::Linear);
        fade_to_grey(&mut bitmap, 0.5);

        // 第 0 级不动
        assert_eq!(bitmap.level_pixels(0)[0].r, 0);
        // 第 1 级向灰插值一半
        assert_eq!(bitmap.level_pixels(1)[0].r, 64);
        // 第 2 级起完全变灰
        assert_eq!(bitmap.level_pixels(2)[0].r, 128);
        assert_eq!(bitmap.level_pixels(2)[0].a, 128);
    }

    #[test]
    fn test_zero_cap_means_no_mipmaps() {
        let mut bitmap = solid_bitmap(16, 16, Pixel::white());
        generate_mipmaps(&mut bitmap, 0, MipmapScaleType::Linear);
        assert_eq!(bitmap.mipmap_count, 0);
        assert_eq!(bitmap.pixels.len(), 256);
    }
}

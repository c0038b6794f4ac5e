//! 高度图转法线图

use crate::image::{BumpPalette, Pixel};

/// 把一层高度图（亮度作为高度）转换为法线图
///
/// 采样按平铺（wrap）处理，中心差分的斜率乘以 bump_height · 256。
/// 输出 RGB 存法线（[-1,1] 映射到 [0,255]），A 保留原始高度。
pub fn height_to_normals(pixels: &mut [Pixel], width: u32, height: u32, bump_height: f32) {
    let w = width as i32;
    let h = height as i32;
    let scale = bump_height * 256.0;

    let heights: Vec<f32> = pixels.iter().map(|p| p.luminance() as f32 / 255.0).collect();
    let sample = |x: i32, y: i32| -> f32 {
        let x = x.rem_euclid(w);
        let y = y.rem_euclid(h);
        heights[(y * w + x) as usize]
    };

    for y in 0..h {
        for x in 0..w {
            let nx = (sample(x - 1, y) - sample(x + 1, y)) * scale;
            let ny = (sample(x, y - 1) - sample(x, y + 1)) * scale;
            let nz = 1.0f32;

            let length = (nx * nx + ny * ny + nz * nz).sqrt();
            let encode = |v: f32| -> u8 {
                ((v / length * 0.5 + 0.5) * 255.0).round().clamp(0.0, 255.0) as u8
            };

            let index = (y * w + x) as usize;
            let original_height = (heights[index] * 255.0).round() as u8;
            pixels[index] = Pixel::new(original_height, encode(nx), encode(ny), encode(nz));
        }
    }
}

/// 把法线图的 RGB 吸附到 P8 调色板上（透明度里的高度保持不动）
pub fn quantize_to_palette(pixels: &mut [Pixel], palette: &BumpPalette) {
    for pixel in pixels {
        let entry = palette.get(palette.find_closest(*pixel));
        pixel.r = entry.r;
        pixel.g = entry.g;
        pixel.b = entry.b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_height_gives_up_normal() {
        let mut pixels = vec![Pixel::new(255, 100, 100, 100); 16];
        height_to_normals(&mut pixels, 4, 4, 0.02);

        for p in &pixels {
            assert_eq!((p.r, p.g, p.b), (128, 128, 255));
            // 高度保留在透明度里
            assert_eq!(p.a, 100);
        }
    }

    #[test]
    fn test_slope_tilts_normal() {
        // 4x1 的横向渐变
        let mut pixels = vec![
            Pixel::new(255, 0, 0, 0),
            Pixel::new(255, 85, 85, 85),
            Pixel::new(255, 170, 170, 170),
            Pixel::new(255, 255, 255, 255),
        ];
        height_to_normals(&mut pixels, 4, 1, 0.1);

        // 上坡方向的法线 X 分量为负，平铺回绕处为正
        assert!(pixels[1].r < 128);
        assert!(pixels[3].r > 128);
    }

    #[test]
    fn test_quantize_snaps_to_palette() {
        let palette = BumpPalette::new();
        let mut pixels = vec![Pixel::new(42, 130, 126, 250)];
        quantize_to_palette(&mut pixels, &palette);

        let entry = palette.get(0);
        assert_eq!((pixels[0].r, pixels[0].g, pixels[0].b), (entry.r, entry.g, entry.b));
        assert_eq!(pixels[0].a, 42);
    }
}

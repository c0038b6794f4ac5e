//! 预处理滤镜：高斯模糊、锐化、透明度偏置

use crate::image::Pixel;

/// 对一层像素做可分离高斯模糊
///
/// σ 取模糊半径本身，卷积核半宽为 ⌈3σ⌉。边缘采样按 clamp 处理。
pub fn gaussian_blur(pixels: &mut [Pixel], width: u32, height: u32, radius: f32) {
    if radius <= 0.0 {
        return;
    }

    let sigma = radius;
    let half = (sigma * 3.0).ceil().max(1.0) as i32;
    let mut weights = Vec::with_capacity((half * 2 + 1) as usize);
    for i in -half..=half {
        weights.push((-((i * i) as f32) / (2.0 * sigma * sigma)).exp());
    }
    let total: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }

    let w = width as i32;
    let h = height as i32;
    let sample = |buffer: &[Pixel], x: i32, y: i32| -> Pixel {
        let x = x.clamp(0, w - 1);
        let y = y.clamp(0, h - 1);
        buffer[(y * w + x) as usize]
    };

    // 水平方向
    let mut scratch = pixels.to_vec();
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (i, weight) in weights.iter().enumerate() {
                let p = sample(pixels, x + i as i32 - half, y);
                acc[0] += p.b as f32 * weight;
                acc[1] += p.g as f32 * weight;
                acc[2] += p.r as f32 * weight;
                acc[3] += p.a as f32 * weight;
            }
            scratch[(y * w + x) as usize] = Pixel {
                b: acc[0].round().clamp(0.0, 255.0) as u8,
                g: acc[1].round().clamp(0.0, 255.0) as u8,
                r: acc[2].round().clamp(0.0, 255.0) as u8,
                a: acc[3].round().clamp(0.0, 255.0) as u8,
            };
        }
    }

    // 垂直方向
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (i, weight) in weights.iter().enumerate() {
                let p = sample(&scratch, x, y + i as i32 - half);
                acc[0] += p.b as f32 * weight;
                acc[1] += p.g as f32 * weight;
                acc[2] += p.r as f32 * weight;
                acc[3] += p.a as f32 * weight;
            }
            pixels[(y * w + x) as usize] = Pixel {
                b: acc[0].round().clamp(0.0, 255.0) as u8,
                g: acc[1].round().clamp(0.0, 255.0) as u8,
                r: acc[2].round().clamp(0.0, 255.0) as u8,
                a: acc[3].round().clamp(0.0, 255.0) as u8,
            };
        }
    }
}

/// 反锐化掩模：out = src + amount · (src − box3(src))
///
/// 只作用于颜色通道，透明度保持不动，避免破坏镂空边缘。
pub fn sharpen(pixels: &mut [Pixel], width: u32, height: u32, amount: f32) {
    if amount <= 0.0 {
        return;
    }

    let w = width as i32;
    let h = height as i32;
    let source = pixels.to_vec();

    for y in 0..h {
        for x in 0..w {
            let mut sums = [0u32; 3];
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let sx = (x + dx).clamp(0, w - 1);
                    let sy = (y + dy).clamp(0, h - 1);
                    let p = source[(sy * w + sx) as usize];
                    sums[0] += p.b as u32;
                    sums[1] += p.g as u32;
                    sums[2] += p.r as u32;
                }
            }

            let p = &mut pixels[(y * w + x) as usize];
            let src = source[(y * w + x) as usize];
            let apply = |value: u8, blurred: f32| -> u8 {
                (value as f32 + amount * (value as f32 - blurred))
                    .round()
                    .clamp(0.0, 255.0) as u8
            };
            p.b = apply(src.b, sums[0] as f32 / 9.0);
            p.g = apply(src.g, sums[1] as f32 / 9.0);
            p.r = apply(src.r, sums[2] as f32 / 9.0);
        }
    }
}

/// 透明度偏置：把 bias ∈ [-1,1] 映射为 ±255 后加到每个透明度上
pub fn alpha_bias(pixels: &mut [Pixel], bias: f32) {
    if bias == 0.0 {
        return;
    }

    let delta = (bias * 255.0).round() as i32;
    for pixel in pixels {
        pixel.a = (pixel.a as i32 + delta).clamp(0, 255) as u8;
    }
}

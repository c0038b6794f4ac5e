//! P8 凹凸贴图调色板

use crate::image::pixel::Pixel;

/// 调色板类型
pub type Palette = [Pixel; 256];

/// P8 凹凸贴图使用的 256 项法线调色板
///
/// 索引 0 是朝向正上方的法线，其余 255 项按 15 个仰角环 × 17 个方位角
/// 均匀量化半球面。生成是确定性的，同一索引在每次编译中都对应同一个
/// 法线。
pub struct BumpPalette {
    entries: Palette,
}

impl BumpPalette {
    /// 生成调色板
    pub fn new() -> Self {
        let mut entries = [Pixel::default(); 256];
        entries[0] = encode_normal(0.0, 0.0, 1.0);

        let mut index = 1;
        for ring in 1..=15u32 {
            let theta = std::f32::consts::FRAC_PI_2 * ring as f32 / 15.0;
            for sector in 0..17u32 {
                let phi = std::f32::consts::TAU * sector as f32 / 17.0;
                let x = theta.sin() * phi.cos();
                let y = theta.sin() * phi.sin();
                let z = theta.cos();
                entries[index] = encode_normal(x, y, z);
                index += 1;
            }
        }

        Self { entries }
    }

    /// 获取调色板
    pub fn entries(&self) -> &Palette {
        &self.entries
    }

    /// 获取指定索引的颜色
    pub fn get(&self, index: u8) -> Pixel {
        self.entries[index as usize]
    }

    /// 查找最接近的调色板索引（感知加权的最近邻）
    ///
    /// 权重沿用亮度公式的 299/587/114，透明度不参与比较。
    pub fn find_closest(&self, pixel: Pixel) -> u8 {
        let mut best_index = 0u8;
        let mut best_distance = u64::MAX;

        for (i, entry) in self.entries.iter().enumerate() {
            let dr = entry.r as i64 - pixel.r as i64;
            let dg = entry.g as i64 - pixel.g as i64;
            let db = entry.b as i64 - pixel.b as i64;
            let distance = (299 * dr * dr + 587 * dg * dg + 114 * db * db) as u64;

            if distance < best_distance {
                best_distance = distance;
                best_index = i as u8;
            }
        }

        best_index
    }
}

impl Default for BumpPalette {
    fn default() -> Self {
        Self::new()
    }
}

/// 把单位法线编码为 RGB（各分量从 [-1,1] 映射到 [0,255]）
fn encode_normal(x: f32, y: f32, z: f32) -> Pixel {
    let quantize = |v: f32| -> u8 { ((v * 0.5 + 0.5) * 255.0).round().clamp(0.0, 255.0) as u8 };
    Pixel::new(255, quantize(x), quantize(y), quantize(z))
}

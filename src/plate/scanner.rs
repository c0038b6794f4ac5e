//! 色板扫描器
//!
//! 按色键约定把一张色板图像拆解为逻辑位图、序列和精灵。色键使用三个
//! 保留色（只比较 RGB，忽略透明度）：
//!
//! - 蓝色 (0,0,255)：行内分隔位图的背景色
//! - 品红 (255,0,255)：整行的序列分隔色（只在左上角像素为品红时生效）
//! - 青色 (0,255,255)：行内的占位色，兼作精灵注册点标记
//!
//! 左上角像素不是保留色时，整张色板就是一个 2D 位图。

use crate::error::{BitmapError, Result};
use crate::image::pixel::is_power_of_two;
use crate::image::Pixel;
use crate::plate::{ScannedBitmap, ScannedColorPlate, Sequence, Sprite};
use crate::tag::{BitmapType, BitmapUsage};

/// 背景色键
const KEY_BLUE: Pixel = Pixel::new(255, 0, 0, 255);
/// 序列分隔色键
const KEY_MAGENTA: Pixel = Pixel::new(255, 255, 0, 255);
/// 占位色键
const KEY_CYAN: Pixel = Pixel::new(255, 0, 255, 255);

/// 扫描一张色板
pub fn scan_color_plate(
    pixels: &[Pixel],
    width: u32,
    height: u32,
    bitmap_type: BitmapType,
    usage: BitmapUsage,
    filthy_sprite_bug_fix: bool,
    allow_non_power_of_two: bool,
) -> Result<ScannedColorPlate> {
    if width == 0 || height == 0 || pixels.len() != (width * height) as usize {
        return Err(BitmapError::InvalidPlate(
            "色板为空或像素数与尺寸不符".to_string(),
        ));
    }

    tracing::debug!(
        "扫描色板: {}x{}, 类型 {:?}, 用途 {:?}",
        width,
        height,
        bitmap_type,
        usage
    );

    let scanner = PlateScanner {
        pixels,
        width,
        height,
        bitmap_type,
        filthy_sprite_bug_fix,
    };

    let top_left = pixels[0];
    let structured = top_left.same_rgb(KEY_BLUE)
        || top_left.same_rgb(KEY_MAGENTA)
        || top_left.same_rgb(KEY_CYAN);

    let mut plate = if structured {
        scanner.scan_structured()?
    } else {
        scanner.scan_whole_plate()
    };

    merge_grouped_bitmaps(&mut plate, bitmap_type)?;
    check_power_of_two(&plate, bitmap_type, allow_non_power_of_two)?;

    tracing::debug!(
        "扫描完成: {} 个位图, {} 个序列",
        plate.bitmaps.len(),
        plate.sequences.len()
    );

    Ok(plate)
}

/// 位图的包围矩形（右、下为开区间，色板坐标系）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl Rect {
    fn width(&self) -> u32 {
        self.right - self.left
    }

    fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

struct PlateScanner<'a> {
    pixels: &'a [Pixel],
    width: u32,
    height: u32,
    bitmap_type: BitmapType,
    filthy_sprite_bug_fix: bool,
}

impl PlateScanner<'_> {
    fn at(&self, x: u32, y: u32) -> Pixel {
        self.pixels[(y * self.width + x) as usize]
    }

    /// 左上角不是保留色：整张色板就是唯一的位图
    fn scan_whole_plate(&self) -> ScannedColorPlate {
        let bitmap = ScannedBitmap::new(self.width, self.height, self.pixels.to_vec());

        ScannedColorPlate {
            bitmaps: vec![bitmap],
            sequences: vec![Sequence {
                first_bitmap: 0,
                bitmap_count: 1,
                sprites: Vec::new(),
            }],
            plate_width: self.width,
            plate_height: self.height,
            plate_pixels: Some(self.pixels.to_vec()),
        }
    }

    fn scan_structured(&self) -> Result<ScannedColorPlate> {
        let magenta_keyed = self.at(0, 0).same_rgb(KEY_MAGENTA);
        let bands = self.find_bands(magenta_keyed)?;

        if magenta_keyed && !self.pixels.iter().any(|p| p.same_rgb(KEY_BLUE)) {
            return Err(BitmapError::InvalidPlate(
                "使用了序列分隔色但没有蓝色背景".to_string(),
            ));
        }

        let mut plate = ScannedColorPlate {
            bitmaps: Vec::new(),
            sequences: Vec::new(),
            plate_width: self.width,
            plate_height: self.height,
            plate_pixels: Some(self.pixels.to_vec()),
        };

        for (band_top, band_bottom) in bands {
            let rects = self.find_rectangles(band_top, band_bottom, magenta_keyed)?;

            if self.bitmap_type == BitmapType::Sprites {
                let mut sequence = Sequence::default();
                for rect in rects {
                    let (bitmap, sprite) = self.extract_sprite(rect, plate.bitmaps.len())?;
                    plate.bitmaps.push(bitmap);
                    sequence.sprites.push(sprite);
                }
                plate.sequences.push(sequence);
            } else {
                let first_bitmap = plate.bitmaps.len();
                for rect in &rects {
                    plate.bitmaps.push(self.extract_bitmap(*rect));
                }
                plate.sequences.push(Sequence {
                    first_bitmap,
                    bitmap_count: rects.len(),
                    sprites: Vec::new(),
                });
            }
        }

        if plate.bitmaps.is_empty() {
            return Err(BitmapError::EmptyBitmap);
        }

        Ok(plate)
    }

    /// 把色板按整行品红分隔成水平条带，每个条带是一个序列
    fn find_bands(&self, magenta_keyed: bool) -> Result<Vec<(u32, u32)>> {
        if !magenta_keyed {
            return Ok(vec![(0, self.height)]);
        }

        let mut divider = vec![false; self.height as usize];
        for y in 0..self.height {
            let magenta_count = (0..self.width)
                .filter(|&x| self.at(x, y).same_rgb(KEY_MAGENTA))
                .count() as u32;

            if magenta_count == self.width {
                divider[y as usize] = true;
            } else if magenta_count > 0 {
                return Err(BitmapError::InvalidPlate(format!(
                    "第 {y} 行的序列分隔色没有贯穿整行"
                )));
            }
        }

        let mut bands = Vec::new();
        let mut start = None;
        for y in 0..self.height {
            match (divider[y as usize], start) {
                (false, None) => start = Some(y),
                (true, Some(s)) => {
                    bands.push((s, y));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            bands.push((s, self.height));
        }

        Ok(bands)
    }

    /// 在一个条带内定位所有蓝色分隔出来的最大矩形
    ///
    /// 矩形按 (top, left) 排序；只含青色的矩形是占位空间，直接跳过。
    fn find_rectangles(
        &self,
        band_top: u32,
        band_bottom: u32,
        magenta_keyed: bool,
    ) -> Result<Vec<Rect>> {
        let mut claimed = vec![false; (self.width * self.height) as usize];
        let mut rects = Vec::new();

        for y in band_top..band_bottom {
            for x in 0..self.width {
                let index = (y * self.width + x) as usize;
                if claimed[index] || self.at(x, y).same_rgb(KEY_BLUE) {
                    continue;
                }

                let rect = self.expand_rectangle(x, y, band_top, band_bottom);
                for yy in rect.top..rect.bottom {
                    for xx in rect.left..rect.right {
                        claimed[(yy * self.width + xx) as usize] = true;
                    }
                }

                if self.rect_is_dummy(rect) {
                    continue;
                }

                // 精灵不允许直接贴着序列分隔行
                if self.bitmap_type == BitmapType::Sprites && magenta_keyed {
                    let presses_top = band_top > 0 && rect.top == band_top;
                    let presses_bottom = band_bottom < self.height && rect.bottom == band_bottom;
                    if presses_top || presses_bottom {
                        return Err(BitmapError::SpriteOutsideRow);
                    }
                }

                rects.push(rect);
            }
        }

        rects.sort_by_key(|r| (r.top, r.left));
        Ok(rects)
    }

    /// 从一个非蓝色像素出发扩张矩形，直到包围盒四周都是蓝色
    ///
    /// 条带边界和色板边界都视作分隔。环检查包含四个角，保证对角相邻的
    /// 内容也被并入同一个矩形。
    fn expand_rectangle(&self, x: u32, y: u32, band_top: u32, band_bottom: u32) -> Rect {
        let mut rect = Rect {
            left: x,
            top: y,
            right: x + 1,
            bottom: y + 1,
        };

        loop {
            let mut grown = false;

            let ring_left = rect.left.saturating_sub(1);
            let ring_right = (rect.right + 1).min(self.width);
            let ring_top = rect.top.max(band_top).saturating_sub(1).max(band_top);
            let ring_bottom = (rect.bottom + 1).min(band_bottom);

            'scan: for yy in ring_top..ring_bottom {
                for xx in ring_left..ring_right {
                    let inside = yy >= rect.top
                        && yy < rect.bottom
                        && xx >= rect.left
                        && xx < rect.right;
                    if inside || self.at(xx, yy).same_rgb(KEY_BLUE) {
                        continue;
                    }

                    rect.left = rect.left.min(xx);
                    rect.right = rect.right.max(xx + 1);
                    rect.top = rect.top.min(yy);
                    rect.bottom = rect.bottom.max(yy + 1);
                    grown = true;
                    break 'scan;
                }
            }

            if !grown {
                return rect;
            }
        }
    }

    /// 矩形是否只由蓝色和青色组成（占位空间）
    fn rect_is_dummy(&self, rect: Rect) -> bool {
        for y in rect.top..rect.bottom {
            for x in rect.left..rect.right {
                let p = self.at(x, y);
                if !p.same_rgb(KEY_BLUE) && !p.same_rgb(KEY_CYAN) {
                    return false;
                }
            }
        }
        true
    }

    /// 注册点：矩形内恰好只有一个青色像素时取该像素，否则取几何中心
    fn registration_point(&self, rect: Rect) -> (i32, i32) {
        let mut cyan = None;
        let mut cyan_count = 0;

        for y in rect.top..rect.bottom {
            for x in rect.left..rect.right {
                if self.at(x, y).same_rgb(KEY_CYAN) {
                    cyan = Some((x as i32, y as i32));
                    cyan_count += 1;
                }
            }
        }

        match (cyan, cyan_count) {
            (Some(point), 1) => point,
            _ => (
                (rect.left + rect.right) as i32 / 2,
                (rect.top + rect.bottom) as i32 / 2,
            ),
        }
    }

    /// 提取一个普通位图（矩形内容原样复制）
    fn extract_bitmap(&self, rect: Rect) -> ScannedBitmap {
        let mut pixels = Vec::with_capacity((rect.width() * rect.height()) as usize);
        for y in rect.top..rect.bottom {
            for x in rect.left..rect.right {
                pixels.push(self.at(x, y));
            }
        }

        let (reg_x, reg_y) = self.registration_point(rect);
        let mut bitmap = ScannedBitmap::new(rect.width(), rect.height(), pixels);
        bitmap.registration_point = (reg_x - rect.left as i32, reg_y - rect.top as i32);
        bitmap
    }

    /// 提取一个精灵：裁掉四周全为蓝色/青色的边，矩形内残留的色键像素
    /// 替换成完全透明，让图集的中性填充色透出来
    fn extract_sprite(&self, rect: Rect, bitmap_index: usize) -> Result<(ScannedBitmap, Sprite)> {
        let trimmed = self.trim_rect(rect).ok_or(BitmapError::EmptyBitmap)?;

        let mut pixels = Vec::with_capacity((trimmed.width() * trimmed.height()) as usize);
        for y in trimmed.top..trimmed.bottom {
            for x in trimmed.left..trimmed.right {
                let p = self.at(x, y);
                if p.same_rgb(KEY_BLUE) || p.same_rgb(KEY_CYAN) {
                    pixels.push(Pixel::new(0, 0, 0, 0));
                } else {
                    pixels.push(p);
                }
            }
        }

        let (reg_x, reg_y) = self.registration_point(rect);
        let (origin_x, origin_y) = if self.filthy_sprite_bug_fix {
            (trimmed.left, trimmed.top)
        } else {
            (rect.left, rect.top)
        };

        let bitmap = ScannedBitmap::new(trimmed.width(), trimmed.height(), pixels);
        let sprite = Sprite {
            bitmap_index,
            left: 0,
            top: 0,
            right: trimmed.width(),
            bottom: trimmed.height(),
            registration_x: reg_x - origin_x as i32,
            registration_y: reg_y - origin_y as i32,
            original_width: trimmed.width(),
            original_height: trimmed.height(),
        };

        Ok((bitmap, sprite))
    }

    /// 裁掉矩形四周全部由蓝色/青色组成的行和列
    fn trim_rect(&self, rect: Rect) -> Option<Rect> {
        let is_edge = |p: Pixel| p.same_rgb(KEY_BLUE) || p.same_rgb(KEY_CYAN);
        let row_is_edge =
            |y: u32, r: &Rect| (r.left..r.right).all(|x| is_edge(self.at(x, y)));
        let column_is_edge =
            |x: u32, r: &Rect| (r.top..r.bottom).all(|y| is_edge(self.at(x, y)));

        let mut trimmed = rect;
        while trimmed.top < trimmed.bottom && row_is_edge(trimmed.top, &trimmed) {
            trimmed.top += 1;
        }
        while trimmed.bottom > trimmed.top && row_is_edge(trimmed.bottom - 1, &trimmed) {
            trimmed.bottom -= 1;
        }
        while trimmed.left < trimmed.right && column_is_edge(trimmed.left, &trimmed) {
            trimmed.left += 1;
        }
        while trimmed.right > trimmed.left && column_is_edge(trimmed.right - 1, &trimmed) {
            trimmed.right -= 1;
        }

        if trimmed.width() == 0 || trimmed.height() == 0 {
            None
        } else {
            Some(trimmed)
        }
    }
}

/// 立方体贴图把每 6 个位图并成一个，3D 贴图把整个序列叠成切片
fn merge_grouped_bitmaps(plate: &mut ScannedColorPlate, bitmap_type: BitmapType) -> Result<()> {
    if bitmap_type != BitmapType::CubeMap && bitmap_type != BitmapType::ThreeDimensional {
        return Ok(());
    }

    let mut merged_bitmaps = Vec::new();
    let mut merged_sequences = Vec::new();

    for sequence in &plate.sequences {
        let members =
            &plate.bitmaps[sequence.first_bitmap..sequence.first_bitmap + sequence.bitmap_count];

        let group_size = match bitmap_type {
            BitmapType::CubeMap => {
                if members.len() % 6 != 0 {
                    return Err(BitmapError::InvalidPlate(
                        "立方体贴图序列的位图数必须是 6 的倍数".to_string(),
                    ));
                }
                6
            }
            _ => members.len(),
        };

        let first = merged_bitmaps.len();
        let mut count = 0;

        if !members.is_empty() {
            for group in members.chunks(group_size) {
                let (width, height) = (group[0].width, group[0].height);
                if group.iter().any(|b| b.width != width || b.height != height) {
                    return Err(BitmapError::InvalidPlate(
                        "同一组内的位图尺寸必须一致".to_string(),
                    ));
                }

                let mut pixels = Vec::with_capacity((width * height) as usize * group.len());
                for member in group {
                    pixels.extend_from_slice(&member.pixels);
                }

                let mut bitmap = ScannedBitmap::new(width, height, pixels);
                match bitmap_type {
                    BitmapType::CubeMap => bitmap.faces = 6,
                    _ => bitmap.depth = group.len() as u32,
                }
                bitmap.registration_point = group[0].registration_point;
                merged_bitmaps.push(bitmap);
                count += 1;
            }
        }

        merged_sequences.push(Sequence {
            first_bitmap: first,
            bitmap_count: count,
            sprites: Vec::new(),
        });
    }

    plate.bitmaps = merged_bitmaps;
    plate.sequences = merged_sequences;
    Ok(())
}

/// 非界面、非精灵的位图必须是 2 的幂尺寸
fn check_power_of_two(
    plate: &ScannedColorPlate,
    bitmap_type: BitmapType,
    allow_non_power_of_two: bool,
) -> Result<()> {
    if matches!(bitmap_type, BitmapType::Interface | BitmapType::Sprites) || allow_non_power_of_two
    {
        return Ok(());
    }

    for bitmap in &plate.bitmaps {
        if !is_power_of_two(bitmap.width) || !is_power_of_two(bitmap.height) {
            return Err(BitmapError::NonPowerOfTwo(bitmap.width, bitmap.height));
        }
    }

    Ok(())
}

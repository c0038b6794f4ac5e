//! 精灵图集打包
//!
//! 按面积从大到小做货架（shelf）打包。每个精灵四周预留 spacing 像素
//! 的空隙，图集空隙用精灵混合用途对应的中性色填充，保证双线性采样越
//! 过精灵边缘时取到该混合模式的单位元。

use crate::error::{BitmapError, Result};
use crate::image::pixel::next_power_of_two;
use crate::image::Pixel;
use crate::plate::{ScannedBitmap, ScannedColorPlate};
use crate::tag::SpriteUsage;

/// 精灵打包参数
#[derive(Debug, Clone)]
pub struct SpriteParameters {
    /// 混合用途（决定中性填充色）
    pub sprite_usage: SpriteUsage,
    /// 图集最大边长（32/64/128/256/512/1024 之一）
    pub sprite_budget: u32,
    /// 图集数量上限，0 表示不限
    pub sprite_budget_count: u32,
    /// 每个精灵四周的空隙
    pub sprite_spacing: u32,
    /// 强制方形图集
    pub force_square_sheets: bool,
}

/// 混合用途的中性填充色
fn neutral_color(usage: SpriteUsage) -> Pixel {
    match usage {
        SpriteUsage::BlendAddSubtractMax => Pixel::new(0, 0, 0, 0),
        SpriteUsage::MultiplyMin => Pixel::new(255, 255, 255, 255),
        SpriteUsage::DoubleMultiply => Pixel::new(255, 128, 128, 128),
    }
}

/// 打包中的一个货架
struct Shelf {
    y: u32,
    height: u32,
    x_used: u32,
}

/// 打包中的一张图集
struct Sheet {
    shelves: Vec<Shelf>,
    height_used: u32,
}

impl Sheet {
    fn new() -> Self {
        Self {
            shelves: Vec::new(),
            height_used: 0,
        }
    }

    /// 尝试放入 w×h 的矩形，成功时返回左上角位置
    fn place(&mut self, w: u32, h: u32, budget: u32) -> Option<(u32, u32)> {
        for shelf in &mut self.shelves {
            if h <= shelf.height && shelf.x_used + w <= budget {
                let position = (shelf.x_used, shelf.y);
                shelf.x_used += w;
                return Some(position);
            }
        }

        if self.height_used + h <= budget {
            let shelf = Shelf {
                y: self.height_used,
                height: h,
                x_used: w,
            };
            self.height_used += h;
            let position = (0, shelf.y);
            self.shelves.push(shelf);
            return Some(position);
        }

        None
    }
}

/// 一次放置结果
struct Placement {
    sequence_index: usize,
    sprite_index: usize,
    sheet_index: usize,
    x: u32,
    y: u32,
}

/// 把扫描出来的精灵打包进图集，并把色板的位图列表替换为图集
pub fn pack_sprites(plate: &mut ScannedColorPlate, params: &SpriteParameters) -> Result<()> {
    let budget = params.sprite_budget;
    let spacing = params.sprite_spacing;

    // 面积从大到小，同面积保持输入顺序
    let mut order = Vec::new();
    for (sequence_index, sequence) in plate.sequences.iter().enumerate() {
        for (sprite_index, sprite) in sequence.sprites.iter().enumerate() {
            let padded_w = sprite.original_width + spacing * 2;
            let padded_h = sprite.original_height + spacing * 2;
            order.push((sequence_index, sprite_index, padded_w, padded_h));
        }
    }
    order.sort_by_key(|&(_, _, w, h)| std::cmp::Reverse(w as u64 * h as u64));

    let mut sheets: Vec<Sheet> = Vec::new();
    let mut placements = Vec::new();

    for (sequence_index, sprite_index, padded_w, padded_h) in order {
        if padded_w > budget || padded_h > budget {
            return Err(BitmapError::SpriteBudgetExceeded(budget));
        }

        let mut placed = None;
        for (sheet_index, sheet) in sheets.iter_mut().enumerate() {
            if let Some((x, y)) = sheet.place(padded_w, padded_h, budget) {
                placed = Some((sheet_index, x, y));
                break;
            }
        }

        let (sheet_index, x, y) = match placed {
            Some(p) => p,
            None => {
                if params.sprite_budget_count > 0
                    && sheets.len() as u32 >= params.sprite_budget_count
                {
                    return Err(BitmapError::SpriteBudgetExceeded(budget));
                }
                let mut sheet = Sheet::new();
                let (x, y) = sheet
                    .place(padded_w, padded_h, budget)
                    .ok_or(BitmapError::SpriteBudgetExceeded(budget))?;
                sheets.push(sheet);
                (sheets.len() - 1, x, y)
            }
        };

        placements.push(Placement {
            sequence_index,
            sprite_index,
            sheet_index,
            x: x + spacing,
            y: y + spacing,
        });
    }

    tracing::debug!("{} 个精灵打包进 {} 张图集", placements.len(), sheets.len());

    // 生成图集位图
    let background = neutral_color(params.sprite_usage);
    let mut sheet_bitmaps = Vec::with_capacity(sheets.len());
    for sheet in &sheets {
        let sheet_height = if params.force_square_sheets {
            budget
        } else {
            next_power_of_two(sheet.height_used.max(1)).min(budget)
        };
        sheet_bitmaps.push(ScannedBitmap::new(
            budget,
            sheet_height,
            vec![background; (budget * sheet_height) as usize],
        ));
    }

    // 把精灵内容混合到图集上，并换算矩形和注册点
    let source_bitmaps = std::mem::take(&mut plate.bitmaps);
    for placement in &placements {
        let sprite =
            &mut plate.sequences[placement.sequence_index].sprites[placement.sprite_index];
        let source = &source_bitmaps[sprite.bitmap_index];
        let sheet = &mut sheet_bitmaps[placement.sheet_index];

        for y in 0..sprite.original_height {
            for x in 0..sprite.original_width {
                let src = source.pixels[(y * source.width + x) as usize];
                let dst_index =
                    ((placement.y + y) * sheet.width + placement.x + x) as usize;
                sheet.pixels[dst_index] = sheet.pixels[dst_index].alpha_blend(src);
            }
        }

        sprite.bitmap_index = placement.sheet_index;
        sprite.left = placement.x;
        sprite.top = placement.y;
        sprite.right = placement.x + sprite.original_width;
        sprite.bottom = placement.y + sprite.original_height;
        sprite.registration_x += placement.x as i32;
        sprite.registration_y += placement.y as i32;
    }

    plate.bitmaps = sheet_bitmaps;
    Ok(())
}

//! 编译选项

use crate::process::MipmapScaleType;
use crate::tag::{BitmapFormat, BitmapType, BitmapUsage, SpriteUsage};
use std::path::PathBuf;

/// 一次标签编译的全部选项
///
/// `Option` 字段未给出时，先从目标位置已有的标签回收，再落到内建
/// 默认值；见 `tag::assembler::resolve_options`。
#[derive(Debug, Clone)]
pub struct BitmapOptions {
    /// 数据目录（源图片所在）
    pub data_dir: PathBuf,
    /// 标签目录（输出所在）
    pub tags_dir: PathBuf,
    /// 忽略已有标签里的值
    pub ignore_tag_data: bool,
    /// 用标签内嵌的色板重新生成
    pub regenerate: bool,
    /// 允许非 2 的幂的位图
    pub allow_non_power_of_two: bool,
    /// 编码格式类别；None 且未显式要求自动时可被已有标签回填
    pub format: Option<BitmapFormat>,
    /// 显式要求自动选择格式（阻止已有标签回填 format）
    pub auto_format: bool,
    /// 位图类型
    pub bitmap_type: Option<BitmapType>,
    /// 位图用途
    pub usage: Option<BitmapUsage>,
    /// mipmap 数量上限，i16::MAX 表示完整链
    pub mipmap_count: Option<u16>,
    /// mipmap 缩小滤波（不写入标签）
    pub mipmap_scale: Option<MipmapScaleType>,
    /// 细节淡出因子 ∈ [0,1]
    pub detail_fade: Option<f32>,
    /// 精灵混合用途
    pub sprite_usage: Option<SpriteUsage>,
    /// 图集最大边长 ∈ {32,64,128,256,512,1024}
    pub sprite_budget: Option<u32>,
    /// 图集数量上限，0 不限
    pub sprite_budget_count: Option<u32>,
    /// 精灵四周的空隙
    pub sprite_spacing: Option<u16>,
    /// 强制方形图集
    pub force_square_sheets: bool,
    /// 高度图做 P8 调色板化
    pub palettize: Option<bool>,
    /// 表观凹凸高度
    pub bump_height: Option<f32>,
    /// 透明度偏置 ∈ [-1,1]
    pub alpha_bias: Option<f32>,
    /// 沿用历史上的精灵注册点修正
    pub filthy_sprite_bug_fix: Option<bool>,
    /// 锐化强度 ∈ (0,1]
    pub sharpen: Option<f32>,
    /// 模糊半径 > 0
    pub blur: Option<f32>,
    /// 16 位格式的有序抖动
    pub dithering: Option<bool>,
}

impl Default for BitmapOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            tags_dir: PathBuf::from("tags"),
            ignore_tag_data: false,
            regenerate: false,
            allow_non_power_of_two: false,
            format: None,
            auto_format: false,
            bitmap_type: None,
            usage: None,
            mipmap_count: None,
            mipmap_scale: None,
            detail_fade: None,
            sprite_usage: None,
            sprite_budget: None,
            sprite_budget_count: None,
            sprite_spacing: None,
            force_square_sheets: false,
            palettize: None,
            bump_height: None,
            alpha_bias: None,
            filthy_sprite_bug_fix: None,
            sharpen: None,
            blur: None,
            dithering: None,
        }
    }
}

//! 位图标签数据模型

pub mod assembler;
pub mod io;

pub use assembler::{compile_tag, regenerate_pixels};

use crate::error::{BitmapError, Result};

/// 位图标签的类型字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BitmapType {
    /// 2D 贴图
    TwoDimensional = 0,
    /// 3D 贴图
    ThreeDimensional = 1,
    /// 立方体贴图
    CubeMap = 2,
    /// 精灵图集
    Sprites = 3,
    /// 界面位图（允许任意尺寸）
    Interface = 4,
}

impl BitmapType {
    /// 从序列化值还原
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::TwoDimensional),
            1 => Ok(Self::ThreeDimensional),
            2 => Ok(Self::CubeMap),
            3 => Ok(Self::Sprites),
            4 => Ok(Self::Interface),
            _ => Err(BitmapError::UnsupportedFormat(format!("位图类型 {value}"))),
        }
    }
}

/// 编码格式类别（标签头的 format 字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BitmapFormat {
    Dxt1 = 0,
    Dxt3 = 1,
    Dxt5 = 2,
    Sixteen = 3,
    ThirtyTwo = 4,
    Monochrome = 5,
}

impl BitmapFormat {
    /// 从序列化值还原
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::Dxt1),
            1 => Ok(Self::Dxt3),
            2 => Ok(Self::Dxt5),
            3 => Ok(Self::Sixteen),
            4 => Ok(Self::ThirtyTwo),
            5 => Ok(Self::Monochrome),
            _ => Err(BitmapError::UnsupportedFormat(format!("编码类别 {value}"))),
        }
    }
}

/// 位图用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BitmapUsage {
    AlphaBlend = 0,
    Default = 1,
    HeightMap = 2,
    DetailMap = 3,
    LightMap = 4,
    VectorMap = 5,
}

impl BitmapUsage {
    /// 从序列化值还原
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::AlphaBlend),
            1 => Ok(Self::Default),
            2 => Ok(Self::HeightMap),
            3 => Ok(Self::DetailMap),
            4 => Ok(Self::LightMap),
            5 => Ok(Self::VectorMap),
            _ => Err(BitmapError::UnsupportedFormat(format!("位图用途 {value}"))),
        }
    }
}

/// 精灵混合用途，决定图集空隙的中性填充色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SpriteUsage {
    BlendAddSubtractMax = 0,
    MultiplyMin = 1,
    DoubleMultiply = 2,
}

impl SpriteUsage {
    /// 从序列化值还原
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::BlendAddSubtractMax),
            1 => Ok(Self::MultiplyMin),
            2 => Ok(Self::DoubleMultiply),
            _ => Err(BitmapError::UnsupportedFormat(format!("精灵用途 {value}"))),
        }
    }
}

/// 输出像素数据的格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PixelFormat {
    A8 = 0,
    Y8 = 1,
    Ay8 = 2,
    A8Y8 = 3,
    R5G6B5 = 6,
    A1R5G5B5 = 8,
    A4R4G4B4 = 9,
    X8R8G8B8 = 10,
    A8R8G8B8 = 11,
    Dxt1 = 14,
    Dxt3 = 15,
    Dxt5 = 16,
    P8Bump = 17,
}

impl PixelFormat {
    /// 从序列化值还原
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::A8),
            1 => Ok(Self::Y8),
            2 => Ok(Self::Ay8),
            3 => Ok(Self::A8Y8),
            6 => Ok(Self::R5G6B5),
            8 => Ok(Self::A1R5G5B5),
            9 => Ok(Self::A4R4G4B4),
            10 => Ok(Self::X8R8G8B8),
            11 => Ok(Self::A8R8G8B8),
            14 => Ok(Self::Dxt1),
            15 => Ok(Self::Dxt3),
            16 => Ok(Self::Dxt5),
            17 => Ok(Self::P8Bump),
            _ => Err(BitmapError::UnsupportedFormat(format!("像素格式 {value}"))),
        }
    }

    /// 每像素位数
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            Self::A8 | Self::Y8 | Self::Ay8 | Self::P8Bump => 8,
            Self::A8Y8 | Self::R5G6B5 | Self::A1R5G5B5 | Self::A4R4G4B4 => 16,
            Self::X8R8G8B8 | Self::A8R8G8B8 => 32,
            Self::Dxt1 => 4,
            Self::Dxt3 | Self::Dxt5 => 8,
        }
    }

    /// 是否为 DXT 块压缩格式
    pub fn is_dxt(self) -> bool {
        matches!(self, Self::Dxt1 | Self::Dxt3 | Self::Dxt5)
    }
}

/// 单个输出位图的数据类型字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BitmapDataType {
    TwoDimensional = 0,
    ThreeDimensional = 1,
    CubeMap = 2,
    White = 3,
}

impl BitmapDataType {
    /// 从序列化值还原
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::TwoDimensional),
            1 => Ok(Self::ThreeDimensional),
            2 => Ok(Self::CubeMap),
            3 => Ok(Self::White),
            _ => Err(BitmapError::UnsupportedFormat(format!("位图数据类型 {value}"))),
        }
    }
}

/// 标签头 flags：启用扩散抖动
pub const FLAG_ENABLE_DITHERING: u16 = 0x1;
/// 标签头 flags：禁用高度图压缩（即不做 P8 调色板化）
pub const FLAG_DISABLE_HEIGHT_MAP_COMPRESSION: u16 = 0x2;
/// 标签头 flags：保留历史上的精灵注册点错误行为的修正
pub const FLAG_FILTHY_SPRITE_BUG_FIX: u16 = 0x8;

/// 位图数据 flags：宽高都是 2 的幂
pub const DATA_FLAG_POWER_OF_TWO: u16 = 0x1;
/// 位图数据 flags：DXT 块压缩
pub const DATA_FLAG_COMPRESSED: u16 = 0x2;
/// 位图数据 flags：调色板化（P8）
pub const DATA_FLAG_PALETTIZED: u16 = 0x4;
/// 位图数据 flags：像素已做 swizzle（编译器不产生，读取时保留）
pub const DATA_FLAG_SWIZZLED: u16 = 0x8;
/// 位图数据 flags：像素存放在外部缓存中（编译器不产生，读取时保留）
pub const DATA_FLAG_EXTERNAL: u16 = 0x100;

/// 把精灵预算边长映射为序列化枚举值（32→0 … 1024→5，非法值→0）
pub fn sprite_budget_to_enum(budget: u32) -> u16 {
    match budget {
        32 => 0,
        64 => 1,
        128 => 2,
        256 => 3,
        512 => 4,
        1024 => 5,
        _ => 0,
    }
}

/// 从序列化枚举值还原精灵预算边长
pub fn sprite_budget_from_enum(value: u16) -> u32 {
    32u32 << value.min(5)
}

/// 序列中的单个精灵记录（坐标已归一化到图集尺寸）
#[derive(Debug, Clone, PartialEq)]
pub struct TagSprite {
    /// 所在图集的位图索引
    pub bitmap_index: u16,
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    /// 归一化注册点
    pub registration_point: (f32, f32),
}

/// 序列记录
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSequence {
    /// 第一个位图索引
    pub first_bitmap_index: u16,
    /// 位图数量
    pub bitmap_count: u16,
    /// 精灵子记录
    pub sprites: Vec<TagSprite>,
}

/// 单个输出位图的元数据记录
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapData {
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub data_type: BitmapDataType,
    pub format: PixelFormat,
    pub flags: u16,
    /// 注册点（单位像素）
    pub registration_point: (i16, i16),
    /// 第 0 级之外的 mipmap 数量
    pub mipmap_count: u16,
    /// 在像素数据块中的偏移
    pub pixel_data_offset: u32,
    /// 像素数据长度
    pub pixel_data_size: u32,
    /// 所属序列索引
    pub sequence_index: u16,
}

/// 序列化的位图标签
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapTag {
    pub bitmap_type: BitmapType,
    pub format: BitmapFormat,
    pub usage: BitmapUsage,
    pub flags: u16,
    pub detail_fade: f32,
    pub sharpen: f32,
    pub bump_height: f32,
    pub sprite_budget_size: u16,
    pub sprite_budget_count: u16,
    pub color_plate_width: u16,
    pub color_plate_height: u16,
    /// 压缩后的色板（4 字节大端原始长度 + zlib 流），为空表示无法重新生成
    pub compressed_color_plate: Vec<u8>,
    pub blur_filter_size: f32,
    pub alpha_bias: f32,
    /// 0 表示完整 mipmap 链，否则为上限 + 1
    pub mipmap_count: u16,
    pub sprite_usage: SpriteUsage,
    pub sprite_spacing: u16,
    pub sequences: Vec<TagSequence>,
    pub bitmap_data: Vec<BitmapData>,
    /// 打包的像素数据块
    pub processed_pixel_data: Vec<u8>,
}

impl Default for BitmapTag {
    fn default() -> Self {
        Self {
            bitmap_type: BitmapType::TwoDimensional,
            format: BitmapFormat::ThirtyTwo,
            usage: BitmapUsage::Default,
            flags: 0,
            detail_fade: 0.0,
            sharpen: 0.0,
            bump_height: 0.0,
            sprite_budget_size: 0,
            sprite_budget_count: 0,
            color_plate_width: 0,
            color_plate_height: 0,
            compressed_color_plate: Vec::new(),
            blur_filter_size: 0.0,
            alpha_bias: 0.0,
            mipmap_count: 0,
            sprite_usage: SpriteUsage::BlendAddSubtractMax,
            sprite_spacing: 0,
            sequences: Vec::new(),
            bitmap_data: Vec::new(),
            processed_pixel_data: Vec::new(),
        }
    }
}

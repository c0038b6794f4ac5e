//! 错误类型定义

use thiserror::Error;

/// 位图编译器错误类型
#[derive(Error, Debug)]
pub enum BitmapError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("图片解码错误: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("在数据目录中找不到源图片: {0}")]
    InputNotFound(String),

    #[error("色板结构无效: {0}")]
    InvalidPlate(String),

    #[error("位图尺寸不是 2 的幂: {0}x{1}")]
    NonPowerOfTwo(u32, u32),

    #[error("精灵越过了所在的序列行")]
    SpriteOutsideRow,

    #[error("色板中没有任何位图")]
    EmptyBitmap,

    #[error("精灵超出图集预算 ({0}x{0})")]
    SpriteBudgetExceeded(u32),

    #[error("无法重新生成: {0}")]
    CannotRegenerate(String),

    #[error("标签中没有色板数据")]
    NoColorPlateData,

    #[error("色板解压后的长度不匹配")]
    CompressedSizeMismatch,

    #[error("不支持的像素格式: {0}")]
    UnsupportedFormat(String),

    #[error("标签文件无效: {0}")]
    InvalidTag(String),

    #[error("标签写入失败: {0}")]
    TagWriteFailed(String),
}

pub type Result<T> = std::result::Result<T, BitmapError>;

//! Bitmap Compiler - 位图标签编译器
//!
//! 把色板图像（TIFF/PNG/TGA/BMP）编译为引擎可直接加载的大端位图标签。
//! 支持的输出格式：
//! - DXT1/DXT3/DXT5 块压缩
//! - A8R8G8B8/X8R8G8B8 32 位
//! - R5G6B5/A1R5G5B5/A4R4G4B4 16 位
//! - A8/Y8/AY8/A8Y8 单色与 P8 凹凸调色板

#![warn(missing_docs)]
#![allow(dead_code)]

mod encode;
mod error;
mod image;
mod options;
mod plate;
mod process;
mod tag;

use error::Result;
use options::BitmapOptions;
use tracing::{error, info};

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("{} v{} 启动", APP_NAME, APP_VERSION);

    let mut arguments = std::env::args().skip(1);
    let tag_path = match arguments.next() {
        Some(path) => path,
        None => {
            info!("用法:");
            info!("  bitmap_compiler <标签路径>");
            info!("");
            info!("源图片按 .tif/.tiff/.png/.tga/.bmp 的顺序在 data/ 下探测,");
            info!("输出写到 tags/<标签路径>.bitmap。其余选项从已有标签回收,");
            info!("命令行解析由外层工具负责。");
            return Ok(());
        }
    };

    let options = BitmapOptions::default();
    match tag::compile_tag(&tag_path, &options) {
        Ok(path) => {
            info!("编译完成: {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("编译失败: {e}");
            Err(e)
        }
    }
}

/// 应用程序信息
pub const APP_NAME: &str = "Bitmap Compiler";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

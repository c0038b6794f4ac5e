//! 色板数据的压缩/解压缩

use crate::error::{BitmapError, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// 压缩色板像素数据
///
/// 输出为 4 字节大端的原始长度，后接最高压缩等级的 zlib 流。
pub fn compress_color_plate(raw: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(raw.len() / 2 + 4);
    output.write_u32::<BigEndian>(raw.len() as u32)?;

    let mut encoder = ZlibEncoder::new(&mut output, Compression::best());
    encoder.write_all(raw)?;
    encoder.finish()?;

    Ok(output)
}

/// 解压色板像素数据
///
/// 校验长度前缀：长度必须是每像素 4 字节的整数倍，且解压结果必须与
/// 声明的长度一致。
pub fn decompress_color_plate(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 4 {
        return Err(BitmapError::NoColorPlateData);
    }

    let declared = BigEndian::read_u32(&data[..4]) as usize;
    if declared == 0 || declared % 4 != 0 {
        return Err(BitmapError::CompressedSizeMismatch);
    }

    let mut decoder = ZlibDecoder::new(&data[4..]);
    let mut output = Vec::with_capacity(declared);
    decoder
        .read_to_end(&mut output)
        .map_err(|_| BitmapError::CompressedSizeMismatch)?;

    if output.len() != declared {
        return Err(BitmapError::CompressedSizeMismatch);
    }

    Ok(output)
}

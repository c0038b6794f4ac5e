//! 标签文件的大端序列化与解析
//!
//! 所有多字节标量都按大端写出；浮点是 IEEE-754 大端。引擎在加载时
//! 解析的指针在磁盘上一律清零（以 pad 字段的形式占位）。

use crate::error::{BitmapError, Result};
use crate::tag::{
    BitmapData, BitmapDataType, BitmapFormat, BitmapTag, BitmapType, BitmapUsage, PixelFormat,
    SpriteUsage, TagSequence, TagSprite,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// 标签类别四字码
const TAG_FOURCC: u32 = u32::from_be_bytes(*b"bitm");
/// 引擎四字码
const ENGINE_FOURCC: u32 = u32::from_be_bytes(*b"blam");
/// 文件头长度
const HEADER_SIZE: u32 = 64;
/// 文件头版本号
const HEADER_VERSION: u16 = 1;

/// 把标签序列化为完整的文件字节
pub fn write_tag(tag: &BitmapTag) -> Result<Vec<u8>> {
    let body = write_tag_body(tag)?;

    let mut crc = flate2::Crc::new();
    crc.update(&body);

    let mut output = Vec::with_capacity(HEADER_SIZE as usize + body.len());
    output.write_all(&[0u8; 36])?;
    output.write_u32::<BigEndian>(TAG_FOURCC)?;
    output.write_u32::<BigEndian>(crc.sum())?;
    output.write_u32::<BigEndian>(HEADER_SIZE)?;
    output.write_all(&[0u8; 8])?;
    output.write_u16::<BigEndian>(HEADER_VERSION)?;
    output.write_u16::<BigEndian>(255)?;
    output.write_u32::<BigEndian>(ENGINE_FOURCC)?;
    output.write_all(&body)?;

    Ok(output)
}

fn write_tag_body(tag: &BitmapTag) -> Result<Vec<u8>> {
    let mut w = Vec::new();

    w.write_u16::<BigEndian>(tag.bitmap_type as u16)?;
    w.write_u16::<BigEndian>(tag.format as u16)?;
    w.write_u16::<BigEndian>(tag.usage as u16)?;
    w.write_u16::<BigEndian>(tag.flags)?;
    w.write_f32::<BigEndian>(tag.detail_fade)?;
    w.write_f32::<BigEndian>(tag.sharpen)?;
    w.write_f32::<BigEndian>(tag.bump_height)?;
    w.write_u16::<BigEndian>(tag.sprite_budget_size)?;
    w.write_u16::<BigEndian>(tag.sprite_budget_count)?;
    w.write_u16::<BigEndian>(tag.color_plate_width)?;
    w.write_u16::<BigEndian>(tag.color_plate_height)?;
    w.write_u32::<BigEndian>(tag.compressed_color_plate.len() as u32)?;
    w.write_all(&tag.compressed_color_plate)?;
    w.write_u32::<BigEndian>(tag.processed_pixel_data.len() as u32)?;
    w.write_f32::<BigEndian>(tag.blur_filter_size)?;
    w.write_f32::<BigEndian>(tag.alpha_bias)?;
    w.write_u16::<BigEndian>(tag.mipmap_count)?;
    w.write_u16::<BigEndian>(tag.sprite_usage as u16)?;
    w.write_u16::<BigEndian>(tag.sprite_spacing)?;
    w.write_u32::<BigEndian>(tag.sequences.len() as u32)?;
    w.write_u32::<BigEndian>(tag.bitmap_data.len() as u32)?;

    for sequence in &tag.sequences {
        w.write_u16::<BigEndian>(sequence.first_bitmap_index)?;
        w.write_u16::<BigEndian>(sequence.bitmap_count)?;
        w.write_u32::<BigEndian>(sequence.sprites.len() as u32)?;

        for sprite in &sequence.sprites {
            w.write_u16::<BigEndian>(sprite.bitmap_index)?;
            w.write_u16::<BigEndian>(0)?;
            w.write_f32::<BigEndian>(sprite.left)?;
            w.write_f32::<BigEndian>(sprite.right)?;
            w.write_f32::<BigEndian>(sprite.top)?;
            w.write_f32::<BigEndian>(sprite.bottom)?;
            w.write_f32::<BigEndian>(sprite.registration_point.0)?;
            w.write_f32::<BigEndian>(sprite.registration_point.1)?;
        }
    }

    for data in &tag.bitmap_data {
        w.write_u16::<BigEndian>(data.width)?;
        w.write_u16::<BigEndian>(data.height)?;
        w.write_u16::<BigEndian>(data.depth)?;
        w.write_u16::<BigEndian>(data.data_type as u16)?;
        w.write_u16::<BigEndian>(data.format as u16)?;
        w.write_u16::<BigEndian>(data.flags)?;
        w.write_i16::<BigEndian>(data.registration_point.0)?;
        w.write_i16::<BigEndian>(data.registration_point.1)?;
        w.write_u16::<BigEndian>(data.mipmap_count)?;
        w.write_u16::<BigEndian>(0)?;
        w.write_u32::<BigEndian>(data.pixel_data_offset)?;
        w.write_u32::<BigEndian>(data.pixel_data_size)?;
        w.write_u16::<BigEndian>(data.sequence_index)?;
        w.write_u16::<BigEndian>(0)?;
    }

    w.write_all(&tag.processed_pixel_data)?;
    Ok(w)
}

/// 从文件字节解析标签
pub fn read_tag(bytes: &[u8]) -> Result<BitmapTag> {
    if bytes.len() < HEADER_SIZE as usize {
        return Err(BitmapError::InvalidTag("文件比文件头还短".to_string()));
    }

    let mut r = Cursor::new(bytes);
    let mut padding = [0u8; 36];
    r.read_exact(&mut padding)?;

    let fourcc = r.read_u32::<BigEndian>()?;
    if fourcc != TAG_FOURCC {
        return Err(BitmapError::InvalidTag(format!(
            "标签四字码不匹配: {fourcc:#010X}"
        )));
    }

    let stored_crc = r.read_u32::<BigEndian>()?;
    let header_size = r.read_u32::<BigEndian>()?;
    if header_size != HEADER_SIZE {
        return Err(BitmapError::InvalidTag(format!("文件头长度 {header_size}")));
    }

    let mut padding = [0u8; 8];
    r.read_exact(&mut padding)?;
    let version = r.read_u16::<BigEndian>()?;
    if version != HEADER_VERSION {
        return Err(BitmapError::InvalidTag(format!("不支持的版本 {version}")));
    }
    let _magic = r.read_u16::<BigEndian>()?;
    let engine = r.read_u32::<BigEndian>()?;
    if engine != ENGINE_FOURCC {
        return Err(BitmapError::InvalidTag("缺少引擎四字码".to_string()));
    }

    let body = &bytes[HEADER_SIZE as usize..];
    let mut crc = flate2::Crc::new();
    crc.update(body);
    if crc.sum() != stored_crc {
        return Err(BitmapError::InvalidTag("校验和不匹配".to_string()));
    }

    read_tag_body(body)
}

fn read_tag_body(body: &[u8]) -> Result<BitmapTag> {
    let mut r = Cursor::new(body);
    let mut tag = BitmapTag {
        bitmap_type: BitmapType::from_u16(r.read_u16::<BigEndian>()?)?,
        format: BitmapFormat::from_u16(r.read_u16::<BigEndian>()?)?,
        usage: BitmapUsage::from_u16(r.read_u16::<BigEndian>()?)?,
        flags: r.read_u16::<BigEndian>()?,
        detail_fade: r.read_f32::<BigEndian>()?,
        sharpen: r.read_f32::<BigEndian>()?,
        bump_height: r.read_f32::<BigEndian>()?,
        sprite_budget_size: r.read_u16::<BigEndian>()?,
        sprite_budget_count: r.read_u16::<BigEndian>()?,
        color_plate_width: r.read_u16::<BigEndian>()?,
        color_plate_height: r.read_u16::<BigEndian>()?,
        ..BitmapTag::default()
    };

    let plate_size = r.read_u32::<BigEndian>()? as usize;
    let mut compressed_plate = vec![0u8; plate_size];
    r.read_exact(&mut compressed_plate)?;
    tag.compressed_color_plate = compressed_plate;

    let pixel_data_size = r.read_u32::<BigEndian>()? as usize;
    tag.blur_filter_size = r.read_f32::<BigEndian>()?;
    tag.alpha_bias = r.read_f32::<BigEndian>()?;
    tag.mipmap_count = r.read_u16::<BigEndian>()?;
    tag.sprite_usage = SpriteUsage::from_u16(r.read_u16::<BigEndian>()?)?;
    tag.sprite_spacing = r.read_u16::<BigEndian>()?;

    let sequence_count = r.read_u32::<BigEndian>()? as usize;
    let bitmap_data_count = r.read_u32::<BigEndian>()? as usize;

    for _ in 0..sequence_count {
        let mut sequence = TagSequence {
            first_bitmap_index: r.read_u16::<BigEndian>()?,
            bitmap_count: r.read_u16::<BigEndian>()?,
            sprites: Vec::new(),
        };

        let sprite_count = r.read_u32::<BigEndian>()? as usize;
        for _ in 0..sprite_count {
            let bitmap_index = r.read_u16::<BigEndian>()?;
            let _pad = r.read_u16::<BigEndian>()?;
            sequence.sprites.push(TagSprite {
                bitmap_index,
                left: r.read_f32::<BigEndian>()?,
                right: r.read_f32::<BigEndian>()?,
                top: r.read_f32::<BigEndian>()?,
                bottom: r.read_f32::<BigEndian>()?,
                registration_point: (r.read_f32::<BigEndian>()?, r.read_f32::<BigEndian>()?),
            });
        }

        tag.sequences.push(sequence);
    }

    for _ in 0..bitmap_data_count {
        let width = r.read_u16::<BigEndian>()?;
        let height = r.read_u16::<BigEndian>()?;
        let depth = r.read_u16::<BigEndian>()?;
        let data_type = BitmapDataType::from_u16(r.read_u16::<BigEndian>()?)?;
        let format = PixelFormat::from_u16(r.read_u16::<BigEndian>()?)?;
        let flags = r.read_u16::<BigEndian>()?;
        let registration_point = (r.read_i16::<BigEndian>()?, r.read_i16::<BigEndian>()?);
        let mipmap_count = r.read_u16::<BigEndian>()?;
        let _pad = r.read_u16::<BigEndian>()?;
        let pixel_data_offset = r.read_u32::<BigEndian>()?;
        let pixel_data_size = r.read_u32::<BigEndian>()?;
        let sequence_index = r.read_u16::<BigEndian>()?;
        let _pad = r.read_u16::<BigEndian>()?;

        tag.bitmap_data.push(BitmapData {
            width,
            height,
            depth,
            data_type,
            format,
            flags,
            registration_point,
            mipmap_count,
            pixel_data_offset,
            pixel_data_size,
            sequence_index,
        });
    }

    let mut pixel_data = vec![0u8; pixel_data_size];
    r.read_exact(&mut pixel_data)?;
    tag.processed_pixel_data = pixel_data;

    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::sprite_budget_to_enum;

    fn sample_tag() -> BitmapTag {
        BitmapTag {
            bitmap_type: BitmapType::Sprites,
            format: BitmapFormat::Dxt5,
            usage: BitmapUsage::Default,
            flags: 0x9,
            detail_fade: 0.25,
            sharpen: 0.5,
            bump_height: 0.026,
            sprite_budget_size: sprite_budget_to_enum(64),
            sprite_budget_count: 2,
            color_plate_width: 100,
            color_plate_height: 60,
            compressed_color_plate: vec![0, 0, 0, 8, 1, 2, 3],
            blur_filter_size: 1.5,
            alpha_bias: -0.25,
            mipmap_count: 3,
            sprite_usage: SpriteUsage::DoubleMultiply,
            sprite_spacing: 1,
            sequences: vec![
                TagSequence {
                    first_bitmap_index: 0,
                    bitmap_count: 0,
                    sprites: vec![TagSprite {
                        bitmap_index: 0,
                        left: 0.25,
                        right: 0.75,
                        top: 0.125,
                        bottom: 0.5,
                        registration_point: (0.5, 0.25),
                    }],
                },
                TagSequence {
                    first_bitmap_index: 0,
                    bitmap_count: 1,
                    sprites: Vec::new(),
                },
            ],
            bitmap_data: vec![BitmapData {
                width: 64,
                height: 64,
                depth: 1,
                data_type: BitmapDataType::TwoDimensional,
                format: PixelFormat::Dxt5,
                flags: 0x3,
                registration_point: (32, 32),
                mipmap_count: 6,
                pixel_data_offset: 0,
                pixel_data_size: 16,
                sequence_index: 0,
            }],
            processed_pixel_data: (0u8..16).collect(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let tag = sample_tag();
        let bytes = write_tag(&tag).unwrap();
        let parsed = read_tag(&bytes).unwrap();
        assert_eq!(parsed, tag);
    }

    #[test]
    fn test_header_layout() {
        let bytes = write_tag(&sample_tag()).unwrap();

        // 四字码在 0x24，引擎四字码在 0x3C
        assert_eq!(&bytes[0x24..0x28], b"bitm");
        assert_eq!(&bytes[0x3C..0x40], b"blam");
        // 前 36 字节为零
        assert!(bytes[..0x24].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_body_is_big_endian() {
        let bytes = write_tag(&sample_tag()).unwrap();
        // 文件头之后第一个字段是 type (Sprites = 3)
        assert_eq!(&bytes[0x40..0x42], &[0, 3]);
    }

    #[test]
    fn test_corrupted_crc_rejected() {
        let mut bytes = write_tag(&sample_tag()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(read_tag(&bytes), Err(BitmapError::InvalidTag(_))));
    }

    #[test]
    fn test_wrong_fourcc_rejected() {
        let mut bytes = write_tag(&sample_tag()).unwrap();
        bytes[0x24] = b'x';
        assert!(matches!(read_tag(&bytes), Err(BitmapError::InvalidTag(_))));
    }

    #[test]
    fn test_truncated_rejected() {
        let bytes = write_tag(&sample_tag()).unwrap();
        assert!(read_tag(&bytes[..30]).is_err());
    }
}

use image::codecs::png::PngEncoder; // 固定使用 PNG 作为规范化容器 (无损)
use image::{ColorType, RgbImage};

use crate::error::EncodingError;

/// 指纹计算的输入
///
/// - `Pixels`: 已经解码并统一成 RGB 三通道的像素数据 (调用方负责 convert)。
/// - `Bytes`: 已经是字节缓冲区，原样透传，不做任何重编码。
#[derive(Debug, Clone)]
pub enum ImageInput {
    Pixels(RgbImage),
    Bytes(Vec<u8>),
}

impl From<RgbImage> for ImageInput {
    fn from(img: RgbImage) -> Self {
        ImageInput::Pixels(img)
    }
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        ImageInput::Bytes(bytes)
    }
}

/// 规范化编码 (Canonical Encoding)
///
/// 从解码后的像素重新序列化为 PNG，原文件的格式、EXIF、时间戳、
/// 压缩痕迹都不会进入输出。同一份像素永远得到逐字节相同的结果，
/// 这是哈希可复现的前提。
pub fn encode(input: &ImageInput) -> Result<Vec<u8>, EncodingError> {
    match input {
        ImageInput::Bytes(bytes) => Ok(bytes.clone()),
        ImageInput::Pixels(img) => encode_rgb(img),
    }
}

fn encode_rgb(img: &RgbImage) -> Result<Vec<u8>, EncodingError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(EncodingError::EmptyImage { width, height });
    }

    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .encode(img.as_raw(), width, height, ColorType::Rgb8)
        .map_err(|e| EncodingError::Encode(e.to_string()))?;
    Ok(buf)
}

/// 解码任意受支持格式 (PNG/JPEG/GIF/BMP/TIFF) 的文件字节，并转换为 RGB8
///
/// 上传入口在验证前调用它，对应"先统一色彩模型"这一步。
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, EncodingError> {
    let img = image::load_from_memory(bytes).map_err(|e| EncodingError::Decode(e.to_string()))?;
    Ok(img.into_rgb8())
}

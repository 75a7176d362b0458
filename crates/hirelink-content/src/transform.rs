use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STD;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, ImageResult};

use hirelink_core::Attachment;

use crate::CodecError;

pub const MAX_IMAGE_EDGE: u32 = 800;
pub const IMAGE_QUALITY: u8 = 70;
const COMPRESSED_IMAGE_MIME: &str = "image/jpeg";

/// A file picked by the user, read fully into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInput {
    pub name: String,
    pub mime: String,
    pub data: Vec<u8>,
}

impl FileInput {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        let mime = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self { name, mime, data }
    }

    pub fn with_mime(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, CodecError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| CodecError::Read {
                path: path.display().to_string(),
                source,
            })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        Ok(Self::new(name, data))
    }

    pub fn is_image(&self) -> bool {
        self.mime
            .parse::<mime::Mime>()
            .map(|m| m.type_() == mime::IMAGE)
            .unwrap_or(false)
    }
}

/// Downscales to `MAX_IMAGE_EDGE` on the longest side and re-encodes as JPEG.
pub fn compress_image(data: &[u8]) -> ImageResult<Vec<u8>> {
    let img = image::load_from_memory(data)?;
    let (width, height) = img.dimensions();
    let img = if width.max(height) > MAX_IMAGE_EDGE {
        img.resize(MAX_IMAGE_EDGE, MAX_IMAGE_EDGE, FilterType::Triangle)
    } else {
        img
    };
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, IMAGE_QUALITY))?;
    Ok(out)
}

pub fn data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64_STD.encode(data))
}

pub(crate) async fn file_to_attachment(file: FileInput) -> Option<Attachment> {
    if !file.is_image() {
        return Some(embed_as_is(file));
    }
    let FileInput { name, mime, data } = file;
    let compressed = tokio::task::spawn_blocking(move || {
        let result = compress_image(&data);
        (data, result)
    })
    .await;
    match compressed {
        Ok((_, Ok(bytes))) => Some(Attachment {
            size: bytes.len() as u64,
            data_url: data_url(COMPRESSED_IMAGE_MIME, &bytes),
            mime: COMPRESSED_IMAGE_MIME.to_string(),
            name,
        }),
        Ok((data, Err(err))) => {
            tracing::debug!(%err, name = %name, "image not re-encoded, embedding original");
            Some(embed_as_is(FileInput { name, mime, data }))
        }
        Err(err) => {
            tracing::warn!(%err, name = %name, "image transform task failed, dropping file");
            None
        }
    }
}

fn embed_as_is(file: FileInput) -> Attachment {
    Attachment {
        size: file.data.len() as u64,
        data_url: data_url(&file.mime, &file.data),
        name: file.name,
        mime: file.mime,
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgb};

    use super::{FileInput, MAX_IMAGE_EDGE, compress_image};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn compress_image_caps_longest_edge() {
        let out = compress_image(&png_bytes(1600, 400)).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.width(), MAX_IMAGE_EDGE);
        assert_eq!(img.height(), 200);
    }

    #[test]
    fn compress_image_keeps_small_images_at_size() {
        let out = compress_image(&png_bytes(120, 80)).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!((img.width(), img.height()), (120, 80));
    }

    #[test]
    fn mime_is_guessed_from_name() {
        assert_eq!(FileInput::new("cv.pdf", vec![]).mime, "application/pdf");
        assert_eq!(FileInput::new("me.png", vec![]).mime, "image/png");
        assert_eq!(
            FileInput::new("notes", vec![]).mime,
            "application/octet-stream"
        );
        assert!(FileInput::new("me.JPG", vec![]).is_image());
    }
}

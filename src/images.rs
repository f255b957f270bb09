use std::io::Cursor;

use image::ImageOutputFormat;

const MAX_LONG_EDGE: u32 = 1200;
const JPEG_QUALITY: u8 = 85;

/// Bounds the long edge at 1200px and re-encodes as JPEG. Anything that fails
/// to decode is stored untouched rather than rejected.
pub fn downsize(bytes: &[u8]) -> Vec<u8> {
    match try_downsize(bytes) {
        Ok(resized) => resized,
        Err(err) => {
            tracing::warn!(error = %err, "storing image as-is");
            bytes.to_vec()
        }
    }
}

fn try_downsize(bytes: &[u8]) -> image::ImageResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;

    // `thumbnail` scales up as readily as down; only shrink
    let img = if img.width().max(img.height()) > MAX_LONG_EDGE {
        img.thumbnail(MAX_LONG_EDGE, MAX_LONG_EDGE)
    } else {
        img
    };

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;

    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use image::GenericImageView;
    use pretty_assertions::assert_eq;

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageOutputFormat::Png).unwrap();

        out.into_inner()
    }

    #[test]
    fn oversized_image_is_bounded_and_reencoded() {
        let resized = downsize(&png_bytes(2400, 1200));

        let img = image::load_from_memory(&resized).unwrap();
        assert_eq!(img.dimensions(), (1200, 600));

        // JPEG SOI marker
        assert_eq!(&resized[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn small_image_keeps_its_dimensions() {
        let resized = downsize(&png_bytes(640, 480));

        let img = image::load_from_memory(&resized).unwrap();
        assert_eq!(img.dimensions(), (640, 480));
    }

    #[test]
    fn undecodable_bytes_pass_through() {
        let garbage = b"not an image at all";

        assert_eq!(downsize(garbage), garbage.to_vec());
    }
}

use crate::assets::AvatarImage;
use crate::foundation::error::{VizError, VizResult};
use crate::surface::pixmap_from_premul;

/// Decodes any format the `image` crate recognises into a premultiplied [`AvatarImage`].
pub fn decode_avatar(bytes: &[u8]) -> VizResult<AvatarImage> {
    let dyn_img = image::load_from_memory(bytes).map_err(|e| VizError::decode(e.to_string()))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(VizError::decode("image has zero size"));
    }

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    let pixmap = pixmap_from_premul(&rgba8_premul, width, height)
        .map_err(|e| VizError::decode(format!("avatar {width}x{height}: {e}")))?;
    Ok(AvatarImage::new(pixmap))
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 255 {
            continue;
        }
        if a == 0 {
            px[..3].fill(0);
            continue;
        }
        for c in px.iter_mut().take(3) {
            *c = ((u16::from(*c) * a + 127) / 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn encode(img: image::RgbaImage, format: image::ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), format)
            .unwrap();
        buf
    }

    #[test]
    fn decode_png_dimensions_and_premul() {
        let img = image::RgbaImage::from_raw(1, 1, vec![100u8, 50u8, 200u8, 128u8]).unwrap();
        let avatar = decode_avatar(&encode(img, image::ImageFormat::Png)).unwrap();
        assert_eq!(avatar.width, 1);
        assert_eq!(avatar.height, 1);
        assert_eq!(
            avatar.rgba8_premul(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn fully_transparent_pixels_drop_colour() {
        let img = image::RgbaImage::from_raw(1, 1, vec![9u8, 9, 9, 0]).unwrap();
        let avatar = decode_avatar(&encode(img, image::ImageFormat::Png)).unwrap();
        assert_eq!(avatar.rgba8_premul(), &[0, 0, 0, 0]);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = decode_avatar(b"definitely not an image").unwrap_err();
        assert!(matches!(err, VizError::Decode(_)));
    }
}

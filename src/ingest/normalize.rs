use anyhow::{anyhow, Result};

use crate::frame::{Frame, PixelFormat, RgbImage, Rotation};

/// Convert a frame into the upright RGB image detector backends expect.
pub(crate) fn upright_image(frame: &Frame) -> Result<RgbImage> {
    let rgb = normalize_to_rgb(frame.pixels(), frame.width, frame.height, frame.format)?;
    let image = RgbImage::new(frame.width, frame.height, rgb)?;
    Ok(rotate_upright(&image, frame.rotation))
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format
        .frame_len(width, height)
        .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", format))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }
    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Rgba8888 => Ok(pixels
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()),
        PixelFormat::Nv12 => {
            if width % 2 != 0 || height % 2 != 0 {
                return Err(anyhow!(
                    "NV12 frames need even dimensions, got {}x{}",
                    width,
                    height
                ));
            }
            Ok(nv12_to_rgb(pixels, width, height))
        }
    }
}

/// Rotate clockwise by the sensor rotation so the scene is right-side-up.
pub(crate) fn rotate_upright(image: &RgbImage, rotation: Rotation) -> RgbImage {
    let w = image.width() as usize;
    let h = image.height() as usize;
    let src = image.pixels();
    let (out_w, out_h) = match rotation {
        Rotation::Deg0 => return image.clone(),
        Rotation::Deg180 => (w, h),
        Rotation::Deg90 | Rotation::Deg270 => (h, w),
    };

    let mut out = vec![0u8; src.len()];
    for y in 0..out_h {
        for x in 0..out_w {
            let (sx, sy) = match rotation {
                Rotation::Deg90 => (y, h - 1 - x),
                Rotation::Deg180 => (w - 1 - x, h - 1 - y),
                _ => (w - 1 - y, x),
            };
            let from = (sy * w + sx) * 3;
            let to = (y * out_w + x) * 3;
            out[to..to + 3].copy_from_slice(&src[from..from + 3]);
        }
    }

    RgbImage::from_parts(out_w as u32, out_h as u32, out)
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w * h;

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

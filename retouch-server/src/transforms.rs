//! Stateless image edits. Each takes encoded image bytes in any format the `image` crate reads
//! and returns the edited image as PNG.
use std::io::Cursor;

use anyhow::{ensure, Context, Result};
use image::{ColorType, DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("Decoding input image")
}

/// Encode as PNG. Float images are narrowed to 8 bits per channel, since PNG can't hold them.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    match img.color() {
        ColorType::Rgb32F | ColorType::Rgba32F => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut cursor, ImageFormat::Png)
        }
        _ => img.write_to(&mut cursor, ImageFormat::Png),
    }
    .context("Encoding PNG")?;
    Ok(buf)
}

/// Rotate clockwise by `angle` degrees.
///
/// Clockwise is what the interpreter prompt promises users. Note this is the opposite of
/// PIL's `Image.rotate`, which turns counter-clockwise for positive angles.
///
/// Right angles are exact pixel moves. Anything else is resampled onto a canvas large enough
/// to hold the whole rotated image, with transparent corners.
pub fn rotate(bytes: &[u8], angle: f64) -> Result<Vec<u8>> {
    ensure!(angle.is_finite(), "Rotation angle must be finite, got {angle}");
    let img = decode(bytes)?;
    let degrees = angle.rem_euclid(360.0);
    let rotated = if degrees == 0.0 {
        img
    } else if degrees == 90.0 {
        img.rotate90()
    } else if degrees == 180.0 {
        img.rotate180()
    } else if degrees == 270.0 {
        img.rotate270()
    } else {
        DynamicImage::ImageRgba8(rotate_expanded(&img.to_rgba8(), degrees.to_radians() as f32))
    };
    encode_png(&rotated)
}

fn rotate_expanded(img: &RgbaImage, theta: f32) -> RgbaImage {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let (sin, cos) = theta.sin_cos();
    let out_w = (w * cos.abs() + h * sin.abs()).ceil().max(1.0) as u32;
    let out_h = (w * sin.abs() + h * cos.abs()).ceil().max(1.0) as u32;
    // Move the center to the origin, rotate, then move it to the center of the new canvas
    let projection = Projection::translate(out_w as f32 / 2.0, out_h as f32 / 2.0)
        * Projection::rotate(theta)
        * Projection::translate(-w / 2.0, -h / 2.0);
    let mut out = RgbaImage::new(out_w, out_h);
    warp_into(
        img,
        &projection,
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
        &mut out,
    );
    out
}

/// Crop to the box from (`left`, `top`) to (`right`, `bottom`), clamped to the image.
pub fn crop(bytes: &[u8], left: f64, top: f64, right: f64, bottom: f64) -> Result<Vec<u8>> {
    ensure!(
        [left, top, right, bottom].iter().all(|v| v.is_finite()),
        "Crop box must be finite"
    );
    let img = decode(bytes)?;
    let (width, height) = (img.width(), img.height());
    let clamp = |v: f64, max: u32| v.round().clamp(0.0, f64::from(max)) as u32;
    let (x0, x1) = (clamp(left, width), clamp(right, width));
    let (y0, y1) = (clamp(top, height), clamp(bottom, height));
    ensure!(
        x1 > x0 && y1 > y0,
        "Crop box ({left}, {top}, {right}, {bottom}) leaves nothing of a {width}x{height} image"
    );
    encode_png(&img.crop_imm(x0, y0, x1 - x0, y1 - y0))
}

/// Gaussian blur with standard deviation `radius`. Zero leaves the image as it is.
///
/// The radius is capped at the image's longest side: the kernel grows with it, and past that
/// point every pixel already sees the whole image.
pub fn blur(bytes: &[u8], radius: f64) -> Result<Vec<u8>> {
    ensure!(
        radius.is_finite() && radius >= 0.0,
        "Blur radius must be a non-negative number, got {radius}"
    );
    let img = decode(bytes)?;
    let longest_side = f64::from(img.width().max(img.height()).max(1));
    let sigma = radius.min(longest_side) as f32;
    if sigma <= 0.0 {
        return encode_png(&img);
    }
    let blurred = imageproc::filter::gaussian_blur_f32(&img.to_rgba8(), sigma);
    encode_png(&DynamicImage::ImageRgba8(blurred))
}

/// Scale every color channel by `level`: 0 is black, 1 is unchanged. Alpha is kept.
pub fn brightness(bytes: &[u8], level: f64) -> Result<Vec<u8>> {
    ensure!(level.is_finite(), "Brightness level must be finite, got {level}");
    let mut img = decode(bytes)?.to_rgba8();
    let level = level as f32;
    for pixel in img.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = to_channel(f32::from(*channel) * level);
        }
    }
    encode_png(&DynamicImage::ImageRgba8(img))
}

/// Stretch colors away from (or toward) the mean luma: 0 is flat gray, 1 is unchanged. Alpha is kept.
pub fn contrast(bytes: &[u8], level: f64) -> Result<Vec<u8>> {
    ensure!(level.is_finite(), "Contrast level must be finite, got {level}");
    let mut img = decode(bytes)?.to_rgba8();
    let pixel_count = (u64::from(img.width()) * u64::from(img.height())).max(1);
    let luma_sum: f64 = img.pixels().map(|p| f64::from(luma(p))).sum();
    let mean = (luma_sum / pixel_count as f64).round() as f32;
    let level = level as f32;
    for pixel in img.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = to_channel(mean + level * (f32::from(*channel) - mean));
        }
    }
    encode_png(&DynamicImage::ImageRgba8(img))
}

fn luma(pixel: &Rgba<u8>) -> f32 {
    let [r, g, b, _] = pixel.0;
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

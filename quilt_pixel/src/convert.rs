// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scanline conversion between pixel encodings.
//!
//! The driver picks the cheapest applicable path: a raw row copy when both
//! encodings are identical, a dedicated byte-level loop for the handful of
//! 8-bit pairs that differ only by channel permutation, premultiplication or
//! an added opaque alpha channel, and otherwise a general path that decodes
//! each row into the canonical `[f32; 4]` representation, fixes up
//! premultiplication, and encodes into the destination.

use crate::format::{AlphaMode, PixelFormat};

/// Convert `width x height` pixels from `src_format` to `dst_format`.
///
/// `dst_stride` and `src_stride` are in bytes and must be at least
/// `width * bytes_per_pixel` of the respective format. Row starts must be
/// aligned to the format's [`alignment`](PixelFormat::alignment); violating
/// any of these preconditions is a caller bug and asserts.
pub fn convert(
    dst: &mut [u8],
    dst_stride: usize,
    dst_format: PixelFormat,
    src: &[u8],
    src_stride: usize,
    src_format: PixelFormat,
    width: usize,
    height: usize,
) {
    let dst_bpp = dst_format.bytes_per_pixel();
    let src_bpp = src_format.bytes_per_pixel();
    assert!(dst_stride >= width * dst_bpp);
    assert!(src_stride >= width * src_bpp);
    if height == 0 || width == 0 {
        return;
    }
    assert!(dst.len() >= dst_stride * (height - 1) + width * dst_bpp);
    assert!(src.len() >= src_stride * (height - 1) + width * src_bpp);
    assert_eq!(dst.as_ptr() as usize % dst_format.alignment(), 0);
    assert_eq!(src.as_ptr() as usize % src_format.alignment(), 0);
    assert_eq!(dst_stride % dst_format.alignment(), 0);
    assert_eq!(src_stride % src_format.alignment(), 0);

    if src_format == dst_format {
        let row_bytes = width * src_bpp;
        for y in 0..height {
            dst[y * dst_stride..y * dst_stride + row_bytes]
                .copy_from_slice(&src[y * src_stride..y * src_stride + row_bytes]);
        }
        return;
    }

    if let Some(fast) = fast_conversion_func(dst_format, src_format) {
        for y in 0..height {
            fast(
                &mut dst[y * dst_stride..y * dst_stride + width * dst_bpp],
                &src[y * src_stride..y * src_stride + width * src_bpp],
            );
        }
        return;
    }

    log::trace!("slow conversion path {src_format:?} -> {dst_format:?}, {width}x{height}");

    let src_desc = src_format.descriptor();
    let dst_desc = dst_format.descriptor();
    let needs_unpremultiply =
        src_desc.alpha == AlphaMode::Premultiplied && dst_desc.alpha == AlphaMode::Straight;
    let needs_premultiply =
        src_desc.alpha == AlphaMode::Straight && dst_desc.alpha != AlphaMode::Straight;

    let mut row = vec![[0f32; 4]; width];
    for y in 0..height {
        (src_desc.to_float)(&mut row, &src[y * src_stride..y * src_stride + width * src_bpp]);
        if needs_unpremultiply {
            unpremultiply(&mut row);
        }
        if needs_premultiply {
            premultiply(&mut row);
        }
        (dst_desc.from_float)(&mut dst[y * dst_stride..y * dst_stride + width * dst_bpp], &row);
    }
}

/// Scale the color channels of each pixel by its alpha.
pub fn premultiply(row: &mut [[f32; 4]]) {
    for px in row {
        px[0] *= px[3];
        px[1] *= px[3];
        px[2] *= px[3];
    }
}

/// Divide the color channels of each pixel by its alpha.
///
/// Pixels with alpha at or below `1/255` are left untouched; their color is
/// effectively zero already and dividing would blow up.
pub fn unpremultiply(row: &mut [[f32; 4]]) {
    for px in row {
        if px[3] > 1.0 / 255.0 {
            px[0] /= px[3];
            px[1] /= px[3];
            px[2] /= px[3];
        }
    }
}

type FastFn = fn(&mut [u8], &[u8]);

/// Premultiply an 8-bit value with round-half-up, as a fixed-point
/// approximation of `round(x * a / 255)`.
#[inline(always)]
fn mul_div_255(x: u8, a: u8) -> u8 {
    let t = x as u32 * a as u32 + 127;
    ((t + (t >> 8) + 1) >> 8) as u8
}

macro_rules! premultiply_func {
    ($name:ident, $r1:expr, $g1:expr, $b1:expr, $a1:expr, $r2:expr, $g2:expr, $b2:expr, $a2:expr) => {
        fn $name(dest: &mut [u8], src: &[u8]) {
            for (d, s) in dest.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                let a = s[$a1];
                d[$r2] = mul_div_255(s[$r1], a);
                d[$g2] = mul_div_255(s[$g1], a);
                d[$b2] = mul_div_255(s[$b1], a);
                d[$a2] = a;
            }
        }
    };
}

premultiply_func!(rgba8_to_rgba8_premul, 0, 1, 2, 3, 0, 1, 2, 3);
premultiply_func!(rgba8_to_bgra8_premul, 0, 1, 2, 3, 2, 1, 0, 3);
premultiply_func!(rgba8_to_argb8_premul, 0, 1, 2, 3, 1, 2, 3, 0);
premultiply_func!(rgba8_to_abgr8_premul, 0, 1, 2, 3, 3, 2, 1, 0);

macro_rules! add_alpha_func {
    ($name:ident, $r2:expr, $g2:expr, $b2:expr, $a2:expr) => {
        fn $name(dest: &mut [u8], src: &[u8]) {
            for (d, s) in dest.chunks_exact_mut(4).zip(src.chunks_exact(3)) {
                d[$r2] = s[0];
                d[$g2] = s[1];
                d[$b2] = s[2];
                d[$a2] = 255;
            }
        }
    };
}

add_alpha_func!(rgb8_to_rgba8, 0, 1, 2, 3);
add_alpha_func!(rgb8_to_bgra8, 2, 1, 0, 3);
add_alpha_func!(rgb8_to_argb8, 1, 2, 3, 0);
add_alpha_func!(rgb8_to_abgr8, 3, 2, 1, 0);

/// Swap red and blue; works for both directions and both alpha dispositions
/// since no precision is involved.
fn swap_rb8(dest: &mut [u8], src: &[u8]) {
    for (d, s) in dest.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        d[0] = s[2];
        d[1] = s[1];
        d[2] = s[0];
        d[3] = s[3];
    }
}

fn fast_conversion_func(dst: PixelFormat, src: PixelFormat) -> Option<FastFn> {
    use PixelFormat::*;
    match (src, dst) {
        (Rgba8, Rgba8Premul) | (Bgra8, Bgra8Premul) => Some(rgba8_to_rgba8_premul),
        (Bgra8, Rgba8Premul) | (Rgba8, Bgra8Premul) => Some(rgba8_to_bgra8_premul),
        (Rgba8, Argb8Premul) => Some(rgba8_to_argb8_premul),
        (Bgra8, Argb8Premul) => Some(rgba8_to_abgr8_premul),
        (Bgra8, Rgba8) | (Bgra8Premul, Rgba8Premul) | (Rgba8, Bgra8) | (Rgba8Premul, Bgra8Premul) => {
            Some(swap_rb8)
        }
        (Rgb8, Rgba8Premul) | (Rgb8, Rgba8) | (Bgr8, Bgra8Premul) | (Bgr8, Bgra8) => {
            Some(rgb8_to_rgba8)
        }
        (Bgr8, Rgba8Premul) | (Bgr8, Rgba8) | (Rgb8, Bgra8Premul) | (Rgb8, Bgra8) => {
            Some(rgb8_to_bgra8)
        }
        (Rgb8, Argb8Premul) | (Rgb8, Argb8) => Some(rgb8_to_argb8),
        (Bgr8, Argb8Premul) | (Bgr8, Argb8) => Some(rgb8_to_abgr8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An 8-byte-aligned byte buffer, so any format's alignment holds.
    fn aligned_buffer(len: usize) -> Vec<u64> {
        vec![0u64; len.div_ceil(8)]
    }

    fn convert_simple(dst_format: PixelFormat, src_format: PixelFormat, src: &[u8], width: usize) -> Vec<u8> {
        let len = width * dst_format.bytes_per_pixel();
        let mut backing = aligned_buffer(len);
        let dst = &mut bytemuck::cast_slice_mut::<u64, u8>(&mut backing)[..len];
        convert(
            dst,
            width * dst_format.bytes_per_pixel(),
            dst_format,
            src,
            width * src_format.bytes_per_pixel(),
            src_format,
            width,
            1,
        );
        dst.to_vec()
    }

    #[test]
    fn same_format_is_a_raw_copy() {
        let src = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let out = convert_simple(PixelFormat::Rgba8, PixelFormat::Rgba8, &src, 2);
        assert_eq!(out, src);
    }

    /// The end-to-end scenario from the design: straight red at half alpha
    /// becomes premultiplied BGRA `(0, 0, 128, 128)`.
    #[test]
    fn rgba8_to_bgra8_premultiplied() {
        let src: Vec<u8> = [255u8, 0, 0, 128].repeat(4);
        let mut dst = vec![0u8; 16];
        convert(&mut dst, 8, PixelFormat::Bgra8Premul, &src, 8, PixelFormat::Rgba8, 2, 2);
        for px in dst.chunks_exact(4) {
            assert_eq!(px, [0, 0, 128, 128]);
        }
    }

    /// The fast byte loop and the general float path agree on
    /// premultiplication for every (value, alpha) pair.
    #[test]
    fn fast_premultiply_matches_float_path() {
        for a in [0u8, 1, 2, 127, 128, 254, 255] {
            for v in 0..=255u8 {
                let fast = mul_div_255(v, a);
                let float = (v as f32 / 255.0 * (a as f32 / 255.0) * 255.0 + 0.5).floor() as u8;
                assert_eq!(fast, float, "v={v} a={a}");
            }
        }
    }

    #[test]
    fn add_alpha_fast_path() {
        let src = [10u8, 20, 30];
        let out = convert_simple(PixelFormat::Bgra8, PixelFormat::Rgb8, &src, 1);
        assert_eq!(out, [30, 20, 10, 255]);
        let out = convert_simple(PixelFormat::Argb8, PixelFormat::Rgb8, &src, 1);
        assert_eq!(out, [255, 10, 20, 30]);
    }

    #[test]
    fn channel_swap_fast_path() {
        let src = [1u8, 2, 3, 4];
        let out = convert_simple(PixelFormat::Bgra8Premul, PixelFormat::Rgba8Premul, &src, 1);
        assert_eq!(out, [3, 2, 1, 4]);
    }

    /// Round trips through the canonical float representation are exact for
    /// 8-bit formats.
    #[test]
    fn roundtrip_rgba8_via_float() {
        let src = [0u8, 1, 127, 255, 33, 66, 99, 201];
        // Abgr8 <-> Rgba8 has no fast path, so this exercises the general
        // path in both directions.
        let there = convert_simple(PixelFormat::Abgr8, PixelFormat::Rgba8, &src, 2);
        assert_eq!(there, [255, 127, 1, 0, 201, 99, 66, 33]);
        let back = convert_simple(PixelFormat::Rgba8, PixelFormat::Abgr8, &there, 2);
        assert_eq!(back, src);
    }

    #[test]
    fn roundtrip_u16_via_float() {
        let src_px: Vec<u16> = vec![0, 1, 32767, 65535, 12345, 54321, 1000, 64000];
        let src: &[u8] = bytemuck::cast_slice(&src_px);
        let mid = convert_simple(PixelFormat::Rgba32Float, PixelFormat::Rgba16, src, 2);
        let mut mid_aligned = aligned_buffer(mid.len());
        bytemuck::cast_slice_mut::<u64, u8>(&mut mid_aligned)[..mid.len()].copy_from_slice(&mid);
        let back = convert_simple(
            PixelFormat::Rgba16,
            PixelFormat::Rgba32Float,
            &bytemuck::cast_slice::<u64, u8>(&mid_aligned)[..mid.len()],
            2,
        );
        assert_eq!(bytemuck::cast_slice::<u8, u16>(&back), src_px);
    }

    /// Every encoding survives a round trip through the canonical float
    /// representation byte for byte.
    ///
    /// The pixel values are chosen to be valid for every alpha disposition:
    /// color at or below alpha so premultiplied encodings are well formed,
    /// and an alpha of 0.5 so the unpremultiply/premultiply pair divides and
    /// multiplies by a power of two, which is exact in binary floating
    /// point. For the integer encodings the re-quantization error stays far
    /// below half a step, so equality is exact there too.
    #[test]
    fn every_format_roundtrips_through_float() {
        let row = [
            [0.25f32, 0.125, 0.0625, 0.5],
            [0.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0, 1.0],
        ];
        for format in crate::format::ALL_FORMATS {
            let len = row.len() * format.bytes_per_pixel();
            let mut backing = aligned_buffer(len);
            let encoded = &mut bytemuck::cast_slice_mut::<u64, u8>(&mut backing)[..len];
            (format.descriptor().from_float)(encoded, &row);

            let mid = convert_simple(PixelFormat::Rgba32Float, format, encoded, row.len());
            let mut mid_backing = aligned_buffer(mid.len());
            bytemuck::cast_slice_mut::<u64, u8>(&mut mid_backing)[..mid.len()]
                .copy_from_slice(&mid);
            let back = convert_simple(
                format,
                PixelFormat::Rgba32Float,
                &bytemuck::cast_slice::<u64, u8>(&mid_backing)[..mid.len()],
                row.len(),
            );
            assert_eq!(back[..], encoded[..], "{format:?}");
        }
    }

    #[test]
    fn premultiply_unpremultiply_inverse() {
        let mut row = [[0.8f32, 0.4, 0.2, 0.5]];
        premultiply(&mut row);
        assert_eq!(row, [[0.4, 0.2, 0.1, 0.5]]);
        unpremultiply(&mut row);
        for (got, want) in row[0].iter().zip([0.8f32, 0.4, 0.2, 0.5]) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn unpremultiply_skips_near_zero_alpha() {
        let mut row = [[0.001f32, 0.002, 0.003, 0.002]];
        unpremultiply(&mut row);
        // Alpha below 1/255: colors are left at their premultiplied values.
        assert_eq!(row, [[0.001, 0.002, 0.003, 0.002]]);
    }

    #[test]
    fn grayscale_decodes_to_equal_channels() {
        let src = [200u8];
        let out = convert_simple(PixelFormat::Rgba8, PixelFormat::Gray8, &src, 1);
        assert_eq!(out, [200, 200, 200, 255]);
    }

    #[test]
    fn alpha_only_is_premultiplied_black_white() {
        // Alpha8 decodes with color == alpha, so converting to a straight
        // format unpremultiplies back to white where alpha is meaningful.
        let src = [128u8];
        let out = convert_simple(PixelFormat::Rgba8, PixelFormat::Alpha8, &src, 1);
        assert_eq!(out, [255, 255, 255, 128]);
    }

    #[test]
    fn float16_formats_roundtrip() {
        let src_px: Vec<u16> = vec![
            crate::fp16::FP16_ZERO,
            crate::fp16::FP16_ONE,
            0x3800, // 0.5
            0x3400, // 0.25
        ];
        let src: &[u8] = bytemuck::cast_slice(&src_px);
        let out = convert_simple(PixelFormat::Rgba32Float, PixelFormat::Rgba16Float, src, 1);
        let mut out_aligned = aligned_buffer(out.len());
        bytemuck::cast_slice_mut::<u64, u8>(&mut out_aligned)[..out.len()].copy_from_slice(&out);
        let out = &bytemuck::cast_slice::<u64, u8>(&out_aligned)[..out.len()];
        let floats: &[f32] = bytemuck::cast_slice(out);
        assert_eq!(floats, [0.0, 1.0, 0.5, 0.25]);
        let back = convert_simple(PixelFormat::Rgba16Float, PixelFormat::Rgba32Float, out, 1);
        assert_eq!(bytemuck::cast_slice::<u8, u16>(&back), src_px);
    }

    #[test]
    fn strides_with_padding_are_respected() {
        // 2x2 image with 2 bytes of per-row padding on both sides.
        let src = [1u8, 2, 0, 0, 3, 4, 0, 0];
        let mut dst = vec![0xffu8; 12];
        convert(&mut dst, 6, PixelFormat::GrayAlpha8, &src, 4, PixelFormat::Gray8, 2, 2);
        assert_eq!(&dst[0..4], [1, 255, 2, 255]);
        assert_eq!(&dst[6..10], [3, 255, 4, 255]);
        // Padding untouched.
        assert_eq!(&dst[4..6], [0xff, 0xff]);
        assert_eq!(&dst[10..12], [0xff, 0xff]);
    }
}

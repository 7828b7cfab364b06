// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The pixel encodings understood by the converter.
//!
//! Every format registers a decoder into and an encoder out of the canonical
//! row representation, four `f32` channels per pixel in RGBA order. Decoding
//! never touches premultiplication; the conversion driver applies it based on
//! the [`AlphaMode`] of the two endpoints.

use crate::fp16;

/// How the alpha channel of a pixel encoding is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaMode {
    /// No alpha channel; pixels are fully opaque.
    Opaque,
    /// Color channels are independent of alpha.
    Straight,
    /// Color channels are pre-scaled by alpha.
    Premultiplied,
}

/// Storage width of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDepth {
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 16-bit IEEE 754 float.
    F16,
    /// 32-bit IEEE 754 float.
    F32,
}

impl ChannelDepth {
    /// Bytes occupied by one channel.
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::F16 => 2,
            Self::F32 => 4,
        }
    }
}

/// A pixel encoding: channel order, channel depth and alpha disposition.
///
/// The names read in byte order, so [`PixelFormat::Bgra8`] stores blue in the
/// first byte of each pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 4 bytes, blue/green/red/alpha, premultiplied.
    Bgra8Premul,
    /// 4 bytes, alpha/red/green/blue, premultiplied.
    Argb8Premul,
    /// 4 bytes, red/green/blue/alpha, premultiplied.
    Rgba8Premul,
    /// 4 bytes, alpha/blue/green/red, premultiplied.
    Abgr8Premul,
    /// 4 bytes, blue/green/red/alpha, straight alpha.
    Bgra8,
    /// 4 bytes, alpha/red/green/blue, straight alpha.
    Argb8,
    /// 4 bytes, red/green/blue/alpha, straight alpha.
    Rgba8,
    /// 4 bytes, alpha/blue/green/red, straight alpha.
    Abgr8,
    /// 3 bytes, red/green/blue, opaque.
    Rgb8,
    /// 3 bytes, blue/green/red, opaque.
    Bgr8,
    /// 3 16-bit channels, red/green/blue, opaque.
    Rgb16,
    /// 4 16-bit channels, red/green/blue/alpha, premultiplied.
    Rgba16Premul,
    /// 4 16-bit channels, red/green/blue/alpha, straight alpha.
    Rgba16,
    /// 3 half-float channels, red/green/blue, opaque.
    Rgb16Float,
    /// 4 half-float channels, red/green/blue/alpha, premultiplied.
    Rgba16FloatPremul,
    /// 4 half-float channels, red/green/blue/alpha, straight alpha.
    Rgba16Float,
    /// 3 `f32` channels, red/green/blue, opaque.
    Rgb32Float,
    /// 4 `f32` channels, red/green/blue/alpha, premultiplied.
    Rgba32FloatPremul,
    /// 4 `f32` channels, red/green/blue/alpha, straight alpha.
    Rgba32Float,
    /// 2 bytes, gray/alpha, premultiplied.
    GrayAlpha8Premul,
    /// 2 bytes, gray/alpha, straight alpha.
    GrayAlpha8,
    /// 1 byte of grayscale, opaque.
    Gray8,
    /// 2 16-bit channels, gray/alpha, premultiplied.
    GrayAlpha16Premul,
    /// 2 16-bit channels, gray/alpha, straight alpha.
    GrayAlpha16,
    /// 1 16-bit channel of grayscale, opaque.
    Gray16,
    /// 1 byte of alpha-only coverage.
    Alpha8,
    /// 1 16-bit channel of alpha-only coverage.
    Alpha16,
    /// 1 half-float channel of alpha-only coverage.
    Alpha16Float,
    /// 1 `f32` channel of alpha-only coverage.
    Alpha32Float,
}

/// Every encoding, for exhaustive tests.
#[cfg(test)]
pub(crate) const ALL_FORMATS: [PixelFormat; 29] = [
    PixelFormat::Bgra8Premul,
    PixelFormat::Argb8Premul,
    PixelFormat::Rgba8Premul,
    PixelFormat::Abgr8Premul,
    PixelFormat::Bgra8,
    PixelFormat::Argb8,
    PixelFormat::Rgba8,
    PixelFormat::Abgr8,
    PixelFormat::Rgb8,
    PixelFormat::Bgr8,
    PixelFormat::Rgb16,
    PixelFormat::Rgba16Premul,
    PixelFormat::Rgba16,
    PixelFormat::Rgb16Float,
    PixelFormat::Rgba16FloatPremul,
    PixelFormat::Rgba16Float,
    PixelFormat::Rgb32Float,
    PixelFormat::Rgba32FloatPremul,
    PixelFormat::Rgba32Float,
    PixelFormat::GrayAlpha8Premul,
    PixelFormat::GrayAlpha8,
    PixelFormat::Gray8,
    PixelFormat::GrayAlpha16Premul,
    PixelFormat::GrayAlpha16,
    PixelFormat::Gray16,
    PixelFormat::Alpha8,
    PixelFormat::Alpha16,
    PixelFormat::Alpha16Float,
    PixelFormat::Alpha32Float,
];

pub(crate) type ToFloatFn = fn(&mut [[f32; 4]], &[u8]);
pub(crate) type FromFloatFn = fn(&mut [u8], &[[f32; 4]]);

pub(crate) struct FormatDescriptor {
    pub alpha: AlphaMode,
    pub bytes_per_pixel: usize,
    pub alignment: usize,
    pub depth: ChannelDepth,
    pub premultiplied: PixelFormat,
    pub straight: Option<PixelFormat>,
    pub to_float: ToFloatFn,
    pub from_float: FromFloatFn,
}

macro_rules! descriptor {
    ($alpha:ident, $bpp:expr, $depth:ident, $premul:expr, $straight:expr, $to:ident, $from:ident) => {{
        const DESC: FormatDescriptor = FormatDescriptor {
            alpha: AlphaMode::$alpha,
            bytes_per_pixel: $bpp,
            alignment: ChannelDepth::$depth.bytes(),
            depth: ChannelDepth::$depth,
            premultiplied: $premul,
            straight: $straight,
            to_float: $to,
            from_float: $from,
        };
        &DESC
    }};
}

impl PixelFormat {
    pub(crate) fn descriptor(self) -> &'static FormatDescriptor {
        use PixelFormat::*;
        match self {
            Bgra8Premul => {
                descriptor!(Premultiplied, 4, U8, Bgra8Premul, Some(Bgra8), bgra8_to_float, bgra8_from_float)
            }
            Argb8Premul => {
                descriptor!(Premultiplied, 4, U8, Argb8Premul, Some(Argb8), argb8_to_float, argb8_from_float)
            }
            Rgba8Premul => {
                descriptor!(Premultiplied, 4, U8, Rgba8Premul, Some(Rgba8), rgba8_to_float, rgba8_from_float)
            }
            Abgr8Premul => {
                descriptor!(Premultiplied, 4, U8, Abgr8Premul, Some(Abgr8), abgr8_to_float, abgr8_from_float)
            }
            Bgra8 => {
                descriptor!(Straight, 4, U8, Bgra8Premul, Some(Bgra8), bgra8_to_float, bgra8_from_float)
            }
            Argb8 => {
                descriptor!(Straight, 4, U8, Argb8Premul, Some(Argb8), argb8_to_float, argb8_from_float)
            }
            Rgba8 => {
                descriptor!(Straight, 4, U8, Rgba8Premul, Some(Rgba8), rgba8_to_float, rgba8_from_float)
            }
            Abgr8 => {
                descriptor!(Straight, 4, U8, Abgr8Premul, Some(Abgr8), abgr8_to_float, abgr8_from_float)
            }
            Rgb8 => descriptor!(Opaque, 3, U8, Rgb8, Some(Rgb8), rgb8_to_float, rgb8_from_float),
            Bgr8 => descriptor!(Opaque, 3, U8, Bgr8, Some(Bgr8), bgr8_to_float, bgr8_from_float),
            Rgb16 => descriptor!(Opaque, 6, U16, Rgb16, Some(Rgb16), rgb16_to_float, rgb16_from_float),
            Rgba16Premul => {
                descriptor!(Premultiplied, 8, U16, Rgba16Premul, Some(Rgba16), rgba16_to_float, rgba16_from_float)
            }
            Rgba16 => {
                descriptor!(Straight, 8, U16, Rgba16Premul, Some(Rgba16), rgba16_to_float, rgba16_from_float)
            }
            Rgb16Float => {
                descriptor!(Opaque, 6, F16, Rgb16Float, Some(Rgb16Float), rgb16f_to_float, rgb16f_from_float)
            }
            Rgba16FloatPremul => descriptor!(
                Premultiplied,
                8,
                F16,
                Rgba16FloatPremul,
                Some(Rgba16Float),
                rgba16f_to_float,
                rgba16f_from_float
            ),
            Rgba16Float => descriptor!(
                Straight,
                8,
                F16,
                Rgba16FloatPremul,
                Some(Rgba16Float),
                rgba16f_to_float,
                rgba16f_from_float
            ),
            Rgb32Float => {
                descriptor!(Opaque, 12, F32, Rgb32Float, Some(Rgb32Float), rgb32f_to_float, rgb32f_from_float)
            }
            Rgba32FloatPremul => descriptor!(
                Premultiplied,
                16,
                F32,
                Rgba32FloatPremul,
                Some(Rgba32Float),
                rgba32f_to_float,
                rgba32f_from_float
            ),
            Rgba32Float => descriptor!(
                Straight,
                16,
                F32,
                Rgba32FloatPremul,
                Some(Rgba32Float),
                rgba32f_to_float,
                rgba32f_from_float
            ),
            GrayAlpha8Premul => descriptor!(
                Premultiplied,
                2,
                U8,
                GrayAlpha8Premul,
                Some(GrayAlpha8),
                gray_alpha8_to_float,
                gray_alpha8_from_float
            ),
            GrayAlpha8 => descriptor!(
                Straight,
                2,
                U8,
                GrayAlpha8Premul,
                Some(GrayAlpha8),
                gray_alpha8_to_float,
                gray_alpha8_from_float
            ),
            Gray8 => descriptor!(Opaque, 1, U8, Gray8, Some(Gray8), gray8_to_float, gray8_from_float),
            GrayAlpha16Premul => descriptor!(
                Premultiplied,
                4,
                U16,
                GrayAlpha16Premul,
                Some(GrayAlpha16),
                gray_alpha16_to_float,
                gray_alpha16_from_float
            ),
            GrayAlpha16 => descriptor!(
                Straight,
                4,
                U16,
                GrayAlpha16Premul,
                Some(GrayAlpha16),
                gray_alpha16_to_float,
                gray_alpha16_from_float
            ),
            Gray16 => descriptor!(Opaque, 2, U16, Gray16, Some(Gray16), gray16_to_float, gray16_from_float),
            Alpha8 => descriptor!(Premultiplied, 1, U8, Alpha8, None, alpha8_to_float, alpha8_from_float),
            Alpha16 => descriptor!(Premultiplied, 2, U16, Alpha16, None, alpha16_to_float, alpha16_from_float),
            Alpha16Float => {
                descriptor!(Premultiplied, 2, F16, Alpha16Float, None, alpha16f_to_float, alpha16f_from_float)
            }
            Alpha32Float => {
                descriptor!(Premultiplied, 4, F32, Alpha32Float, None, alpha32f_to_float, alpha32f_from_float)
            }
        }
    }

    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(self) -> usize {
        self.descriptor().bytes_per_pixel
    }

    /// Required alignment of row starts for buffers in this format.
    pub fn alignment(self) -> usize {
        self.descriptor().alignment
    }

    /// The alpha disposition of this format.
    pub fn alpha(self) -> AlphaMode {
        self.descriptor().alpha
    }

    /// Storage width of the channels.
    pub fn depth(self) -> ChannelDepth {
        self.descriptor().depth
    }

    /// The closest format that stores premultiplied data. Opaque formats and
    /// alpha-only formats return themselves.
    pub fn premultiplied(self) -> PixelFormat {
        self.descriptor().premultiplied
    }

    /// The closest format that stores straight-alpha data, if one exists.
    /// Alpha-only formats have no straight representation.
    pub fn straight(self) -> Option<PixelFormat> {
        self.descriptor().straight
    }
}

fn clamp_u8(v: f32) -> u8 {
    (v * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

fn clamp_u16(v: f32) -> u16 {
    (v * 65535.0 + 0.5).clamp(0.0, 65535.0) as u16
}

macro_rules! rgba8_funcs {
    ($to:ident, $from:ident, $r:expr, $g:expr, $b:expr, $a:expr) => {
        fn $to(dest: &mut [[f32; 4]], src: &[u8]) {
            for (d, s) in dest.iter_mut().zip(src.chunks_exact(4)) {
                d[0] = s[$r] as f32 / 255.0;
                d[1] = s[$g] as f32 / 255.0;
                d[2] = s[$b] as f32 / 255.0;
                d[3] = s[$a] as f32 / 255.0;
            }
        }

        fn $from(dest: &mut [u8], src: &[[f32; 4]]) {
            for (d, s) in dest.chunks_exact_mut(4).zip(src) {
                d[$r] = clamp_u8(s[0]);
                d[$g] = clamp_u8(s[1]);
                d[$b] = clamp_u8(s[2]);
                d[$a] = clamp_u8(s[3]);
            }
        }
    };
}

rgba8_funcs!(rgba8_to_float, rgba8_from_float, 0, 1, 2, 3);
rgba8_funcs!(bgra8_to_float, bgra8_from_float, 2, 1, 0, 3);
rgba8_funcs!(argb8_to_float, argb8_from_float, 1, 2, 3, 0);
rgba8_funcs!(abgr8_to_float, abgr8_from_float, 3, 2, 1, 0);

macro_rules! rgb8_funcs {
    ($to:ident, $from:ident, $r:expr, $g:expr, $b:expr) => {
        fn $to(dest: &mut [[f32; 4]], src: &[u8]) {
            for (d, s) in dest.iter_mut().zip(src.chunks_exact(3)) {
                d[0] = s[$r] as f32 / 255.0;
                d[1] = s[$g] as f32 / 255.0;
                d[2] = s[$b] as f32 / 255.0;
                d[3] = 1.0;
            }
        }

        fn $from(dest: &mut [u8], src: &[[f32; 4]]) {
            for (d, s) in dest.chunks_exact_mut(3).zip(src) {
                d[$r] = clamp_u8(s[0]);
                d[$g] = clamp_u8(s[1]);
                d[$b] = clamp_u8(s[2]);
            }
        }
    };
}

rgb8_funcs!(rgb8_to_float, rgb8_from_float, 0, 1, 2);
rgb8_funcs!(bgr8_to_float, bgr8_from_float, 2, 1, 0);

fn rgb16_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    let src: &[u16] = bytemuck::cast_slice(src);
    for (d, s) in dest.iter_mut().zip(src.chunks_exact(3)) {
        d[0] = s[0] as f32 / 65535.0;
        d[1] = s[1] as f32 / 65535.0;
        d[2] = s[2] as f32 / 65535.0;
        d[3] = 1.0;
    }
}

fn rgb16_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    let dest: &mut [u16] = bytemuck::cast_slice_mut(dest);
    for (d, s) in dest.chunks_exact_mut(3).zip(src) {
        d[0] = clamp_u16(s[0]);
        d[1] = clamp_u16(s[1]);
        d[2] = clamp_u16(s[2]);
    }
}

fn rgba16_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    let src: &[u16] = bytemuck::cast_slice(src);
    for (d, s) in dest.iter_mut().zip(src.chunks_exact(4)) {
        d[0] = s[0] as f32 / 65535.0;
        d[1] = s[1] as f32 / 65535.0;
        d[2] = s[2] as f32 / 65535.0;
        d[3] = s[3] as f32 / 65535.0;
    }
}

fn rgba16_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    let dest: &mut [u16] = bytemuck::cast_slice_mut(dest);
    for (d, s) in dest.chunks_exact_mut(4).zip(src) {
        d[0] = clamp_u16(s[0]);
        d[1] = clamp_u16(s[1]);
        d[2] = clamp_u16(s[2]);
        d[3] = clamp_u16(s[3]);
    }
}

fn rgb16f_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    let src: &[u16] = bytemuck::cast_slice(src);
    for (d, s) in dest.iter_mut().zip(src.chunks_exact(3)) {
        d[0] = fp16::half_to_float_one(s[0]);
        d[1] = fp16::half_to_float_one(s[1]);
        d[2] = fp16::half_to_float_one(s[2]);
        d[3] = 1.0;
    }
}

fn rgb16f_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    let dest: &mut [u16] = bytemuck::cast_slice_mut(dest);
    for (d, s) in dest.chunks_exact_mut(3).zip(src) {
        d[0] = fp16::float_to_half_one(s[0]);
        d[1] = fp16::float_to_half_one(s[1]);
        d[2] = fp16::float_to_half_one(s[2]);
    }
}

fn rgba16f_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    fp16::half_to_float(bytemuck::cast_slice_mut(dest), bytemuck::cast_slice(src));
}

fn rgba16f_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    fp16::float_to_half(bytemuck::cast_slice_mut(dest), bytemuck::cast_slice(src));
}

fn rgb32f_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    let src: &[f32] = bytemuck::cast_slice(src);
    for (d, s) in dest.iter_mut().zip(src.chunks_exact(3)) {
        d[0] = s[0];
        d[1] = s[1];
        d[2] = s[2];
        d[3] = 1.0;
    }
}

fn rgb32f_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    let dest: &mut [f32] = bytemuck::cast_slice_mut(dest);
    for (d, s) in dest.chunks_exact_mut(3).zip(src) {
        d[0] = s[0];
        d[1] = s[1];
        d[2] = s[2];
    }
}

fn rgba32f_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    bytemuck::cast_slice_mut::<_, f32>(dest).copy_from_slice(bytemuck::cast_slice(src));
}

fn rgba32f_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    bytemuck::cast_slice_mut::<_, f32>(dest).copy_from_slice(bytemuck::cast_slice(src));
}

fn gray8_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    for (d, s) in dest.iter_mut().zip(src) {
        let g = *s as f32 / 255.0;
        *d = [g, g, g, 1.0];
    }
}

fn gray8_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    for (d, s) in dest.iter_mut().zip(src) {
        *d = clamp_u8((s[0] + s[1] + s[2]) / 3.0);
    }
}

fn gray_alpha8_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    for (d, s) in dest.iter_mut().zip(src.chunks_exact(2)) {
        let g = s[0] as f32 / 255.0;
        *d = [g, g, g, s[1] as f32 / 255.0];
    }
}

fn gray_alpha8_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    for (d, s) in dest.chunks_exact_mut(2).zip(src) {
        d[0] = clamp_u8((s[0] + s[1] + s[2]) / 3.0);
        d[1] = clamp_u8(s[3]);
    }
}

fn gray16_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    let src: &[u16] = bytemuck::cast_slice(src);
    for (d, s) in dest.iter_mut().zip(src) {
        let g = *s as f32 / 65535.0;
        *d = [g, g, g, 1.0];
    }
}

fn gray16_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    let dest: &mut [u16] = bytemuck::cast_slice_mut(dest);
    for (d, s) in dest.iter_mut().zip(src) {
        *d = clamp_u16((s[0] + s[1] + s[2]) / 3.0);
    }
}

fn gray_alpha16_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    let src: &[u16] = bytemuck::cast_slice(src);
    for (d, s) in dest.iter_mut().zip(src.chunks_exact(2)) {
        let g = s[0] as f32 / 65535.0;
        *d = [g, g, g, s[1] as f32 / 65535.0];
    }
}

fn gray_alpha16_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    let dest: &mut [u16] = bytemuck::cast_slice_mut(dest);
    for (d, s) in dest.chunks_exact_mut(2).zip(src) {
        d[0] = clamp_u16((s[0] + s[1] + s[2]) / 3.0);
        d[1] = clamp_u16(s[3]);
    }
}

fn alpha8_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    for (d, s) in dest.iter_mut().zip(src) {
        let a = *s as f32 / 255.0;
        *d = [a, a, a, a];
    }
}

fn alpha8_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    for (d, s) in dest.iter_mut().zip(src) {
        *d = clamp_u8(s[3]);
    }
}

fn alpha16_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    let src: &[u16] = bytemuck::cast_slice(src);
    for (d, s) in dest.iter_mut().zip(src) {
        let a = *s as f32 / 65535.0;
        *d = [a, a, a, a];
    }
}

fn alpha16_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    let dest: &mut [u16] = bytemuck::cast_slice_mut(dest);
    for (d, s) in dest.iter_mut().zip(src) {
        *d = clamp_u16(s[3]);
    }
}

fn alpha16f_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    let src: &[u16] = bytemuck::cast_slice(src);
    for (d, s) in dest.iter_mut().zip(src) {
        let a = fp16::half_to_float_one(*s);
        *d = [a, a, a, a];
    }
}

fn alpha16f_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    let dest: &mut [u16] = bytemuck::cast_slice_mut(dest);
    for (d, s) in dest.iter_mut().zip(src) {
        *d = fp16::float_to_half_one(s[3]);
    }
}

fn alpha32f_to_float(dest: &mut [[f32; 4]], src: &[u8]) {
    let src: &[f32] = bytemuck::cast_slice(src);
    for (d, s) in dest.iter_mut().zip(src) {
        *d = [*s, *s, *s, *s];
    }
}

fn alpha32f_from_float(dest: &mut [u8], src: &[[f32; 4]]) {
    let dest: &mut [f32] = bytemuck::cast_slice_mut(dest);
    for (d, s) in dest.iter_mut().zip(src) {
        *d = s[3];
    }
}

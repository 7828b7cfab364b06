// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Power-of-two downsampling for mipmap generation.
//!
//! Works directly on the encoded channels, so averaging happens in the
//! format's own color representation. Half-float channels go through the
//! fp16 codec.

use crate::format::{ChannelDepth, PixelFormat};
use crate::fp16;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

/// How source pixels are combined into a destination pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipmapFilter {
    /// Pick the center sample of each block.
    Nearest,
    /// Box-filter average over the block.
    Linear,
}

/// Downsample `width x height` pixels by `2^lod_level` in both dimensions.
///
/// The destination is `ceil(width / 2^lod_level)` pixels wide and
/// `ceil(height / 2^lod_level)` rows tall, in the same `format` as the
/// source. Strides are in bytes; the same alignment rules as
/// [`convert`](crate::convert) apply.
pub fn mipmap(
    dst: &mut [u8],
    dst_stride: usize,
    src: &[u8],
    src_stride: usize,
    format: PixelFormat,
    width: usize,
    height: usize,
    lod_level: u32,
    filter: MipmapFilter,
) {
    assert!(lod_level >= 1);
    assert!(width > 0 && height > 0);
    let bpp = format.bytes_per_pixel();
    assert!(src_stride >= width * bpp);
    assert_eq!(dst.as_ptr() as usize % format.alignment(), 0);
    assert_eq!(src.as_ptr() as usize % format.alignment(), 0);

    match format.depth() {
        ChannelDepth::U8 => run::<u8>(dst, dst_stride, src, src_stride, format, width, height, lod_level, filter),
        ChannelDepth::U16 => run::<u16>(dst, dst_stride, src, src_stride, format, width, height, lod_level, filter),
        ChannelDepth::F16 => run::<Half>(dst, dst_stride, src, src_stride, format, width, height, lod_level, filter),
        ChannelDepth::F32 => run::<f32>(dst, dst_stride, src, src_stride, format, width, height, lod_level, filter),
    }
}

trait MipChannel: Pod {
    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
}

impl MipChannel for u8 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> Self {
        v.round().clamp(0.0, 255.0) as u8
    }
}

impl MipChannel for u16 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> Self {
        v.round().clamp(0.0, 65535.0) as u16
    }
}

impl MipChannel for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

/// A half-float channel in storage form.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(transparent)]
struct Half(u16);

impl MipChannel for Half {
    fn to_f64(self) -> f64 {
        fp16::half_to_float_one(self.0) as f64
    }

    fn from_f64(v: f64) -> Self {
        Self(fp16::float_to_half_one(v as f32))
    }
}

#[allow(clippy::too_many_arguments)]
fn run<T: MipChannel>(
    dst: &mut [u8],
    dst_stride: usize,
    src: &[u8],
    src_stride: usize,
    format: PixelFormat,
    width: usize,
    height: usize,
    lod_level: u32,
    filter: MipmapFilter,
) {
    let channels = format.bytes_per_pixel() / format.depth().bytes();
    let n = 1usize << lod_level;
    let dest_width = width.div_ceil(n);
    let dest_height = height.div_ceil(n);
    assert!(dst_stride >= dest_width * format.bytes_per_pixel());

    for dy in 0..dest_height {
        let dst_row: &mut [T] = bytemuck::cast_slice_mut(
            &mut dst[dy * dst_stride..dy * dst_stride + dest_width * channels * size_of::<T>()],
        );
        match filter {
            MipmapFilter::Nearest => {
                let sy = (dy * n + n / 2).min(height - 1);
                let src_row: &[T] = bytemuck::cast_slice(
                    &src[sy * src_stride..sy * src_stride + width * channels * size_of::<T>()],
                );
                for dx in 0..dest_width {
                    let sx = (dx * n + n / 2).min(width - 1);
                    dst_row[dx * channels..(dx + 1) * channels]
                        .copy_from_slice(&src_row[sx * channels..(sx + 1) * channels]);
                }
            }
            MipmapFilter::Linear => {
                for dx in 0..dest_width {
                    let x0 = dx * n;
                    let y0 = dy * n;
                    let x1 = (x0 + n).min(width);
                    let y1 = (y0 + n).min(height);
                    let count = ((x1 - x0) * (y1 - y0)) as f64;
                    let mut sums = [0f64; 4];
                    for sy in y0..y1 {
                        let src_row: &[T] = bytemuck::cast_slice(
                            &src[sy * src_stride..sy * src_stride + width * channels * size_of::<T>()],
                        );
                        for sx in x0..x1 {
                            for (c, sum) in sums.iter_mut().enumerate().take(channels) {
                                *sum += src_row[sx * channels + c].to_f64();
                            }
                        }
                    }
                    for (c, sum) in sums.iter().enumerate().take(channels) {
                        dst_row[dx * channels + c] = T::from_f64(sum / count);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_averages_blocks() {
        // 4x4 gray image: one 2x2 quadrant of 100s, rest 0.
        #[rustfmt::skip]
        let src = [
            100u8, 100, 0, 0,
            100, 100, 0, 0,
            0, 0, 40, 40,
            0, 0, 40, 40,
        ];
        let mut dst = [0u8; 4];
        mipmap(&mut dst, 2, &src, 4, PixelFormat::Gray8, 4, 4, 1, MipmapFilter::Linear);
        assert_eq!(dst, [100, 0, 0, 40]);
    }

    #[test]
    fn nearest_picks_block_center() {
        #[rustfmt::skip]
        let src = [
            1u8, 2, 3, 4,
            5, 6, 7, 8,
            9, 10, 11, 12,
            13, 14, 15, 16,
        ];
        let mut dst = [0u8; 4];
        mipmap(&mut dst, 2, &src, 4, PixelFormat::Gray8, 4, 4, 1, MipmapFilter::Nearest);
        // Center of each 2x2 block is its bottom-right sample.
        assert_eq!(dst, [6, 8, 14, 16]);
    }

    #[test]
    fn odd_sizes_clamp_at_the_edges() {
        let src = [10u8, 20, 30];
        let mut dst = [0u8; 2];
        mipmap(&mut dst, 2, &src, 3, PixelFormat::Gray8, 3, 1, 1, MipmapFilter::Linear);
        assert_eq!(dst, [15, 30]);
    }

    #[test]
    fn multi_channel_blocks_average_per_channel() {
        // 2x2 RGBA8 down to 1x1.
        #[rustfmt::skip]
        let src = [
            255u8, 0, 0, 255,   0, 0, 0, 255,
            0, 0, 0, 255,       255, 0, 0, 255,
        ];
        let mut dst = [0u8; 4];
        mipmap(&mut dst, 4, &src, 8, PixelFormat::Rgba8, 2, 2, 1, MipmapFilter::Linear);
        assert_eq!(dst, [128, 0, 0, 255]);
    }

    #[test]
    fn half_float_channels_average_through_the_codec() {
        let src_px = [fp16::FP16_ONE, fp16::FP16_ZERO];
        let src: &[u8] = bytemuck::cast_slice(&src_px);
        let mut dst_px = [0u16; 1];
        mipmap(
            bytemuck::cast_slice_mut(&mut dst_px),
            2,
            src,
            4,
            PixelFormat::Alpha16Float,
            2,
            1,
            1,
            MipmapFilter::Linear,
        );
        // (1.0 + 0.0) / 2
        assert_eq!(dst_px[0], 0x3800);
    }
}

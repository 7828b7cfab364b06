// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel format conversion for the quilt GPU cache.
//!
//! This crate is the upload-side leaf of the quilt renderer: it transcodes
//! CPU pixel buffers between the encodings the scene producers hand us and
//! the encodings the GPU images want, without ever touching GPU state.
//!
//! # Contents
//!
//! - [`PixelFormat`]: the supported pixel encodings and their properties.
//! - [`convert`]: scanline conversion between any two encodings, with fast
//!   paths for the common image-upload pairs.
//! - [`fp16`]: `f32` ↔ half-float transcoding with a runtime-selected SIMD
//!   implementation.
//! - [`mipmap`]: power-of-two box-filter downsampling.

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![warn(unsafe_op_in_unsafe_fn)]
#![expect(
    clippy::cast_possible_truncation,
    reason = "Quantization to integer channel values is the point of this crate."
)]

mod convert;
mod format;
pub mod fp16;
mod mipmap;

pub use convert::{convert, premultiply, unpremultiply};
pub use format::{AlphaMode, ChannelDepth, PixelFormat};
pub use mipmap::{mipmap, MipmapFilter};

// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Atlas-packed GPU resource caching for the quilt renderer.
//!
//! The cache answers one question for the frame walker: given a semantic key
//! (a glyph at a scale and subpixel phase, a filled or stroked path), where
//! on the GPU is its rendering? Hits return a texture region immediately;
//! misses reserve space in a shared atlas (or a dedicated texture for
//! oversized content), schedule rasterization through the caller's upload
//! queue, and return the reserved placement.
//!
//! Everything is frame-thread single-threaded. Eviction is explicit: call
//! [`GpuCache::begin_frame`] with a monotonic time each frame and
//! [`GpuCache::gc`] whenever idle time allows.

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET

mod atlas;
mod cache;
mod fill;
mod glyph;
mod mask;
mod stroke;
mod subpixel;
mod texture;

pub use atlas::{AllocId, AtlasAllocator, AtlasError, AtlasRect};
pub use cache::{GcStats, GpuCache, GpuCacheConfig};
pub use glyph::GlyphImage;
pub use mask::MaskImage;
pub use subpixel::{align_glyph_origin, GlyphPhase, SUBPIXEL_GRID};
pub use texture::{
    Device, FontId, FontService, RasterJob, RasterJobKind, Texture, UploadQueue,
};

// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The seams between the cache and the GPU backend.
//!
//! The cache never touches pixel memory. It reserves space, records what has
//! to be rasterized where, and hands those instructions to the upload queue.
//! Backends implement [`Device`] to create textures and [`UploadQueue`] to
//! consume rasterization jobs; fonts are reached through [`FontService`].

use std::sync::Arc;

use peniko::kurbo::{BezPath, Rect, Stroke, Vec2};
use peniko::Fill;
use quilt_pixel::PixelFormat;

use crate::atlas::AtlasRect;
use crate::subpixel::GlyphPhase;

/// A GPU texture as far as the cache is concerned.
pub trait Texture {
    /// Width in pixels.
    fn width(&self) -> u32;
    /// Height in pixels.
    fn height(&self) -> u32;
}

/// Creates the textures the cache allocates into.
pub trait Device {
    /// The texture type this device produces.
    type Texture: Texture;

    /// Create a texture suitable for hosting many atlas-packed items.
    fn create_atlas_texture(&mut self, width: u32, height: u32) -> Self::Texture;

    /// Create a dedicated texture for a single oversized item.
    fn create_texture(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Self::Texture;
}

/// Identity of a font for cache-key purposes.
///
/// Two fonts compare equal exactly when their backing data and face index
/// are the same; the cache never inspects font data itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontId {
    /// Unique id of the font data blob.
    pub data_id: u64,
    /// Face index within the blob.
    pub index: u32,
}

/// Resolves glyph metrics for cache sizing.
pub trait FontService {
    /// The ink bounding box of a glyph in font units, where the render scale
    /// maps font units to device pixels. `None` for glyphs without ink
    /// (e.g. spaces).
    fn glyph_ink_extents(&self, font: FontId, glyph_id: u32) -> Option<Rect>;
}

/// A deferred rasterization the cache has reserved space for.
///
/// `target_rect` is the region inside `target` (including any padding) that
/// the job must fill; `viewport` is the source-space rectangle that maps
/// onto it.
#[derive(Debug, Clone)]
pub struct RasterJob {
    /// What to rasterize.
    pub kind: RasterJobKind,
    /// Placement inside the target texture.
    pub target_rect: AtlasRect,
    /// Source-space rectangle mapped onto `target_rect`.
    pub viewport: Rect,
}

/// The content of a [`RasterJob`].
#[derive(Debug, Clone)]
pub enum RasterJobKind {
    /// A glyph rendered at a fixed scale and subpixel phase.
    Glyph {
        /// The font to pull the glyph from.
        font: FontId,
        /// Glyph index within the font.
        glyph_id: u32,
        /// Font-unit to device-pixel scale.
        scale: f32,
        /// Subpixel phase the glyph was keyed under.
        phase: GlyphPhase,
    },
    /// A filled path rendered as a coverage mask.
    Fill {
        /// The path to fill.
        path: Arc<BezPath>,
        /// Fill rule.
        fill_rule: Fill,
        /// Per-axis device scale.
        scale: Vec2,
    },
    /// A stroked path rendered as a coverage mask.
    Stroke {
        /// The path to stroke.
        path: Arc<BezPath>,
        /// Stroke style, including dashing for rendering even though dashing
        /// is not part of the cache key.
        style: Stroke,
        /// Per-axis device scale.
        scale: Vec2,
    },
}

/// Receives the rasterization work the cache schedules.
///
/// The cache treats enqueued jobs as fire-and-forget; it never observes
/// completion.
pub trait UploadQueue<T: Texture> {
    /// Rasterize `job` into its target rect of `target`.
    fn enqueue_rasterize(&mut self, target: &Arc<T>, job: RasterJob);
}

// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glyph lookup.

use std::sync::Arc;

use peniko::kurbo::{Point, Rect};
use quilt_pixel::PixelFormat;

use crate::atlas::AtlasRect;
use crate::cache::{CacheEntry, CachedResource, GpuCache};
use crate::subpixel::GlyphPhase;
use crate::texture::{Device, FontId, FontService, RasterJob, RasterJobKind, Texture, UploadQueue};

/// Cache key for a rendered glyph.
///
/// `scale_bits` compares the render scale by exact bit equality; callers are
/// expected to quantize scales before lookup rather than rely on the cache
/// to collapse nearby values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct GlyphKey {
    font: FontId,
    glyph: u32,
    phase: GlyphPhase,
    scale_bits: u32,
}

pub(crate) struct CachedGlyph<T> {
    pub res: CachedResource<T>,
    /// Device-space offset from the glyph origin to the top left of the
    /// cached region, phase offset included.
    pub origin: Point,
}

impl<T> CacheEntry<T> for CachedGlyph<T> {
    fn res(&self) -> &CachedResource<T> {
        &self.res
    }

    fn res_mut(&mut self) -> &mut CachedResource<T> {
        &mut self.res
    }
}

/// A ready-to-sample glyph rendering.
#[derive(Debug)]
pub struct GlyphImage<T> {
    /// Texture holding the glyph, possibly shared with other items.
    pub texture: Arc<T>,
    /// Region of `texture` the glyph occupies.
    pub area: AtlasRect,
    /// Device-space offset from the glyph origin to the top left of `area`.
    pub origin: Point,
    /// Device-space ink bounds relative to the glyph origin; `origin` with
    /// the size of `area`.
    pub bounds: Rect,
}

impl<T: Texture> GpuCache<T> {
    /// Fetch or create the rendering of a glyph at `scale` and subpixel
    /// `phase`.
    ///
    /// On a miss this reserves texture space and schedules rasterization on
    /// `queue`; the returned placement is valid immediately. Returns `None`
    /// for glyphs without ink.
    pub fn lookup_or_create_glyph<D, Q, F>(
        &mut self,
        device: &mut D,
        queue: &mut Q,
        fonts: &F,
        font: FontId,
        glyph_id: u32,
        scale: f32,
        phase: GlyphPhase,
    ) -> Option<GlyphImage<T>>
    where
        D: Device<Texture = T>,
        Q: UploadQueue<T>,
        F: FontService,
    {
        let key = GlyphKey {
            font,
            glyph: glyph_id,
            phase,
            scale_bits: scale.to_bits(),
        };
        if let Some(entry) = self.glyphs.get_mut(&key) {
            Self::touch(self.now, &mut self.atlases, &mut entry.res);
            return Some(glyph_image(entry));
        }

        let ink = fonts.glyph_ink_extents(font, glyph_id)?;
        let s = f64::from(scale);
        let dx = f64::from(phase.x()) * 0.25;
        let dy = f64::from(phase.y()) * 0.25;
        let rect = Rect::new(
            ink.x0 * s + dx,
            ink.y0 * s + dy,
            ink.x1 * s + dx,
            ink.y1 * s + dy,
        );
        if !(rect.width() > 0.0 && rect.height() > 0.0) {
            return None;
        }
        let x0 = rect.x0.floor();
        let y0 = rect.y0.floor();
        let width = (rect.x1.ceil() - x0) as u32;
        let height = (rect.y1.ceil() - y0) as u32;

        let alloc = self.allocate_resource(device, PixelFormat::Rgba8Premul, width, height);
        let pad = f64::from(alloc.area.x - alloc.padded.x);
        queue.enqueue_rasterize(
            &alloc.texture,
            RasterJob {
                kind: RasterJobKind::Glyph {
                    font,
                    glyph_id,
                    scale,
                    phase,
                },
                target_rect: alloc.padded,
                viewport: Rect::new(
                    x0 - pad,
                    y0 - pad,
                    x0 + f64::from(width) + pad,
                    y0 + f64::from(height) + pad,
                ),
            },
        );

        let entry = CachedGlyph {
            res: CachedResource {
                texture: alloc.texture,
                storage: alloc.storage,
                area: alloc.area,
                timestamp: self.now,
                stale: false,
                pixels: u64::from(alloc.padded.width) * u64::from(alloc.padded.height),
            },
            origin: Point::new(x0, y0),
        };
        let image = glyph_image(&entry);
        self.glyphs.insert(key, entry);
        Some(image)
    }
}

fn glyph_image<T>(entry: &CachedGlyph<T>) -> GlyphImage<T> {
    GlyphImage {
        texture: entry.res.texture.clone(),
        area: entry.res.area,
        origin: entry.origin,
        bounds: Rect::from_origin_size(
            entry.origin,
            (
                f64::from(entry.res.area.width),
                f64::from(entry.res.area.height),
            ),
        ),
    }
}

// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stroke mask lookup.

use std::sync::Arc;

use peniko::kurbo::{BezPath, Cap, Join, Rect, Shape, Stroke, Vec2};
use quilt_pixel::PixelFormat;

use crate::cache::{intersect_nonempty, CachedResource, GpuCache};
use crate::mask::{mask_geometry, padded_viewport, CachedMask, MaskImage};
use crate::texture::{Device, RasterJob, RasterJobKind, Texture, UploadQueue};

/// Cache key for a stroke mask.
///
/// Keyed like [`FillKey`] plus the stroke's width, caps, join and miter
/// limit. The dash pattern is deliberately not part of the key: strokes that
/// differ only in dashing share one entry. That makes dashed strokes with
/// distinct dash arrays collide, which is a known, accepted imprecision.
///
/// [`FillKey`]: crate::fill::FillKey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StrokeKey {
    path: usize,
    scale_x_bits: u64,
    scale_y_bits: u64,
    phase: (u8, u8),
    width_bits: u64,
    start_cap: u8,
    end_cap: u8,
    join: u8,
    miter_bits: u64,
}

fn cap_bits(cap: Cap) -> u8 {
    match cap {
        Cap::Butt => 0,
        Cap::Square => 1,
        Cap::Round => 2,
    }
}

impl StrokeKey {
    fn new(path: &Arc<BezPath>, style: &Stroke, scale: Vec2, phase: (u8, u8)) -> Self {
        Self {
            path: Arc::as_ptr(path) as usize,
            scale_x_bits: scale.x.to_bits(),
            scale_y_bits: scale.y.to_bits(),
            phase,
            width_bits: style.width.to_bits(),
            start_cap: cap_bits(style.start_cap),
            end_cap: cap_bits(style.end_cap),
            join: match style.join {
                Join::Bevel => 0,
                Join::Miter => 1,
                Join::Round => 2,
            },
            miter_bits: style.miter_limit.to_bits(),
        }
    }
}

/// Conservative bounds of a stroked path: the fill bounds grown by the
/// stroke radius, widened for miter spikes and square cap corners.
fn stroke_bounds(path: &BezPath, style: &Stroke) -> Rect {
    let mut factor: f64 = 1.0;
    if matches!(style.join, Join::Miter) {
        factor = factor.max(style.miter_limit);
    }
    if matches!(style.start_cap, Cap::Square) || matches!(style.end_cap, Cap::Square) {
        factor = factor.max(std::f64::consts::SQRT_2);
    }
    let r = 0.5 * style.width * factor;
    path.bounding_box().inflate(r, r)
}

impl<T: Texture> GpuCache<T> {
    /// Fetch or create the coverage mask of a stroked path.
    ///
    /// Same contract as [`lookup_or_create_fill`]; the mask covers the
    /// stroke's conservative bounds within `clip`.
    ///
    /// [`lookup_or_create_fill`]: GpuCache::lookup_or_create_fill
    pub fn lookup_or_create_stroke<D, Q>(
        &mut self,
        device: &mut D,
        queue: &mut Q,
        scale: Vec2,
        offset: Vec2,
        clip: Rect,
        path: &Arc<BezPath>,
        style: &Stroke,
    ) -> Option<MaskImage<T>>
    where
        D: Device<Texture = T>,
        Q: UploadQueue<T>,
    {
        let bounds = intersect_nonempty(stroke_bounds(path, style), clip)?;
        let geo = mask_geometry(bounds + offset, scale)?;
        let key = StrokeKey::new(path, style, scale, geo.phase);
        if let Some(entry) = self.strokes.get_mut(&key) {
            Self::touch(self.now, &mut self.atlases, &mut entry.res);
            return Some(MaskImage {
                texture: entry.res.texture.clone(),
                area: entry.res.area,
                rect: entry.rect - geo.residual,
            });
        }
        let rect = geo.rect - offset;

        let alloc = self.allocate_resource(device, PixelFormat::Alpha8, geo.width, geo.height);
        let pad = f64::from(alloc.area.x - alloc.padded.x);
        queue.enqueue_rasterize(
            &alloc.texture,
            RasterJob {
                kind: RasterJobKind::Stroke {
                    path: path.clone(),
                    style: style.clone(),
                    scale,
                },
                target_rect: alloc.padded,
                viewport: padded_viewport(rect, scale, pad),
            },
        );

        let image = MaskImage {
            texture: alloc.texture.clone(),
            area: alloc.area,
            rect: rect - geo.residual,
        };
        self.strokes.insert(
            key,
            CachedMask {
                res: CachedResource {
                    texture: alloc.texture,
                    storage: alloc.storage,
                    area: alloc.area,
                    timestamp: self.now,
                    stale: false,
                    pixels: u64::from(alloc.padded.width) * u64::from(alloc.padded.height),
                },
                rect,
                path: path.clone(),
            },
        );
        Some(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::kurbo::Line;

    #[test]
    fn stroke_bounds_cover_the_stroke_radius() {
        let path: BezPath = Line::new((0.0, 0.0), (10.0, 0.0)).into_path(0.1);
        let style = Stroke::new(4.0);
        let bounds = stroke_bounds(&path, &style);
        assert!(bounds.y0 <= -2.0 && bounds.y1 >= 2.0);
        assert!(bounds.x0 <= -2.0 && bounds.x1 >= 12.0);

        // Miter joins can spike out by the miter limit.
        let mitered = Stroke::new(4.0).with_join(Join::Miter).with_miter_limit(10.0);
        let wide = stroke_bounds(&path, &mitered);
        assert!(wide.y1 >= 20.0);
    }

    #[test]
    fn dash_pattern_is_not_part_of_the_key() {
        let path = Arc::new(BezPath::new());
        let plain = Stroke::new(2.0);
        let dashed = Stroke::new(2.0).with_dashes(0.0, [1.0, 2.0]);
        let scale = Vec2::new(1.0, 1.0);
        assert_eq!(
            StrokeKey::new(&path, &plain, scale, (0, 0)),
            StrokeKey::new(&path, &dashed, scale, (0, 0))
        );
        let thick = Stroke::new(3.0);
        assert_ne!(
            StrokeKey::new(&path, &plain, scale, (0, 0)),
            StrokeKey::new(&path, &thick, scale, (0, 0))
        );
    }
}

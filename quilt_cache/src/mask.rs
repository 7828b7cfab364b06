// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared machinery for cached coverage masks (fills and strokes).

use std::sync::Arc;

use peniko::kurbo::{Rect, Vec2};

use crate::atlas::AtlasRect;
use crate::cache::{CacheEntry, CachedResource};
use crate::subpixel::quantize;

/// A ready-to-sample coverage mask.
#[derive(Debug)]
pub struct MaskImage<T> {
    /// Texture holding the mask, possibly shared with other items.
    pub texture: Arc<T>,
    /// Region of `texture` the mask occupies.
    pub area: AtlasRect,
    /// Path-space rectangle to draw `area` at, relative to the lookup's
    /// offset. Already corrected for the subpixel residual of the position
    /// the lookup was made with.
    pub rect: Rect,
}

/// A fill or stroke mask held by the cache.
pub(crate) struct CachedMask<T> {
    pub res: CachedResource<T>,
    /// Path-space rect at the quantized subpixel position, relative to the
    /// draw offset.
    pub rect: Rect,
    /// Keeps the keyed path's identity alive; fill and stroke keys compare
    /// paths by address.
    #[allow(dead_code, reason = "held for its ownership, never read")]
    pub path: Arc<peniko::kurbo::BezPath>,
}

impl<T> CacheEntry<T> for CachedMask<T> {
    fn res(&self) -> &CachedResource<T> {
        &self.res
    }

    fn res_mut(&mut self) -> &mut CachedResource<T> {
        &mut self.res
    }
}

/// Device-space footprint of a mask, derived from its source bounds.
pub(crate) struct MaskGeometry {
    /// Subpixel phase per axis, part of the cache key.
    pub phase: (u8, u8),
    /// Source-space correction back to the unquantized position.
    pub residual: Vec2,
    /// Mask size in device pixels, padding excluded.
    pub width: u32,
    pub height: u32,
    /// Source-space rect of the mask at the quantized position.
    pub rect: Rect,
}

/// Snap source-space `bounds` to the device pixel grid at its quantized
/// subpixel position. `None` for degenerate bounds or scales, which the
/// caller treats as nothing to draw.
pub(crate) fn mask_geometry(bounds: Rect, scale: Vec2) -> Option<MaskGeometry> {
    if !(scale.x > 0.0 && scale.y > 0.0) {
        return None;
    }
    let qx = quantize(bounds.x0, scale.x);
    let qy = quantize(bounds.y0, scale.y);
    let x0 = ((bounds.x0 + qx.residual) * scale.x).floor();
    let y0 = ((bounds.y0 + qy.residual) * scale.y).floor();
    let x1 = ((bounds.x1 + qx.residual) * scale.x).ceil();
    let y1 = ((bounds.y1 + qy.residual) * scale.y).ceil();
    let width = (x1 - x0) as u32;
    let height = (y1 - y0) as u32;
    if width == 0 || height == 0 {
        return None;
    }
    Some(MaskGeometry {
        phase: (qx.key, qy.key),
        residual: Vec2::new(qx.residual, qy.residual),
        width,
        height,
        rect: Rect::new(x0 / scale.x, y0 / scale.y, x1 / scale.x, y1 / scale.y),
    })
}

/// Grow the rasterization viewport by the padding border, converted back to
/// source space.
pub(crate) fn padded_viewport(rect: Rect, scale: Vec2, pad: f64) -> Rect {
    Rect::new(
        rect.x0 - pad / scale.x,
        rect.y0 - pad / scale.y,
        rect.x1 + pad / scale.x,
        rect.y1 + pad / scale.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_covers_the_bounds() {
        let bounds = Rect::new(1.3, 2.7, 10.2, 8.1);
        let geo = mask_geometry(bounds, Vec2::new(2.0, 2.0)).unwrap();
        // The quantized rect contains the bounds shifted by the residual.
        let shifted = bounds + geo.residual;
        assert!(geo.rect.x0 <= shifted.x0 + 1e-9);
        assert!(geo.rect.y0 <= shifted.y0 + 1e-9);
        assert!(geo.rect.x1 >= shifted.x1 - 1e-9);
        assert!(geo.rect.y1 >= shifted.y1 - 1e-9);
        // Device size matches the rect under the scale.
        assert_eq!(f64::from(geo.width), (geo.rect.width() * 2.0).round());
        assert_eq!(f64::from(geo.height), (geo.rect.height() * 2.0).round());
    }

    #[test]
    fn degenerate_bounds_produce_nothing() {
        let scale = Vec2::new(1.0, 1.0);
        assert!(mask_geometry(Rect::new(3.0, 1.0, 3.0, 5.0), scale).is_none());
        assert!(mask_geometry(Rect::new(0.0, 0.0, 4.0, 0.0), scale).is_none());
        assert!(mask_geometry(Rect::new(0.0, 0.0, 4.0, 4.0), Vec2::new(0.0, 1.0)).is_none());
    }

    #[test]
    fn nearby_positions_quantize_to_the_same_phase() {
        let a = mask_geometry(Rect::new(1.301, 0.0, 5.0, 5.0), Vec2::new(1.0, 1.0)).unwrap();
        let b = mask_geometry(Rect::new(1.309, 0.0, 5.0, 5.0), Vec2::new(1.0, 1.0)).unwrap();
        assert_eq!(a.phase, b.phase);
        assert_eq!(a.rect.x0, b.rect.x0);
        // After residual correction the two placements agree to within one
        // subpixel grid step.
        let pa = a.rect.x0 - a.residual.x;
        let pb = b.rect.x0 - b.residual.x;
        assert!((pa - pb).abs() < 1.0 / 32.0);
        // The residual snaps each position up onto the 1/32 grid.
        for (pos, geo) in [(1.301, &a), (1.309, &b)] {
            let snapped = (pos + geo.residual.x) * 32.0;
            assert!((snapped - snapped.round()).abs() < 1e-9);
        }
    }
}

// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subpixel phase quantization for cache keys.
//!
//! Fractional device positions are discretized so that renderings closer
//! than one grid step share a cache entry while visually distinct phases get
//! their own. Masks use a 1/32 pixel grid per axis; glyphs use the coarser
//! 1/4 pixel phase their rasterizers support.

use peniko::kurbo::Point;

/// Subgrid resolution for mask keys, in steps per device pixel.
pub const SUBPIXEL_GRID: u32 = 32;

/// One axis of a quantized position.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SubpixelAxis {
    /// Grid phase in `0..SUBPIXEL_GRID`, part of the cache key.
    pub key: u8,
    /// Source-space correction to apply to the returned placement so a hit
    /// at a slightly different fractional position still lands on the right
    /// subpixel.
    pub residual: f64,
}

/// Quantize a source-space coordinate under an axis scale onto the subpixel
/// grid.
pub(crate) fn quantize(pos: f64, scale: f64) -> SubpixelAxis {
    let grid = f64::from(SUBPIXEL_GRID);
    let scaled = scale * grid * pos;
    let frac = scaled.rem_euclid(grid);
    let key = if frac > 0.0 {
        grid - frac.ceil()
    } else {
        -frac.ceil()
    };
    let residual = (frac.ceil() - frac) / (scale * grid);
    SubpixelAxis {
        key: key as u8,
        residual,
    }
}

/// A glyph's 1/4-pixel phase on both axes, packed as the low four bits
/// (`x | y << 2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GlyphPhase(pub u8);

impl GlyphPhase {
    /// The x phase in quarter pixels, `0..4`.
    pub fn x(self) -> u8 {
        self.0 & 3
    }

    /// The y phase in quarter pixels, `0..4`.
    pub fn y(self) -> u8 {
        (self.0 >> 2) & 3
    }
}

/// Snap a device-space glyph origin to the quarter-pixel grid and derive its
/// phase flags.
///
/// The returned origin is the snapped position the glyph should be drawn at;
/// the phase selects which of the 16 subpixel renderings to use.
pub fn align_glyph_origin(origin: Point, antialias: bool) -> (Point, GlyphPhase) {
    if !antialias {
        return (
            Point::new(origin.x.round(), origin.y.round()),
            GlyphPhase(0),
        );
    }
    let align_scale = 4.0;
    let x = (origin.x * align_scale + 0.5).floor();
    let y = (origin.y * align_scale + 0.5).floor();
    let phase = ((x as i64 & 3) | ((y as i64 & 3) << 2)) as u8;
    (Point::new(x / align_scale, y / align_scale), GlyphPhase(phase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_positions_have_zero_phase() {
        for pos in [-3.0, 0.0, 1.0, 17.0] {
            let axis = quantize(pos, 1.0);
            assert_eq!(axis.key, 0);
            assert_eq!(axis.residual, 0.0);
        }
    }

    #[test]
    fn keys_cover_the_grid() {
        // Walking one device pixel in 1/32 steps hits each key exactly once.
        let mut seen = [false; 32];
        for i in 0..32 {
            let axis = quantize(i as f64 / 32.0, 1.0);
            assert!(!seen[axis.key as usize]);
            seen[axis.key as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn nearby_positions_share_a_key() {
        let a = quantize(5.0 + 10.4 / 32.0, 1.0);
        let b = quantize(5.0 + 10.6 / 32.0, 1.0);
        assert_eq!(a.key, b.key);
        // Positions more than a grid step apart do not.
        let c = quantize(5.0 + 12.5 / 32.0, 1.0);
        assert_ne!(a.key, c.key);
    }

    #[test]
    fn residual_reconstructs_the_position() {
        // Snapping up by the residual lands on a 1/32 boundary.
        for pos in [0.013, 1.99, 7.03125, 123.456] {
            for scale in [0.5, 1.0, 2.0, 3.7] {
                let axis = quantize(pos, scale);
                let snapped = (pos + axis.residual) * scale * 32.0;
                assert!((snapped - snapped.round()).abs() < 1e-6, "pos={pos} scale={scale}");
                assert!(axis.residual >= 0.0);
                assert!(axis.residual * scale <= 1.0 / 32.0 + 1e-9);
            }
        }
    }

    #[test]
    fn glyph_origin_snaps_to_quarter_pixels() {
        let (snapped, phase) = align_glyph_origin(Point::new(10.3, 20.6), true);
        assert_eq!(snapped, Point::new(10.25, 20.5));
        assert_eq!(phase.x(), 1);
        assert_eq!(phase.y(), 2);

        let (snapped, phase) = align_glyph_origin(Point::new(10.3, 20.6), false);
        assert_eq!(snapped, Point::new(10.0, 21.0));
        assert_eq!(phase, GlyphPhase(0));
    }
}

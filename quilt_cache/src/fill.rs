// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fill mask lookup.

use std::sync::Arc;

use peniko::kurbo::{BezPath, Rect, Shape, Vec2};
use peniko::Fill;
use quilt_pixel::PixelFormat;

use crate::cache::{intersect_nonempty, CachedResource, GpuCache};
use crate::mask::{mask_geometry, padded_viewport, CachedMask, MaskImage};
use crate::texture::{Device, RasterJob, RasterJobKind, Texture, UploadQueue};

/// Cache key for a fill mask.
///
/// Paths are keyed by address; they are immutable and reference counted, so
/// pointer equality is identity. The entry pins its path alive for as long
/// as the key is in the table. Scales compare by exact bit equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FillKey {
    path: usize,
    rule: u8,
    scale_x_bits: u64,
    scale_y_bits: u64,
    phase: (u8, u8),
}

impl FillKey {
    pub(crate) fn new(path: &Arc<BezPath>, fill_rule: Fill, scale: Vec2, phase: (u8, u8)) -> Self {
        Self {
            path: Arc::as_ptr(path) as usize,
            rule: match fill_rule {
                Fill::NonZero => 0,
                Fill::EvenOdd => 1,
            },
            scale_x_bits: scale.x.to_bits(),
            scale_y_bits: scale.y.to_bits(),
            phase,
        }
    }
}

impl<T: Texture> GpuCache<T> {
    /// Fetch or create the coverage mask of a filled path.
    ///
    /// `offset` is where the path will be drawn, in the path's own
    /// coordinate space; only its subpixel phase under `scale` enters the
    /// cache key, so translating content by whole device pixels keeps
    /// hitting one entry. `clip` bounds the cached region in path space;
    /// geometry fully outside it yields `None`, as do degenerate paths. On a
    /// miss this reserves texture space and schedules rasterization on
    /// `queue`. The returned rect is relative to `offset`.
    pub fn lookup_or_create_fill<D, Q>(
        &mut self,
        device: &mut D,
        queue: &mut Q,
        scale: Vec2,
        offset: Vec2,
        clip: Rect,
        path: &Arc<BezPath>,
        fill_rule: Fill,
    ) -> Option<MaskImage<T>>
    where
        D: Device<Texture = T>,
        Q: UploadQueue<T>,
    {
        let bounds = intersect_nonempty(path.bounding_box(), clip)?;
        let geo = mask_geometry(bounds + offset, scale)?;
        let key = FillKey::new(path, fill_rule, scale, geo.phase);
        if let Some(entry) = self.fills.get_mut(&key) {
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
                kind: RasterJobKind::Fill {
                    path: path.clone(),
                    fill_rule,
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
        self.fills.insert(
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

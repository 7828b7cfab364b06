// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The cache orchestrator: per-kind lookup tables, the atlas list, and the
//! garbage collection sweep.

use std::collections::HashMap;
use std::sync::Arc;

use peniko::kurbo::Rect;
use quilt_pixel::PixelFormat;

use crate::atlas::{AllocId, AtlasAllocator, AtlasError, AtlasRect};
use crate::fill::FillKey;
use crate::glyph::GlyphKey;
use crate::mask::CachedMask;
use crate::stroke::StrokeKey;
use crate::texture::{Device, Texture};

/// Pixels of padding kept around every atlas-packed item so bilinear
/// sampling never bleeds in a neighbor.
pub(crate) const ATLAS_PADDING: u32 = 1;

/// Sizing knobs for the cache's atlases.
#[derive(Debug, Clone, Copy)]
pub struct GpuCacheConfig {
    /// Size of each atlas texture.
    pub atlas_size: (u32, u32),
    /// Maximum number of shelf slices per atlas.
    pub max_slices: usize,
    /// Maximum number of atlases before falling back to dedicated textures.
    pub max_atlases: usize,
    /// Items whose padded width or height exceeds this always get a
    /// dedicated texture; large items fragment shelves badly.
    pub max_item_size: u32,
}

impl Default for GpuCacheConfig {
    fn default() -> Self {
        Self {
            atlas_size: (1024, 1024),
            max_slices: 64,
            max_atlases: 8,
            max_item_size: 256,
        }
    }
}

/// Where a cached item's pixels live.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Storage {
    /// Packed into an atlas; `atlas` indexes the cache's atlas arena.
    Atlas { atlas: usize, slot: AllocId },
    /// Owns its texture outright.
    Dedicated,
}

/// Lifecycle state shared by every cached kind.
#[derive(Debug)]
pub(crate) struct CachedResource<T> {
    pub texture: Arc<T>,
    pub storage: Storage,
    /// Content region inside `texture`, padding excluded.
    pub area: AtlasRect,
    /// Frame time of the last use.
    pub timestamp: i64,
    /// Past its timeout but pinned by its atlas.
    pub stale: bool,
    /// Area charged against the atlas, padding included.
    pub pixels: u64,
}

/// Accessor for the shared lifecycle state of a map entry.
pub(crate) trait CacheEntry<T> {
    fn res(&self) -> &CachedResource<T>;
    fn res_mut(&mut self) -> &mut CachedResource<T>;
}

pub(crate) struct CachedAtlas<T> {
    pub texture: Arc<T>,
    pub allocator: AtlasAllocator,
    /// Pixels held by stale items, reclaimable by a purge.
    pub dead_pixels: u64,
    /// Last time an item was packed into or used from this atlas.
    pub timestamp: i64,
}

/// Result of one [`GpuCache::gc`] sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Resources (including atlases) freed by this sweep.
    pub collected: usize,
    /// Resources still cached after the sweep.
    pub remaining: usize,
    /// Pixels held by stale atlas items after the sweep.
    pub dead_pixels: u64,
}

impl GcStats {
    /// Whether the sweep freed anything.
    pub fn any_collected(&self) -> bool {
        self.collected > 0
    }
}

/// A successful space reservation for one item.
pub(crate) struct ResourceAlloc<T> {
    pub texture: Arc<T>,
    pub storage: Storage,
    /// Content region, padding excluded.
    pub area: AtlasRect,
    /// Rasterization target, padding included. Equals `area` for dedicated
    /// textures, which carry no padding.
    pub padded: AtlasRect,
}

/// Caches rasterized glyphs and coverage masks on GPU textures.
///
/// The cache is single-threaded; all lookups and sweeps happen on the frame
/// thread. Returned texture handles stay valid until the next [`gc`] sweep
/// unless re-looked-up first, which refreshes their lifetime.
///
/// [`gc`]: GpuCache::gc
pub struct GpuCache<T: Texture> {
    pub(crate) config: GpuCacheConfig,
    /// Current frame time, set by [`Self::begin_frame`].
    pub(crate) now: i64,
    pub(crate) atlases: Vec<Option<CachedAtlas<T>>>,
    free_atlases: Vec<usize>,
    pub(crate) glyphs: HashMap<GlyphKey, crate::glyph::CachedGlyph<T>>,
    pub(crate) fills: HashMap<FillKey, CachedMask<T>>,
    pub(crate) strokes: HashMap<StrokeKey, CachedMask<T>>,
}

impl<T: Texture> GpuCache<T> {
    /// Create an empty cache.
    pub fn new(config: GpuCacheConfig) -> Self {
        Self {
            config,
            now: 0,
            atlases: Vec::new(),
            free_atlases: Vec::new(),
            glyphs: HashMap::new(),
            fills: HashMap::new(),
            strokes: HashMap::new(),
        }
    }

    /// Set the frame time used to stamp lookups until the next call.
    ///
    /// `now` must not decrease between frames.
    pub fn begin_frame(&mut self, now: i64) {
        self.now = now;
    }

    /// Number of cached resources, atlases included.
    pub fn len(&self) -> usize {
        let atlases = self.atlases.iter().filter(|a| a.is_some()).count();
        atlases + self.glyphs.len() + self.fills.len() + self.strokes.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refresh a hit entry's lifetime and atlas accounting.
    pub(crate) fn touch(
        now: i64,
        atlases: &mut [Option<CachedAtlas<T>>],
        res: &mut CachedResource<T>,
    ) {
        res.timestamp = now;
        if let Storage::Atlas { atlas, .. } = res.storage {
            let atlas = atlases[atlas]
                .as_mut()
                .expect("cached item points at a torn-down atlas");
            atlas.timestamp = now;
            if res.stale {
                res.stale = false;
                atlas.dead_pixels -= res.pixels;
            }
        } else {
            res.stale = false;
        }
    }

    /// Reserve space for a `width` x `height` item.
    ///
    /// Prefers packing into an atlas; falls back to a dedicated `format`
    /// texture when the item is oversized or every atlas is full. The
    /// dedicated path drops the padding border, so oversized content loses
    /// its bilinear bleed guard.
    pub(crate) fn allocate_resource<D: Device<Texture = T>>(
        &mut self,
        device: &mut D,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> ResourceAlloc<T> {
        match self.try_atlas_allocate(device, width, height) {
            Ok(alloc) => alloc,
            Err(err) => {
                log::debug!("atlas allocation of {width}x{height} failed ({err}), using a dedicated texture");
                let texture = Arc::new(device.create_texture(format, width, height));
                let area = AtlasRect {
                    x: 0,
                    y: 0,
                    width,
                    height,
                };
                ResourceAlloc {
                    texture,
                    storage: Storage::Dedicated,
                    area,
                    padded: area,
                }
            }
        }
    }

    fn try_atlas_allocate<D: Device<Texture = T>>(
        &mut self,
        device: &mut D,
        width: u32,
        height: u32,
    ) -> Result<ResourceAlloc<T>, AtlasError> {
        let padded_width = width + 2 * ATLAS_PADDING;
        let padded_height = height + 2 * ATLAS_PADDING;
        if padded_width.max(padded_height) > self.config.max_item_size {
            return Err(AtlasError::ItemTooLarge { width, height });
        }

        for idx in 0..self.atlases.len() {
            if self.atlases[idx].is_some() {
                if let Some(alloc) = self.atlas_allocate(idx, padded_width, padded_height) {
                    return Ok(alloc);
                }
            }
        }

        // Reclaim stale items, then retry, before paying for a new atlas.
        for idx in 0..self.atlases.len() {
            let has_dead = matches!(&self.atlases[idx], Some(a) if a.dead_pixels > 0);
            if has_dead {
                self.purge_stale(idx);
                if let Some(alloc) = self.atlas_allocate(idx, padded_width, padded_height) {
                    return Ok(alloc);
                }
            }
        }

        let live = self.atlases.iter().filter(|a| a.is_some()).count();
        if live >= self.config.max_atlases {
            return Err(AtlasError::AtlasLimitReached);
        }
        let idx = self.create_atlas(device);
        self.atlas_allocate(idx, padded_width, padded_height)
            .ok_or(AtlasError::ItemTooLarge { width, height })
    }

    fn atlas_allocate(&mut self, idx: usize, width: u32, height: u32) -> Option<ResourceAlloc<T>> {
        let now = self.now;
        let atlas = self.atlases[idx].as_mut()?;
        let slot = atlas.allocator.allocate(width, height)?;
        atlas.timestamp = now;
        let padded = atlas.allocator.get_area(slot);
        let area = AtlasRect {
            x: padded.x + ATLAS_PADDING,
            y: padded.y + ATLAS_PADDING,
            width: width - 2 * ATLAS_PADDING,
            height: height - 2 * ATLAS_PADDING,
        };
        Some(ResourceAlloc {
            texture: atlas.texture.clone(),
            storage: Storage::Atlas { atlas: idx, slot },
            area,
            padded,
        })
    }

    fn create_atlas<D: Device<Texture = T>>(&mut self, device: &mut D) -> usize {
        let (width, height) = self.config.atlas_size;
        let atlas = CachedAtlas {
            texture: Arc::new(device.create_atlas_texture(width, height)),
            allocator: AtlasAllocator::new(width, height, self.config.max_slices),
            dead_pixels: 0,
            timestamp: self.now,
        };
        match self.free_atlases.pop() {
            Some(idx) => {
                debug_assert!(self.atlases[idx].is_none());
                self.atlases[idx] = Some(atlas);
                idx
            }
            None => {
                self.atlases.push(Some(atlas));
                self.atlases.len() - 1
            }
        }
    }

    /// Evict every stale item of one atlas, freeing their slots.
    fn purge_stale(&mut self, idx: usize) {
        let atlas = self.atlases[idx]
            .as_mut()
            .expect("purge of a torn-down atlas");
        purge_stale_map(&mut self.glyphs, idx, atlas);
        purge_stale_map(&mut self.fills, idx, atlas);
        purge_stale_map(&mut self.strokes, idx, atlas);
        debug_assert_eq!(atlas.dead_pixels, 0);
    }

    /// Sweep the cache, freeing resources unused for longer than `timeout`.
    ///
    /// A negative `timeout` disables collection. Items packed into an atlas
    /// are only marked stale here; their space returns when the atlas is
    /// purged under allocation pressure or torn down once it has no fresh
    /// items left. Dedicated items are freed immediately.
    pub fn gc(&mut self, timeout: i64, now: i64) -> GcStats {
        let mut stats = GcStats::default();
        if timeout >= 0 {
            sweep_map(&mut self.glyphs, &mut self.atlases, timeout, now, &mut stats);
            sweep_map(&mut self.fills, &mut self.atlases, timeout, now, &mut stats);
            sweep_map(&mut self.strokes, &mut self.atlases, timeout, now, &mut stats);
            self.collect_atlases(timeout, now, &mut stats);
        }
        stats.remaining = self.len();
        stats.dead_pixels = self
            .atlases
            .iter()
            .flatten()
            .map(|a| a.dead_pixels)
            .sum();
        log::debug!(
            "gc: collected {}, remaining {}, {} dead pixels",
            stats.collected,
            stats.remaining,
            stats.dead_pixels
        );
        stats
    }

    /// Tear down atlases whose every item has gone stale.
    ///
    /// Stale children are collected together with their atlas, never after
    /// it, so no entry ever points at a freed texture.
    fn collect_atlases(&mut self, timeout: i64, now: i64, stats: &mut GcStats) {
        let mut fresh = vec![0u32; self.atlases.len()];
        count_fresh(&self.glyphs, &mut fresh);
        count_fresh(&self.fills, &mut fresh);
        count_fresh(&self.strokes, &mut fresh);

        for idx in 0..self.atlases.len() {
            let collect = match &self.atlases[idx] {
                Some(atlas) => fresh[idx] == 0 && now - atlas.timestamp > timeout,
                None => false,
            };
            if !collect {
                continue;
            }
            stats.collected += 1 + drop_atlas_children(&mut self.glyphs, idx)
                + drop_atlas_children(&mut self.fills, idx)
                + drop_atlas_children(&mut self.strokes, idx);
            self.atlases[idx] = None;
            self.free_atlases.push(idx);
        }
    }
}

impl<T: Texture> std::fmt::Debug for GpuCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuCache")
            .field("config", &self.config)
            .field("now", &self.now)
            .field("atlases", &self.atlases.iter().filter(|a| a.is_some()).count())
            .field("glyphs", &self.glyphs.len())
            .field("fills", &self.fills.len())
            .field("strokes", &self.strokes.len())
            .finish()
    }
}

fn purge_stale_map<T, K, V: CacheEntry<T>>(
    map: &mut HashMap<K, V>,
    idx: usize,
    atlas: &mut CachedAtlas<T>,
) {
    map.retain(|_, entry| {
        let res = entry.res();
        match res.storage {
            Storage::Atlas { atlas: a, slot } if a == idx && res.stale => {
                atlas.allocator.deallocate(slot);
                atlas.dead_pixels -= res.pixels;
                false
            }
            _ => true,
        }
    });
}

fn sweep_map<T, K, V: CacheEntry<T>>(
    map: &mut HashMap<K, V>,
    atlases: &mut [Option<CachedAtlas<T>>],
    timeout: i64,
    now: i64,
    stats: &mut GcStats,
) {
    map.retain(|_, entry| {
        let res = entry.res_mut();
        if now - res.timestamp <= timeout {
            return true;
        }
        match res.storage {
            Storage::Atlas { atlas, .. } => {
                // Deferred: the slot stays occupied until a purge or the
                // atlas teardown reclaims it.
                if !res.stale {
                    res.stale = true;
                    atlases[atlas]
                        .as_mut()
                        .expect("cached item points at a torn-down atlas")
                        .dead_pixels += res.pixels;
                }
                true
            }
            Storage::Dedicated => {
                stats.collected += 1;
                false
            }
        }
    });
}

fn count_fresh<T, K, V: CacheEntry<T>>(map: &HashMap<K, V>, fresh: &mut [u32]) {
    for entry in map.values() {
        let res = entry.res();
        if let Storage::Atlas { atlas, .. } = res.storage {
            if !res.stale {
                fresh[atlas] += 1;
            }
        }
    }
}

fn drop_atlas_children<T, K, V: CacheEntry<T>>(map: &mut HashMap<K, V>, idx: usize) -> usize {
    let before = map.len();
    map.retain(|_, entry| !matches!(entry.res().storage, Storage::Atlas { atlas, .. } if atlas == idx));
    before - map.len()
}

/// Intersection of two rectangles, or `None` when they do not overlap in
/// both dimensions.
pub(crate) fn intersect_nonempty(a: Rect, b: Rect) -> Option<Rect> {
    let r = a.intersect(b);
    (r.width() > 0.0 && r.height() > 0.0).then_some(r)
}

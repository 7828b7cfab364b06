// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shelf-style rectangle allocation inside a fixed-size atlas texture.
//!
//! The atlas is carved into horizontal slices. Each slice hosts items of
//! similar height packed left to right; when the last item of a slice is
//! freed the whole slice's width is reclaimed at once. This trades some
//! packing density for trivial bookkeeping, which fits a cache where items
//! of one kind (glyphs, masks) cluster around a few heights.

use smallvec::SmallVec;
use thiserror::Error;

/// A placement inside an atlas texture, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl AtlasRect {
    /// One past the right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether the two rectangles share any pixel.
    pub fn intersects(&self, other: &Self) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Stable handle for a live allocation.
///
/// Valid from the `allocate` call that produced it until the matching
/// `deallocate`; using it afterwards is a caller bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocId(u32);

/// Errors from atlas management at the cache level.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AtlasError {
    /// Every permitted atlas exists and none has room.
    #[error("maximum number of atlases reached")]
    AtlasLimitReached,
    /// The item exceeds what an atlas can ever hold.
    #[error("item too large ({width}x{height}) for atlas packing")]
    ItemTooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// Slice heights are rounded up to this granularity so that items of nearby
/// heights land in the same slice.
const SLICE_HEIGHT_STEP: u32 = 16;

/// A slice never hosts an item shorter than half its height, bounding the
/// vertical waste per item.
const MAX_SLICE_WASTE_FACTOR: u32 = 2;

#[derive(Debug)]
struct Slice {
    y: u32,
    height: u32,
    /// Next free x position.
    cursor: u32,
    live: u32,
}

#[derive(Debug, Clone, Copy)]
struct Allocation {
    slice: usize,
    rect: AtlasRect,
}

/// Shelf allocator over one atlas texture's area.
#[derive(Debug)]
pub struct AtlasAllocator {
    width: u32,
    height: u32,
    max_slices: usize,
    /// Slices stay few (tens at most), so keep them inline.
    slices: SmallVec<[Slice; 8]>,
    /// Top of the as yet unsliced region.
    sliced_height: u32,
    slots: Vec<Option<Allocation>>,
    free_slots: Vec<usize>,
    live: u32,
}

impl AtlasAllocator {
    /// Create an allocator for a `width` x `height` texture with at most
    /// `max_slices` internal slices.
    pub fn new(width: u32, height: u32, max_slices: usize) -> Self {
        debug_assert!(width > 0 && height > 0);
        Self {
            width,
            height,
            max_slices,
            slices: SmallVec::new(),
            sliced_height: 0,
            slots: Vec::new(),
            free_slots: Vec::new(),
            live: 0,
        }
    }

    /// Width of the managed texture.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the managed texture.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether no allocation is currently live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Reserve a `width` x `height` rectangle.
    ///
    /// Returns `None` when no slice can host the item and no new slice fits;
    /// the caller is expected to move on to another atlas or a dedicated
    /// texture. Zero-sized requests are a caller bug.
    pub fn allocate(&mut self, width: u32, height: u32) -> Option<AllocId> {
        assert!(width > 0 && height > 0, "zero-sized atlas allocation");
        if width > self.width || height > self.height {
            return None;
        }

        let slice = self.find_slice(width, height)?;
        let rect = AtlasRect {
            x: self.slices[slice].cursor,
            y: self.slices[slice].y,
            width,
            height,
        };
        self.slices[slice].cursor += width;
        self.slices[slice].live += 1;
        self.live += 1;

        let allocation = Allocation { slice, rect };
        let slot = match self.free_slots.pop() {
            Some(idx) => {
                debug_assert!(self.slots[idx].is_none());
                self.slots[idx] = Some(allocation);
                idx
            }
            None => {
                self.slots.push(Some(allocation));
                self.slots.len() - 1
            }
        };
        Some(AllocId(slot as u32))
    }

    /// Release a previously returned handle.
    ///
    /// When this was the slice's last live item the slice's width becomes
    /// available again for items of its height class.
    pub fn deallocate(&mut self, id: AllocId) {
        let slot = id.0 as usize;
        let allocation = self.slots[slot]
            .take()
            .expect("deallocate of a dead atlas handle");
        self.free_slots.push(slot);
        self.live -= 1;

        let slice = &mut self.slices[allocation.slice];
        slice.live -= 1;
        if slice.live == 0 {
            slice.cursor = 0;
        }
    }

    /// The rectangle behind a live handle.
    pub fn get_area(&self, id: AllocId) -> AtlasRect {
        self.slots[id.0 as usize]
            .expect("get_area of a dead atlas handle")
            .rect
    }

    /// Pick the best existing slice for the item, or open a new one.
    fn find_slice(&mut self, width: u32, height: u32) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (idx, slice) in self.slices.iter().enumerate() {
            if slice.height < height
                || slice.height > height * MAX_SLICE_WASTE_FACTOR
                || slice.cursor + width > self.width
            {
                continue;
            }
            match best {
                Some(b) if self.slices[b].height <= slice.height => {}
                _ => best = Some(idx),
            }
        }
        if best.is_some() {
            return best;
        }

        // Open a new slice below the existing ones.
        if self.slices.len() >= self.max_slices {
            return None;
        }
        let slice_height = height
            .next_multiple_of(SLICE_HEIGHT_STEP)
            .min(self.height - self.sliced_height);
        if slice_height < height {
            return None;
        }
        self.slices.push(Slice {
            y: self.sliced_height,
            height: slice_height,
            cursor: 0,
            live: 0,
        });
        self.sliced_height += slice_height;
        Some(self.slices.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(atlas: &AtlasAllocator, live: &[(AllocId, u32, u32)]) {
        for (i, &(id, w, h)) in live.iter().enumerate() {
            let rect = atlas.get_area(id);
            assert_eq!((rect.width, rect.height), (w, h));
            assert!(rect.right() <= atlas.width());
            assert!(rect.bottom() <= atlas.height());
            for &(other, ..) in &live[i + 1..] {
                assert!(
                    !rect.intersects(&atlas.get_area(other)),
                    "{rect:?} overlaps {:?}",
                    atlas.get_area(other)
                );
            }
        }
    }

    #[test]
    fn allocations_never_overlap() {
        let mut atlas = AtlasAllocator::new(128, 128, 16);
        let mut live = Vec::new();
        let sizes = [
            (10, 10),
            (30, 12),
            (50, 9),
            (12, 30),
            (64, 16),
            (7, 7),
            (100, 20),
            (16, 16),
        ];
        for &(w, h) in &sizes {
            let id = atlas.allocate(w, h).unwrap();
            live.push((id, w, h));
            assert_invariants(&atlas, &live);
        }
        // Free every other item, then refill; nothing may overlap at any step.
        for i in (0..sizes.len()).step_by(2).rev() {
            let (id, ..) = live.remove(i);
            atlas.deallocate(id);
            assert_invariants(&atlas, &live);
        }
        for &(w, h) in &sizes[..4] {
            let id = atlas.allocate(w, h).unwrap();
            live.push((id, w, h));
            assert_invariants(&atlas, &live);
        }
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut atlas = AtlasAllocator::new(256, 256, 64);
        let mut live = Vec::new();
        loop {
            match atlas.allocate(64, 64) {
                Some(id) => live.push((id, 64, 64)),
                None => break,
            }
            assert!(live.len() <= 16, "more 64x64 items than the area can hold");
        }
        assert_eq!(live.len(), 16);
        assert_invariants(&atlas, &live);

        // Freeing one item reclaims nothing while its slice has neighbors.
        let (id, ..) = live.pop().unwrap();
        atlas.deallocate(id);
        assert!(atlas.allocate(64, 64).is_none());
        // Emptying the whole slice brings its row back.
        for _ in 0..3 {
            let (id, ..) = live.pop().unwrap();
            atlas.deallocate(id);
        }
        for _ in 0..4 {
            let id = atlas.allocate(64, 64).unwrap();
            live.push((id, 64, 64));
        }
        assert!(atlas.allocate(64, 64).is_none());
        assert_invariants(&atlas, &live);
    }

    #[test]
    fn oversized_requests_fail_cleanly() {
        let mut atlas = AtlasAllocator::new(64, 64, 8);
        assert!(atlas.allocate(65, 10).is_none());
        assert!(atlas.allocate(10, 65).is_none());
        assert!(atlas.allocate(64, 64).is_some());
    }

    #[test]
    fn slice_width_is_reclaimed_when_it_empties() {
        let mut atlas = AtlasAllocator::new(100, 32, 1);
        let a = atlas.allocate(60, 16).unwrap();
        let b = atlas.allocate(30, 16).unwrap();
        // The slice is nearly full; a wide item does not fit anywhere.
        assert!(atlas.allocate(60, 16).is_none());
        atlas.deallocate(a);
        // Still no room: freeing a partially used slice reclaims nothing.
        assert!(atlas.allocate(60, 16).is_none());
        atlas.deallocate(b);
        assert!(atlas.is_empty());
        // Now the slice is empty and its full width is usable again.
        let c = atlas.allocate(90, 16).unwrap();
        assert_eq!(atlas.get_area(c).x, 0);
    }

    #[test]
    fn handles_stay_stable_across_unrelated_frees() {
        let mut atlas = AtlasAllocator::new(128, 128, 16);
        let a = atlas.allocate(20, 20).unwrap();
        let b = atlas.allocate(20, 20).unwrap();
        let area_b = atlas.get_area(b);
        atlas.deallocate(a);
        assert_eq!(atlas.get_area(b), area_b);
        // The freed slot may be reused for a new handle without disturbing b.
        let c = atlas.allocate(40, 18).unwrap();
        assert_eq!(atlas.get_area(b), area_b);
        assert!(!atlas.get_area(c).intersects(&area_b));
    }

    #[test]
    #[should_panic(expected = "dead atlas handle")]
    fn double_free_is_a_bug() {
        let mut atlas = AtlasAllocator::new(64, 64, 8);
        let id = atlas.allocate(8, 8).unwrap();
        atlas.deallocate(id);
        atlas.deallocate(id);
    }

    #[test]
    fn tall_items_do_not_land_in_short_slices() {
        let mut atlas = AtlasAllocator::new(64, 64, 8);
        let short = atlas.allocate(8, 4).unwrap();
        let tall = atlas.allocate(8, 15).unwrap();
        // 4 rounds up to a 16-high slice, but a 15-high item may share it.
        assert_eq!(atlas.get_area(short).y, atlas.get_area(tall).y);
        // A 40-high item needs its own slice.
        let very_tall = atlas.allocate(8, 40).unwrap();
        assert!(atlas.get_area(very_tall).y >= 16);
    }
}

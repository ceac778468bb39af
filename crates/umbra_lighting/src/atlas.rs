//! Shadow Atlas
//!
//! One square depth texture split into `tile_count x tile_count` tiles.
//! Each shadow source claims an axis-aligned rectangle of tiles, found by a
//! row-major first-fit scan. Allocations are sticky: a source keeps its
//! rectangle until [`ShadowAtlas::release`] is called, so a depth image
//! rendered in an earlier frame stays usable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::AtlasConfig;
use crate::error::AtlasError;
use crate::shadow_source::SourceUid;

/// Tile rectangle in the atlas grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtlasRegion {
    /// Origin column
    pub x: u32,
    /// Origin row
    pub y: u32,
    /// Width in tiles
    pub width: u32,
    /// Height in tiles
    pub height: u32,
}

impl AtlasRegion {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn tile_count(&self) -> u32 {
        self.width * self.height
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    pub fn overlaps(&self, other: &AtlasRegion) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Pixel rectangle the shadow pass renders into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasViewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Atlas statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AtlasStats {
    pub total_allocations: u64,
    pub total_releases: u64,
    pub failed_allocations: u64,
    pub allocations_this_frame: u32,
    pub peak_used_tiles: u32,
}

/// Tile-grid shadow atlas
#[derive(Clone, Debug)]
pub struct ShadowAtlas {
    size: u32,
    tile_size: u32,
    tile_count: u32,
    /// Row-major owner of every tile
    cells: Vec<Option<SourceUid>>,
    allocations: BTreeMap<SourceUid, AtlasRegion>,
    used_tiles: u32,
    frame: u64,
    stats: AtlasStats,
}

impl ShadowAtlas {
    /// Create an atlas of `size` pixels split into `tile_size` tiles
    pub fn new(size: u32, tile_size: u32) -> Result<Self, AtlasError> {
        if tile_size == 0 || size == 0 || size % tile_size != 0 {
            return Err(AtlasError::InvalidLayout { size, tile_size });
        }
        let tile_count = size / tile_size;
        // Total tile count must fit in u32
        if tile_count.checked_mul(tile_count).is_none() {
            return Err(AtlasError::InvalidLayout { size, tile_size });
        }
        log::debug!(
            "Creating shadow atlas {}x{} with {}x{} tiles",
            size,
            size,
            tile_count,
            tile_count
        );

        Ok(Self {
            size,
            tile_size,
            tile_count,
            cells: vec![None; (tile_count * tile_count) as usize],
            allocations: BTreeMap::new(),
            used_tiles: 0,
            frame: 0,
            stats: AtlasStats::default(),
        })
    }

    pub fn from_config(config: &AtlasConfig) -> Result<Self, AtlasError> {
        Self::new(config.size, config.tile_size)
    }

    /// Begin a new frame
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.stats.allocations_this_frame = 0;
    }

    /// Tiles per edge needed for a square shadow map
    pub fn required_tiles(&self, resolution: u32) -> Result<u32, AtlasError> {
        if resolution == 0 || resolution % self.tile_size != 0 {
            return Err(AtlasError::InvalidResolution {
                resolution,
                tile_size: self.tile_size,
            });
        }
        Ok(resolution / self.tile_size)
    }

    /// Claim a `tiles_w x tiles_h` rectangle for `uid`
    ///
    /// A source that already holds a rectangle of this size gets it back
    /// unchanged. For a different size the search may reuse the source's own
    /// tiles; the old rectangle is only given up once the new one is found.
    pub fn allocate(
        &mut self,
        uid: SourceUid,
        tiles_w: u32,
        tiles_h: u32,
    ) -> Result<AtlasRegion, AtlasError> {
        if tiles_w == 0 || tiles_h == 0 {
            return Err(AtlasError::EmptyRegion);
        }

        if let Some(existing) = self.allocations.get(&uid) {
            if existing.width == tiles_w && existing.height == tiles_h {
                return Ok(*existing);
            }
        }

        let Some(region) = self.find_free_region(uid, tiles_w, tiles_h) else {
            self.stats.failed_allocations += 1;
            return Err(AtlasError::NoSpace {
                uid,
                tiles_w,
                tiles_h,
            });
        };

        self.release(uid);
        self.fill(&region, Some(uid));
        self.allocations.insert(uid, region);
        self.used_tiles += region.tile_count();

        self.stats.total_allocations += 1;
        self.stats.allocations_this_frame += 1;
        self.stats.peak_used_tiles = self.stats.peak_used_tiles.max(self.used_tiles);

        Ok(region)
    }

    /// Claim a square region for a shadow map of `resolution` pixels
    pub fn allocate_resolution(
        &mut self,
        uid: SourceUid,
        resolution: u32,
    ) -> Result<AtlasRegion, AtlasError> {
        let tiles = self.required_tiles(resolution)?;
        self.allocate(uid, tiles, tiles)
    }

    /// Free the rectangle held by `uid`
    pub fn release(&mut self, uid: SourceUid) -> Option<AtlasRegion> {
        let region = self.allocations.remove(&uid)?;
        self.fill(&region, None);
        self.used_tiles -= region.tile_count();
        self.stats.total_releases += 1;
        Some(region)
    }

    /// Check if every tile of the rectangle is empty
    pub fn region_is_free(&self, x: u32, y: u32, tiles_w: u32, tiles_h: u32) -> bool {
        self.region_is_available(None, x, y, tiles_w, tiles_h)
    }

    /// Tiles are empty or already owned by `owner`
    fn region_is_available(
        &self,
        owner: Option<SourceUid>,
        x: u32,
        y: u32,
        tiles_w: u32,
        tiles_h: u32,
    ) -> bool {
        let (Some(right), Some(bottom)) = (x.checked_add(tiles_w), y.checked_add(tiles_h)) else {
            return false;
        };
        if right > self.tile_count || bottom > self.tile_count {
            return false;
        }
        (y..bottom).all(|row| {
            let start = self.cell_index(x, row);
            self.cells[start..start + tiles_w as usize]
                .iter()
                .all(|cell| cell.is_none() || *cell == owner)
        })
    }

    fn find_free_region(&self, uid: SourceUid, tiles_w: u32, tiles_h: u32) -> Option<AtlasRegion> {
        if tiles_w > self.tile_count || tiles_h > self.tile_count {
            return None;
        }
        let own_tiles = self.allocations.get(&uid).map_or(0, AtlasRegion::tile_count);
        if tiles_w * tiles_h > self.free_tiles() + own_tiles {
            return None;
        }

        let owner = Some(uid);
        for y in 0..=self.tile_count - tiles_h {
            for x in 0..=self.tile_count - tiles_w {
                if self.region_is_available(owner, x, y, tiles_w, tiles_h) {
                    return Some(AtlasRegion::new(x, y, tiles_w, tiles_h));
                }
            }
        }
        None
    }

    fn fill(&mut self, region: &AtlasRegion, owner: Option<SourceUid>) {
        for row in region.y..region.y + region.height {
            let start = self.cell_index(region.x, row);
            self.cells[start..start + region.width as usize].fill(owner);
        }
    }

    fn cell_index(&self, x: u32, y: u32) -> usize {
        (y * self.tile_count + x) as usize
    }

    /// Region in normalized UV space: x, y, width, height
    pub fn region_to_uv(&self, region: &AtlasRegion) -> [f32; 4] {
        let n = self.tile_count as f32;
        [
            region.x as f32 / n,
            region.y as f32 / n,
            region.width as f32 / n,
            region.height as f32 / n,
        ]
    }

    /// Region in pixels
    pub fn region_to_viewport(&self, region: &AtlasRegion) -> AtlasViewport {
        AtlasViewport {
            x: region.x * self.tile_size,
            y: region.y * self.tile_size,
            width: region.width * self.tile_size,
            height: region.height * self.tile_size,
        }
    }

    /// Region held by a source
    pub fn get(&self, uid: SourceUid) -> Option<&AtlasRegion> {
        self.allocations.get(&uid)
    }

    pub fn contains(&self, uid: SourceUid) -> bool {
        self.allocations.contains_key(&uid)
    }

    /// Source owning a tile
    pub fn owner_at(&self, x: u32, y: u32) -> Option<SourceUid> {
        if x >= self.tile_count || y >= self.tile_count {
            return None;
        }
        self.cells[self.cell_index(x, y)]
    }

    /// Fraction of tiles in use (0.0 - 1.0)
    pub fn coverage(&self) -> f32 {
        self.used_tiles as f32 / self.total_tiles() as f32
    }

    pub fn num_used_tiles(&self) -> u32 {
        self.used_tiles
    }

    pub fn free_tiles(&self) -> u32 {
        self.total_tiles() - self.used_tiles
    }

    pub fn total_tiles(&self) -> u32 {
        self.tile_count * self.tile_count
    }

    pub fn allocated_count(&self) -> usize {
        self.allocations.len()
    }

    /// Live allocations in uid order
    pub fn allocations(&self) -> impl Iterator<Item = (SourceUid, &AtlasRegion)> {
        self.allocations.iter().map(|(uid, region)| (*uid, region))
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn tile_count(&self) -> u32 {
        self.tile_count
    }

    pub fn stats(&self) -> &AtlasStats {
        &self.stats
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Release everything
    pub fn reset(&mut self) {
        self.cells.fill(None);
        self.allocations.clear();
        self.used_tiles = 0;
    }
}

/// Serializable atlas state for hot-reload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShadowAtlasState {
    pub size: u32,
    pub tile_size: u32,
    pub allocations: Vec<(SourceUid, AtlasRegion)>,
    pub frame: u64,
}

impl ShadowAtlas {
    /// Save state for hot-reload
    pub fn save_state(&self) -> ShadowAtlasState {
        ShadowAtlasState {
            size: self.size,
            tile_size: self.tile_size,
            allocations: self.allocations.iter().map(|(u, r)| (*u, *r)).collect(),
            frame: self.frame,
        }
    }

    /// Restore state from hot-reload
    ///
    /// The grid is rebuilt from the allocation list. Allocations that no
    /// longer fit are dropped and returned so their sources can be re-queued.
    pub fn restore_state(&mut self, state: ShadowAtlasState) -> Result<Vec<SourceUid>, AtlasError> {
        let mut restored = Self::new(state.size, state.tile_size)?;
        restored.frame = state.frame;

        let mut dropped = Vec::new();
        for (uid, region) in state.allocations {
            if restored.region_is_free(region.x, region.y, region.width, region.height) {
                restored.fill(&region, Some(uid));
                restored.allocations.insert(uid, region);
                restored.used_tiles += region.tile_count();
            } else {
                log::warn!("Dropping overlapping atlas region {:?} for {:?}", region, uid);
                dropped.push(uid);
            }
        }

        restored.stats = std::mem::take(&mut self.stats);
        *self = restored;
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(raw: u32) -> SourceUid {
        SourceUid::from_raw(raw)
    }

    /// Every live uid owns exactly its rectangle
    fn assert_partition(atlas: &ShadowAtlas) {
        let mut owned = 0;
        for (id, region) in atlas.allocations() {
            for y in 0..atlas.tile_count() {
                for x in 0..atlas.tile_count() {
                    let owner = atlas.owner_at(x, y);
                    if region.contains(x, y) {
                        assert_eq!(owner, Some(id));
                    } else {
                        assert_ne!(owner, Some(id));
                    }
                }
            }
            owned += region.tile_count();
        }
        assert_eq!(owned, atlas.num_used_tiles());
    }

    #[test]
    fn test_invalid_layout() {
        assert!(ShadowAtlas::new(1000, 64).is_err());
        assert!(ShadowAtlas::new(1024, 0).is_err());
        assert_eq!(ShadowAtlas::new(1024, 64).unwrap().tile_count(), 16);

        // 65536 tiles per edge: the tile total does not fit in u32
        assert_eq!(
            ShadowAtlas::new(65536, 1).unwrap_err(),
            AtlasError::InvalidLayout {
                size: 65536,
                tile_size: 1
            }
        );
    }

    #[test]
    fn test_region_is_free_out_of_range() {
        let atlas = ShadowAtlas::new(256, 64).unwrap();
        assert!(!atlas.region_is_free(u32::MAX, 0, 2, 1));
        assert!(!atlas.region_is_free(0, 1, 1, u32::MAX));
        assert!(!atlas.region_is_free(3, 0, 2, 1));
        assert!(atlas.region_is_free(2, 2, 2, 2));
    }

    #[test]
    fn test_failed_resize_keeps_old_region() {
        let mut atlas = ShadowAtlas::new(256, 64).unwrap();
        let a = atlas.allocate(uid(1), 2, 2).unwrap();
        atlas.allocate(uid(2), 2, 4).unwrap();

        assert!(matches!(
            atlas.allocate(uid(1), 4, 4),
            Err(AtlasError::NoSpace { .. })
        ));
        assert_eq!(atlas.get(uid(1)), Some(&a));
        assert_eq!(atlas.owner_at(0, 0), Some(uid(1)));
        assert_eq!(atlas.num_used_tiles(), 12);
        assert_eq!(atlas.stats().total_releases, 0);
        assert_partition(&atlas);
    }

    #[test]
    fn test_resize_grows_over_own_tiles() {
        let mut atlas = ShadowAtlas::new(256, 64).unwrap();
        atlas.allocate(uid(1), 2, 2).unwrap();
        atlas.allocate(uid(2), 1, 1).unwrap();

        // uid 2 sits at (2, 0); the 3x3 only fits over uid 1's own cells
        assert_eq!(atlas.allocate(uid(1), 3, 3), Ok(AtlasRegion::new(0, 1, 3, 3)));
        assert_eq!(atlas.num_used_tiles(), 10);
        assert_eq!(atlas.owner_at(0, 0), None);
        assert_partition(&atlas);
    }

    #[test]
    fn test_first_fit_row_major() {
        let mut atlas = ShadowAtlas::new(512, 64).unwrap();

        assert_eq!(atlas.allocate(uid(1), 2, 2).unwrap(), AtlasRegion::new(0, 0, 2, 2));
        assert_eq!(atlas.allocate(uid(2), 2, 2).unwrap(), AtlasRegion::new(2, 0, 2, 2));
        assert_eq!(atlas.allocate(uid(3), 4, 1).unwrap(), AtlasRegion::new(4, 0, 4, 1));
        assert_eq!(atlas.allocate(uid(4), 4, 1).unwrap(), AtlasRegion::new(4, 1, 4, 1));
        assert_eq!(atlas.allocate(uid(5), 1, 1).unwrap(), AtlasRegion::new(0, 2, 1, 1));
        assert_partition(&atlas);
    }

    #[test]
    fn test_sticky_allocation() {
        let mut atlas = ShadowAtlas::new(1024, 64).unwrap();
        let first = atlas.allocate(uid(1), 4, 4).unwrap();

        for _ in 0..3 {
            atlas.begin_frame();
            assert_eq!(atlas.allocate(uid(1), 4, 4).unwrap(), first);
        }
        assert_eq!(atlas.stats().total_allocations, 1);
        assert_eq!(atlas.num_used_tiles(), 16);
    }

    #[test]
    fn test_reallocate_new_size() {
        let mut atlas = ShadowAtlas::new(1024, 64).unwrap();
        atlas.allocate(uid(1), 2, 2).unwrap();
        atlas.allocate(uid(2), 2, 2).unwrap();

        let bigger = atlas.allocate(uid(1), 4, 4).unwrap();
        assert_eq!(bigger, AtlasRegion::new(4, 0, 4, 4));
        assert_eq!(atlas.num_used_tiles(), 20);
        assert_partition(&atlas);
    }

    #[test]
    fn test_no_space() {
        let mut atlas = ShadowAtlas::new(256, 64).unwrap();
        atlas.allocate(uid(1), 2, 2).unwrap();

        let err = atlas.allocate(uid(2), 4, 4).unwrap_err();
        assert_eq!(
            err,
            AtlasError::NoSpace {
                uid: uid(2),
                tiles_w: 4,
                tiles_h: 4
            }
        );
        assert!(!atlas.contains(uid(2)));
        assert_eq!(atlas.stats().failed_allocations, 1);

        // Fragmented: 12 free tiles, but no 3x3 hole
        assert!(atlas.allocate(uid(3), 3, 3).is_err());
        assert!(atlas.allocate(uid(4), 2, 4).is_ok());
        assert_partition(&atlas);
    }

    #[test]
    fn test_release_clears_cells() {
        let mut atlas = ShadowAtlas::new(256, 64).unwrap();
        let region = atlas.allocate(uid(1), 2, 2).unwrap();

        assert_eq!(atlas.release(uid(1)), Some(region));
        assert_eq!(atlas.release(uid(1)), None);
        assert_eq!(atlas.num_used_tiles(), 0);
        assert!(atlas.region_is_free(0, 0, 4, 4));
        assert_eq!(atlas.allocate(uid(2), 2, 2).unwrap(), region);
    }

    #[test]
    fn test_required_tiles() {
        let atlas = ShadowAtlas::new(4096, 128).unwrap();
        assert_eq!(atlas.required_tiles(512).unwrap(), 4);
        assert_eq!(atlas.required_tiles(4096).unwrap(), 32);
        assert_eq!(
            atlas.required_tiles(500),
            Err(AtlasError::InvalidResolution {
                resolution: 500,
                tile_size: 128
            })
        );
        assert!(atlas.required_tiles(0).is_err());
    }

    #[test]
    fn test_uv_and_viewport() {
        let mut atlas = ShadowAtlas::new(4096, 128).unwrap();
        atlas.allocate(uid(1), 8, 8).unwrap();
        let region = atlas.allocate(uid(2), 4, 4).unwrap();
        assert_eq!(region, AtlasRegion::new(8, 0, 4, 4));

        assert_eq!(atlas.region_to_uv(&region), [0.25, 0.0, 0.125, 0.125]);
        assert_eq!(
            atlas.region_to_viewport(&region),
            AtlasViewport {
                x: 1024,
                y: 0,
                width: 512,
                height: 512
            }
        );
    }

    #[test]
    fn test_coverage() {
        let mut atlas = ShadowAtlas::new(256, 64).unwrap();
        assert_eq!(atlas.coverage(), 0.0);
        atlas.allocate(uid(1), 2, 2).unwrap();
        assert_eq!(atlas.coverage(), 0.25);
        atlas.allocate(uid(2), 2, 4).unwrap();
        assert_eq!(atlas.coverage(), 0.75);
    }

    #[test]
    fn test_hot_reload() {
        let mut atlas = ShadowAtlas::new(1024, 64).unwrap();
        atlas.begin_frame();
        atlas.allocate(uid(1), 4, 4).unwrap();
        atlas.allocate(uid(2), 2, 2).unwrap();

        let json = serde_json::to_string(&atlas.save_state()).unwrap();
        let state: ShadowAtlasState = serde_json::from_str(&json).unwrap();

        let mut reloaded = ShadowAtlas::new(512, 32).unwrap();
        let dropped = reloaded.restore_state(state).unwrap();

        assert!(dropped.is_empty());
        assert_eq!(reloaded.size(), 1024);
        assert_eq!(reloaded.frame(), 1);
        assert_eq!(reloaded.get(uid(1)), atlas.get(uid(1)));
        assert_eq!(reloaded.owner_at(4, 0), Some(uid(2)));
        assert_partition(&reloaded);
    }
}

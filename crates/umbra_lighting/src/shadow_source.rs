//! Shadow sources
//!
//! One shadow-map viewpoint owned by a light. Identity is a [`SourceUid`]
//! handed out by a [`SourceUidArena`]; the GPU slot is separate and may be
//! reused by later sources.

use serde::{Deserialize, Serialize};

use umbra_command::{CommandError, GpuCommand};

use crate::atlas::AtlasRegion;
use crate::gpu_data::GpuShadowSourceRecord;

/// Stable shadow source identifier, used as the atlas key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceUid(u32);

impl SourceUid {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Hands out unique source ids
#[derive(Clone, Debug)]
pub struct SourceUidArena {
    next: u32,
}

impl Default for SourceUidArena {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SourceUidArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused id
    pub fn allocate(&mut self) -> SourceUid {
        let uid = SourceUid(self.next);
        self.next = self.next.wrapping_add(1).max(1);
        uid
    }

    /// Ids handed out so far
    pub fn issued(&self) -> u32 {
        self.next - 1
    }
}

/// Bounding sphere used for distance checks
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: [f32; 3],
    pub radius: f32,
}

const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// A shadow-casting viewpoint
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowSource {
    uid: SourceUid,
    slot: u32,
    resolution: u32,
    view_projection: [[f32; 4]; 4],
    bounds: BoundingSphere,
    region: Option<AtlasRegion>,
    uv: [f32; 4],
    needs_update: bool,
    valid: bool,
    last_update: Option<u64>,
}

impl ShadowSource {
    /// Create a dirty source without atlas space
    pub fn new(uid: SourceUid, slot: u32, resolution: u32) -> Self {
        Self {
            uid,
            slot,
            resolution,
            view_projection: IDENTITY,
            bounds: BoundingSphere::default(),
            region: None,
            uv: [0.0; 4],
            needs_update: true,
            valid: false,
            last_update: None,
        }
    }

    pub fn uid(&self) -> SourceUid {
        self.uid
    }

    /// Slot in the shadow source buffer
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Shadow map edge length in pixels
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Change resolution, dropping the atlas region
    ///
    /// Returns the old region; the caller must release it in the atlas.
    pub fn set_resolution(&mut self, resolution: u32) -> Option<AtlasRegion> {
        if resolution == self.resolution {
            return None;
        }
        self.resolution = resolution;
        self.needs_update = true;
        self.clear_region()
    }

    pub fn view_projection(&self) -> &[[f32; 4]; 4] {
        &self.view_projection
    }

    /// Set the view-projection matrix, marking the source dirty on change
    pub fn set_view_projection(&mut self, matrix: [[f32; 4]; 4]) {
        if matrix != self.view_projection {
            self.view_projection = matrix;
            self.needs_update = true;
        }
    }

    pub fn bounds(&self) -> &BoundingSphere {
        &self.bounds
    }

    pub fn set_bounds(&mut self, bounds: BoundingSphere) {
        self.bounds = bounds;
    }

    /// Atlas region in tiles, if assigned
    pub fn region(&self) -> Option<AtlasRegion> {
        self.region
    }

    pub fn has_region(&self) -> bool {
        self.region.is_some()
    }

    /// Atlas region in UV space
    pub fn uv(&self) -> [f32; 4] {
        self.uv
    }

    /// Record the region the atlas assigned
    pub fn set_region(&mut self, region: AtlasRegion, uv: [f32; 4]) {
        self.region = Some(region);
        self.uv = uv;
    }

    /// Forget the atlas region; the depth image is no longer usable
    pub fn clear_region(&mut self) -> Option<AtlasRegion> {
        self.valid = false;
        self.uv = [0.0; 4];
        self.region.take()
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn mark_dirty(&mut self) {
        self.needs_update = true;
    }

    /// Record a successful render this frame
    pub fn mark_updated(&mut self, frame: u64) {
        self.needs_update = false;
        self.valid = true;
        self.last_update = Some(frame);
    }

    /// Whether the atlas holds a rendered depth image for this source
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn last_update(&self) -> Option<u64> {
        self.last_update
    }

    /// Check if the last render is older than `max_age` frames
    pub fn is_stale(&self, frame: u64, max_age: u64) -> bool {
        match self.last_update {
            Some(last) => frame.saturating_sub(last) >= max_age,
            None => true,
        }
    }

    pub fn to_gpu_record(&self) -> GpuShadowSourceRecord {
        GpuShadowSourceRecord {
            view_projection: self.view_projection,
            uv_region: self.uv,
        }
    }

    /// Append the GPU record to a command
    pub fn write_to_command(&self, command: &mut GpuCommand) -> Result<(), CommandError> {
        for vec4 in self.to_gpu_record().vec4s() {
            command.push_vec4(vec4)?;
        }
        Ok(())
    }
}

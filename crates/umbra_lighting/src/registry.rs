//! Light Registry
//!
//! Owns every registered [`Light`] and its [`ShadowSource`]s. Light indices
//! and source slots are handed out lowest-free-first so the GPU only scans
//! up to the watermark. A light's sources always occupy consecutive slots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use umbra_structures::SlotStorage;

use crate::error::RegistryError;
use crate::light::Light;
use crate::scheduler::SourceStore;
use crate::shadow_source::{BoundingSphere, ShadowSource, SourceUid, SourceUidArena};

/// Stable light index, doubles as the GPU slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LightIndex(u32);

impl LightIndex {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug)]
struct LightEntry {
    light: Light,
    sources: Vec<SourceUid>,
    first_source_slot: Option<u32>,
    needs_update: bool,
}

/// A light taken out of the registry
#[derive(Clone, Debug)]
pub struct RemovedLight {
    pub index: LightIndex,
    pub light: Light,
    pub first_source_slot: Option<u32>,
    /// Sources as they were, regions included; the caller releases them
    pub sources: Vec<ShadowSource>,
}

/// What an update changed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LightUpdate {
    /// The light record must be re-uploaded
    pub changed: bool,
    /// Sources that need a new shadow map
    pub dirty_sources: Vec<SourceUid>,
    /// Sources whose atlas regions must be released
    pub released: Vec<SourceUid>,
    /// Source slots cleared on the GPU: first slot, count
    pub removed_slots: Option<(u32, usize)>,
}

/// Registered lights and their shadow sources
#[derive(Clone, Debug)]
pub struct LightRegistry {
    lights: SlotStorage<LightEntry>,
    source_slots: SlotStorage<SourceUid>,
    sources: BTreeMap<SourceUid, ShadowSource>,
    uids: SourceUidArena,
}

impl LightRegistry {
    /// Create a registry with fixed light and source capacities
    pub fn new(max_lights: usize, max_shadow_sources: usize) -> Self {
        Self {
            lights: SlotStorage::new(max_lights),
            source_slots: SlotStorage::new(max_shadow_sources),
            sources: BTreeMap::new(),
            uids: SourceUidArena::new(),
        }
    }

    /// Register a light at the lowest free index
    ///
    /// The light and all its sources start dirty. Nothing is registered if
    /// its sources do not fit.
    pub fn add(&mut self, light: Light) -> Result<LightIndex, RegistryError> {
        let slot = self.lights.find_slot().ok_or(RegistryError::LightsFull {
            capacity: self.lights.capacity(),
        })?;

        let count = light.num_shadow_sources();
        let first_source_slot = if count > 0 {
            Some(
                self.source_slots
                    .find_consecutive_slots(count)
                    .ok_or(RegistryError::SourcesFull { requested: count })?,
            )
        } else {
            None
        };
        let sources = match first_source_slot {
            Some(first) => self.spawn_sources(first, &light),
            None => Vec::new(),
        };

        log::debug!(
            "Registered {} light at index {} with {} shadow sources",
            light.kind().name(),
            slot,
            sources.len()
        );

        self.lights.reserve_slot(
            slot,
            LightEntry {
                light,
                sources,
                first_source_slot,
                needs_update: true,
            },
        );
        Ok(LightIndex(slot))
    }

    /// Unregister a light, freeing its index and source slots
    pub fn remove(&mut self, index: LightIndex) -> Result<RemovedLight, RegistryError> {
        let entry = self
            .lights
            .free_slot(index.0)
            .ok_or(RegistryError::LightNotFound(index))?;

        if let Some(first) = entry.first_source_slot {
            self.source_slots
                .free_consecutive_slots(first, entry.sources.len());
        }
        let sources = entry
            .sources
            .iter()
            .filter_map(|uid| self.sources.remove(uid))
            .collect();

        log::debug!("Removed light at index {}", index.0);

        Ok(RemovedLight {
            index,
            light: entry.light,
            first_source_slot: entry.first_source_slot,
            sources,
        })
    }

    /// Replace a light's parameters
    ///
    /// Any change marks the light dirty. Moving or reshaping it marks its
    /// sources dirty unless its update mode is static. A new source count
    /// replaces the sources; a new resolution keeps them but drops their
    /// atlas regions.
    pub fn update(&mut self, index: LightIndex, light: Light) -> Result<LightUpdate, RegistryError> {
        let entry = self
            .lights
            .get(index.0)
            .ok_or(RegistryError::LightNotFound(index))?;
        if entry.light == light {
            return Ok(LightUpdate::default());
        }

        let old_light = entry.light.clone();
        let old_sources = entry.sources.clone();
        let old_first = entry.first_source_slot;

        let mut outcome = LightUpdate {
            changed: true,
            ..Default::default()
        };
        let mut sources = old_sources.clone();
        let mut first_source_slot = old_first;

        if old_light.num_shadow_sources() != light.num_shadow_sources() {
            first_source_slot = self.reassign_source_slots(old_first, &old_sources, &light)?;

            for uid in &old_sources {
                self.sources.remove(uid);
            }
            outcome.released = old_sources;
            outcome.removed_slots = old_first.map(|first| (first, outcome.released.len()));

            sources = match first_source_slot {
                Some(first) => self.spawn_sources(first, &light),
                None => Vec::new(),
            };
            outcome.dirty_sources = sources.clone();
        } else if old_light.shadow_layout_changed(&light) {
            for uid in &sources {
                if let Some(source) = self.sources.get_mut(uid) {
                    if source.set_resolution(light.shadow_resolution).is_some() {
                        outcome.released.push(*uid);
                    }
                    source.mark_dirty();
                }
            }
            outcome.dirty_sources = sources.clone();
        } else if old_light.shadow_changed(&light) && light.update_mode.tracks_changes() {
            for uid in &sources {
                if let Some(source) = self.sources.get_mut(uid) {
                    source.mark_dirty();
                }
            }
            outcome.dirty_sources = sources.clone();
        }

        let bounds = bounds_of(&light);
        for uid in &sources {
            if let Some(source) = self.sources.get_mut(uid) {
                source.set_bounds(bounds);
            }
        }

        if let Some(entry) = self.lights.get_mut(index.0) {
            entry.light = light;
            entry.sources = sources;
            entry.first_source_slot = first_source_slot;
            entry.needs_update = true;
        }
        Ok(outcome)
    }

    /// Move a light's source slots to fit a new source count
    ///
    /// Leaves the old slots in place if the new count does not fit.
    fn reassign_source_slots(
        &mut self,
        old_first: Option<u32>,
        old_sources: &[SourceUid],
        light: &Light,
    ) -> Result<Option<u32>, RegistryError> {
        if let Some(first) = old_first {
            self.source_slots.free_consecutive_slots(first, old_sources.len());
        }

        let count = light.num_shadow_sources();
        if count == 0 {
            return Ok(None);
        }
        match self.source_slots.find_consecutive_slots(count) {
            Some(first) => Ok(Some(first)),
            None => {
                if let Some(first) = old_first {
                    for (offset, uid) in old_sources.iter().enumerate() {
                        self.source_slots.reserve_slot(first + offset as u32, *uid);
                    }
                }
                Err(RegistryError::SourcesFull { requested: count })
            }
        }
    }

    fn spawn_sources(&mut self, first: u32, light: &Light) -> Vec<SourceUid> {
        let bounds = bounds_of(light);
        (0..light.num_shadow_sources() as u32)
            .map(|offset| {
                let uid = self.uids.allocate();
                let slot = first + offset;
                self.source_slots.reserve_slot(slot, uid);

                let mut source = ShadowSource::new(uid, slot, light.shadow_resolution);
                source.set_bounds(bounds);
                self.sources.insert(uid, source);
                uid
            })
            .collect()
    }

    /// Get a light
    pub fn get(&self, index: LightIndex) -> Option<&Light> {
        self.lights.get(index.0).map(|e| &e.light)
    }

    pub fn contains(&self, index: LightIndex) -> bool {
        self.lights.contains(index.0)
    }

    /// Active lights in index order
    pub fn iter(&self) -> impl Iterator<Item = (LightIndex, &Light)> {
        self.lights.iter().map(|(slot, e)| (LightIndex(slot), &e.light))
    }

    /// Sources owned by a light
    pub fn sources_of(&self, index: LightIndex) -> &[SourceUid] {
        self.lights
            .get(index.0)
            .map(|e| e.sources.as_slice())
            .unwrap_or_default()
    }

    /// First source slot of a light
    pub fn first_source_slot(&self, index: LightIndex) -> Option<u32> {
        self.lights.get(index.0)?.first_source_slot
    }

    pub fn source(&self, uid: SourceUid) -> Option<&ShadowSource> {
        self.sources.get(&uid)
    }

    pub fn source_mut(&mut self, uid: SourceUid) -> Option<&mut ShadowSource> {
        self.sources.get_mut(&uid)
    }

    /// All shadow sources in uid order
    pub fn sources(&self) -> impl Iterator<Item = &ShadowSource> {
        self.sources.values()
    }

    /// Check if a light still needs uploading
    pub fn is_dirty(&self, index: LightIndex) -> bool {
        self.lights.get(index.0).is_some_and(|e| e.needs_update)
    }

    /// Force a light to be re-uploaded
    pub fn mark_dirty(&mut self, index: LightIndex) -> bool {
        match self.lights.get_mut(index.0) {
            Some(entry) => {
                entry.needs_update = true;
                true
            }
            None => false,
        }
    }

    /// Collect dirty lights in index order and mark them clean
    pub fn take_dirty_lights(&mut self) -> Vec<LightIndex> {
        self.lights
            .iter_mut()
            .filter(|(_, e)| e.needs_update)
            .map(|(slot, e)| {
                e.needs_update = false;
                LightIndex(slot)
            })
            .collect()
    }

    /// Highest occupied light index
    pub fn max_light_index(&self) -> Option<u32> {
        self.lights.max_index()
    }

    /// Highest occupied source slot
    pub fn max_source_index(&self) -> Option<u32> {
        self.source_slots.max_index()
    }

    pub fn num_lights(&self) -> usize {
        self.lights.len()
    }

    pub fn num_shadow_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn light_capacity(&self) -> usize {
        self.lights.capacity()
    }

    pub fn source_capacity(&self) -> usize {
        self.source_slots.capacity()
    }
}

impl SourceStore for LightRegistry {
    fn source(&self, uid: SourceUid) -> Option<&ShadowSource> {
        self.sources.get(&uid)
    }

    fn source_mut(&mut self, uid: SourceUid) -> Option<&mut ShadowSource> {
        self.sources.get_mut(&uid)
    }
}

fn bounds_of(light: &Light) -> BoundingSphere {
    BoundingSphere {
        center: light.position,
        radius: light.radius,
    }
}

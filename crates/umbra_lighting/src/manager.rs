//! Light Manager
//!
//! Producer-facing entry point. Owns the registry, the atlas, the scheduler
//! and the command queue, and runs one frame per [`LightManager::tick`]:
//!
//! 1. Upload dirty lights (`StoreLight`)
//! 2. Cull lights and apply per-kind caps
//! 3. Queue dirty shadow sources of visible lights
//! 4. Render queued sources within budget (`StoreSource`)
//! 5. Encode the frame's commands

use std::collections::BTreeMap;

use umbra_command::{CommandListHandle, CommandType, GpuCommandQueue};

use crate::atlas::ShadowAtlas;
use crate::config::LightManagerConfig;
use crate::error::Result;
use crate::gpu_data::{GpuFrameScalars, StorageLayout};
use crate::light::{distance, Light, LightKind};
use crate::registry::{LightIndex, LightRegistry};
use crate::scheduler::{ShadowScheduler, ShadowUpdateReport};
use crate::shadow_source::{ShadowSource, SourceUid};

/// Lights selected for rendering, bucketed by kind and shadow flag
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibleLights {
    buckets: BTreeMap<(LightKind, bool), Vec<LightIndex>>,
}

impl VisibleLights {
    /// Lights of one bucket, nearest first
    pub fn get(&self, kind: LightKind, shadowed: bool) -> &[LightIndex] {
        self.buckets
            .get(&(kind, shadowed))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every visible light
    pub fn iter(&self) -> impl Iterator<Item = LightIndex> + '_ {
        self.buckets.values().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Statistics for one frame
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// Light records uploaded
    pub lights_updated: usize,
    pub visible_lights: usize,
    /// Lights skipped this frame by per-kind caps
    pub over_capacity: Vec<LightIndex>,
    pub shadows: ShadowUpdateReport,
    /// Records in the command buffer
    pub commands_encoded: usize,
    /// Commands left for later frames
    pub commands_pending: usize,
    /// Atlas tiles in use (0.0 - 1.0)
    pub atlas_coverage: f32,
    pub max_light_index: Option<u32>,
}

/// Light and shadow update manager
#[derive(Debug)]
pub struct LightManager {
    config: LightManagerConfig,
    registry: LightRegistry,
    atlas: ShadowAtlas,
    scheduler: ShadowScheduler,
    commands: GpuCommandQueue,
    camera_pos: [f32; 3],
    visible: VisibleLights,
    /// Sources rendered by the last tick
    last_shadow_updates: usize,
    frame: u64,
}

impl LightManager {
    /// Create a manager with its own command list
    pub fn new(config: LightManagerConfig) -> Result<Self> {
        let list = umbra_command::CommandList::shared();
        Self::with_command_list(config, list)
    }

    /// Create a manager draining a shared command list
    pub fn with_command_list(mut config: LightManagerConfig, list: CommandListHandle) -> Result<Self> {
        config.validate()?;

        let registry = LightRegistry::new(config.max_lights, config.max_shadow_sources);
        let atlas = ShadowAtlas::from_config(&config.atlas)?;
        let scheduler = ShadowScheduler::new(config.scheduler.max_updates_per_frame);
        let commands = GpuCommandQueue::with_list(config.commands.clone(), list)?;

        log::info!(
            "Light manager ready: {} lights, {} shadow sources, {}px atlas in {}px tiles",
            config.max_lights,
            config.max_shadow_sources,
            config.atlas.size,
            config.atlas.tile_size
        );

        Ok(Self {
            config,
            registry,
            atlas,
            scheduler,
            commands,
            camera_pos: [0.0; 3],
            visible: VisibleLights::default(),
            last_shadow_updates: 0,
            frame: 0,
        })
    }

    /// Register a light; it is uploaded on the next tick
    pub fn add_light(&mut self, light: Light) -> Result<LightIndex> {
        if light.casts_shadows {
            self.atlas.required_tiles(light.shadow_resolution)?;
        }
        Ok(self.registry.add(light)?)
    }

    /// Remove a light, releasing its atlas regions and GPU slots
    pub fn remove_light(&mut self, index: LightIndex) -> Result<Light> {
        let removed = self.registry.remove(index)?;

        for source in &removed.sources {
            self.atlas.release(source.uid());
            self.scheduler.forget(source.uid());
        }

        let mut command = self.commands.create_command(CommandType::RemoveLight);
        command.push_int(index.raw() as i32)?;
        self.commands.push(command)?;

        if let Some(first) = removed.first_source_slot {
            self.push_remove_sources(first, removed.sources.len())?;
        }

        Ok(removed.light)
    }

    /// Replace a light's parameters
    pub fn update_light(&mut self, index: LightIndex, light: Light) -> Result<()> {
        if light.casts_shadows {
            self.atlas.required_tiles(light.shadow_resolution)?;
        }
        let outcome = self.registry.update(index, light)?;

        for uid in &outcome.released {
            self.atlas.release(*uid);
            if self.registry.source(*uid).is_none() {
                self.scheduler.forget(*uid);
            }
        }
        if let Some((first, count)) = outcome.removed_slots {
            self.push_remove_sources(first, count)?;
        }
        Ok(())
    }

    fn push_remove_sources(&mut self, first: u32, count: usize) -> Result<()> {
        let mut command = self.commands.create_command(CommandType::RemoveSources);
        command.push_int(first as i32)?.push_int(count as i32)?;
        self.commands.push(command)?;
        Ok(())
    }

    pub fn light(&self, index: LightIndex) -> Option<&Light> {
        self.registry.get(index)
    }

    /// Camera position used for culling and priorities
    pub fn set_camera_pos(&mut self, position: [f32; 3]) {
        self.camera_pos = position;
    }

    pub fn camera_pos(&self) -> [f32; 3] {
        self.camera_pos
    }

    /// Set a source's view-projection matrix, marking it dirty on change
    pub fn set_source_view_projection(&mut self, uid: SourceUid, matrix: [[f32; 4]; 4]) -> bool {
        match self.registry.source_mut(uid) {
            Some(source) => {
                source.set_view_projection(matrix);
                true
            }
            None => false,
        }
    }

    pub fn source(&self, uid: SourceUid) -> Option<&ShadowSource> {
        self.registry.source(uid)
    }

    /// Run one frame
    pub fn tick(&mut self) -> Result<FrameReport> {
        self.frame += 1;
        self.atlas.begin_frame();

        let lights_updated = self.upload_dirty_lights()?;
        let over_capacity = self.cull_lights();
        self.queue_shadow_sources();

        let shadows = self
            .scheduler
            .tick(&mut self.registry, &mut self.atlas, &self.commands)?;
        let commands_encoded = self.commands.process_queue()?;
        self.last_shadow_updates = shadows.updated.len();

        Ok(FrameReport {
            frame: self.frame,
            lights_updated,
            visible_lights: self.visible.len(),
            over_capacity,
            shadows,
            commands_encoded,
            commands_pending: self.commands.num_queued_commands(),
            atlas_coverage: self.atlas.coverage(),
            max_light_index: self.registry.max_light_index(),
        })
    }

    fn upload_dirty_lights(&mut self) -> Result<usize> {
        let dirty = self.registry.take_dirty_lights();
        for index in &dirty {
            let Some(light) = self.registry.get(*index) else {
                continue;
            };
            let mut command = self.commands.create_command(CommandType::StoreLight);
            command.push_int(index.raw() as i32)?;
            light.write_to_command(&mut command, self.registry.first_source_slot(*index))?;
            self.commands.push(command)?;
        }
        Ok(dirty.len())
    }

    /// Bucket visible lights and drop the farthest beyond each cap
    fn cull_lights(&mut self) -> Vec<LightIndex> {
        let cull_distance = self.config.scheduler.light_cull_distance;
        let mut candidates: BTreeMap<(LightKind, bool), Vec<(f32, LightIndex)>> = BTreeMap::new();

        for (index, light) in self.registry.iter() {
            let dist = light.distance_to(self.camera_pos);
            if cull_distance.is_some_and(|max| dist - light.radius > max) {
                continue;
            }
            candidates
                .entry((light.kind(), light.casts_shadows))
                .or_default()
                .push((dist, index));
        }

        let mut over_capacity = Vec::new();
        let mut visible = VisibleLights::default();
        for ((kind, shadowed), mut lights) in candidates {
            lights.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let cap = self.config.limits.get(kind).cap(shadowed);
            if lights.len() > cap {
                log::warn!(
                    "Too many visible {} lights ({} shadowed: {}), skipping {} this frame",
                    kind.name(),
                    lights.len(),
                    shadowed,
                    lights.len() - cap
                );
                over_capacity.extend(lights.drain(cap..).map(|(_, index)| index));
            }
            visible
                .buckets
                .insert((kind, shadowed), lights.into_iter().map(|(_, i)| i).collect());
        }

        self.visible = visible;
        over_capacity
    }

    fn queue_shadow_sources(&mut self) {
        let update_distance = self.config.scheduler.shadow_update_distance;
        let max_age = self.config.scheduler.max_shadow_age;
        let frame = self.frame;

        let shadowed: Vec<LightIndex> = LightKind::ALL
            .iter()
            .flat_map(|kind| self.visible.get(*kind, true).iter().copied())
            .collect();

        for index in shadowed {
            let Some(light) = self.registry.get(index) else {
                continue;
            };
            let refresh = light.update_mode.should_update(frame, false);
            let uids = self.registry.sources_of(index).to_vec();

            for uid in uids {
                let Some(source) = self.registry.source_mut(uid) else {
                    continue;
                };
                if refresh || max_age.is_some_and(|age| source.is_stale(frame, age)) {
                    source.mark_dirty();
                }
                if !source.needs_update() {
                    continue;
                }

                let bounds = source.bounds();
                let dist = distance(bounds.center, self.camera_pos) - bounds.radius;
                if update_distance.is_some_and(|max| dist > max) {
                    continue;
                }
                self.scheduler.queue_dirty(uid);
            }
        }
    }

    /// Percentage of atlas tiles in use (0 - 100)
    pub fn shadow_atlas_coverage(&self) -> f32 {
        self.atlas.coverage() * 100.0
    }

    /// Lights selected by the last tick
    pub fn visible_lights(&self) -> &VisibleLights {
        &self.visible
    }

    /// Scalars for the consumer after the last tick
    pub fn frame_scalars(&self) -> GpuFrameScalars {
        GpuFrameScalars {
            max_light_index: self.registry.max_light_index().map_or(-1, |i| i as i32),
            command_count: self.commands.num_processed_commands() as u32,
            num_shadow_updates: self.last_shadow_updates as u32,
            _pad: 0,
        }
    }

    /// GPU storage sizes for this manager's capacities
    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout {
            max_lights: self.config.max_lights,
            max_shadow_sources: self.config.max_shadow_sources,
            command_buffer_words: self.config.commands.buffer_words(),
        }
    }

    /// Handle for other producers sharing the command queue
    pub fn command_list(&self) -> CommandListHandle {
        self.commands.command_list()
    }

    pub fn command_queue(&self) -> &GpuCommandQueue {
        &self.commands
    }

    pub fn registry(&self) -> &LightRegistry {
        &self.registry
    }

    pub fn atlas(&self) -> &ShadowAtlas {
        &self.atlas
    }

    pub fn scheduler(&self) -> &ShadowScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &LightManagerConfig {
        &self.config
    }

    pub fn num_lights(&self) -> usize {
        self.registry.num_lights()
    }

    pub fn num_shadow_sources(&self) -> usize {
        self.registry.num_shadow_sources()
    }

    pub fn max_light_index(&self) -> Option<u32> {
        self.registry.max_light_index()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AtlasConfig, LightLimits, ShadowUpdateMode, TypeLimits};
    use crate::error::LightingError;
    use crate::AtlasError;

    fn config() -> LightManagerConfig {
        LightManagerConfig {
            atlas: AtlasConfig {
                size: 1024,
                tile_size: 128,
            },
            ..Default::default()
        }
    }

    fn spot(position: [f32; 3]) -> Light {
        Light::spot(position, [0.0, -1.0, 0.0], 5.0, 60.0).with_shadows(256)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LightManagerConfig {
            atlas: AtlasConfig {
                size: 1000,
                tile_size: 128,
            },
            ..Default::default()
        };
        assert!(matches!(LightManager::new(config), Err(LightingError::Config(_))));
    }

    #[test]
    fn test_first_tick_uploads_everything() {
        let mut manager = LightManager::new(config()).unwrap();
        let a = manager.add_light(spot([0.0; 3])).unwrap();
        manager.add_light(Light::point([5.0, 0.0, 0.0], 3.0)).unwrap();

        let report = manager.tick().unwrap();
        assert_eq!(report.lights_updated, 2);
        assert_eq!(report.visible_lights, 2);
        assert_eq!(report.shadows.updated.len(), 1);
        // Two StoreLight, one StoreSource
        assert_eq!(report.commands_encoded, 3);
        assert_eq!(report.max_light_index, Some(1));
        assert_eq!(manager.shadow_atlas_coverage(), 4.0 / 64.0 * 100.0);

        let types: Vec<_> = manager
            .command_queue()
            .buffer()
            .records()
            .map(|r| r.command_type)
            .collect();
        assert_eq!(
            types,
            vec![
                Some(CommandType::StoreLight),
                Some(CommandType::StoreLight),
                Some(CommandType::StoreSource)
            ]
        );

        // Nothing changed: nothing to do
        let report = manager.tick().unwrap();
        assert_eq!(report.lights_updated, 0);
        assert!(report.shadows.updated.is_empty());
        assert_eq!(report.commands_encoded, 0);
        assert_eq!(manager.light(a).unwrap().kind(), LightKind::Spot);
    }

    #[test]
    fn test_remove_light_releases_tiles() {
        let mut manager = LightManager::new(config()).unwrap();
        let idx = manager.add_light(spot([0.0; 3])).unwrap();
        manager.tick().unwrap();
        assert!(manager.shadow_atlas_coverage() > 0.0);

        manager.remove_light(idx).unwrap();
        assert_eq!(manager.shadow_atlas_coverage(), 0.0);
        assert_eq!(manager.num_shadow_sources(), 0);

        manager.tick().unwrap();
        let buffer = manager.command_queue().buffer();
        let remove = buffer.decode(0).unwrap();
        assert_eq!(remove.command_type, Some(CommandType::RemoveLight));
        assert_eq!(remove.payload[0], 0.0);
        let sources = buffer.decode(1).unwrap();
        assert_eq!(sources.command_type, Some(CommandType::RemoveSources));
        assert_eq!(&sources.payload[..2], &[0.0, 1.0]);

        assert!(manager.remove_light(idx).is_err());
    }

    #[test]
    fn test_per_kind_caps_skip_farthest() {
        let mut config = config();
        config.limits = LightLimits::uniform(TypeLimits::new(2, 1));
        let mut manager = LightManager::new(config).unwrap();

        let far = manager.add_light(Light::point([30.0, 0.0, 0.0], 1.0)).unwrap();
        let near = manager.add_light(Light::point([1.0, 0.0, 0.0], 1.0)).unwrap();
        let mid = manager.add_light(Light::point([10.0, 0.0, 0.0], 1.0)).unwrap();

        let report = manager.tick().unwrap();
        assert_eq!(report.over_capacity, vec![far]);
        assert_eq!(manager.visible_lights().get(LightKind::Point, false), &[near, mid]);

        // Caps apply per frame only
        manager.set_camera_pos([30.0, 0.0, 0.0]);
        let report = manager.tick().unwrap();
        assert_eq!(report.over_capacity, vec![near]);
    }

    #[test]
    fn test_invalid_shadow_resolution() {
        let mut manager = LightManager::new(config()).unwrap();
        let err = manager
            .add_light(Light::point([0.0; 3], 1.0).with_shadows(300))
            .unwrap_err();
        assert_eq!(
            err,
            LightingError::Atlas(AtlasError::InvalidResolution {
                resolution: 300,
                tile_size: 128
            })
        );
        assert_eq!(manager.num_lights(), 0);
    }

    #[test]
    fn test_moving_light_requeues_sources() {
        let mut manager = LightManager::new(config()).unwrap();
        let light = spot([0.0; 3]);
        let idx = manager.add_light(light.clone()).unwrap();
        let first = manager.tick().unwrap();
        let region = first.shadows.updated[0].region;

        manager
            .update_light(
                idx,
                Light {
                    position: [1.0, 0.0, 0.0],
                    ..light
                },
            )
            .unwrap();
        let report = manager.tick().unwrap();
        assert_eq!(report.lights_updated, 1);
        assert_eq!(report.shadows.updated.len(), 1);
        // Sticky: same tiles
        assert_eq!(report.shadows.updated[0].region, region);
    }

    #[test]
    fn test_every_frame_mode() {
        let mut manager = LightManager::new(config()).unwrap();
        manager
            .add_light(spot([0.0; 3]).with_update_mode(ShadowUpdateMode::EveryFrame))
            .unwrap();

        for _ in 0..3 {
            let report = manager.tick().unwrap();
            assert_eq!(report.shadows.updated.len(), 1);
        }
    }

    #[test]
    fn test_shadow_update_distance() {
        let mut config = config();
        config.scheduler.shadow_update_distance = Some(10.0);
        let mut manager = LightManager::new(config).unwrap();
        let idx = manager.add_light(spot([50.0, 0.0, 0.0])).unwrap();
        let uid = manager.registry().sources_of(idx)[0];

        let report = manager.tick().unwrap();
        assert!(report.shadows.updated.is_empty());
        assert!(manager.source(uid).unwrap().needs_update());

        manager.set_camera_pos([45.0, 0.0, 0.0]);
        let report = manager.tick().unwrap();
        assert_eq!(report.shadows.updated_uids(), vec![uid]);
    }

    #[test]
    fn test_frame_scalars() {
        let mut manager = LightManager::new(config()).unwrap();
        assert_eq!(manager.frame_scalars().max_light_index, -1);

        manager.add_light(Light::point([0.0; 3], 1.0)).unwrap();
        manager.add_light(spot([2.0, 0.0, 0.0])).unwrap();
        manager.tick().unwrap();
        let scalars = manager.frame_scalars();
        assert_eq!(scalars.max_light_index, 1);
        // Two StoreLight, one StoreSource
        assert_eq!(scalars.command_count, 3);
        assert_eq!(scalars.num_shadow_updates, 1);

        manager.tick().unwrap();
        assert_eq!(manager.frame_scalars().num_shadow_updates, 0);
    }

    #[test]
    fn test_storage_layout_follows_config() {
        let mut config = config();
        config.max_lights = 100;
        config.max_shadow_sources = 40;
        config.commands.commands_per_frame = 16;
        let manager = LightManager::new(config).unwrap();

        let layout = manager.storage_layout();
        assert_eq!(layout.light_buffer_bytes(), 100 * 64);
        assert_eq!(layout.source_buffer_bytes(), 40 * 80);
        assert_eq!(layout.command_buffer_bytes(), 16 * 32 * 4);
        assert_eq!(layout.buffers()[1].0, "ShadowSourceData");
    }
}

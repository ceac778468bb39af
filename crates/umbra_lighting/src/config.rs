//! Lighting configuration
//!
//! Startup settings with serde support. [`LightManagerConfig::validate`]
//! clamps soft values and rejects layouts the system cannot run with.

use serde::{Deserialize, Serialize};

use umbra_command::CommandQueueConfig;

use crate::error::ConfigError;
use crate::gpu_data::{MAX_LIGHT_COUNT, MAX_SHADOW_SOURCES, STORE_LIGHT_WIDTH, STORE_SOURCE_WIDTH};
use crate::light::LightKind;

/// Shadow atlas layout
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Atlas edge length in pixels
    pub size: u32,

    /// Tile edge length in pixels, must divide `size`
    pub tile_size: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            size: 4096,
            tile_size: 32,
        }
    }
}

impl AtlasConfig {
    /// Tiles along one edge
    pub fn tile_count(&self) -> u32 {
        if self.tile_size == 0 {
            0
        } else {
            self.size / self.tile_size
        }
    }
}

/// Shadow update scheduling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Shadow sources rendered per frame
    pub max_updates_per_frame: usize,

    /// Sources farther than this from the camera are not queued
    pub shadow_update_distance: Option<f32>,

    /// Re-render sources whose last update is this many frames old
    pub max_shadow_age: Option<u64>,

    /// Lights farther than this from the camera are culled
    pub light_cull_distance: Option<f32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_updates_per_frame: 10,
            shadow_update_distance: None,
            max_shadow_age: None,
            light_cull_distance: None,
        }
    }
}

/// Per-kind rendering caps
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLimits {
    /// Visible lights without shadows
    pub max_lights: usize,

    /// Visible lights with shadows
    pub max_shadowed: usize,
}

impl TypeLimits {
    pub const fn new(max_lights: usize, max_shadowed: usize) -> Self {
        Self {
            max_lights,
            max_shadowed,
        }
    }

    /// Cap for one bucket
    pub fn cap(&self, shadowed: bool) -> usize {
        if shadowed {
            self.max_shadowed
        } else {
            self.max_lights
        }
    }
}

/// Rendering caps for every light kind
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightLimits {
    pub point: TypeLimits,
    pub sphere: TypeLimits,
    pub spot: TypeLimits,
    pub rectangle: TypeLimits,
    pub tube: TypeLimits,
}

impl Default for LightLimits {
    fn default() -> Self {
        Self {
            point: TypeLimits::new(256, 16),
            sphere: TypeLimits::new(128, 8),
            spot: TypeLimits::new(128, 16),
            rectangle: TypeLimits::new(64, 4),
            tube: TypeLimits::new(64, 4),
        }
    }
}

impl LightLimits {
    /// Limits for a light kind
    pub fn get(&self, kind: LightKind) -> TypeLimits {
        match kind {
            LightKind::Point => self.point,
            LightKind::Sphere => self.sphere,
            LightKind::Spot => self.spot,
            LightKind::Rectangle => self.rectangle,
            LightKind::Tube => self.tube,
        }
    }

    /// Same limits for every kind
    pub fn uniform(limits: TypeLimits) -> Self {
        Self {
            point: limits,
            sphere: limits,
            spot: limits,
            rectangle: limits,
            tube: limits,
        }
    }
}

/// Complete lighting configuration
///
/// Shadow resolution is chosen per light; unknown keys are rejected so a
/// misspelled or stale setting is not silently ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightManagerConfig {
    pub atlas: AtlasConfig,
    pub scheduler: SchedulerConfig,
    pub commands: CommandQueueConfig,
    pub limits: LightLimits,

    /// Light slots in the GPU buffer
    pub max_lights: usize,

    /// Shadow source slots in the GPU buffer
    pub max_shadow_sources: usize,
}

impl Default for LightManagerConfig {
    fn default() -> Self {
        Self {
            atlas: AtlasConfig::default(),
            scheduler: SchedulerConfig::default(),
            commands: CommandQueueConfig::default(),
            limits: LightLimits::default(),
            max_lights: MAX_LIGHT_COUNT,
            max_shadow_sources: MAX_SHADOW_SOURCES,
        }
    }
}

impl LightManagerConfig {
    /// Large atlas and a generous update budget
    pub fn high_quality() -> Self {
        Self {
            atlas: AtlasConfig {
                size: 8192,
                tile_size: 32,
            },
            scheduler: SchedulerConfig {
                max_updates_per_frame: 32,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Small atlas and few updates per frame
    pub fn low_quality() -> Self {
        Self {
            atlas: AtlasConfig {
                size: 2048,
                tile_size: 64,
            },
            scheduler: SchedulerConfig {
                max_updates_per_frame: 4,
                shadow_update_distance: Some(50.0),
                ..Default::default()
            },
            limits: LightLimits::uniform(TypeLimits::new(64, 4)),
            ..Default::default()
        }
    }

    /// Clamp soft values and reject unusable layouts
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let atlas = &self.atlas;
        if atlas.tile_size == 0 || atlas.size == 0 || atlas.size % atlas.tile_size != 0 {
            return Err(ConfigError::AtlasLayout {
                size: atlas.size,
                tile_size: atlas.tile_size,
            });
        }

        self.commands.validate()?;
        let required = STORE_LIGHT_WIDTH.max(STORE_SOURCE_WIDTH);
        if self.commands.command_width < required {
            return Err(ConfigError::CommandWidth {
                width: self.commands.command_width,
                required,
            });
        }

        if self.max_lights == 0 || self.max_lights > MAX_LIGHT_COUNT {
            return Err(ConfigError::Capacity(format!(
                "max_lights must be in 1..={}, got {}",
                MAX_LIGHT_COUNT, self.max_lights
            )));
        }
        if self.max_shadow_sources > MAX_SHADOW_SOURCES {
            return Err(ConfigError::Capacity(format!(
                "max_shadow_sources must be at most {}, got {}",
                MAX_SHADOW_SOURCES, self.max_shadow_sources
            )));
        }

        if self.scheduler.max_updates_per_frame == 0 {
            log::warn!("max_updates_per_frame is 0, no shadow maps will be rendered");
        }
        if let Some(distance) = self.scheduler.shadow_update_distance {
            self.scheduler.shadow_update_distance = Some(distance.max(0.0));
        }
        if let Some(distance) = self.scheduler.light_cull_distance {
            self.scheduler.light_cull_distance = Some(distance.max(0.0));
        }
        if self.scheduler.max_shadow_age == Some(0) {
            self.scheduler.max_shadow_age = Some(1);
        }

        Ok(())
    }
}

/// Shadow map refresh policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowUpdateMode {
    /// Re-render every frame the light is visible
    EveryFrame,
    /// Re-render every N frames
    Interval(u32),
    /// Re-render when the light changes
    #[default]
    OnChange,
    /// Render once, ignore later changes
    Static,
}

impl ShadowUpdateMode {
    /// Check if a clean shadow map should be refreshed this frame
    pub fn should_update(&self, frame: u64, light_changed: bool) -> bool {
        match self {
            Self::EveryFrame => true,
            Self::Interval(n) => frame % u64::from((*n).max(1)) == 0,
            Self::OnChange => light_changed,
            Self::Static => false,
        }
    }

    /// Check if light changes invalidate the shadow map
    pub fn tracks_changes(&self) -> bool {
        !matches!(self, Self::Static)
    }
}

/// Configuration presets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowQuality {
    Low,
    Medium,
    High,
}

impl ShadowQuality {
    /// Convert to a full configuration
    pub fn to_config(self) -> LightManagerConfig {
        match self {
            Self::Low => LightManagerConfig::low_quality(),
            Self::Medium => LightManagerConfig::default(),
            Self::High => LightManagerConfig::high_quality(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let mut config = LightManagerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.atlas.tile_count(), 128);
        assert_eq!(config.commands.commands_per_frame, 1024);

        for quality in [ShadowQuality::Low, ShadowQuality::Medium, ShadowQuality::High] {
            assert!(quality.to_config().validate().is_ok());
        }
    }

    #[test]
    fn test_validate_rejects_bad_layout() {
        let mut config = LightManagerConfig {
            atlas: AtlasConfig {
                size: 1000,
                tile_size: 64,
            },
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::AtlasLayout {
                size: 1000,
                tile_size: 64
            })
        );

        let mut config = LightManagerConfig::default();
        config.commands.command_width = 16;
        assert_eq!(
            config.validate(),
            Err(ConfigError::CommandWidth {
                width: 16,
                required: 22
            })
        );

        let mut config = LightManagerConfig::default();
        config.commands.commands_per_frame = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Commands(_))));

        let mut config = LightManagerConfig {
            max_shadow_sources: 4096,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Capacity(_))));
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = LightManagerConfig::default();
        config.scheduler.shadow_update_distance = Some(-5.0);
        config.scheduler.max_shadow_age = Some(0);
        config.validate().unwrap();

        assert_eq!(config.scheduler.shadow_update_distance, Some(0.0));
        assert_eq!(config.scheduler.max_shadow_age, Some(1));
    }

    #[test]
    fn test_update_mode() {
        assert!(ShadowUpdateMode::EveryFrame.should_update(3, false));
        assert!(ShadowUpdateMode::Interval(4).should_update(8, false));
        assert!(!ShadowUpdateMode::Interval(4).should_update(9, false));
        assert!(ShadowUpdateMode::Interval(0).should_update(9, false));
        assert!(ShadowUpdateMode::OnChange.should_update(1, true));
        assert!(!ShadowUpdateMode::OnChange.should_update(1, false));
        assert!(!ShadowUpdateMode::Static.should_update(1, true));
        assert!(!ShadowUpdateMode::Static.tracks_changes());
    }

    #[test]
    fn test_limits_lookup() {
        let limits = LightLimits::default();
        assert_eq!(limits.get(LightKind::Point).cap(false), 256);
        assert_eq!(limits.get(LightKind::Spot).cap(true), 16);
    }

    #[test]
    fn test_config_serialization() {
        let config = LightManagerConfig::low_quality();
        let json = serde_json::to_string(&config).unwrap();
        let restored: LightManagerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);

        let partial: LightManagerConfig =
            serde_json::from_str(r#"{ "atlas": { "size": 512, "tile_size": 128 } }"#).unwrap();
        assert_eq!(partial.atlas.tile_count(), 4);
        assert_eq!(partial.scheduler.max_updates_per_frame, 10);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let stale = r#"{ "default_shadow_resolution": 256 }"#;
        assert!(serde_json::from_str::<LightManagerConfig>(stale).is_err());
    }
}

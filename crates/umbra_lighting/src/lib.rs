//! # umbra_lighting - Light and Shadow Update Scheduling
//!
//! Keeps many lights and their shadow maps up to date within a fixed
//! per-frame budget:
//! - Light registry with lowest-free index reuse
//! - Tile-grid shadow atlas with sticky first-fit allocation
//! - FIFO shadow update scheduler with a per-frame budget
//! - GPU record layouts written through `umbra_command`
//!
//! ## Frame flow
//!
//! ```text
//! add_light / update_light / remove_light
//!         |
//!         v
//!   LightRegistry --dirty lights--> StoreLight commands
//!         |
//!   dirty sources
//!         v
//!   ShadowScheduler --budget--> ShadowAtlas --region--> StoreSource commands
//!                                                          |
//!                                                          v
//!                                                   GpuCommandQueue
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use umbra_lighting::prelude::*;
//!
//! let mut manager = LightManager::new(LightManagerConfig::default())?;
//! let lamp = manager.add_light(
//!     Light::spot([0.0, 4.0, 0.0], [0.0, -1.0, 0.0], 12.0, 60.0).with_shadows(512),
//! )?;
//!
//! // Once per frame
//! manager.set_camera_pos(camera);
//! let report = manager.tick()?;
//! for update in &report.shadows.updated {
//!     render_shadow(update.viewport, &update.view_projection);
//! }
//! upload(manager.command_queue().buffer().as_bytes());
//! ```

pub mod error;
pub mod config;
pub mod gpu_data;
pub mod light;
pub mod shadow_source;
pub mod atlas;
pub mod registry;
pub mod scheduler;
pub mod manager;

pub use error::{AtlasError, ConfigError, LightingError, RegistryError, Result};
pub use config::{
    AtlasConfig, LightLimits, LightManagerConfig, SchedulerConfig, ShadowQuality,
    ShadowUpdateMode, TypeLimits,
};
pub use gpu_data::{
    GpuFrameScalars, GpuLightRecord, GpuShadowSourceRecord, StorageLayout, MAX_LIGHT_COUNT,
    MAX_SHADOW_SOURCES,
};
pub use light::{color_from_temperature, normalize_color, Light, LightKind, LightShape};
pub use shadow_source::{BoundingSphere, ShadowSource, SourceUid, SourceUidArena};
pub use atlas::{AtlasRegion, AtlasStats, AtlasViewport, ShadowAtlas, ShadowAtlasState};
pub use registry::{LightIndex, LightRegistry, LightUpdate, RemovedLight};
pub use scheduler::{SchedulerStats, ShadowScheduler, ShadowUpdate, ShadowUpdateReport, SourceStore};
pub use manager::{FrameReport, LightManager, VisibleLights};

pub use umbra_command;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::atlas::{AtlasRegion, ShadowAtlas};
    pub use crate::config::{LightManagerConfig, ShadowUpdateMode};
    pub use crate::error::LightingError;
    pub use crate::light::{Light, LightKind, LightShape};
    pub use crate::manager::{FrameReport, LightManager};
    pub use crate::registry::LightIndex;
    pub use crate::scheduler::ShadowScheduler;
    pub use crate::shadow_source::SourceUid;
}

//! Error types for the lighting system

use thiserror::Error;

use umbra_command::CommandError;

use crate::registry::LightIndex;
use crate::shadow_source::SourceUid;

/// Shadow atlas errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtlasError {
    /// No free rectangle of the requested size
    #[error("No free {tiles_w}x{tiles_h} tile region for shadow source {uid:?}")]
    NoSpace {
        uid: SourceUid,
        tiles_w: u32,
        tiles_h: u32,
    },

    /// Resolution is not a positive multiple of the tile size
    #[error("Shadow resolution {resolution} is not a multiple of the tile size {tile_size}")]
    InvalidResolution { resolution: u32, tile_size: u32 },

    /// Zero-sized region requested
    #[error("Cannot allocate an empty atlas region")]
    EmptyRegion,

    /// Tile size does not evenly divide the atlas size
    #[error("Atlas size {size} is not a positive multiple of tile size {tile_size}")]
    InvalidLayout { size: u32, tile_size: u32 },
}

/// Light registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No light at this index
    #[error("Light not found: {0:?}")]
    LightNotFound(LightIndex),

    /// Every light slot is taken
    #[error("Light storage is full ({capacity} lights)")]
    LightsFull { capacity: usize },

    /// Not enough consecutive shadow source slots
    #[error("No room for {requested} consecutive shadow sources")]
    SourcesFull { requested: usize },
}

/// Startup configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Atlas cannot be split into whole tiles
    #[error("Atlas size {size} is not a positive multiple of tile size {tile_size}")]
    AtlasLayout { size: u32, tile_size: u32 },

    /// Command stride cannot hold the widest lighting command
    #[error("Command width {width} is smaller than the {required} words a shadow source update needs")]
    CommandWidth { width: usize, required: usize },

    /// Storage limits out of range
    #[error("Invalid capacity: {0}")]
    Capacity(String),

    /// Command queue configuration rejected
    #[error("Command queue: {0}")]
    Commands(#[from] CommandError),
}

/// Errors from the lighting system
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LightingError {
    #[error("Atlas error: {0}")]
    Atlas(#[from] AtlasError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Result type for lighting operations
pub type Result<T> = std::result::Result<T, LightingError>;

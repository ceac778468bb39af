//! GPU-side record layouts
//!
//! Lights and shadow sources live in flat storage buffers indexed by slot.
//! Records are `#[repr(C)]` vec4 groups so they can be uploaded with
//! `bytemuck` and written into commands word for word.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Hard cap on light slots
pub const MAX_LIGHT_COUNT: usize = 65535;

/// Hard cap on shadow source slots
pub const MAX_SHADOW_SOURCES: usize = 2048;

/// vec4s per light record
pub const LIGHT_RECORD_VEC4S: usize = 4;

/// vec4s per shadow source record
pub const SOURCE_RECORD_VEC4S: usize = 5;

/// Words in a store-light command: header, slot, record
pub const STORE_LIGHT_WIDTH: usize = 2 + LIGHT_RECORD_VEC4S * 4;

/// Words in a store-source command: header, slot, record
pub const STORE_SOURCE_WIDTH: usize = 2 + SOURCE_RECORD_VEC4S * 4;

/// Buffer and input names the consumer binds
pub mod names {
    pub const ALL_LIGHTS_DATA: &str = "AllLightsData";
    pub const SHADOW_SOURCE_DATA: &str = "ShadowSourceData";
    pub const COMMAND_QUEUE: &str = "CommandQueue";
    pub const COMMAND_COUNT: &str = "commandCount";
    pub const MAX_LIGHT_INDEX: &str = "maxLightIndex";
}

/// GPU light record
///
/// `position_kind.w` holds the kind code, zero marks an empty slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct GpuLightRecord {
    /// xyz = position, w = kind code
    pub position_kind: [f32; 4],
    /// rgb = color * intensity, a = culling radius
    pub color_radius: [f32; 4],
    /// Kind-specific vector, w = first shadow source slot or -1
    pub shape_a: [f32; 4],
    /// Kind-specific vector, w = IES profile or -1
    pub shape_b: [f32; 4],
}

impl GpuLightRecord {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Record as vec4s in upload order
    pub fn vec4s(&self) -> [[f32; 4]; LIGHT_RECORD_VEC4S] {
        [self.position_kind, self.color_radius, self.shape_a, self.shape_b]
    }

    /// Kind code, zero for an empty record
    pub fn kind_code(&self) -> u32 {
        self.position_kind[3] as u32
    }
}

/// GPU shadow source record
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct GpuShadowSourceRecord {
    /// Row-major view-projection matrix
    pub view_projection: [[f32; 4]; 4],
    /// Atlas region in UV space: x, y, width, height
    pub uv_region: [f32; 4],
}

impl GpuShadowSourceRecord {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Record as vec4s in upload order
    pub fn vec4s(&self) -> [[f32; 4]; SOURCE_RECORD_VEC4S] {
        let m = self.view_projection;
        [m[0], m[1], m[2], m[3], self.uv_region]
    }
}

/// Per-frame scalars passed alongside the buffers
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuFrameScalars {
    /// Highest occupied light slot, -1 when empty
    pub max_light_index: i32,
    /// Valid records in the command buffer
    pub command_count: u32,
    /// Shadow sources rendered this frame
    pub num_shadow_updates: u32,
    pub _pad: u32,
}

impl GpuFrameScalars {
    /// Scalar shader inputs by name
    pub fn inputs(&self) -> [(&'static str, i32); 2] {
        [
            (names::MAX_LIGHT_INDEX, self.max_light_index),
            (names::COMMAND_COUNT, self.command_count as i32),
        ]
    }
}

/// Storage buffer sizing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    pub max_lights: usize,
    pub max_shadow_sources: usize,
    /// Words in the command buffer (commands per frame * stride)
    pub command_buffer_words: usize,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            max_lights: MAX_LIGHT_COUNT,
            max_shadow_sources: MAX_SHADOW_SOURCES,
            command_buffer_words: umbra_command::DEFAULT_COMMANDS_PER_FRAME
                * umbra_command::DEFAULT_COMMAND_WIDTH,
        }
    }
}

impl StorageLayout {
    /// Bytes needed for the light buffer
    pub fn light_buffer_bytes(&self) -> usize {
        self.max_lights * GpuLightRecord::SIZE
    }

    /// Bytes needed for the shadow source buffer
    pub fn source_buffer_bytes(&self) -> usize {
        self.max_shadow_sources * GpuShadowSourceRecord::SIZE
    }

    /// Bytes needed for the command buffer
    pub fn command_buffer_bytes(&self) -> usize {
        self.command_buffer_words * std::mem::size_of::<f32>()
    }

    /// Storage buffers by input name, sizes in bytes
    pub fn buffers(&self) -> [(&'static str, usize); 3] {
        [
            (names::ALL_LIGHTS_DATA, self.light_buffer_bytes()),
            (names::SHADOW_SOURCE_DATA, self.source_buffer_bytes()),
            (names::COMMAND_QUEUE, self.command_buffer_bytes()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(GpuLightRecord::SIZE, LIGHT_RECORD_VEC4S * 16);
        assert_eq!(GpuShadowSourceRecord::SIZE, SOURCE_RECORD_VEC4S * 16);
        assert_eq!(std::mem::size_of::<GpuFrameScalars>(), 16);
    }

    #[test]
    fn test_command_widths_fit_default_stride() {
        assert_eq!(STORE_LIGHT_WIDTH, 18);
        assert_eq!(STORE_SOURCE_WIDTH, 22);
        assert!(STORE_SOURCE_WIDTH <= umbra_command::DEFAULT_COMMAND_WIDTH);
    }

    #[test]
    fn test_record_bytes() {
        let record = GpuLightRecord {
            position_kind: [1.0, 2.0, 3.0, 1.0],
            ..Default::default()
        };
        let bytes: &[u8] = bytemuck::bytes_of(&record);
        assert_eq!(bytes.len(), 64);
        assert_eq!(record.kind_code(), 1);
        assert_eq!(GpuLightRecord::zeroed().kind_code(), 0);
    }

    #[test]
    fn test_layout_sizes() {
        let layout = StorageLayout::default();
        assert_eq!(layout.light_buffer_bytes(), 65535 * 64);
        assert_eq!(layout.source_buffer_bytes(), 2048 * 80);
        assert_eq!(layout.command_buffer_bytes(), 1024 * 32 * 4);

        let buffers = layout.buffers();
        assert_eq!(buffers[0], (names::ALL_LIGHTS_DATA, 65535 * 64));
        assert_eq!(buffers[2].0, "CommandQueue");
    }

    #[test]
    fn test_scalar_inputs() {
        let scalars = GpuFrameScalars {
            max_light_index: -1,
            command_count: 7,
            ..Default::default()
        };
        assert_eq!(scalars.inputs(), [("maxLightIndex", -1), ("commandCount", 7)]);
    }
}

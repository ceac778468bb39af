//! Light definitions
//!
//! A [`Light`] is a closed set of shapes sharing common attributes. The GPU
//! record is produced by one exhaustive match, so adding a shape means
//! touching a single function.

use serde::{Deserialize, Serialize};

use umbra_command::{CommandError, GpuCommand};

use crate::config::ShadowUpdateMode;
use crate::gpu_data::GpuLightRecord;

/// Resolution assigned by constructors that enable shadows
pub const DEFAULT_SHADOW_RESOLUTION: u32 = 512;

/// Light type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    Point,
    Sphere,
    Spot,
    Rectangle,
    Tube,
}

impl LightKind {
    pub const ALL: [LightKind; 5] = [
        LightKind::Point,
        LightKind::Sphere,
        LightKind::Spot,
        LightKind::Rectangle,
        LightKind::Tube,
    ];

    /// Code stored in the record, zero is reserved for empty slots
    pub fn code(self) -> u32 {
        match self {
            Self::Point => 1,
            Self::Sphere => 2,
            Self::Spot => 3,
            Self::Rectangle => 4,
            Self::Tube => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Sphere => "sphere",
            Self::Spot => "spot",
            Self::Rectangle => "rectangle",
            Self::Tube => "tube",
        }
    }

    /// Shadow sources a shadowed light of this kind owns
    pub fn num_shadow_sources(self) -> usize {
        match self {
            // One per cube face
            Self::Point | Self::Sphere | Self::Tube => 6,
            Self::Spot | Self::Rectangle => 1,
        }
    }
}

/// Shape-specific light parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LightShape {
    Point,
    Sphere {
        sphere_radius: f32,
    },
    Spot {
        direction: [f32; 3],
        /// Full cone angle in degrees
        fov: f32,
    },
    Rectangle {
        up: [f32; 3],
        right: [f32; 3],
    },
    Tube {
        direction: [f32; 3],
        length: f32,
        tube_radius: f32,
    },
}

impl LightShape {
    pub fn kind(&self) -> LightKind {
        match self {
            Self::Point => LightKind::Point,
            Self::Sphere { .. } => LightKind::Sphere,
            Self::Spot { .. } => LightKind::Spot,
            Self::Rectangle { .. } => LightKind::Rectangle,
            Self::Tube { .. } => LightKind::Tube,
        }
    }
}

/// A light
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub shape: LightShape,
    pub position: [f32; 3],
    /// Normalized to unit luminance by [`Light::with_color`]
    pub color: [f32; 3],
    pub intensity: f32,
    /// Culling radius
    pub radius: f32,
    #[serde(default)]
    pub casts_shadows: bool,
    #[serde(default = "default_shadow_resolution")]
    pub shadow_resolution: u32,
    #[serde(default = "default_near_plane")]
    pub near_plane: f32,
    #[serde(default)]
    pub ies_profile: Option<u32>,
    #[serde(default)]
    pub update_mode: ShadowUpdateMode,
}

fn default_shadow_resolution() -> u32 {
    DEFAULT_SHADOW_RESOLUTION
}

fn default_near_plane() -> f32 {
    0.5
}

impl Light {
    /// Create a light of the given shape
    pub fn new(shape: LightShape, position: [f32; 3], radius: f32) -> Self {
        Self {
            shape,
            position,
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            radius,
            casts_shadows: false,
            shadow_resolution: DEFAULT_SHADOW_RESOLUTION,
            near_plane: default_near_plane(),
            ies_profile: None,
            update_mode: ShadowUpdateMode::default(),
        }
    }

    pub fn point(position: [f32; 3], radius: f32) -> Self {
        Self::new(LightShape::Point, position, radius)
    }

    pub fn sphere(position: [f32; 3], radius: f32, sphere_radius: f32) -> Self {
        Self::new(LightShape::Sphere { sphere_radius }, position, radius)
    }

    pub fn spot(position: [f32; 3], direction: [f32; 3], radius: f32, fov: f32) -> Self {
        Self::new(
            LightShape::Spot {
                direction: normalize(direction),
                fov,
            },
            position,
            radius,
        )
    }

    pub fn rectangle(position: [f32; 3], up: [f32; 3], right: [f32; 3], radius: f32) -> Self {
        Self::new(LightShape::Rectangle { up, right }, position, radius)
    }

    pub fn tube(
        position: [f32; 3],
        direction: [f32; 3],
        length: f32,
        tube_radius: f32,
        radius: f32,
    ) -> Self {
        Self::new(
            LightShape::Tube {
                direction: normalize(direction),
                length,
                tube_radius,
            },
            position,
            radius,
        )
    }

    /// Set color, normalized to unit luminance
    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = normalize_color(color);
        self
    }

    /// Set color from a black body temperature
    pub fn with_color_temperature(mut self, kelvin: f32) -> Self {
        self.color = color_from_temperature(kelvin);
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    /// Enable shadows at the given resolution
    pub fn with_shadows(mut self, resolution: u32) -> Self {
        self.casts_shadows = true;
        self.shadow_resolution = resolution;
        self
    }

    pub fn with_update_mode(mut self, mode: ShadowUpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    pub fn with_ies_profile(mut self, profile: u32) -> Self {
        self.ies_profile = Some(profile);
        self
    }

    pub fn with_near_plane(mut self, near_plane: f32) -> Self {
        self.near_plane = near_plane;
        self
    }

    pub fn kind(&self) -> LightKind {
        self.shape.kind()
    }

    /// Shadow sources this light owns
    pub fn num_shadow_sources(&self) -> usize {
        if self.casts_shadows {
            self.kind().num_shadow_sources()
        } else {
            0
        }
    }

    /// Distance from a point to the light position
    pub fn distance_to(&self, point: [f32; 3]) -> f32 {
        distance(self.position, point)
    }

    /// Check if anything a shadow map depends on differs
    pub fn shadow_changed(&self, other: &Light) -> bool {
        self.position != other.position
            || self.shape != other.shape
            || self.radius != other.radius
            || self.near_plane != other.near_plane
    }

    /// Check if the shadow layout (source count or resolution) differs
    pub fn shadow_layout_changed(&self, other: &Light) -> bool {
        self.num_shadow_sources() != other.num_shadow_sources()
            || (self.casts_shadows && self.shadow_resolution != other.shadow_resolution)
    }

    /// Build the GPU record
    pub fn to_gpu_record(&self, first_source_slot: Option<u32>) -> GpuLightRecord {
        let [x, y, z] = self.position;
        let [r, g, b] = self.color;
        let first_source = first_source_slot.map_or(-1.0, |slot| slot as f32);
        let ies = self.ies_profile.map_or(-1.0, |profile| profile as f32);

        let (shape_a, shape_b) = match self.shape {
            LightShape::Point => ([0.0; 3], [0.0; 3]),
            LightShape::Sphere { sphere_radius } => ([sphere_radius, 0.0, 0.0], [0.0; 3]),
            LightShape::Spot { direction, fov } => {
                let cos_half_angle = (fov.to_radians() * 0.5).cos();
                (direction, [cos_half_angle, 0.0, 0.0])
            }
            LightShape::Rectangle { up, right } => (up, right),
            LightShape::Tube {
                direction,
                length,
                tube_radius,
            } => (direction, [length, tube_radius, 0.0]),
        };

        GpuLightRecord {
            position_kind: [x, y, z, self.kind().code() as f32],
            color_radius: [
                r * self.intensity,
                g * self.intensity,
                b * self.intensity,
                self.radius,
            ],
            shape_a: [shape_a[0], shape_a[1], shape_a[2], first_source],
            shape_b: [shape_b[0], shape_b[1], shape_b[2], ies],
        }
    }

    /// Append the GPU record to a command
    pub fn write_to_command(
        &self,
        command: &mut GpuCommand,
        first_source_slot: Option<u32>,
    ) -> Result<(), CommandError> {
        for vec4 in self.to_gpu_record(first_source_slot).vec4s() {
            command.push_vec4(vec4)?;
        }
        Ok(())
    }
}

/// Relative luminance of a linear RGB color
pub fn luminance(color: [f32; 3]) -> f32 {
    0.2126 * color[0] + 0.7152 * color[1] + 0.0722 * color[2]
}

/// Scale a color to unit luminance, black stays black
pub fn normalize_color(color: [f32; 3]) -> [f32; 3] {
    let lum = luminance(color);
    if lum <= f32::EPSILON {
        return color;
    }
    color.map(|c| c / lum)
}

/// Approximate black body color, normalized to unit luminance
pub fn color_from_temperature(kelvin: f32) -> [f32; 3] {
    let t = kelvin.clamp(1000.0, 40000.0) / 100.0;

    let r = if t <= 66.0 {
        255.0
    } else {
        329.698_73 * (t - 60.0).powf(-0.133_204_76)
    };
    let g = if t <= 66.0 {
        99.470_8 * t.ln() - 161.119_57
    } else {
        288.122_16 * (t - 60.0).powf(-0.075_514_85)
    };
    let b = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.517_73 * (t - 10.0).ln() - 305.044_8
    };

    normalize_color([r, g, b].map(|c| c.clamp(0.0, 255.0) / 255.0))
}

pub(crate) fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= f32::EPSILON {
        return v;
    }
    v.map(|c| c / len)
}

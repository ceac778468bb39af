//! Scenario files
//!
//! A scenario describes the lighting configuration, the initial lights, a
//! camera path and timed events.
//!
//! # Example
//!
//! ```toml
//! frames = 120
//!
//! [camera]
//! start = [0.0, 2.0, 0.0]
//! end = [40.0, 2.0, 0.0]
//!
//! [lighting.atlas]
//! size = 4096
//! tile_size = 128
//!
//! [lighting.scheduler]
//! max_updates_per_frame = 8
//!
//! [[lights]]
//! position = [0.0, 4.0, 0.0]
//! color = [1.0, 0.9, 0.8]
//! intensity = 20.0
//! radius = 15.0
//! casts_shadows = true
//! shadow_resolution = 512
//! shape = { kind = "spot", direction = [0.0, -1.0, 0.0], fov = 60.0 }
//!
//! [[events]]
//! frame = 30
//! action = "move"
//! light = 0
//! position = [5.0, 4.0, 0.0]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use umbra_lighting::{Light, LightManagerConfig};

/// Scenario loading errors
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Event at frame {frame} refers to unknown light {light}")]
    UnknownLight { frame: u64, light: usize },
}

/// Linear camera path over the whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraPath {
    pub start: [f32; 3],
    pub end: [f32; 3],
}

impl CameraPath {
    /// Camera position at `frame` of `frames`
    pub fn position(&self, frame: u64, frames: u64) -> [f32; 3] {
        let t = if frames <= 1 {
            0.0
        } else {
            (frame as f32 / (frames - 1) as f32).clamp(0.0, 1.0)
        };
        [0, 1, 2].map(|i| self.start[i] + (self.end[i] - self.start[i]) * t)
    }
}

/// Timed change applied before a frame's tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum EventAction {
    /// Register another light; it gets the next scenario light number
    Add { light: Light },
    Remove { light: usize },
    Move { light: usize, position: [f32; 3] },
    /// Change the shadow map resolution
    Resize { light: usize, resolution: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEvent {
    pub frame: u64,
    #[serde(flatten)]
    pub action: EventAction,
}

/// Complete scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub frames: u64,
    pub camera: CameraPath,
    pub lighting: LightManagerConfig,
    pub lights: Vec<Light>,
    pub events: Vec<ScenarioEvent>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            frames: 60,
            camera: CameraPath::default(),
            lighting: LightManagerConfig::default(),
            lights: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl Scenario {
    /// Load a scenario from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a scenario from TOML
    pub fn parse(content: &str) -> Result<Self, ScenarioError> {
        let mut scenario: Scenario = toml::from_str(content)?;
        scenario.events.sort_by_key(|e| e.frame);
        scenario.check_events()?;
        Ok(scenario)
    }

    /// Check that every event refers to a light that exists by then
    fn check_events(&self) -> Result<(), ScenarioError> {
        let mut known = self.lights.len();
        for event in &self.events {
            match &event.action {
                EventAction::Add { .. } => known += 1,
                EventAction::Remove { light }
                | EventAction::Move { light, .. }
                | EventAction::Resize { light, .. } => {
                    if *light >= known {
                        return Err(ScenarioError::UnknownLight {
                            frame: event.frame,
                            light: *light,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Events scheduled for a frame
    pub fn events_at(&self, frame: u64) -> impl Iterator<Item = &ScenarioEvent> {
        self.events.iter().filter(move |e| e.frame == frame)
    }

    /// Built-in scenario used when no file is given
    pub fn demo() -> Self {
        let mut lights = Vec::new();
        for i in 0..12 {
            let x = i as f32 * 6.0;
            lights.push(
                Light::point([x, 3.0, 0.0], 10.0)
                    .with_color_temperature(2700.0 + i as f32 * 300.0)
                    .with_intensity(15.0)
                    .with_shadows(256),
            );
            lights.push(
                Light::spot([x, 5.0, 4.0], [0.0, -1.0, -0.5], 14.0, 50.0)
                    .with_intensity(25.0)
                    .with_shadows(512),
            );
        }

        Self {
            frames: 90,
            camera: CameraPath {
                start: [0.0, 2.0, 0.0],
                end: [66.0, 2.0, 0.0],
            },
            lights,
            events: vec![
                ScenarioEvent {
                    frame: 20,
                    action: EventAction::Move {
                        light: 0,
                        position: [0.0, 3.0, 2.0],
                    },
                },
                ScenarioEvent {
                    frame: 45,
                    action: EventAction::Remove { light: 1 },
                },
                ScenarioEvent {
                    frame: 60,
                    action: EventAction::Resize {
                        light: 3,
                        resolution: 1024,
                    },
                },
            ],
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_lighting::{LightKind, ShadowUpdateMode};

    const SAMPLE: &str = r#"
frames = 10

[camera]
start = [0.0, 0.0, 0.0]
end = [9.0, 0.0, 0.0]

[lighting.atlas]
size = 1024
tile_size = 128

[lighting.scheduler]
max_updates_per_frame = 2

[[lights]]
position = [0.0, 4.0, 0.0]
color = [1.0, 1.0, 1.0]
intensity = 5.0
radius = 12.0
casts_shadows = true
shadow_resolution = 256
update_mode = { Interval = 4 }
shape = { kind = "spot", direction = [0.0, -1.0, 0.0], fov = 60.0 }

[[events]]
frame = 5
action = "remove"
light = 0

[[events]]
frame = 2
action = "move"
light = 0
position = [1.0, 4.0, 0.0]
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::parse(SAMPLE).unwrap();
        assert_eq!(scenario.frames, 10);
        assert_eq!(scenario.lighting.atlas.tile_count(), 8);
        assert_eq!(scenario.lighting.scheduler.max_updates_per_frame, 2);
        assert_eq!(scenario.lighting.commands.commands_per_frame, 1024);

        let light = &scenario.lights[0];
        assert_eq!(light.kind(), LightKind::Spot);
        assert_eq!(light.update_mode, ShadowUpdateMode::Interval(4));
        assert_eq!(light.num_shadow_sources(), 1);

        // Sorted by frame
        assert_eq!(scenario.events[0].frame, 2);
        assert_eq!(
            scenario.events_at(5).next().map(|e| &e.action),
            Some(&EventAction::Remove { light: 0 })
        );
    }

    #[test]
    fn test_unknown_light_rejected() {
        let content = r#"
[[events]]
frame = 1
action = "remove"
light = 3
"#;
        assert!(matches!(
            Scenario::parse(content),
            Err(ScenarioError::UnknownLight { frame: 1, light: 3 })
        ));
    }

    #[test]
    fn test_camera_path() {
        let path = CameraPath {
            start: [0.0, 0.0, 0.0],
            end: [10.0, 0.0, 0.0],
        };
        assert_eq!(path.position(0, 11), [0.0, 0.0, 0.0]);
        assert_eq!(path.position(5, 11), [5.0, 0.0, 0.0]);
        assert_eq!(path.position(10, 11), [10.0, 0.0, 0.0]);
        assert_eq!(path.position(0, 1), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_bundled_scenario_parses() {
        let scenario = Scenario::parse(include_str!("../scenarios/corridor.toml")).unwrap();
        assert_eq!(scenario.lights.len(), 5);
        assert_eq!(scenario.lighting.limits.point.max_shadowed, 4);
        assert_eq!(scenario.lights[2].update_mode, ShadowUpdateMode::EveryFrame);
        assert!(matches!(
            scenario.events.last().map(|e| &e.action),
            Some(EventAction::Add { .. })
        ));
        assert!(scenario.lighting.clone().validate().is_ok());
    }

    #[test]
    fn test_demo_is_valid() {
        let demo = Scenario::demo();
        assert!(demo.check_events().is_ok());
        assert!(demo.lighting.clone().validate().is_ok());
    }
}

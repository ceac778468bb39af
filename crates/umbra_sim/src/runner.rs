//! Frame loop
//!
//! Drives a [`LightManager`] through a scenario: apply the frame's events,
//! move the camera, tick, and fold the [`FrameReport`] into a summary.
//! One diagnostic step runs per frame, rotating through a fixed cycle.

use umbra_lighting::{FrameReport, LightIndex, LightManager, LightingError};
use umbra_structures::RoundRobinQueue;

use crate::scenario::{EventAction, Scenario};

/// Per-frame diagnostic steps, one per frame in rotation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    Atlas,
    Scheduler,
    Commands,
    Registry,
}

/// Totals over a whole run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimSummary {
    pub frames: u64,
    pub shadow_updates: usize,
    pub allocation_failures: usize,
    pub max_deferred: usize,
    pub over_capacity_skips: usize,
    pub commands_encoded: usize,
    pub peak_coverage: f32,
    /// Frames in which every queued shadow source was rendered
    pub frames_within_budget: u64,
}

impl SimSummary {
    fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        self.shadow_updates += report.shadows.updated.len();
        self.allocation_failures += report.shadows.failed.len();
        self.max_deferred = self.max_deferred.max(report.shadows.deferred);
        self.over_capacity_skips += report.over_capacity.len();
        self.commands_encoded += report.commands_encoded;
        self.peak_coverage = self.peak_coverage.max(report.atlas_coverage);
        if report.shadows.deferred == 0 {
            self.frames_within_budget += 1;
        }
    }
}

/// A running scenario
pub struct Simulation {
    scenario: Scenario,
    manager: LightManager,
    /// Scenario light number to registry index, None once removed
    handles: Vec<Option<LightIndex>>,
    diagnostics: RoundRobinQueue<Diagnostic>,
    summary: SimSummary,
}

impl Simulation {
    /// Build the manager and register the scenario's initial lights
    pub fn new(scenario: Scenario) -> Result<Self, LightingError> {
        let mut manager = LightManager::new(scenario.lighting.clone())?;
        for (name, bytes) in manager.storage_layout().buffers() {
            log::info!("GPU buffer {}: {} KiB", name, bytes / 1024);
        }

        let mut handles = Vec::with_capacity(scenario.lights.len());
        for light in &scenario.lights {
            handles.push(register(&mut manager, light.clone()));
        }

        let mut diagnostics = RoundRobinQueue::new();
        diagnostics.extend([
            Diagnostic::Atlas,
            Diagnostic::Scheduler,
            Diagnostic::Commands,
            Diagnostic::Registry,
        ]);

        Ok(Self {
            scenario,
            manager,
            handles,
            diagnostics,
            summary: SimSummary::default(),
        })
    }

    /// Run every frame of the scenario
    pub fn run(&mut self) -> Result<SimSummary, LightingError> {
        for frame in 0..self.scenario.frames {
            self.step(frame)?;
        }
        Ok(self.summary.clone())
    }

    /// Run a single frame
    pub fn step(&mut self, frame: u64) -> Result<FrameReport, LightingError> {
        self.apply_events(frame)?;

        let camera = self.scenario.camera.position(frame, self.scenario.frames);
        self.manager.set_camera_pos(camera);

        let report = self.manager.tick()?;
        self.summary.record(&report);

        if report.shadows.updated.is_empty() && report.lights_updated == 0 {
            log::debug!("Frame {}: idle", report.frame);
        } else {
            log::info!(
                "Frame {}: {} lights uploaded, {} shadow maps rendered, {} deferred, {} commands, atlas {:.1}%",
                report.frame,
                report.lights_updated,
                report.shadows.updated.len(),
                report.shadows.deferred,
                report.commands_encoded,
                report.atlas_coverage * 100.0
            );
        }

        if let Some(step) = self.diagnostics.next().copied() {
            self.run_diagnostic(step);
        }

        Ok(report)
    }

    fn apply_events(&mut self, frame: u64) -> Result<(), LightingError> {
        let actions: Vec<EventAction> = self
            .scenario
            .events_at(frame)
            .map(|e| e.action.clone())
            .collect();

        for action in actions {
            match action {
                EventAction::Add { light } => {
                    let handle = register(&mut self.manager, light);
                    self.handles.push(handle);
                }
                EventAction::Remove { light } => {
                    if let Some(index) = self.take_handle(light) {
                        self.manager.remove_light(index)?;
                        log::info!("Frame {}: removed light {}", frame, light);
                    }
                }
                EventAction::Move { light, position } => {
                    self.modify(light, frame, |l| l.position = position)?;
                }
                EventAction::Resize { light, resolution } => {
                    self.modify(light, frame, |l| l.shadow_resolution = resolution)?;
                }
            }
        }
        Ok(())
    }

    fn modify(
        &mut self,
        light: usize,
        frame: u64,
        change: impl FnOnce(&mut umbra_lighting::Light),
    ) -> Result<(), LightingError> {
        let Some(index) = self.handles.get(light).copied().flatten() else {
            log::warn!("Frame {}: light {} is not registered", frame, light);
            return Ok(());
        };
        let Some(current) = self.manager.light(index) else {
            return Ok(());
        };

        let mut updated = current.clone();
        change(&mut updated);
        if let Err(e) = self.manager.update_light(index, updated) {
            log::error!("Frame {}: failed to update light {}: {}", frame, light, e);
            if matches!(e, LightingError::Command(_)) {
                return Err(e);
            }
        }
        Ok(())
    }

    fn take_handle(&mut self, light: usize) -> Option<LightIndex> {
        self.handles.get_mut(light).and_then(Option::take)
    }

    fn run_diagnostic(&self, step: Diagnostic) {
        match step {
            Diagnostic::Atlas => {
                let atlas = self.manager.atlas();
                let stats = atlas.stats();
                log::debug!(
                    "Atlas: {}/{} tiles, {} regions, {} allocations, {} failures",
                    atlas.num_used_tiles(),
                    atlas.total_tiles(),
                    atlas.allocated_count(),
                    stats.total_allocations,
                    stats.failed_allocations
                );
            }
            Diagnostic::Scheduler => {
                let scheduler = self.manager.scheduler();
                let stats = scheduler.stats();
                log::debug!(
                    "Scheduler: {} queued, {} rendered, peak queue {}, {} ticks over budget",
                    scheduler.queue_len(),
                    stats.total_updates,
                    stats.peak_queue_len,
                    stats.ticks_over_budget
                );
            }
            Diagnostic::Commands => {
                let queue = self.manager.command_queue();
                let stats = queue.stats();
                log::debug!(
                    "Commands: {} processed, peak backlog {}, {} frames with backlog",
                    stats.total_processed,
                    stats.peak_queued,
                    stats.frames_with_backlog
                );
                for (name, value) in self.manager.frame_scalars().inputs() {
                    log::debug!("Input {} = {}", name, value);
                }
            }
            Diagnostic::Registry => {
                log::debug!(
                    "Registry: {} lights (max index {:?}), {} shadow sources",
                    self.manager.num_lights(),
                    self.manager.max_light_index(),
                    self.manager.num_shadow_sources()
                );
            }
        }
    }

    pub fn manager(&self) -> &LightManager {
        &self.manager
    }

    pub fn summary(&self) -> &SimSummary {
        &self.summary
    }
}

/// Add a light, logging instead of failing when it cannot be registered
fn register(manager: &mut LightManager, light: umbra_lighting::Light) -> Option<LightIndex> {
    match manager.add_light(light) {
        Ok(index) => Some(index),
        Err(e) => {
            log::error!("Failed to register light: {}", e);
            None
        }
    }
}

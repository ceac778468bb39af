//! Shadow Update Scheduler
//!
//! FIFO of dirty shadow sources with a per-frame budget. Each tick pops up
//! to `max_updates_per_frame` sources from the front, gives them atlas space
//! if they have none and emits a `StoreSource` command for each. Sources not
//! popped keep their place for the next tick, so with `N` queued sources and
//! a budget of `B` every source is serviced within `ceil(N / B)` ticks.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use umbra_command::{CommandError, CommandType, GpuCommandQueue};

use crate::atlas::{AtlasRegion, AtlasViewport, ShadowAtlas};
use crate::shadow_source::{ShadowSource, SourceUid};

/// Lookup of shadow sources by uid
pub trait SourceStore {
    fn source(&self, uid: SourceUid) -> Option<&ShadowSource>;
    fn source_mut(&mut self, uid: SourceUid) -> Option<&mut ShadowSource>;
}

impl SourceStore for BTreeMap<SourceUid, ShadowSource> {
    fn source(&self, uid: SourceUid) -> Option<&ShadowSource> {
        self.get(&uid)
    }

    fn source_mut(&mut self, uid: SourceUid) -> Option<&mut ShadowSource> {
        self.get_mut(&uid)
    }
}

/// A source rendered this frame
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowUpdate {
    pub uid: SourceUid,
    pub slot: u32,
    pub region: AtlasRegion,
    /// Pixel rectangle to render into
    pub viewport: AtlasViewport,
    pub uv: [f32; 4],
    pub view_projection: [[f32; 4]; 4],
}

/// Result of one scheduler tick
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShadowUpdateReport {
    pub frame: u64,
    /// Serviced sources in queue order
    pub updated: Vec<ShadowUpdate>,
    /// Sources dropped this frame for lack of atlas space
    pub failed: Vec<SourceUid>,
    /// Sources left queued for later ticks
    pub deferred: usize,
}

impl ShadowUpdateReport {
    /// Uids of the serviced sources
    pub fn updated_uids(&self) -> Vec<SourceUid> {
        self.updated.iter().map(|u| u.uid).collect()
    }
}

/// Scheduler statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_updates: u64,
    pub total_failures: u64,
    pub peak_queue_len: usize,
    /// Ticks that left sources queued
    pub ticks_over_budget: u64,
}

/// Budgeted FIFO of dirty shadow sources
#[derive(Clone, Debug)]
pub struct ShadowScheduler {
    queue: VecDeque<SourceUid>,
    queued: HashSet<SourceUid>,
    max_updates_per_frame: usize,
    frame: u64,
    stats: SchedulerStats,
}

impl ShadowScheduler {
    pub fn new(max_updates_per_frame: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            max_updates_per_frame,
            frame: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Queue a source for rendering
    ///
    /// Returns false if it was already queued; its position is unchanged.
    pub fn queue_dirty(&mut self, uid: SourceUid) -> bool {
        if !self.queued.insert(uid) {
            return false;
        }
        self.queue.push_back(uid);
        self.stats.peak_queue_len = self.stats.peak_queue_len.max(self.queue.len());
        true
    }

    /// Drop a source from the queue
    pub fn forget(&mut self, uid: SourceUid) -> bool {
        if !self.queued.remove(&uid) {
            return false;
        }
        self.queue.retain(|queued| *queued != uid);
        true
    }

    pub fn is_queued(&self, uid: SourceUid) -> bool {
        self.queued.contains(&uid)
    }

    /// Sources waiting, front first
    pub fn queued(&self) -> impl Iterator<Item = SourceUid> + '_ {
        self.queue.iter().copied()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn max_updates_per_frame(&self) -> usize {
        self.max_updates_per_frame
    }

    pub fn set_max_updates_per_frame(&mut self, budget: usize) {
        if budget == 0 {
            log::warn!("Shadow update budget set to 0, queued sources will not be rendered");
        }
        self.max_updates_per_frame = budget;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Drop everything queued
    pub fn clear(&mut self) {
        self.queue.clear();
        self.queued.clear();
    }

    /// Service up to the budget of queued sources
    ///
    /// A source that cannot get atlas space is logged and dropped for this
    /// frame; it is not re-queued. Command construction errors abort the tick.
    pub fn tick<S: SourceStore + ?Sized>(
        &mut self,
        store: &mut S,
        atlas: &mut ShadowAtlas,
        commands: &GpuCommandQueue,
    ) -> Result<ShadowUpdateReport, CommandError> {
        self.frame += 1;
        let mut report = ShadowUpdateReport {
            frame: self.frame,
            ..Default::default()
        };

        let mut popped = 0;
        while popped < self.max_updates_per_frame {
            let Some(uid) = self.queue.pop_front() else {
                break;
            };
            self.queued.remove(&uid);
            popped += 1;

            let Some(source) = store.source_mut(uid) else {
                log::debug!("Skipping removed shadow source {:?}", uid);
                continue;
            };

            let region = match source.region() {
                Some(region) => region,
                None => match atlas.allocate_resolution(uid, source.resolution()) {
                    Ok(region) => {
                        source.set_region(region, atlas.region_to_uv(&region));
                        region
                    }
                    Err(e) => {
                        log::error!("Failed to find atlas space for shadow source: {}", e);
                        self.stats.total_failures += 1;
                        report.failed.push(uid);
                        continue;
                    }
                },
            };

            let mut command = commands.create_command(CommandType::StoreSource);
            command.push_int(source.slot() as i32)?;
            source.write_to_command(&mut command)?;
            commands.push(command)?;

            source.mark_updated(self.frame);
            self.stats.total_updates += 1;
            report.updated.push(ShadowUpdate {
                uid,
                slot: source.slot(),
                region,
                viewport: atlas.region_to_viewport(&region),
                uv: source.uv(),
                view_projection: *source.view_projection(),
            });
        }

        report.deferred = self.queue.len();
        if report.deferred > 0 {
            self.stats.ticks_over_budget += 1;
            log::debug!(
                "Shadow update budget reached: {} rendered, {} deferred",
                report.updated.len(),
                report.deferred
            );
        }

        Ok(report)
    }
}

//! # umbra_structures - Frame Scheduling Data Structures
//!
//! Small containers shared by the lighting crates:
//! - SlotStorage: lowest-free-index storage with a max-index watermark
//! - RoundRobinQueue: fixed cycle of steps, one step per call

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod slot_storage;
pub mod round_robin;

pub use slot_storage::SlotStorage;
pub use round_robin::{RoundRobinQueue, StepQueue};

pub mod prelude {
    pub use crate::slot_storage::SlotStorage;
    pub use crate::round_robin::RoundRobinQueue;
}

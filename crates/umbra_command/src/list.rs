//! Pending command list
//!
//! Commands are appended by any producer during frame setup and drained
//! oldest-first by the queue. Draining never reorders: later commands may rely
//! on GPU state written by earlier ones.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::GpuCommand;

/// Shared handle to a command list
///
/// One writer per frame tick: producers take the lock for a single push and
/// the queue takes it once per frame to drain.
pub type CommandListHandle = Arc<Mutex<CommandList>>;

/// FIFO of commands waiting for upload
#[derive(Clone, Debug, Default)]
pub struct CommandList {
    commands: VecDeque<GpuCommand>,
}

impl CommandList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty list behind a shared handle
    pub fn shared() -> CommandListHandle {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Append a command to the back of the list
    pub fn add_command(&mut self, command: GpuCommand) {
        self.commands.push_back(command);
    }

    /// Remove and return up to `max_count` commands, oldest first
    pub fn drain(&mut self, max_count: usize) -> Vec<GpuCommand> {
        let count = max_count.min(self.commands.len());
        self.commands.drain(..count).collect()
    }

    /// Number of pending commands
    pub fn num_commands(&self) -> usize {
        self.commands.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every pending command
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Pending commands in submission order
    pub fn iter(&self) -> impl Iterator<Item = &GpuCommand> {
        self.commands.iter()
    }
}

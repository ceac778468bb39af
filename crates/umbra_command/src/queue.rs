//! Per-frame command queue
//!
//! Owns the shared [`CommandList`] and the [`CommandBuffer`] it is encoded
//! into. Once per frame [`GpuCommandQueue::process_queue`] moves up to
//! `commands_per_frame` of the oldest commands into the buffer; the rest wait
//! for the next frame in their original order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::CommandBuffer;
use crate::command::{CommandType, GpuCommand, DEFAULT_COMMAND_WIDTH};
use crate::error::CommandError;
use crate::list::{CommandList, CommandListHandle};

/// Default number of commands transferred per frame
pub const DEFAULT_COMMANDS_PER_FRAME: usize = 1024;

/// Command queue configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandQueueConfig {
    /// Maximum commands encoded per frame
    pub commands_per_frame: usize,

    /// Record stride in words (header included)
    pub command_width: usize,

    /// Value written to unused words
    pub pad_value: f32,
}

impl Default for CommandQueueConfig {
    fn default() -> Self {
        Self {
            commands_per_frame: DEFAULT_COMMANDS_PER_FRAME,
            command_width: DEFAULT_COMMAND_WIDTH,
            pad_value: 0.0,
        }
    }
}

impl CommandQueueConfig {
    /// Check that the buffer layout is usable
    pub fn validate(&self) -> Result<(), CommandError> {
        if self.commands_per_frame == 0 {
            return Err(CommandError::InvalidConfig(
                "commands_per_frame must be at least 1".into(),
            ));
        }
        if self.command_width < 2 {
            return Err(CommandError::InvalidConfig(format!(
                "command_width {} leaves no room for a payload",
                self.command_width
            )));
        }
        Ok(())
    }

    /// Total words in the command buffer
    pub fn buffer_words(&self) -> usize {
        self.commands_per_frame * self.command_width
    }
}

/// Command queue statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandQueueStats {
    /// Commands encoded since creation
    pub total_processed: u64,

    /// Largest backlog seen at the start of a frame
    pub peak_queued: usize,

    /// Frames that left commands queued for later
    pub frames_with_backlog: u64,

    /// Commands discarded for being wider than the stride
    pub dropped_commands: u64,
}

/// Transfers queued commands to the GPU-facing buffer
#[derive(Debug)]
pub struct GpuCommandQueue {
    config: CommandQueueConfig,
    list: CommandListHandle,
    buffer: CommandBuffer,
    num_processed: usize,
    stats: CommandQueueStats,
}

impl GpuCommandQueue {
    /// Create a queue with its own command list
    pub fn new(config: CommandQueueConfig) -> Result<Self, CommandError> {
        Self::with_list(config, CommandList::shared())
    }

    /// Create a queue draining an existing command list
    pub fn with_list(config: CommandQueueConfig, list: CommandListHandle) -> Result<Self, CommandError> {
        config.validate()?;
        let buffer = CommandBuffer::with_pad_value(
            config.commands_per_frame,
            config.command_width,
            config.pad_value,
        );

        Ok(Self {
            config,
            list,
            buffer,
            num_processed: 0,
            stats: CommandQueueStats::default(),
        })
    }

    /// Handle producers use to append commands
    pub fn command_list(&self) -> CommandListHandle {
        Arc::clone(&self.list)
    }

    /// Start a command sized for this queue's stride
    pub fn create_command(&self, command_type: CommandType) -> GpuCommand {
        GpuCommand::with_max_width(command_type, self.config.command_width)
    }

    /// Append a command to the shared list
    ///
    /// Commands wider than the queue stride are rejected here, before they
    /// can reach the buffer.
    pub fn push(&self, command: GpuCommand) -> Result<(), CommandError> {
        if command.len() > self.config.command_width {
            return Err(CommandError::Overflow {
                command_type: command.command_type(),
                width: command.len(),
                max_width: self.config.command_width,
            });
        }
        self.list.lock().add_command(command);
        Ok(())
    }

    /// Encode the oldest queued commands into the buffer
    ///
    /// Returns how many commands were written. A command added straight to
    /// the shared list that is wider than the stride is logged and discarded;
    /// the rest of the batch is encoded in order. On error the buffer is
    /// cleared and reports zero commands so the consumer never sees a partial
    /// batch.
    pub fn process_queue(&mut self) -> Result<usize, CommandError> {
        let (drained, remaining) = {
            let mut list = self.list.lock();
            self.stats.peak_queued = self.stats.peak_queued.max(list.num_commands());
            let batch = list.drain(self.config.commands_per_frame);
            (batch, list.num_commands())
        };

        let stride = self.config.command_width;
        let (batch, wide): (Vec<_>, Vec<_>) = drained.into_iter().partition(|c| c.len() <= stride);
        for command in &wide {
            log::error!(
                "Discarding {:?} command of {} words, queue stride is {}",
                command.command_type(),
                command.len(),
                stride
            );
        }
        self.stats.dropped_commands += wide.len() as u64;

        match self.buffer.encode(&batch) {
            Ok(count) => {
                self.num_processed = count;
                self.stats.total_processed += count as u64;
                if remaining > 0 {
                    self.stats.frames_with_backlog += 1;
                    log::debug!(
                        "Command queue backlog: {} encoded, {} deferred to next frame",
                        count,
                        remaining
                    );
                }
                Ok(count)
            }
            Err(e) => {
                log::error!("Dropping command batch of {}: {}", batch.len(), e);
                self.buffer.clear();
                self.num_processed = 0;
                Err(e)
            }
        }
    }

    /// Commands waiting in the list
    pub fn num_queued_commands(&self) -> usize {
        self.list.lock().num_commands()
    }

    /// Commands written by the last `process_queue` (the `commandCount` input)
    pub fn num_processed_commands(&self) -> usize {
        self.num_processed
    }

    /// Encoded buffer (the `CommandQueue` input)
    pub fn buffer(&self) -> &CommandBuffer {
        &self.buffer
    }

    /// Queue configuration
    pub fn config(&self) -> &CommandQueueConfig {
        &self.config
    }

    /// Queue statistics
    pub fn stats(&self) -> &CommandQueueStats {
        &self.stats
    }

    /// Drop every pending command
    pub fn clear_queue(&self) {
        self.list.lock().clear();
    }

    /// Shader defines describing the protocol
    pub fn defines(&self) -> Vec<(&'static str, u32)> {
        let mut defines: Vec<_> = CommandType::defines().collect();
        defines.push(("GPU_CMD_INT_AS_FLOAT", u32::from(!self.buffer.uses_integer_packing())));
        defines.push(("GPU_CMD_WIDTH", self.config.command_width as u32));
        defines
    }
}

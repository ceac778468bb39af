//! # umbra_command - GPU Command Protocol
//!
//! Moves per-light and per-shadow-source state changes to the GPU as a flat
//! buffer of fixed-stride records instead of many small state-setting calls.
//!
//! ## Wire format
//!
//! ```text
//! word:    0        1 .. n           n+1 .. stride-1
//!        [header | payload words  |  pad value ...   ]   command 0
//!        [header | payload words  |  pad value ...   ]   command 1
//!        ...
//!        [pad value ...                              ]   unused up to commands_per_frame
//! ```
//!
//! Every word is an `f32`. The header holds the [`CommandType`] code and
//! integers are stored as float values. The consumer addresses command `i` at
//! `i * stride` and reads `commandCount` leading records.
//!
//! ## Usage
//!
//! ```ignore
//! let mut queue = GpuCommandQueue::new(CommandQueueConfig::default())?;
//! let list = queue.command_list();
//!
//! let mut cmd = queue.create_command(CommandType::RemoveLight);
//! cmd.push_int(light_slot)?;
//! list.lock().add_command(cmd);
//!
//! // Once per frame
//! let count = queue.process_queue()?;
//! upload(queue.buffer().as_bytes(), count);
//! ```

pub mod error;
pub mod command;
pub mod list;
pub mod buffer;
pub mod queue;

pub use error::CommandError;
pub use command::{CommandType, GpuCommand, DEFAULT_COMMAND_WIDTH, MAX_EXACT_INT};
pub use list::{CommandList, CommandListHandle};
pub use buffer::{CommandBuffer, EncodedCommand};
pub use queue::{CommandQueueConfig, CommandQueueStats, GpuCommandQueue, DEFAULT_COMMANDS_PER_FRAME};

/// Result type for command protocol operations
pub type Result<T> = std::result::Result<T, CommandError>;

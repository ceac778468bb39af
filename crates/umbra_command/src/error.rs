//! Error types for the command protocol

use thiserror::Error;

use crate::command::CommandType;

/// Command protocol errors
///
/// All of these abort construction or encoding of the affected command or
/// batch. A malformed record would shift the addressing of every command
/// behind it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// A command grew past its fixed width
    #[error("{command_type:?} command needs {width} words, max is {max_width}")]
    Overflow {
        command_type: CommandType,
        width: usize,
        max_width: usize,
    },

    /// An integer cannot be represented exactly as a float word
    #[error("Integer {0} cannot be packed into a float word exactly")]
    IntegerPrecision(i64),

    /// More commands were handed to the encoder than the buffer holds
    #[error("Batch of {count} commands exceeds buffer capacity of {capacity}")]
    BatchTooLarge { count: usize, capacity: usize },

    /// Invalid queue configuration
    #[error("Invalid command queue configuration: {0}")]
    InvalidConfig(String),
}

//! Command records
//!
//! A [`GpuCommand`] is built by an ordered series of typed pushes. The first
//! word is always the command type; pushes past the command's maximum width
//! fail instead of truncating.

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// Default maximum width of a command in words (header included)
pub const DEFAULT_COMMAND_WIDTH: usize = 32;

/// Largest integer magnitude a float word stores exactly (2^24)
pub const MAX_EXACT_INT: i64 = 1 << 24;

/// Command type, stored in the header word
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandType {
    /// Never emitted; a zero header marks an unused record
    Invalid = 0,
    /// Write a light record: slot, then the light data
    StoreLight = 1,
    /// Clear a light record: slot
    RemoveLight = 2,
    /// Write a shadow source record: slot, then the source data
    StoreSource = 3,
    /// Clear consecutive shadow source records: first slot, count
    RemoveSources = 4,
}

impl CommandType {
    /// All command types in code order
    pub const ALL: [CommandType; 5] = [
        CommandType::Invalid,
        CommandType::StoreLight,
        CommandType::RemoveLight,
        CommandType::StoreSource,
        CommandType::RemoveSources,
    ];

    /// Numeric code written to the header
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Look up a command type by header code
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Name of the shader define carrying this code
    pub fn define_name(self) -> &'static str {
        match self {
            Self::Invalid => "CMD_invalid",
            Self::StoreLight => "CMD_store_light",
            Self::RemoveLight => "CMD_remove_light",
            Self::StoreSource => "CMD_store_source",
            Self::RemoveSources => "CMD_remove_sources",
        }
    }

    /// Shader defines for every command type
    pub fn defines() -> impl Iterator<Item = (&'static str, u32)> {
        Self::ALL.iter().map(|t| (t.define_name(), t.code()))
    }
}

/// A single command under construction
#[derive(Clone, Debug, PartialEq)]
pub struct GpuCommand {
    command_type: CommandType,
    /// Header followed by payload
    words: Vec<f32>,
    max_width: usize,
}

impl GpuCommand {
    /// Create a command with the default maximum width
    pub fn new(command_type: CommandType) -> Self {
        Self::with_max_width(command_type, DEFAULT_COMMAND_WIDTH)
    }

    /// Create a command limited to `max_width` words including the header
    pub fn with_max_width(command_type: CommandType, max_width: usize) -> Self {
        let max_width = max_width.max(1);
        let mut words = Vec::with_capacity(max_width);
        words.push(command_type.code() as f32);

        Self {
            command_type,
            words,
            max_width,
        }
    }

    /// Append a float word
    pub fn push_float(&mut self, value: f32) -> Result<&mut Self, CommandError> {
        if self.words.len() >= self.max_width {
            return Err(CommandError::Overflow {
                command_type: self.command_type,
                width: self.words.len() + 1,
                max_width: self.max_width,
            });
        }
        self.words.push(value);
        Ok(self)
    }

    /// Append an integer, packed as a float value
    pub fn push_int(&mut self, value: i32) -> Result<&mut Self, CommandError> {
        if i64::from(value).abs() > MAX_EXACT_INT {
            return Err(CommandError::IntegerPrecision(i64::from(value)));
        }
        self.push_float(value as f32)
    }

    /// Append three float words
    pub fn push_vec3(&mut self, value: [f32; 3]) -> Result<&mut Self, CommandError> {
        self.reserve(3)?;
        self.words.extend_from_slice(&value);
        Ok(self)
    }

    /// Append four float words
    pub fn push_vec4(&mut self, value: [f32; 4]) -> Result<&mut Self, CommandError> {
        self.reserve(4)?;
        self.words.extend_from_slice(&value);
        Ok(self)
    }

    /// Append a 4x4 matrix, one row after another
    pub fn push_mat4(&mut self, value: &[[f32; 4]; 4]) -> Result<&mut Self, CommandError> {
        self.reserve(16)?;
        for row in value {
            self.words.extend_from_slice(row);
        }
        Ok(self)
    }

    /// Pad the command to exactly `width` words
    ///
    /// Fails without modifying the command if it is already wider.
    pub fn enforce_width(&mut self, width: usize, pad_value: f32) -> Result<(), CommandError> {
        if self.words.len() > width {
            return Err(CommandError::Overflow {
                command_type: self.command_type,
                width: self.words.len(),
                max_width: width,
            });
        }
        self.words.resize(width, pad_value);
        Ok(())
    }

    /// Write this command into a record of `dest.len()` words, padding the rest
    pub fn write_to(&self, dest: &mut [f32], pad_value: f32) -> Result<(), CommandError> {
        if self.words.len() > dest.len() {
            return Err(CommandError::Overflow {
                command_type: self.command_type,
                width: self.words.len(),
                max_width: dest.len(),
            });
        }
        let (head, tail) = dest.split_at_mut(self.words.len());
        head.copy_from_slice(&self.words);
        tail.fill(pad_value);
        Ok(())
    }

    /// Command type
    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    /// All words, header first
    pub fn words(&self) -> &[f32] {
        &self.words
    }

    /// Words after the header
    pub fn payload(&self) -> &[f32] {
        &self.words[1..]
    }

    /// Current width in words, header included
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Commands always carry a header
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Maximum width in words
    pub fn max_width(&self) -> usize {
        self.max_width
    }

    /// Words left before the command is full
    pub fn remaining(&self) -> usize {
        self.max_width - self.words.len()
    }

    fn reserve(&self, count: usize) -> Result<(), CommandError> {
        if self.words.len() + count > self.max_width {
            return Err(CommandError::Overflow {
                command_type: self.command_type,
                width: self.words.len() + count,
                max_width: self.max_width,
            });
        }
        Ok(())
    }
}

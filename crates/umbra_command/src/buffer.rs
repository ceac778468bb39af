//! Fixed-stride command buffer
//!
//! CPU-side mirror of the `CommandQueue` GPU buffer. Sized once for
//! `commands_per_frame * stride` words and rewritten in full every frame, so
//! the consumer can read the whole region without bounds checks.

use crate::command::{CommandType, GpuCommand};
use crate::error::CommandError;

/// A decoded record view
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EncodedCommand<'a> {
    /// Type read back from the header word
    pub command_type: Option<CommandType>,
    /// Payload words, padding included
    pub payload: &'a [f32],
}

/// Flat buffer of fixed-stride command records
#[derive(Clone, Debug)]
pub struct CommandBuffer {
    data: Vec<f32>,
    stride: usize,
    commands_per_frame: usize,
    pad_value: f32,
    num_encoded: usize,
}

impl CommandBuffer {
    /// Create a buffer for `commands_per_frame` records of `stride` words
    pub fn new(commands_per_frame: usize, stride: usize) -> Self {
        Self::with_pad_value(commands_per_frame, stride, 0.0)
    }

    /// Create a buffer whose unused words hold `pad_value`
    pub fn with_pad_value(commands_per_frame: usize, stride: usize, pad_value: f32) -> Self {
        let stride = stride.max(1);
        let words = commands_per_frame * stride;
        log::debug!("Allocating command buffer of {} words", words);

        Self {
            data: vec![pad_value; words],
            stride,
            commands_per_frame,
            pad_value,
            num_encoded: 0,
        }
    }

    /// Encode a batch of commands, replacing the previous frame's contents
    ///
    /// Commands are written in submission order at `index * stride`. The
    /// buffer is left untouched if any command is wider than the stride.
    pub fn encode(&mut self, commands: &[GpuCommand]) -> Result<usize, CommandError> {
        if commands.len() > self.commands_per_frame {
            return Err(CommandError::BatchTooLarge {
                count: commands.len(),
                capacity: self.commands_per_frame,
            });
        }

        if let Some(wide) = commands.iter().find(|c| c.len() > self.stride) {
            return Err(CommandError::Overflow {
                command_type: wide.command_type(),
                width: wide.len(),
                max_width: self.stride,
            });
        }

        for (command, record) in commands.iter().zip(self.data.chunks_exact_mut(self.stride)) {
            command.write_to(record, self.pad_value)?;
        }
        self.data[commands.len() * self.stride..].fill(self.pad_value);
        self.num_encoded = commands.len();

        Ok(self.num_encoded)
    }

    /// Reset to an all-padding buffer with no valid records
    pub fn clear(&mut self) {
        self.data.fill(self.pad_value);
        self.num_encoded = 0;
    }

    /// Number of valid records written by the last `encode`
    pub fn num_encoded(&self) -> usize {
        self.num_encoded
    }

    /// Record width in words
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Maximum records per frame
    pub fn commands_per_frame(&self) -> usize {
        self.commands_per_frame
    }

    /// Value stored in unused words
    pub fn pad_value(&self) -> f32 {
        self.pad_value
    }

    /// Whole buffer as words
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Whole buffer as bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Size of the whole buffer in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len() * core::mem::size_of::<f32>()
    }

    /// Integers are stored as float values, not bit patterns
    pub fn uses_integer_packing(&self) -> bool {
        false
    }

    /// Raw words of a valid record
    pub fn record(&self, index: usize) -> Option<&[f32]> {
        if index >= self.num_encoded {
            return None;
        }
        let start = index * self.stride;
        Some(&self.data[start..start + self.stride])
    }

    /// Decode a valid record
    pub fn decode(&self, index: usize) -> Option<EncodedCommand<'_>> {
        let record = self.record(index)?;
        Some(EncodedCommand {
            command_type: CommandType::from_code(record[0] as u32),
            payload: &record[1..],
        })
    }

    /// Decode every valid record in order
    pub fn records(&self) -> impl Iterator<Item = EncodedCommand<'_>> {
        (0..self.num_encoded).filter_map(move |i| self.decode(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_light(slot: i32, value: f32) -> GpuCommand {
        let mut cmd = GpuCommand::with_max_width(CommandType::StoreLight, 8);
        cmd.push_int(slot).unwrap().push_float(value).unwrap();
        cmd
    }

    #[test]
    fn test_encode_layout() {
        let mut buffer = CommandBuffer::new(4, 8);
        let commands = vec![store_light(0, 1.5), store_light(3, 2.5)];

        assert_eq!(buffer.encode(&commands).unwrap(), 2);
        assert_eq!(buffer.num_encoded(), 2);
        assert_eq!(buffer.data().len(), 32);

        assert_eq!(&buffer.data()[0..3], &[1.0, 0.0, 1.5]);
        assert_eq!(&buffer.data()[8..11], &[1.0, 3.0, 2.5]);
        assert!(buffer.data()[16..].iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_encode_clears_previous_frame() {
        let mut buffer = CommandBuffer::new(4, 8);
        buffer
            .encode(&[store_light(0, 1.0), store_light(1, 1.0), store_light(2, 1.0)])
            .unwrap();
        buffer.encode(&[store_light(9, 4.0)]).unwrap();

        assert_eq!(buffer.num_encoded(), 1);
        assert!(buffer.data()[8..].iter().all(|&w| w == 0.0));
        assert!(buffer.record(1).is_none());
    }

    #[test]
    fn test_custom_pad_value() {
        let mut buffer = CommandBuffer::with_pad_value(2, 4, -1.0);
        buffer.encode(&[store_light(1, 0.25)]).unwrap();

        assert_eq!(buffer.data(), &[1.0, 1.0, 0.25, -1.0, -1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_wide_command_rejected() {
        let mut buffer = CommandBuffer::new(2, 2);
        buffer.encode(&[]).unwrap();

        let err = buffer.encode(&[store_light(0, 1.0)]).unwrap_err();
        assert!(matches!(err, CommandError::Overflow { width: 3, max_width: 2, .. }));
        assert_eq!(buffer.num_encoded(), 0);
    }

    #[test]
    fn test_batch_too_large() {
        let mut buffer = CommandBuffer::new(1, 8);
        let err = buffer
            .encode(&[store_light(0, 0.0), store_light(1, 0.0)])
            .unwrap_err();
        assert_eq!(err, CommandError::BatchTooLarge { count: 2, capacity: 1 });
    }

    #[test]
    fn test_decode() {
        let mut buffer = CommandBuffer::new(4, 8);
        buffer.encode(&[store_light(5, 0.75)]).unwrap();

        let decoded = buffer.decode(0).unwrap();
        assert_eq!(decoded.command_type, Some(CommandType::StoreLight));
        assert_eq!(&decoded.payload[..2], &[5.0, 0.75]);
        assert_eq!(decoded.payload.len(), 7);
        assert_eq!(buffer.records().count(), 1);
    }

    #[test]
    fn test_as_bytes() {
        let buffer = CommandBuffer::new(16, 32);
        assert_eq!(buffer.as_bytes().len(), 16 * 32 * 4);
        assert_eq!(buffer.size_bytes(), 16 * 32 * 4);
    }
}

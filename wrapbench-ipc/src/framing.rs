//! Length-Prefixed Frames
//!
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  | rkyv payload     |
//! +----------------+------------------+
//! ```
//!
//! A clean EOF before a length prefix is `EndOfStream`; an EOF inside a
//! frame is an I/O error.

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use thiserror::Error;

/// Maximum frame size (16 MiB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const IO_BUFFER: usize = 64 * 1024;

/// Errors from frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying pipe failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// rkyv could not serialize the message
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Payload failed validation
    #[error("invalid payload: {0}")]
    Validation(String),

    /// Declared or produced frame exceeds [`MAX_FRAME_SIZE`]
    #[error("frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Limit
        max: usize,
    },

    /// Length prefix of zero
    #[error("empty frame")]
    EmptyFrame,

    /// Peer closed the stream between frames
    #[error("end of stream")]
    EndOfStream,
}

/// Serialize `message` and write it as one frame
pub fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize<AllocSerializer<256>>,
{
    let bytes =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Serialization(e.to_string()))?;

    if bytes.len() > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and deserialize it as `T`
pub fn read_frame<R, T>(reader: &mut R) -> Result<T, FrameError>
where
    R: Read,
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(FrameError::EndOfStream),
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len == 0 {
        return Err(FrameError::EmptyFrame);
    }
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = rkyv::AlignedVec::with_capacity(len);
    buf.resize(len, 0);
    reader.read_exact(&mut buf)?;

    let archived = rkyv::check_archived_root::<T>(&buf)
        .map_err(|e| FrameError::Validation(e.to_string()))?;

    Ok(archived
        .deserialize(&mut Infallible)
        .unwrap_or_else(|never| match never {}))
}

/// Buffered frame writer
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(IO_BUFFER, writer),
        }
    }

    /// Write and flush one message
    pub fn write<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        write_frame(&mut self.writer, message)
    }
}

/// Buffered frame reader
pub struct FrameReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap `reader`
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(IO_BUFFER, reader),
        }
    }

    /// Read one message
    pub fn read<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        read_frame(&mut self.reader)
    }

    /// Bytes already buffered; a `poll(2)` on the fd would not see them
    pub fn has_buffered_data(&self) -> bool {
        !self.reader.buffer().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BenchmarkConfig, Sample, SampleBatch, SupervisorCommand, WorkerMessage};
    use std::io::Cursor;

    fn encode<T: Serialize<AllocSerializer<256>>>(messages: &[T]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            for msg in messages {
                writer.write(msg).unwrap();
            }
        }
        buffer
    }

    #[test]
    fn test_command_stream() {
        let commands = vec![
            SupervisorCommand::Ping,
            SupervisorCommand::Run {
                job_id: "sort@n=1000".to_string(),
                config: BenchmarkConfig::default(),
            },
            SupervisorCommand::Shutdown,
        ];

        let mut reader = FrameReader::new(Cursor::new(encode(&commands)));
        for expected in &commands {
            let decoded: SupervisorCommand = reader.read().unwrap();
            assert_eq!(expected, &decoded);
        }
        assert!(matches!(
            reader.read::<SupervisorCommand>(),
            Err(FrameError::EndOfStream)
        ));
    }

    #[test]
    fn test_sample_batch_frame() {
        let msg = WorkerMessage::SampleBatch(SampleBatch {
            job_id: "parse".to_string(),
            sequence: 0,
            samples: vec![Sample::new(41.5, 16, 0, 0, 120); 3],
        });

        let mut reader = FrameReader::new(Cursor::new(encode(&[msg.clone()])));
        let decoded: WorkerMessage = reader.read().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_length_prefix_is_little_endian() {
        let buffer = encode(&[SupervisorCommand::Ping]);
        let len = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        assert_eq!(len, buffer.len() - 4);
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let mut buffer = ((MAX_FRAME_SIZE + 1) as u32).to_le_bytes().to_vec();
        buffer.extend_from_slice(&[0u8; 16]);

        let mut reader = FrameReader::new(Cursor::new(buffer));
        assert!(matches!(
            reader.read::<SupervisorCommand>(),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_zero_length_rejected() {
        let mut reader = FrameReader::new(Cursor::new(vec![0u8; 4]));
        assert!(matches!(
            reader.read::<SupervisorCommand>(),
            Err(FrameError::EmptyFrame)
        ));
    }

    #[test]
    fn test_truncated_payload_is_io_error() {
        let mut buffer = encode(&[SupervisorCommand::Shutdown]);
        buffer.truncate(buffer.len() - 1);

        let mut reader = FrameReader::new(Cursor::new(buffer));
        assert!(matches!(
            reader.read::<SupervisorCommand>(),
            Err(FrameError::Io(_))
        ));
    }
}

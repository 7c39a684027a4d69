//! Little-endian frames exchanged between a proxy and its companion.
//!
//! Every frame starts with a one-byte tag:
//!
//! - request: `function: u32`, `len: u32`, payload
//! - reply: `status: i32`, `len: u32`, payload
//! - callback: `kind: u8`, `len: u32`, payload
//!
//! Payloads are sequences of Real (`f64`), Integer (`i32`), Boolean (`i32`,
//! zero or nonzero), and String (`u32` length then UTF-8 bytes) values.
//! Arrays carry a `u32` element count.

use std::io::{self, Cursor, Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use tandem_core::{ChannelError, ValueRef};
use thiserror::Error;

use crate::function::{CallbackKind, Function};

/// Largest payload either side accepts.
pub const MAX_PAYLOAD: u32 = 64 * 1024 * 1024;

const TAG_REQUEST: u8 = 1;
const TAG_REPLY: u8 = 2;
const TAG_CALLBACK: u8 = 3;

/// A frame or payload that does not follow the protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o failed")]
    Io(#[from] io::Error),

    #[error("unknown frame tag {0}")]
    UnknownTag(u8),

    #[error("unknown function {0}")]
    UnknownFunction(u32),

    #[error("unknown callback kind {0}")]
    UnknownCallback(u8),

    #[error("payload of {len} bytes exceeds the limit")]
    TooLarge { len: u32 },

    #[error("payload ended early while reading {what}")]
    Truncated { what: &'static str },

    #[error("{count} unread bytes after the payload")]
    TrailingBytes { count: usize },

    #[error("invalid {what}: {raw}")]
    InvalidValue { what: &'static str, raw: i64 },

    #[error("string is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("expected {expected} values, got {actual}")]
    Count { expected: usize, actual: usize },

    #[error("unexpected {0} frame")]
    Unexpected(&'static str),
}

impl ProtocolError {
    /// True if the peer closed the channel at a frame boundary.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl From<ProtocolError> for ChannelError {
    fn from(err: ProtocolError) -> Self {
        match err {
            err if err.is_eof() => ChannelError::Closed,
            ProtocolError::Io(err) => ChannelError::Io(err),
            err => ChannelError::Malformed(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request { function: Function, payload: Vec<u8> },
    Reply { status: i32, payload: Vec<u8> },
    Callback { kind: CallbackKind, payload: Vec<u8> },
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Reply { .. } => "reply",
            Self::Callback { .. } => "callback",
        }
    }
}

/// Reads one frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Io`] with `UnexpectedEof` if the stream ends
/// before the frame starts, and a protocol error if it is malformed.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, ProtocolError> {
    let tag = reader.read_u8()?;
    match tag {
        TAG_REQUEST => {
            let raw = reader.read_u32::<LittleEndian>()?;
            let function = Function::from_raw(raw).ok_or(ProtocolError::UnknownFunction(raw))?;
            let payload = read_payload(reader)?;
            Ok(Frame::Request { function, payload })
        }
        TAG_REPLY => {
            let status = reader.read_i32::<LittleEndian>()?;
            let payload = read_payload(reader)?;
            Ok(Frame::Reply { status, payload })
        }
        TAG_CALLBACK => {
            let raw = reader.read_u8()?;
            let kind = CallbackKind::from_raw(raw).ok_or(ProtocolError::UnknownCallback(raw))?;
            let payload = read_payload(reader)?;
            Ok(Frame::Callback { kind, payload })
        }
        tag => Err(ProtocolError::UnknownTag(tag)),
    }
}

fn read_payload<R: Read>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let len = reader.read_u32::<LittleEndian>()?;
    if len > MAX_PAYLOAD {
        return Err(ProtocolError::TooLarge { len });
    }
    let mut payload = vec![0; len as usize];
    reader.read_exact(&mut payload).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::Truncated { what: "frame payload" },
        _ => err.into(),
    })?;
    Ok(payload)
}

/// Writes one frame and flushes the writer.
///
/// # Errors
///
/// Returns an error if the payload is too large or the write fails.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<(), ProtocolError> {
    let payload = match frame {
        Frame::Request { payload, .. } | Frame::Reply { payload, .. } | Frame::Callback { payload, .. } => payload,
    };
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    if len > MAX_PAYLOAD {
        return Err(ProtocolError::TooLarge { len });
    }

    match frame {
        Frame::Request { function, .. } => {
            writer.write_u8(TAG_REQUEST)?;
            writer.write_u32::<LittleEndian>(function.to_raw())?;
        }
        Frame::Reply { status, .. } => {
            writer.write_u8(TAG_REPLY)?;
            writer.write_i32::<LittleEndian>(*status)?;
        }
        Frame::Callback { kind, .. } => {
            writer.write_u8(TAG_CALLBACK)?;
            writer.write_u8(kind.to_raw())?;
        }
    }
    writer.write_u32::<LittleEndian>(len)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Builds a payload.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the bytes written so far.
    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.put(4, |buf| LittleEndian::write_u32(buf, value))
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.put(8, |buf| LittleEndian::write_u64(buf, value))
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.put(4, |buf| LittleEndian::write_i32(buf, value))
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.put(8, |buf| LittleEndian::write_f64(buf, value))
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.i32(i32::from(value))
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.count(value.len());
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn option_f64(&mut self, value: Option<f64>) -> &mut Self {
        self.bool(value.is_some());
        self.f64(value.unwrap_or_default())
    }

    pub fn refs(&mut self, refs: &[ValueRef]) -> &mut Self {
        self.count(refs.len());
        for vr in refs {
            self.u32(vr.0);
        }
        self
    }

    pub fn reals(&mut self, values: &[f64]) -> &mut Self {
        self.count(values.len());
        for &value in values {
            self.f64(value);
        }
        self
    }

    pub fn integers(&mut self, values: &[i32]) -> &mut Self {
        self.count(values.len());
        for &value in values {
            self.i32(value);
        }
        self
    }

    pub fn booleans(&mut self, values: &[bool]) -> &mut Self {
        self.count(values.len());
        for &value in values {
            self.bool(value);
        }
        self
    }

    pub fn strings(&mut self, values: &[String]) -> &mut Self {
        self.count(values.len());
        for value in values {
            self.str(value);
        }
        self
    }

    // Payloads are capped far below `u32::MAX`.
    #[allow(clippy::cast_possible_truncation)]
    fn count(&mut self, len: usize) {
        self.u32(len as u32);
    }

    /// Appends `size` bytes filled in by `write`.
    fn put(&mut self, size: usize, write: impl FnOnce(&mut [u8])) -> &mut Self {
        let start = self.buf.len();
        self.buf.resize(start + size, 0);
        write(&mut self.buf[start..]);
        self
    }
}

/// Reads a payload front to back.
pub struct Decoder<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Decoder<'a> {
    #[must_use]
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(payload),
        }
    }

    /// Checks that the whole payload was read.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TrailingBytes`] otherwise.
    pub fn finish(self) -> Result<(), ProtocolError> {
        let len = self.cursor.get_ref().len();
        let position = usize::try_from(self.cursor.position()).unwrap_or(len);
        match len.saturating_sub(position) {
            0 => Ok(()),
            count => Err(ProtocolError::TrailingBytes { count }),
        }
    }

    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        len.saturating_sub(usize::try_from(self.cursor.position()).unwrap_or(len))
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        self.cursor.read_u8().map_err(|_| truncated("u8"))
    }

    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        self.cursor.read_u32::<LittleEndian>().map_err(|_| truncated("u32"))
    }

    pub fn u64(&mut self) -> Result<u64, ProtocolError> {
        self.cursor.read_u64::<LittleEndian>().map_err(|_| truncated("u64"))
    }

    pub fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.cursor.read_i32::<LittleEndian>().map_err(|_| truncated("Integer"))
    }

    pub fn f64(&mut self) -> Result<f64, ProtocolError> {
        self.cursor.read_f64::<LittleEndian>().map_err(|_| truncated("Real"))
    }

    pub fn bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.i32()? != 0)
    }

    pub fn string(&mut self) -> Result<String, ProtocolError> {
        let len = self.count(1)?;
        let mut bytes = vec![0; len];
        self.cursor.read_exact(&mut bytes).map_err(|_| truncated("String"))?;
        Ok(String::from_utf8(bytes)?)
    }

    pub fn option_f64(&mut self) -> Result<Option<f64>, ProtocolError> {
        let present = self.bool()?;
        let value = self.f64()?;
        Ok(present.then_some(value))
    }

    pub fn refs(&mut self) -> Result<Vec<ValueRef>, ProtocolError> {
        let len = self.count(4)?;
        (0..len).map(|_| self.u32().map(ValueRef)).collect()
    }

    pub fn reals(&mut self) -> Result<Vec<f64>, ProtocolError> {
        let len = self.count(8)?;
        (0..len).map(|_| self.f64()).collect()
    }

    pub fn integers(&mut self) -> Result<Vec<i32>, ProtocolError> {
        let len = self.count(4)?;
        (0..len).map(|_| self.i32()).collect()
    }

    pub fn booleans(&mut self) -> Result<Vec<bool>, ProtocolError> {
        let len = self.count(4)?;
        (0..len).map(|_| self.bool()).collect()
    }

    pub fn strings(&mut self) -> Result<Vec<String>, ProtocolError> {
        let len = self.count(4)?;
        (0..len).map(|_| self.string()).collect()
    }

    /// Reads the length of an array the peer asks to have filled.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidValue`] if a reply carrying that many
    /// `element_size` values would not fit in one frame.
    pub fn requested_len(&mut self, element_size: usize) -> Result<usize, ProtocolError> {
        let raw = self.u32()?;
        let len = raw as usize;
        // The reply starts with its own `u32` count.
        if len.saturating_mul(element_size) > MAX_PAYLOAD as usize - 4 {
            return Err(ProtocolError::InvalidValue {
                what: "array length",
                raw: i64::from(raw),
            });
        }
        Ok(len)
    }

    /// Reads an element count, rejecting counts the payload cannot hold.
    fn count(&mut self, element_size: usize) -> Result<usize, ProtocolError> {
        let len = self.u32()? as usize;
        if len.saturating_mul(element_size) > self.remaining() {
            return Err(truncated("array"));
        }
        Ok(len)
    }
}

fn truncated(what: &'static str) -> ProtocolError {
    ProtocolError::Truncated { what }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_survive_the_wire() {
        let frames = [
            Frame::Request {
                function: Function::DoStep,
                payload: Encoder::new().f64(0.5).f64(0.1).bool(true).finish(),
            },
            Frame::Reply {
                status: -1,
                payload: Encoder::new().str("no such variable").finish(),
            },
            Frame::Callback {
                kind: CallbackKind::StepFinished,
                payload: Vec::new(),
            },
        ];

        let mut wire = Vec::new();
        for frame in &frames {
            write_frame(&mut wire, frame).unwrap();
        }
        assert_eq!(&wire[..5], [1, 16, 0, 0, 0]);

        let mut reader = wire.as_slice();
        for frame in &frames {
            assert_eq!(&read_frame(&mut reader).unwrap(), frame);
        }
        assert!(read_frame(&mut reader).unwrap_err().is_eof());
    }

    #[test]
    fn payload_values_are_little_endian() {
        let payload = Encoder::new()
            .refs(&[ValueRef(7)])
            .booleans(&[true, false])
            .str("ok")
            .option_f64(None)
            .finish();

        assert_eq!(&payload[..8], [1, 0, 0, 0, 7, 0, 0, 0]);
        let mut decoder = Decoder::new(&payload);
        assert_eq!(decoder.refs().unwrap(), [ValueRef(7)]);
        assert_eq!(decoder.booleans().unwrap(), [true, false]);
        assert_eq!(decoder.string().unwrap(), "ok");
        assert_eq!(decoder.option_f64().unwrap(), None);
        decoder.finish().unwrap();
    }

    #[test]
    fn malformed_frames_are_rejected() {
        let mut unknown_tag: &[u8] = &[9, 0, 0, 0, 0];
        assert!(matches!(read_frame(&mut unknown_tag), Err(ProtocolError::UnknownTag(9))));

        let mut huge: Vec<u8> = vec![2, 0, 0, 0, 0];
        huge.extend_from_slice(&(MAX_PAYLOAD + 1).to_le_bytes());
        assert!(matches!(read_frame(&mut huge.as_slice()), Err(ProtocolError::TooLarge { .. })));

        let mut short: &[u8] = &[2, 0, 0, 0, 0, 8, 0, 0, 0, 1, 2];
        assert!(matches!(read_frame(&mut short), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn decoder_rejects_impossible_counts_and_leftovers() {
        let payload = Encoder::new().u32(1_000).finish();
        assert!(matches!(Decoder::new(&payload).reals(), Err(ProtocolError::Truncated { .. })));

        let payload = Encoder::new().f64(1.0).u8(0).finish();
        let mut decoder = Decoder::new(&payload);
        decoder.f64().unwrap();
        assert!(matches!(decoder.finish(), Err(ProtocolError::TrailingBytes { count: 1 })));
    }

    #[test]
    fn requested_lengths_must_fit_in_a_reply() {
        let payload = Encoder::new().u32(3).finish();
        assert_eq!(Decoder::new(&payload).requested_len(8).unwrap(), 3);

        let largest = (MAX_PAYLOAD - 4) / 8;
        let payload = Encoder::new().u32(largest).finish();
        assert_eq!(Decoder::new(&payload).requested_len(8).unwrap(), largest as usize);

        let payload = Encoder::new().u32(largest + 1).finish();
        assert!(matches!(
            Decoder::new(&payload).requested_len(8),
            Err(ProtocolError::InvalidValue { what: "array length", .. })
        ));

        let payload = Encoder::new().u32(u32::MAX).finish();
        let err = Decoder::new(&payload).requested_len(8).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidValue { raw, .. } if raw == i64::from(u32::MAX)));
    }

    #[test]
    fn encoder_writes_little_endian_scalars() {
        let payload = Encoder::new().u32(0x0102_0304).i32(-2).u64(1).f64(1.0).finish();

        assert_eq!(&payload[..4], [4, 3, 2, 1]);
        assert_eq!(&payload[4..8], [0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(&payload[8..16], [1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&payload[16..], 1.0_f64.to_le_bytes());
    }

    #[test]
    fn eof_maps_to_a_closed_channel() {
        let mut empty: &[u8] = &[];
        let eof = read_frame(&mut empty).unwrap_err();
        assert!(matches!(ChannelError::from(eof), ChannelError::Closed));

        let malformed = ChannelError::from(ProtocolError::UnknownTag(0));
        assert!(matches!(malformed, ChannelError::Malformed(_)));
    }
}

// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Tri-mode binary serialization.
//!
//! Every persisted structure is described by a single schema function that is
//! generic over [`Serializer`] and runs in three modes: [`Measure`] computes
//! the exact encoded size, [`Writer`] fills a pre-sized buffer, and [`Reader`]
//! decodes back into the in-memory model. Because all three modes execute the
//! same code path, measured sizes, written bytes and read fields can never
//! drift apart.
//!
//! The encoding is not self-describing: fixed-width native-endian scalars,
//! length-prefixed strings and counted slices, in schema order.

use std::{
    error::Error,
    fmt,
    hash::BuildHasher,
    mem,
    str::Utf8Error,
    sync::atomic::{AtomicU64, Ordering},
};

use bytemuck::Pod;

/// Maximum encoded string payload, including the trailing NUL byte.
///
/// The length prefix is a `u16`; longer strings are silently truncated to keep
/// the wire format stable. Truncation trips a debug assertion.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Error type for serialization and deserialization failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SerializeError {
    /// An operation would read or write past the end of the buffer.
    BufferOverrun {
        position: usize,
        requested: usize,
        size: usize,
    },
    /// A raw `u32` did not correspond to any variant of the named enum, or
    /// carried bits outside the named bitmask.
    InvalidEnumValue {
        type_name: &'static str,
        value: u32,
    },
    /// An encoded string did not end with the mandatory NUL byte.
    MissingNulTerminator,
    /// An encoded string was not valid UTF-8.
    InvalidUtf8(Utf8Error),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferOverrun {
                position,
                requested,
                size,
            } => write!(
                f,
                "buffer overrun: {} bytes requested at position {} in a buffer of {} bytes",
                requested, position, size,
            ),
            Self::InvalidEnumValue { type_name, value } => {
                write!(f, "value {:#x} is not a valid `{}`", value, type_name)
            }
            Self::MissingNulTerminator => {
                write!(f, "encoded string is missing its NUL terminator")
            }
            Self::InvalidUtf8(err) => write!(f, "encoded string is not valid UTF-8: {}", err),
        }
    }
}

impl Error for SerializeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidUtf8(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Utf8Error> for SerializeError {
    fn from(err: Utf8Error) -> Self {
        Self::InvalidUtf8(err)
    }
}

/// Types stored on the wire as a raw `u32` with validated decoding.
///
/// Implemented by the `wire_enum!` and `wire_flags!` macros.
pub trait WireEnum: Copy {
    /// Name used in error messages.
    const TYPE_NAME: &'static str;

    fn to_raw(self) -> u32;

    /// Returns `None` for raw values that do not map to a valid instance.
    fn from_raw(value: u32) -> Option<Self>
    where
        Self: Sized;
}

/// Distinguishes the three serializer modes where a schema needs to branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerializerMode {
    Measure,
    Write,
    Read,
}

/// The common interface of [`Measure`], [`Writer`] and [`Reader`].
///
/// Schema functions take `&mut` references to every field in all three modes;
/// only `Read` actually mutates the model.
pub trait Serializer {
    const MODE: SerializerMode;

    /// Serializes a plain-old-data value as its native byte representation.
    fn pod<T: Pod>(&mut self, value: &mut T) -> Result<(), SerializeError>;

    /// Serializes a string with a `u16` length prefix that counts the string
    /// bytes plus one trailing NUL. A prefix of zero encodes the empty string
    /// with no payload.
    fn string(&mut self, value: &mut String) -> Result<(), SerializeError>;

    /// Serializes an uncounted run of bytes extending to the end of the
    /// buffer. Must be the last operation of a schema.
    fn tail(&mut self, value: &mut Vec<u8>) -> Result<(), SerializeError>;

    /// Bytes measured, written or consumed so far.
    fn position(&self) -> usize;

    /// Serializes an enum or bitmask as a raw `u32`, validating on read.
    fn wire_enum<E: WireEnum>(&mut self, value: &mut E) -> Result<(), SerializeError> {
        let mut raw = value.to_raw();
        self.pod(&mut raw)?;

        if Self::MODE == SerializerMode::Read {
            *value = E::from_raw(raw).ok_or(SerializeError::InvalidEnumValue {
                type_name: E::TYPE_NAME,
                value: raw,
            })?;
        }

        Ok(())
    }

    /// Serializes a `bool` as a single byte.
    fn boolean(&mut self, value: &mut bool) -> Result<(), SerializeError> {
        let mut raw = u8::from(*value);
        self.pod(&mut raw)?;

        if Self::MODE == SerializerMode::Read {
            *value = raw != 0;
        }

        Ok(())
    }

    /// Serializes a `u32` element count followed by each element in order.
    ///
    /// On read, the vector is resized to the decoded count with default
    /// elements before `each` runs over it.
    fn slice<T: Default, F>(&mut self, values: &mut Vec<T>, mut each: F) -> Result<(), SerializeError>
    where
        F: FnMut(&mut Self, &mut T) -> Result<(), SerializeError>,
    {
        let mut count = values.len() as u32;
        self.pod(&mut count)?;

        if Self::MODE == SerializerMode::Read {
            values.clear();
            values.resize_with(count as usize, T::default);
        }

        for value in values.iter_mut() {
            each(self, value)?;
        }

        Ok(())
    }

    /// Serializes an `Option<String>`, encoding `None` as the empty string.
    fn opt_string(&mut self, value: &mut Option<String>) -> Result<(), SerializeError> {
        let mut raw = value.clone().unwrap_or_default();
        self.string(&mut raw)?;

        if Self::MODE == SerializerMode::Read {
            *value = (!raw.is_empty()).then_some(raw);
        }

        Ok(())
    }
}

/// Returns the encoded size of a string: length prefix plus payload.
#[inline]
fn encoded_string_len(value: &str) -> usize {
    if value.is_empty() {
        mem::size_of::<u16>()
    } else {
        let payload = value.len().min(MAX_STRING_LEN - 1) + 1;
        mem::size_of::<u16>() + payload
    }
}

/// Measuring serializer: counts bytes without touching any buffer.
#[derive(Clone, Debug, Default)]
pub struct Measure {
    size: usize,
}

impl Measure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bytes the write pass will produce.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Serializer for Measure {
    const MODE: SerializerMode = SerializerMode::Measure;

    fn pod<T: Pod>(&mut self, _value: &mut T) -> Result<(), SerializeError> {
        self.size += mem::size_of::<T>();
        Ok(())
    }

    fn string(&mut self, value: &mut String) -> Result<(), SerializeError> {
        self.size += encoded_string_len(value);
        Ok(())
    }

    fn tail(&mut self, value: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.size += value.len();
        Ok(())
    }

    fn position(&self) -> usize {
        self.size
    }
}

/// Writing serializer over a pre-sized buffer.
///
/// The buffer is expected to be exactly the size reported by [`Measure`] for
/// the same schema; running past the end is an error.
#[derive(Debug)]
pub struct Writer<'a> {
    buffer: &'a mut [u8],
    position: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Whether the write cursor has reached the end of the buffer.
    pub fn is_ended(&self) -> bool {
        self.position == self.buffer.len()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SerializeError> {
        let end = self.position + bytes.len();

        if end > self.buffer.len() {
            return Err(SerializeError::BufferOverrun {
                position: self.position,
                requested: bytes.len(),
                size: self.buffer.len(),
            });
        }

        self.buffer[self.position..end].copy_from_slice(bytes);
        self.position = end;

        Ok(())
    }
}

impl Serializer for Writer<'_> {
    const MODE: SerializerMode = SerializerMode::Write;

    fn pod<T: Pod>(&mut self, value: &mut T) -> Result<(), SerializeError> {
        self.write_bytes(bytemuck::bytes_of(value))
    }

    fn string(&mut self, value: &mut String) -> Result<(), SerializeError> {
        if value.is_empty() {
            return self.pod(&mut 0u16);
        }

        let payload_len = value.len().min(MAX_STRING_LEN - 1);
        debug_assert_eq!(payload_len, value.len(), "string truncated on write");

        self.pod(&mut ((payload_len + 1) as u16))?;
        self.write_bytes(&value.as_bytes()[..payload_len])?;
        self.write_bytes(&[0u8])
    }

    fn tail(&mut self, value: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.write_bytes(value)
    }

    fn position(&self) -> usize {
        self.position
    }
}

/// Reading serializer over a byte slice.
///
/// All reads are bounds-checked; truncated or corrupt input yields an error
/// rather than garbage data.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Whether all input bytes have been consumed.
    pub fn is_ended(&self) -> bool {
        self.position == self.data.len()
    }

    /// Bytes remaining after the read cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Consumes `len` raw bytes. Used by index parsing where the layout is
    /// array-based rather than schema-based.
    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], SerializeError> {
        self.read_bytes(len)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], SerializeError> {
        let end = self.position.checked_add(len).filter(|&end| end <= self.data.len()).ok_or(
            SerializeError::BufferOverrun {
                position: self.position,
                requested: len,
                size: self.data.len(),
            },
        )?;

        let bytes = &self.data[self.position..end];
        self.position = end;

        Ok(bytes)
    }
}

impl Serializer for Reader<'_> {
    const MODE: SerializerMode = SerializerMode::Read;

    fn pod<T: Pod>(&mut self, value: &mut T) -> Result<(), SerializeError> {
        let bytes = self.read_bytes(mem::size_of::<T>())?;
        *value = bytemuck::pod_read_unaligned(bytes);
        Ok(())
    }

    fn string(&mut self, value: &mut String) -> Result<(), SerializeError> {
        let mut len = 0u16;
        self.pod(&mut len)?;

        if len == 0 {
            value.clear();
            return Ok(());
        }

        let bytes = self.read_bytes(len as usize)?;
        let (payload, terminator) = bytes.split_at(bytes.len() - 1);

        if terminator != [0] {
            return Err(SerializeError::MissingNulTerminator);
        }

        value.clear();
        value.push_str(std::str::from_utf8(payload)?);

        Ok(())
    }

    fn tail(&mut self, value: &mut Vec<u8>) -> Result<(), SerializeError> {
        let bytes = self.read_bytes(self.remaining())?;
        value.clear();
        value.extend_from_slice(bytes);
        Ok(())
    }

    fn position(&self) -> usize {
        self.position
    }
}

/// An immutable, owned blob of serialized bytes with a lazily computed
/// content hash.
///
/// Equality compares bytes; hashing uses the content hash, so
/// `SerializedData` works directly as a deduplication map key. The hash is
/// computed over the raw bytes with a fixed-seed hasher and is therefore
/// independent of the buffer's address and alignment.
#[derive(Default)]
pub struct SerializedData {
    bytes: Box<[u8]>,
    // 0 = not yet computed; computed hashes are folded away from 0.
    hash: AtomicU64,
}

impl SerializedData {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
            hash: AtomicU64::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Content hash of the bytes, computed on first use.
    ///
    /// Concurrent first calls may both compute the hash; they store the same
    /// value, so the race is benign.
    pub fn hash(&self) -> u64 {
        let hash = self.hash.load(Ordering::Relaxed);

        if hash != 0 {
            return hash;
        }

        let hash = content_hash(&self.bytes).max(1);
        self.hash.store(hash, Ordering::Relaxed);

        hash
    }
}

impl From<Vec<u8>> for SerializedData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl PartialEq for SerializedData {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SerializedData {}

impl std::hash::Hash for SerializedData {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash());
    }
}

impl fmt::Debug for SerializedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedData")
            .field("len", &self.bytes.len())
            .field("hash", &format_args!("{:#018x}", self.hash()))
            .finish()
    }
}

/// Fixed-seed hash of a byte slice, stable across runs and platforms.
pub fn content_hash(bytes: &[u8]) -> u64 {
    foldhash::quality::FixedState::default().hash_one(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema<S: Serializer>(
        ser: &mut S,
        scalar: &mut u32,
        flag: &mut bool,
        name: &mut String,
        blob: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        ser.pod(scalar)?;
        ser.boolean(flag)?;
        ser.string(name)?;
        ser.tail(blob)
    }

    #[test]
    fn measure_write_read_round_trip() {
        let mut scalar = 0xDEAD_BEEFu32;
        let mut flag = true;
        let mut name = "BlitPass".to_owned();
        let mut blob = vec![1u8, 2, 3, 4, 5];

        let mut measure = Measure::new();
        schema(&mut measure, &mut scalar, &mut flag, &mut name, &mut blob).unwrap();
        // 4 (u32) + 1 (bool) + 2 + 8 + 1 (string) + 5 (tail)
        assert_eq!(measure.size(), 21);

        let mut bytes = vec![0u8; measure.size()];
        let mut writer = Writer::new(&mut bytes);
        schema(&mut writer, &mut scalar, &mut flag, &mut name, &mut blob).unwrap();
        assert!(writer.is_ended());

        let mut scalar2 = 0u32;
        let mut flag2 = false;
        let mut name2 = String::new();
        let mut blob2 = Vec::new();
        let mut reader = Reader::new(&bytes);
        schema(&mut reader, &mut scalar2, &mut flag2, &mut name2, &mut blob2).unwrap();

        assert!(reader.is_ended());
        assert_eq!(scalar2, scalar);
        assert_eq!(flag2, flag);
        assert_eq!(name2, name);
        assert_eq!(blob2, blob);
    }

    #[test]
    fn empty_string_takes_two_bytes() {
        let mut empty = String::new();

        let mut measure = Measure::new();
        measure.string(&mut empty).unwrap();
        assert_eq!(measure.size(), 2);

        let mut bytes = vec![0xFFu8; 2];
        let mut writer = Writer::new(&mut bytes);
        writer.string(&mut empty).unwrap();
        assert_eq!(bytes, [0, 0]);

        let mut decoded = "overwritten".to_owned();
        let mut reader = Reader::new(&bytes);
        reader.string(&mut decoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn string_prefix_counts_nul() {
        let mut name = "abc".to_owned();

        let mut bytes = vec![0u8; encoded_string_len(&name)];
        let mut writer = Writer::new(&mut bytes);
        writer.string(&mut name).unwrap();

        assert_eq!(bytes, [4, 0, b'a', b'b', b'c', 0]);
    }

    #[test]
    fn reader_rejects_truncated_input() {
        let bytes = [5u8, 0, b'a'];
        let mut reader = Reader::new(&bytes);
        let mut decoded = String::new();

        assert!(matches!(
            reader.string(&mut decoded),
            Err(SerializeError::BufferOverrun { .. })
        ));
    }

    #[test]
    fn reader_rejects_missing_terminator() {
        let bytes = [2u8, 0, b'a', b'b'];
        let mut reader = Reader::new(&bytes);
        let mut decoded = String::new();

        assert_eq!(
            reader.string(&mut decoded),
            Err(SerializeError::MissingNulTerminator)
        );
    }

    #[test]
    fn slice_round_trip() {
        let mut values = vec![3u32, 1, 4, 1, 5];

        let mut measure = Measure::new();
        measure.slice(&mut values, |ser, v| ser.pod(v)).unwrap();
        assert_eq!(measure.size(), 4 + 5 * 4);

        let mut bytes = vec![0u8; measure.size()];
        let mut writer = Writer::new(&mut bytes);
        writer.slice(&mut values, |ser, v| ser.pod(v)).unwrap();

        let mut decoded: Vec<u32> = Vec::new();
        let mut reader = Reader::new(&bytes);
        reader.slice(&mut decoded, |ser, v| ser.pod(v)).unwrap();

        assert_eq!(decoded, values);
    }

    #[test]
    fn serialized_data_hash_is_content_based() {
        let a = SerializedData::new(vec![1, 2, 3]);
        let b = SerializedData::new(vec![1, 2, 3]);
        let c = SerializedData::new(vec![1, 2, 4]);

        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a, c);
        // Not guaranteed in general, but a collision here would mean a broken
        // hasher.
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn serialized_data_empty() {
        let empty = SerializedData::default();
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        assert_ne!(empty.hash(), 0);
    }
}

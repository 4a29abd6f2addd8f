//! # MQTT Serialization Utilities
//!
//! Cursor types for reading and writing MQTT-specific data types, such as variable-byte
//! integers and length-prefixed strings. Every access is bounds-checked: a short buffer turns
//! into an error, never a panic.

use crate::error::{PacketError, ProtocolError};

/// Largest value a four-byte variable-byte integer can carry.
pub const MAX_REMAINING_LEN: usize = 268_435_455;

/// Decodes a variable-byte integer at the start of `buf`.
///
/// Returns `Ok(None)` when the buffer ends before the last length byte, which lets callers
/// wait for more input. Yields the value and the number of bytes it occupied otherwise.
pub fn read_variable_byte_integer(buf: &[u8]) -> Result<Option<(usize, usize)>, PacketError> {
    let mut multiplier = 1;
    let mut value = 0;
    for i in 0..4 {
        let Some(&encoded_byte) = buf.get(i) else {
            return Ok(None);
        };
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    Err(ProtocolError::MalformedPacket.into())
}

/// Number of bytes needed to encode `val` as a variable-byte integer.
pub fn variable_byte_integer_len(val: usize) -> usize {
    match val {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// A forward-only cursor over an output buffer.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn put_u8(&mut self, val: u8) -> Result<(), PacketError> {
        self.put_bytes(&[val])
    }

    pub fn put_u16(&mut self, val: u16) -> Result<(), PacketError> {
        self.put_bytes(&val.to_be_bytes())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        let end = self.pos + bytes.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or(PacketError::BufferTooSmall)?
            .copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Writes a variable-byte integer.
    pub fn put_variable_byte_integer(&mut self, mut val: usize) -> Result<(), PacketError> {
        if val > MAX_REMAINING_LEN {
            return Err(ProtocolError::PayloadTooLarge.into());
        }
        loop {
            let mut encoded_byte = (val % 128) as u8;
            val /= 128;
            if val > 0 {
                encoded_byte |= 128;
            }
            self.put_u8(encoded_byte)?;
            if val == 0 {
                return Ok(());
            }
        }
    }

    /// Writes binary data prefixed with its 2-byte length.
    pub fn put_prefixed(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        let len = u16::try_from(bytes.len()).map_err(|_| ProtocolError::PayloadTooLarge)?;
        self.put_u16(len)?;
        self.put_bytes(bytes)
    }

    /// Writes a UTF-8 encoded string prefixed with its 2-byte length.
    pub fn put_str(&mut self, s: &str) -> Result<(), PacketError> {
        self.put_prefixed(s.as_bytes())
    }
}

/// Encoded size of a length-prefixed string or binary field.
pub fn prefixed_len(bytes: &[u8]) -> usize {
    2 + bytes.len()
}

/// A forward-only cursor over an input buffer.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        let end = self.pos + len;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or(ProtocolError::MalformedPacket)?;
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, PacketError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a UTF-8 encoded string prefixed with its 2-byte length.
    pub fn utf8_str(&mut self) -> Result<&'a str, PacketError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        core::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8String.into())
    }

    /// Everything not consumed yet.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}

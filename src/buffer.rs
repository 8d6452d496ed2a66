use std::str;

use crate::types::{DnsBufferError, DnsReadBuffer, DnsWriteBuffer};

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

impl<'a> DnsReadBuffer<'a> {
    /// Creates a new `DnsReadBuffer` to read from the given byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice containing the whole DNS message.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    /// Returns the current read index.
    pub fn get_index(&self) -> usize {
        self.index
    }

    /// Sets the read index to the specified offset.
    ///
    /// An offset equal to the message length is allowed; it marks the end.
    pub fn set_index(&mut self, off: usize) -> Result<&mut Self, DnsBufferError> {
        if off > self.data.len() {
            return Err(DnsBufferError::EndOfBuffer(off));
        }
        self.index = off;
        Ok(self)
    }

    /// Number of bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.index)
    }

    /// Reads a single byte (`u8`) from the buffer.
    pub fn read_u8(&mut self) -> Result<u8, DnsBufferError> {
        self.data
            .get(self.index)
            .copied()
            .ok_or(DnsBufferError::EndOfBuffer(self.index))
            .map(|b| {
                self.index += 1;
                b
            })
    }

    /// Reads a big-endian `u16` from the buffer.
    pub fn read_u16(&mut self) -> Result<u16, DnsBufferError> {
        let b = self.read_n_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big-endian `u32` from the buffer.
    pub fn read_u32(&mut self) -> Result<u32, DnsBufferError> {
        let b = self.read_n_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads `n` bytes from the buffer as a slice.
    ///
    /// # Errors
    /// Returns `DnsBufferError::EndOfBuffer` if fewer than `n` bytes remain.
    pub fn read_n_bytes(&mut self, n: usize) -> Result<&'a [u8], DnsBufferError> {
        let end = self
            .index
            .checked_add(n)
            .ok_or(DnsBufferError::EndOfBuffer(self.index))?;
        let data: &'a [u8] = self.data;
        let bytes = data
            .get(self.index..end)
            .ok_or(DnsBufferError::EndOfBuffer(self.data.len()))?;
        self.index = end;
        Ok(bytes)
    }

    /// Reads a DNS domain name at the cursor, following compression pointers.
    ///
    /// The cursor ends right after the name as it appears at the cursor: after
    /// the terminating zero, or two bytes past the first pointer.
    pub fn read_str(&mut self) -> Result<String, DnsBufferError> {
        let (name, next) = Self::read_name_at(self.data, self.index)?;
        self.index = next;
        Ok(name)
    }

    /// Walks the label sequence starting at `start`.
    ///
    /// Returns `(presentation_name, index_after_name)`. Every pointer must
    /// target an offset before the label run it terminates, so each jump moves
    /// strictly backwards and the walk always ends.
    fn read_name_at(data: &[u8], start: usize) -> Result<(String, usize), DnsBufferError> {
        let mut labels: Vec<String> = Vec::new();
        let mut idx = start;
        let mut run_start = start;
        let mut resume: Option<usize> = None;
        let mut wire_len = 0usize;

        loop {
            let len = *data.get(idx).ok_or(DnsBufferError::EndOfBuffer(idx))?;

            match len & 0b1100_0000 {
                0b1100_0000 => {
                    let b2 = *data.get(idx + 1).ok_or(DnsBufferError::EndOfBuffer(idx + 1))?;
                    let target = (((len & 0b0011_1111) as usize) << 8) | (b2 as usize);

                    if target >= idx || target >= data.len() {
                        return Err(DnsBufferError::BadPointer { at: idx, target });
                    }
                    if target >= run_start {
                        return Err(DnsBufferError::PointerLoop(target));
                    }

                    resume.get_or_insert(idx + 2);
                    idx = target;
                    run_start = target;
                }
                0b0000_0000 => {
                    wire_len += len as usize + 1;
                    if wire_len > MAX_NAME_LEN {
                        return Err(DnsBufferError::NameOverflow(start));
                    }
                    if len == 0 {
                        idx += 1;
                        break;
                    }

                    let begin = idx + 1;
                    let end = begin + len as usize;
                    let bytes = data.get(begin..end).ok_or(DnsBufferError::EndOfBuffer(data.len()))?;
                    let label = str::from_utf8(bytes).map_err(|_| DnsBufferError::InvalidString(idx))?;
                    labels.push(label.to_string());
                    idx = end;
                }
                _ => return Err(DnsBufferError::ReservedLabel(len)),
            }
        }

        let name = if labels.is_empty() {
            ".".to_string()
        } else {
            labels.join(".")
        };

        Ok((name, resume.unwrap_or(idx)))
    }
}

impl DnsWriteBuffer {
    /// Creates a new empty `DnsWriteBuffer`.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Writes a 16-bit unsigned integer in big-endian order.
    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a 32-bit unsigned integer in big-endian order.
    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Current length of the encoded data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Overwrites two bytes at `at` with a big-endian `u16`.
    ///
    /// Used to back-fill length fields once the payload size is known.
    pub fn patch_u16(&mut self, at: usize, value: u16) {
        self.data[at..at + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Consumes the buffer and returns the inner byte vector.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Writes a DNS domain name to the buffer, without compression.
    ///
    /// Splits the name by `.` and writes each label preceded by its length,
    /// followed by a zero-length byte to terminate the name. A single trailing
    /// dot is accepted. Nothing is written when the name is rejected.
    ///
    /// # Errors
    /// * `EmptyLabel` for an empty name or an empty label (`a..b`).
    /// * `LabelTooLong` if any label exceeds 63 bytes.
    /// * `NameTooLong` if the encoded name exceeds 255 bytes.
    pub fn write_str(&mut self, name: &str) -> Result<(), DnsBufferError> {
        let encoded = encode_name(name)?;
        self.write_bytes(&encoded);
        Ok(())
    }
}

/// Encodes a presentation name as length-prefixed labels plus terminator.
pub fn encode_name(name: &str) -> Result<Vec<u8>, DnsBufferError> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return Err(DnsBufferError::EmptyLabel(name.to_string()));
    }

    let mut out = Vec::with_capacity(trimmed.len() + 2);
    for label in trimmed.split('.') {
        let len = label.len();
        if len == 0 {
            return Err(DnsBufferError::EmptyLabel(name.to_string()));
        }
        if len > MAX_LABEL_LEN {
            return Err(DnsBufferError::LabelTooLong(label.to_string()));
        }
        out.push(len as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);

    if out.len() > MAX_NAME_LEN {
        return Err(DnsBufferError::NameTooLong);
    }
    Ok(out)
}

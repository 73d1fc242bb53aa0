//! Growable native-endian byte buffer.

/// Appends native-endian values to a byte vector.
///
/// Offsets returned by the writer are positions within this buffer; the
/// caller adds segment bases where needed.
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Write `bytes` into a field of exactly `width` bytes, truncating or
    /// zero-padding.
    pub fn write_fixed(&mut self, bytes: &[u8], width: usize) {
        let len = bytes.len().min(width);
        self.bytes.extend_from_slice(&bytes[..len]);
        self.zeros(width - len);
    }

    /// Append `count` zero bytes.
    pub fn zeros(&mut self, count: usize) {
        self.bytes.resize(self.bytes.len() + count, 0);
    }

    /// Pad with zeros until `base + position` is a multiple of `alignment`.
    pub fn align(&mut self, base: usize, alignment: usize) {
        let misalignment = (base + self.bytes.len()) % alignment;
        if misalignment != 0 {
            self.zeros(alignment - misalignment);
        }
    }

    /// Overwrite four bytes at `offset`.
    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

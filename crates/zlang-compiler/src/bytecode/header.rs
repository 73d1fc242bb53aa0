//! The fixed-size image header.

use bitflags::bitflags;
use zlang_core::ImageError;

use super::{ByteWriter, HEADER_SIZE, MAJOR_VERSION, MINOR_VERSION};

bitflags! {
    /// Properties of an image.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageFlags: u32 {
        /// A zeroed heap follows the global segment.
        const MEMORY_IMAGE = 1 << 0;
        /// The heap must not grow beyond the header's heap size.
        const LIMIT_HEAP_SIZE = 1 << 1;
    }
}

/// Decoded image header. Sizes are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub major: u8,
    pub minor: u8,
    pub code_size: u32,
    pub const_size: u32,
    pub global_size: u32,
    /// Constant-segment address of the entry function's record.
    pub entry_point: i32,
    /// Registers per stack frame: the highest register used plus one.
    pub register_count: u32,
    pub max_stack_depth: u32,
    pub heap_size: u32,
    pub flags: ImageFlags,
}

impl ImageHeader {
    /// Offset of the code segment.
    pub fn code_offset(&self) -> usize {
        HEADER_SIZE
    }

    /// Offset of the constant segment.
    pub fn const_offset(&self) -> usize {
        self.code_offset() + self.code_size as usize
    }

    /// Offset of the global segment.
    pub fn global_offset(&self) -> usize {
        self.const_offset() + self.const_size as usize
    }

    /// Offset of the heap, present only in memory images.
    pub fn heap_offset(&self) -> usize {
        self.global_offset() + self.global_size as usize
    }

    pub fn write(&self, out: &mut ByteWriter) {
        out.write_bytes(&[b'Z', b'L', self.major, self.minor]);
        out.write_u32(self.code_size);
        out.write_u32(self.const_size);
        out.write_u32(self.global_size);
        out.write_i32(self.entry_point);
        out.write_u32(self.register_count);
        out.write_u32(self.max_stack_depth);
        out.write_u32(self.heap_size);
        out.write_u32(self.flags.bits());
        out.write_u32(0);
    }

    /// Decode and validate the header at the start of `bytes`.
    pub fn read(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ImageError::Truncated {
                offset: 0,
                needed: HEADER_SIZE,
            });
        }
        if &bytes[..2] != b"ZL" {
            return Err(ImageError::BadMagic);
        }
        let (major, minor) = (bytes[2], bytes[3]);
        if major != MAJOR_VERSION || minor != MINOR_VERSION {
            return Err(ImageError::UnsupportedVersion { major, minor });
        }
        let word = |offset: usize| u32::from_ne_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]);
        Ok(Self {
            major,
            minor,
            code_size: word(4),
            const_size: word(8),
            global_size: word(12),
            entry_point: word(16) as i32,
            register_count: word(20),
            max_stack_depth: word(24),
            heap_size: word(28),
            flags: ImageFlags::from_bits_truncate(word(32)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ImageHeader {
        ImageHeader {
            major: MAJOR_VERSION,
            minor: MINOR_VERSION,
            code_size: 12,
            const_size: 160,
            global_size: 8,
            entry_point: 148,
            register_count: 5,
            max_stack_depth: 64,
            heap_size: 4096,
            flags: ImageFlags::MEMORY_IMAGE,
        }
    }

    #[test]
    fn header_is_forty_bytes_with_fields_at_fixed_offsets() {
        let mut out = ByteWriter::new();
        header().write(&mut out);
        let bytes = out.into_bytes();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..4], &[b'Z', b'L', 0, 2]);
        assert_eq!(&bytes[16..20], &148i32.to_ne_bytes());
        assert_eq!(&bytes[28..32], &4096u32.to_ne_bytes());
        assert_eq!(ImageHeader::read(&bytes), Ok(header()));
    }

    #[test]
    fn segment_offsets_follow_sizes() {
        let h = header();
        assert_eq!(h.code_offset(), 40);
        assert_eq!(h.const_offset(), 52);
        assert_eq!(h.global_offset(), 212);
        assert_eq!(h.heap_offset(), 220);
    }

    #[test]
    fn rejects_foreign_and_short_buffers() {
        assert_eq!(
            ImageHeader::read(&[0; 8]),
            Err(ImageError::Truncated { offset: 0, needed: 40 })
        );
        assert_eq!(ImageHeader::read(&[0; 40]), Err(ImageError::BadMagic));

        let mut bytes = [0u8; 40];
        bytes[..4].copy_from_slice(&[b'Z', b'L', 1, 0]);
        assert_eq!(
            ImageHeader::read(&bytes),
            Err(ImageError::UnsupportedVersion { major: 1, minor: 0 })
        );
    }
}

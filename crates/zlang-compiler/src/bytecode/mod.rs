//! Binary images for the zlang virtual machine.
//!
//! An image is laid out as:
//!
//! ```text
//! +-----------------+  0
//! | header          |  40 bytes, see ImageHeader
//! +-----------------+
//! | code segment    |  encoded instructions, function after function
//! +-----------------+
//! | const segment   |  type records, function records, literal pool
//! +-----------------+
//! | global segment  |  zeroed module-level variables
//! +-----------------+
//! | heap            |  optional, starts with one free entry
//! +-----------------+
//! ```
//!
//! All multi-byte values use native byte order. Addresses stored in the
//! image are offsets into their segment.
//!
//! - [`Encoder`] - Writes an image from an emitted [`Program`](crate::ir::Program)
//! - [`ImageReader`] - Decodes headers, instructions, records and heap entries
//! - [`EncoderOptions`] - Heap and stack configuration
//! - [`LiteralPool`] - Deduplicated float and string constants

mod encoder;
mod header;
mod options;
mod pool;
mod reader;
mod records;
mod writer;

pub use encoder::{EncodeOutput, Encoder};
pub use header::{ImageFlags, ImageHeader};
pub use options::EncoderOptions;
pub use pool::{Literal, LiteralPool};
pub use reader::{DecodedInstruction, GlobalValue, HeapEntry, ImageReader, TypeRecord};
pub use writer::ByteWriter;

/// Format version written into every header.
pub const MAJOR_VERSION: u8 = 0;
pub const MINOR_VERSION: u8 = 2;

/// Size of the image header in bytes.
pub const HEADER_SIZE: usize = 40;

/// Size of the fixed-width, zero-padded type name in a type record.
pub const TYPE_NAME_LEN: usize = 64;

/// Number of interface slots in a type record.
pub const MAX_INTERFACES: usize = 8;

/// Longest encodable string constant.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Size of the header preceding every heap object.
pub const HEAP_ENTRY_HEADER_SIZE: usize = 12;

/// Reference count marking a free heap slot.
pub const FREE_SLOT: u32 = 0xFFFF_FFFF;

/// Set in the type word of heap objects whose type is an aggregate; the
/// remaining bits are the type record address.
pub const AGGREGATE_TYPE_BIT: u32 = 0x8000_0000;

/// Function record value of interface methods, which have no code.
pub const NO_CODE: i32 = -1;

//! Encoder configuration.

/// Options controlling image layout.
///
/// ```
/// use zlang_compiler::bytecode::EncoderOptions;
///
/// let options = EncoderOptions::default()
///     .with_memory_image(true)
///     .with_heap_size(4096)
///     .with_limit_heap_size(true);
/// assert_eq!(options.max_stack_depth, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Append a zeroed heap to the image.
    pub memory_image: bool,
    /// Heap size in bytes. A minimum unless `limit_heap_size` is set.
    pub heap_size: u32,
    /// Use `heap_size` exactly. Otherwise the heap grows so the image
    /// fills the next buffer bucket (16 KiB up to 64 MiB).
    pub limit_heap_size: bool,
    /// Maximum call depth of the virtual machine.
    pub max_stack_depth: u32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            memory_image: false,
            heap_size: 256 * 1024,
            limit_heap_size: false,
            max_stack_depth: 64,
        }
    }
}

impl EncoderOptions {
    pub fn with_memory_image(mut self, memory_image: bool) -> Self {
        self.memory_image = memory_image;
        self
    }

    pub fn with_heap_size(mut self, heap_size: u32) -> Self {
        self.heap_size = heap_size;
        self
    }

    pub fn with_limit_heap_size(mut self, limit_heap_size: bool) -> Self {
        self.limit_heap_size = limit_heap_size;
        self
    }

    pub fn with_max_stack_depth(mut self, max_stack_depth: u32) -> Self {
        self.max_stack_depth = max_stack_depth;
        self
    }
}

const KIB: u32 = 1024;
const MIB: u32 = KIB * KIB;

/// Image sizes the heap is rounded up to.
const BUCKETS: [u32; 8] = [16 * KIB, 32 * KIB, 64 * KIB, 256 * KIB, MIB, 4 * MIB, 16 * MIB, 64 * MIB];

/// The heap size to encode, given the size of everything before the heap.
///
/// Without a limit the heap absorbs the slack up to the smallest bucket
/// holding the whole image. Images beyond the largest bucket keep the
/// requested size.
pub(crate) fn effective_heap_size(options: &EncoderOptions, preceding: u32) -> u32 {
    if options.limit_heap_size {
        return options.heap_size;
    }
    let required = preceding.saturating_add(options.heap_size);
    BUCKETS
        .iter()
        .find(|bucket| **bucket >= required)
        .map_or(options.heap_size, |bucket| bucket - preceding)
}

//! Layout constants shared by the host and the WGSL kernels.
//!
//! The shaders hard-code the same values; change both sides together.

/// Quantization bits per axis. Two axes interleave into one `u32` key.
pub const MORTON_BITS_PER_AXIS: u32 = 16;

/// Number of grid cells along each axis of the quantization window.
pub const MORTON_GRID_RESOLUTION: u32 = 1 << MORTON_BITS_PER_AXIS;

/// Tag bit on a child reference marking it as a leaf (sorted rank) rather
/// than an internal node index.
pub const LEAF_FLAG: u32 = 0x8000_0000;

/// "No node": the root's parent and a leaf's children.
pub const INVALID_NODE: u32 = 0xFFFF_FFFF;

/// Upper bound on bodies, so a sorted rank never collides with [`LEAF_FLAG`].
pub const MAX_BODIES: u32 = LEAF_FLAG - 1;

/// Depth of the force-walk stack.
///
/// Keys are effectively 64 bits wide once ties are broken by body index, so a
/// root-to-leaf path has at most 64 edges and the stack never holds more than
/// one pending sibling per level.
pub const TRAVERSAL_STACK_SIZE: usize = 80;

/// Threads per workgroup for the per-body and per-node kernels.
pub const WORKGROUP_SIZE: u32 = 64;

/// Key bits consumed per radix sort pass.
pub const RADIX_BITS: u32 = 4;

/// Buckets per radix sort pass.
pub const RADIX_BUCKETS: usize = 1 << RADIX_BITS;

/// Passes needed to sort a full `u32` key. Even, so the sorted data ends up
/// back in the buffers it started in.
pub const RADIX_PASSES: u32 = u32::BITS / RADIX_BITS;

/// Keys handled by one radix sort workgroup.
pub const RADIX_BLOCK_SIZE: u32 = 256;

//! Owned block arena used as the memory ballast.

use tracing::trace;

/// Byte written into every block so the pages are actually committed.
const FILL: u8 = 0xA5;

/// Ordered sequence of fixed-size blocks.
///
/// Only the pressure loop holds one; nothing else ever sees its contents.
#[derive(Debug)]
pub(crate) struct MemoryArena {
    blocks: Vec<Box<[u8]>>,
    block_bytes: usize,
}

impl MemoryArena {
    pub(crate) fn new(block_bytes: usize) -> Self {
        Self {
            blocks: Vec::new(),
            block_bytes,
        }
    }

    /// Append one block.
    pub(crate) fn grow(&mut self) {
        self.blocks.push(vec![FILL; self.block_bytes].into_boxed_slice());
    }

    /// Drop every block and ask the allocator to return freed pages.
    pub(crate) fn release(&mut self) {
        let dropped = self.blocks.len();
        self.blocks = Vec::new();
        trim_allocator();
        trace!(dropped, "arena released");
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    pub(crate) fn bytes(&self) -> usize {
        self.blocks.len() * self.block_bytes
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn trim_allocator() {
    // SAFETY: malloc_trim only walks glibc's own free lists.
    unsafe {
        libc::malloc_trim(0);
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn trim_allocator() {}

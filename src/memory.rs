//! Linear-increment block allocator with wrap to zero.
//!
//! Allocation hands out the current address and advances by one block while
//! the just-emitted block still fits inside system memory; past that point
//! the cursor resets to zero. For 1000 kB of memory and 400 kB blocks the
//! emitted sequence is 0, 400, 800, 0, and so on. There is no free.

/// Next-allocation cursor over a fixed memory size, in kB units.
#[derive(Clone, Copy, Debug)]
pub struct MemoryTracker {
    next: u64,
    block: u64,
    total: u64,
}

impl MemoryTracker {
    pub fn new(total_kb: u64, block_kb: u64) -> Self {
        Self {
            next: 0,
            block: block_kb,
            total: total_kb,
        }
    }

    /// Address the next allocation will return.
    #[inline]
    pub fn next_address(&self) -> u64 {
        self.next
    }

    /// Emit the current address and advance the cursor by one block; once
    /// the emitted block overruns system memory the cursor resets to zero
    /// instead.
    pub fn allocate(&mut self) -> u64 {
        let addr = self.next;
        self.next = if addr.saturating_add(self.block) <= self.total {
            addr + self.block
        } else {
            0
        };
        addr
    }
}

/// Trace spelling of an address: `0x` plus eight lowercase hex digits.
pub fn format_address(addr: u64) -> String {
    format!("{addr:#010x}")
}

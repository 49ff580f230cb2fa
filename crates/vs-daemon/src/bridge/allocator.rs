//! Local port allocation for bridges

use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out strictly increasing local ports, never the same one twice
pub struct PortAllocator {
    next: AtomicU32,
}

impl PortAllocator {
    /// Create an allocator whose first port is `base`
    pub fn new(base: u16) -> Self {
        Self {
            next: AtomicU32::new(u32::from(base)),
        }
    }

    /// Take the next port
    ///
    /// Returns `None` once the port range is used up; the counter keeps
    /// advancing so no value is ever handed out twice.
    pub fn next_port(&self) -> Option<u16> {
        let port = self.next.fetch_add(1, Ordering::SeqCst);
        u16::try_from(port).ok()
    }
}

//! Typed, bounded I/O device pools with named handles.
//!
//! Each device kind owns a fixed set of handles (`HDD_0`, `HDD_1`, …) created
//! once at boot from the configured quantity. `acquire` blocks while the pool
//! is exhausted and hands out the handle at the head of the free list;
//! releasing appends to the tail, so handles rotate in FIFO order.
//!
//! # Correctness Invariants
//!
//! - **Bounded**: `free + in-use == capacity` at all times.
//! - **Leak-free**: [`DeviceLease`] is RAII; the handle returns on drop, even
//!   during unwinding.
//! - **FIFO waiters**: blocked acquirers are served strictly in arrival
//!   order (ticket queue), so starvation is bounded by queue length.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// The five I/O device classes a process operation can name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    HardDrive,
    Keyboard,
    Scanner,
    Monitor,
    Projector,
}

/// Number of device classes.
pub const NUM_DEVICE_KINDS: usize = 5;

impl DeviceKind {
    /// All kinds, in the canonical configuration order.
    pub const ALL: [DeviceKind; NUM_DEVICE_KINDS] = [
        DeviceKind::HardDrive,
        DeviceKind::Keyboard,
        DeviceKind::Scanner,
        DeviceKind::Monitor,
        DeviceKind::Projector,
    ];

    /// Stable index into per-kind arrays.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            DeviceKind::HardDrive => 0,
            DeviceKind::Keyboard => 1,
            DeviceKind::Scanner => 2,
            DeviceKind::Monitor => 3,
            DeviceKind::Projector => 4,
        }
    }

    /// Handle-name prefix for this kind (`HDD_0`, `KBRD_1`, …).
    pub fn handle_prefix(self) -> &'static str {
        match self {
            DeviceKind::HardDrive => "HDD",
            DeviceKind::Keyboard => "KBRD",
            DeviceKind::Scanner => "SCNR",
            DeviceKind::Monitor => "MNTR",
            DeviceKind::Projector => "PROJ",
        }
    }
}

/// Mutable pool state guarded by the mutex.
#[derive(Debug)]
struct PoolState {
    /// Handles currently available, head is granted next.
    free: VecDeque<String>,
    /// Tickets of blocked acquirers, front is served first.
    waiters: VecDeque<u64>,
    next_ticket: u64,
}

/// Fixed-capacity blocking pool for one device kind.
///
/// Safe to share via `Arc<DevicePool>`. The engine thread acquires; timer
/// threads never touch pools, so contention is limited to lease drops.
#[derive(Debug)]
pub struct DevicePool {
    kind: DeviceKind,
    capacity: usize,
    state: Mutex<PoolState>,
    cv: Condvar,
}

impl DevicePool {
    /// Create a pool of `capacity` named handles.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0; configuration validation rejects that
    /// before a pool is ever built.
    pub fn new(kind: DeviceKind, capacity: usize) -> Arc<Self> {
        assert!(capacity > 0, "device pool capacity must be > 0");
        let free = (0..capacity)
            .map(|i| format!("{}_{}", kind.handle_prefix(), i))
            .collect();
        Arc::new(Self {
            kind,
            capacity,
            state: Mutex::new(PoolState {
                free,
                waiters: VecDeque::new(),
                next_ticket: 0,
            }),
            cv: Condvar::new(),
        })
    }

    /// Device kind served by this pool.
    #[inline]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Total number of handles.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Handles currently free. Snapshot only; may be stale immediately.
    pub fn available(&self) -> usize {
        self.state.lock().expect("device pool mutex poisoned").free.len()
    }

    /// Acquire a handle, blocking until one is free.
    ///
    /// Waiters are granted handles in strict arrival order: a caller takes a
    /// ticket and sleeps until its ticket is at the front of the wait queue
    /// and a handle is free.
    pub fn acquire(self: &Arc<Self>) -> DeviceLease {
        let mut st = self.state.lock().expect("device pool mutex poisoned");
        let ticket = st.next_ticket;
        st.next_ticket += 1;
        st.waiters.push_back(ticket);

        while st.waiters.front() != Some(&ticket) || st.free.is_empty() {
            st = self.cv.wait(st).expect("device pool condvar poisoned");
        }

        st.waiters.pop_front();
        let handle = st.free.pop_front().expect("free list empty after wait");
        drop(st);

        // Wake the next ticket holder; a handle may still be free.
        self.cv.notify_all();

        DeviceLease {
            pool: Arc::clone(self),
            handle: Some(handle),
        }
    }

    /// Lock with poison recovery, for Drop paths that must not panic.
    fn lock_or_recover(&self) -> MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Return a handle to the tail of the free list. Called by lease drop.
    fn release(&self, handle: String) {
        let mut st = self.lock_or_recover();
        st.free.push_back(handle);

        #[cfg(debug_assertions)]
        {
            if st.free.len() > self.capacity && !std::thread::panicking() {
                panic!(
                    "device pool over-release: free={} > capacity={}",
                    st.free.len(),
                    self.capacity
                );
            }
        }

        drop(st);
        self.cv.notify_all();
    }
}

/// RAII lease on one device handle.
///
/// The handle returns to its pool when the lease drops, including during
/// panic unwinding.
#[derive(Debug)]
#[must_use = "dropping a DeviceLease immediately releases the handle"]
pub struct DeviceLease {
    pool: Arc<DevicePool>,
    handle: Option<String>,
}

impl DeviceLease {
    /// Name of the held handle, e.g. `HDD_0`.
    pub fn handle(&self) -> &str {
        self.handle.as_deref().expect("lease already released")
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}

/// The full set of pools, one per device kind, owned by the engine.
#[derive(Debug)]
pub struct DevicePools {
    pools: [Arc<DevicePool>; NUM_DEVICE_KINDS],
}

impl DevicePools {
    /// Build all five pools from configured quantities, indexed by
    /// [`DeviceKind::index`].
    pub fn new(quantities: &[usize; NUM_DEVICE_KINDS]) -> Self {
        let pools = DeviceKind::ALL.map(|kind| DevicePool::new(kind, quantities[kind.index()]));
        Self { pools }
    }

    /// Pool for one device kind.
    #[inline]
    pub fn pool(&self, kind: DeviceKind) -> &Arc<DevicePool> {
        &self.pools[kind.index()]
    }

    /// Acquire a handle of the given kind, blocking until one is free.
    pub fn acquire(&self, kind: DeviceKind) -> DeviceLease {
        self.pool(kind).acquire()
    }
}

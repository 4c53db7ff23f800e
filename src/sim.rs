//! A byte-buffer-backed [`MemoryWindow`]/[`Device`] pair used by this
//! crate's own tests and by the `demos/` binaries to exercise the worker
//! state machine without real RDMA hardware.
//!
//! [`SimWindow`] is the same region-keyed byte store used by the unit test
//! harnesses scattered through this crate (`window.rs`'s `ByteWindow`,
//! `coordinator.rs`'s `FakeWindow`), promoted here so integration tests and
//! demos share one implementation instead of redefining it per module.
//! [`SimDevice`] only records doorbell/arm/fence calls; interpreting the
//! WQEs those doorbells refer to (i.e. simulating the network) is the
//! integration test's job, since it alone knows how ranks map to each
//! other's memory.

use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::Infallible;
use std::rc::Rc;

use crate::device::Device;
use crate::window::{MemoryWindow, WindowPtr};

/// Shared, region-keyed byte storage. `Rc<RefCell<_>>`-wrapped so a test can
/// hand the same backing store to both a [`SimWindow`] (the worker's own
/// view) and direct inspection code (asserting on buffer contents).
#[derive(Debug, Default)]
pub struct SimMemory {
    regions: HashMap<u32, Vec<u8>>,
}

impl SimMemory {
    /// Wrap a fresh, empty store.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Register (or fetch, if already registered) the byte region for
    /// `mkey`, growing it to at least `min_len` bytes.
    pub fn region_mut(&mut self, mkey: u32, min_len: usize) -> &mut Vec<u8> {
        let region = self.regions.entry(mkey).or_default();
        if region.len() < min_len {
            region.resize(min_len, 0);
        }
        region
    }

    /// Read `len` bytes at `addr` within `mkey`'s region.
    pub fn read(&mut self, mkey: u32, addr: u64, len: usize) -> Vec<u8> {
        let start = addr as usize;
        self.region_mut(mkey, start + len)[start..start + len].to_vec()
    }

    /// Write `data` at `addr` within `mkey`'s region.
    pub fn write(&mut self, mkey: u32, addr: u64, data: &[u8]) {
        let start = addr as usize;
        self.region_mut(mkey, start + data.len())[start..start + data.len()]
            .copy_from_slice(data);
    }

    /// Fetch-and-add a big-endian `u64` at `addr` within `mkey`'s region,
    /// returning the pre-add value. Mirrors the NIC's Fetch-and-Add
    /// semantics, which this crate's atomic WQEs always issue with
    /// `add = 1`.
    pub fn fetch_add_be_u64(&mut self, mkey: u32, addr: u64, add: u64) -> u64 {
        let start = addr as usize;
        let region = self.region_mut(mkey, start + 8);
        let prev = u64::from_be_bytes(region[start..start + 8].try_into().unwrap());
        region[start..start + 8].copy_from_slice(&(prev.wrapping_add(add)).to_be_bytes());
        prev
    }
}

/// A [`MemoryWindow`] over a [`SimMemory`] store: one mkey configured at a
/// time, matching the hardware's single-active-window rule.
pub struct SimWindow {
    memory: Rc<RefCell<SimMemory>>,
    configured: Option<u32>,
}

impl SimWindow {
    /// Create a window over an existing shared store.
    pub fn new(memory: Rc<RefCell<SimMemory>>) -> Self {
        Self {
            memory,
            configured: None,
        }
    }
}

impl MemoryWindow for SimWindow {
    type Error = Infallible;

    fn configure(&mut self, mkey: u32) -> Result<(), Self::Error> {
        self.configured = Some(mkey);
        Ok(())
    }

    fn ptr_acquire(&mut self, addr: u64) -> Result<WindowPtr<'_, Self>, Self::Error> {
        Ok(WindowPtr::new(self, addr))
    }

    fn writeback(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn raw_read_inv(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, Self::Error> {
        let mkey = self.configured.expect("window not configured");
        Ok(self.memory.borrow_mut().read(mkey, addr, len))
    }

    fn raw_write(&mut self, addr: u64, data: &[u8]) -> Result<(), Self::Error> {
        let mkey = self.configured.expect("window not configured");
        self.memory.borrow_mut().write(mkey, addr, data);
        Ok(())
    }
}

/// A [`Device`] that just records what was asked of it, for assertions in
/// tests. Doesn't interpret WQE content; see the module doc comment.
#[derive(Debug, Default)]
pub struct SimDevice {
    /// `(qpn, sq_pi)` pairs passed to every [`Device::ring_sq_db`] call, in
    /// order.
    pub doorbells: Vec<(u32, u32)>,
    /// `(cq_idx, cqn)` pairs passed to every [`Device::arm_cq`] call, in
    /// order.
    pub arms: Vec<(u32, u32)>,
    /// Number of [`Device::memory_writeback`] calls.
    pub fences: u32,
}

impl Device for SimDevice {
    fn ring_sq_db(&mut self, qpn: u32, sq_pi: u32) {
        self.doorbells.push((qpn, sq_pi));
    }

    fn arm_cq(&mut self, cq_idx: u32, cqn: u32) {
        self.arms.push((cq_idx, cqn));
    }

    fn memory_writeback(&mut self) {
        self.fences += 1;
    }
}

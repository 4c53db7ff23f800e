//! Completion coordinator: tracks how many workers have finished a given
//! CMDQ slot and publishes the host-visible completion sentinel once the
//! last one does.
//!
//! Grounded in `g_workers_finished` and `ldo_dev_complete_coll` /
//! `ldo_dev_process_a2a_comp` in
//! `original_source/src/dpa/ldo_state_a2a_comp.c`.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::cmd::CMD_COMPLETED;
use crate::window::MemoryWindow;

/// Shared per-CMDQ-slot finished-worker counters. One instance is shared
/// (via `Arc`, in the running system) across every worker thread that
/// services the same command queue.
pub struct Coordinator {
    finished: Vec<AtomicU8>,
}

impl Coordinator {
    /// Create a coordinator with one counter per CMDQ slot, all zeroed.
    pub fn new(cmdq_depth: usize) -> Self {
        Self {
            finished: (0..cmdq_depth).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    /// Record that this worker has finished `cmd_index`. Returns `true` if
    /// this call was the one that brought the slot's count to
    /// `num_workers` (i.e. this worker is the last finisher and must
    /// publish the host completion sentinel) — the counter is reset to
    /// zero in that case so the slot is ready for reuse.
    pub fn mark_finished(&self, cmd_index: usize, num_workers: u8) -> bool {
        let prev = self.finished[cmd_index].fetch_add(1, Ordering::SeqCst);
        if prev == num_workers - 1 {
            self.finished[cmd_index].store(0, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

/// Byte offset of the completion-info slot's sentinel field. The slot is a
/// single 8-byte cell per CMDQ entry.
pub const CMD_INFO_SLOT_SIZE: u64 = 8;

/// Publish the host-visible completion: write [`CMD_COMPLETED`] into this
/// collective's command-info slot, then `cmp_count` into the completion
/// region, then fence. Mirrors `ldo_dev_complete_coll`.
pub fn complete_coll<W: MemoryWindow>(
    window: &mut W,
    host_cmd_info_mkey: u32,
    host_cmd_info_addr: u64,
    cmd_index: u64,
    host_cmp_mkey: u32,
    host_cmp_addr: u64,
    cmp_count: u64,
) -> Result<(), W::Error> {
    let cmd_info_addr = host_cmd_info_addr + cmd_index * CMD_INFO_SLOT_SIZE;

    window.configure(host_cmd_info_mkey)?;
    window.raw_write(cmd_info_addr, &CMD_COMPLETED.to_ne_bytes())?;

    window.configure(host_cmp_mkey)?;
    window.raw_write(host_cmp_addr, &cmp_count.to_ne_bytes())?;

    window.writeback()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowPtr;
    use std::collections::HashMap;

    #[test]
    fn only_the_last_finisher_is_reported() {
        let coord = Coordinator::new(4);
        assert!(!coord.mark_finished(0, 3));
        assert!(!coord.mark_finished(0, 3));
        assert!(coord.mark_finished(0, 3));
    }

    #[test]
    fn counter_resets_after_last_finisher_so_slot_is_reusable() {
        let coord = Coordinator::new(1);
        assert!(!coord.mark_finished(0, 2));
        assert!(coord.mark_finished(0, 2));
        assert!(!coord.mark_finished(0, 2));
    }

    #[test]
    fn slots_are_independent() {
        let coord = Coordinator::new(2);
        assert!(coord.mark_finished(0, 1));
        assert!(!coord.mark_finished(1, 2));
        assert!(coord.mark_finished(1, 2));
    }

    #[derive(Default)]
    struct FakeWindow {
        regions: HashMap<u32, Vec<u8>>,
        configured: Option<u32>,
    }

    #[derive(Debug)]
    struct FakeWindowError;

    impl MemoryWindow for FakeWindow {
        type Error = FakeWindowError;

        fn configure(&mut self, mkey: u32) -> Result<(), Self::Error> {
            self.regions.entry(mkey).or_default();
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
            let mkey = self.configured.ok_or(FakeWindowError)?;
            let region = self.regions.get_mut(&mkey).unwrap();
            let start = addr as usize;
            if region.len() < start + len {
                region.resize(start + len, 0);
            }
            Ok(region[start..start + len].to_vec())
        }

        fn raw_write(&mut self, addr: u64, data: &[u8]) -> Result<(), Self::Error> {
            let mkey = self.configured.ok_or(FakeWindowError)?;
            let region = self.regions.get_mut(&mkey).unwrap();
            let start = addr as usize;
            if region.len() < start + data.len() {
                region.resize(start + data.len(), 0);
            }
            region[start..start + data.len()].copy_from_slice(data);
            Ok(())
        }
    }

    #[test]
    fn complete_coll_writes_sentinel_and_cmp_count() {
        let mut window = FakeWindow::default();
        complete_coll(&mut window, 1, 0, 2, 2, 0, 42).unwrap();

        window.configure(1).unwrap();
        let sentinel = window.raw_read_inv(2 * CMD_INFO_SLOT_SIZE, 8).unwrap();
        assert_eq!(u64::from_ne_bytes(sentinel.try_into().unwrap()), CMD_COMPLETED);

        window.configure(2).unwrap();
        let cmp = window.raw_read_inv(0, 8).unwrap();
        assert_eq!(u64::from_ne_bytes(cmp.try_into().unwrap()), 42);
    }
}

//! Memory window abstraction: `configure(mkey)` selects which remote
//! memory region subsequent accesses target, `ptr_acquire(addr)` maps an
//! address within that region, and the resulting pointer supports
//! `read_inv` (read with invalidate) or a write followed by `writeback`.
//!
//! Grounded in the `flexio_dev_window_mkey_config` /
//! `flexio_dev_window_ptr_acquire` / `__dpa_thread_window_writeback` call
//! sequence used throughout `original_source/src/dpa/ldo_state_host_cmd.c`
//! and `ldo_state_a2a_comp.c`.

/// A device-side memory window: one mkey configured at a time, with
/// pointers acquired against it.
///
/// Implementations are expected to make a pointer's validity tied to the
/// borrow of `&mut self` it holds, so that calling [`MemoryWindow::configure`]
/// again — which requires a fresh exclusive borrow — cannot compile while a
/// previously acquired [`WindowPtr`] is still alive. This mirrors the
/// hardware rule "a window pointer is only valid until the next
/// `mkey_config` call" at the type level instead of by convention.
pub trait MemoryWindow {
    /// Error type for window operations.
    type Error;

    /// Select the memory region subsequent `ptr_acquire` calls address.
    fn configure(&mut self, mkey: u32) -> Result<(), Self::Error>;

    /// Map `addr` within the currently configured region.
    fn ptr_acquire(&mut self, addr: u64) -> Result<WindowPtr<'_, Self>, Self::Error>
    where
        Self: Sized;

    /// Force any buffered writes out to the region (device writeback
    /// barrier). Affects all windows configured by this thread, not just
    /// the most recently acquired pointer.
    fn writeback(&mut self) -> Result<(), Self::Error>;

    /// Acquire a pointer at `addr` in the currently configured region and
    /// read `len` bytes with invalidate (the region may have been read
    /// through this window before; the cache line must not be stale).
    fn raw_read_inv(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, Self::Error>;

    /// Acquire a pointer at `addr` in the currently configured region and
    /// write `data` there. Does not imply a writeback; call
    /// [`MemoryWindow::writeback`] once all writes for this fence epoch are
    /// queued.
    fn raw_write(&mut self, addr: u64, data: &[u8]) -> Result<(), Self::Error>;
}

/// A pointer acquired from a [`MemoryWindow`], valid only for the lifetime
/// of the exclusive borrow that produced it.
pub struct WindowPtr<'a, W: MemoryWindow> {
    window: &'a mut W,
    addr: u64,
}

impl<'a, W: MemoryWindow> WindowPtr<'a, W> {
    /// Construct a pointer over `window` at `addr`. Implementations of
    /// [`MemoryWindow::ptr_acquire`] use this to hand back a borrow-scoped
    /// handle.
    pub fn new(window: &'a mut W, addr: u64) -> Self {
        Self { window, addr }
    }

    /// The address this pointer was acquired at.
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// Borrow the window mutably, e.g. to perform a read or write through
    /// whatever device-specific method the concrete window exposes.
    pub fn window_mut(&mut self) -> &mut W {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ByteWindow {
        regions: std::collections::HashMap<u32, Vec<u8>>,
        configured: Option<u32>,
    }

    #[derive(Debug)]
    struct ByteWindowError(&'static str);

    impl MemoryWindow for ByteWindow {
        type Error = ByteWindowError;

        fn configure(&mut self, mkey: u32) -> Result<(), Self::Error> {
            self.regions.entry(mkey).or_default();
            self.configured = Some(mkey);
            Ok(())
        }

        fn ptr_acquire(&mut self, addr: u64) -> Result<WindowPtr<'_, Self>, Self::Error> {
            if self.configured.is_none() {
                return Err(ByteWindowError("no region configured"));
            }
            Ok(WindowPtr::new(self, addr))
        }

        fn writeback(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn raw_read_inv(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, Self::Error> {
            Ok(self.read_inv(addr, len))
        }

        fn raw_write(&mut self, addr: u64, data: &[u8]) -> Result<(), Self::Error> {
            self.write(addr, data);
            Ok(())
        }
    }

    impl ByteWindow {
        fn read_inv(&mut self, addr: u64, len: usize) -> Vec<u8> {
            let mkey = self.configured.unwrap();
            let region = self.regions.get_mut(&mkey).unwrap();
            let start = addr as usize;
            if region.len() < start + len {
                region.resize(start + len, 0);
            }
            let out = region[start..start + len].to_vec();
            out
        }

        fn write(&mut self, addr: u64, data: &[u8]) {
            let mkey = self.configured.unwrap();
            let region = self.regions.get_mut(&mkey).unwrap();
            let start = addr as usize;
            if region.len() < start + data.len() {
                region.resize(start + data.len(), 0);
            }
            region[start..start + data.len()].copy_from_slice(data);
        }
    }

    #[test]
    fn acquire_fails_before_configure() {
        let mut w = ByteWindow::default();
        assert!(w.ptr_acquire(0).is_err());
    }

    #[test]
    fn configure_then_acquire_round_trips_data() {
        let mut w = ByteWindow::default();
        w.configure(5).unwrap();
        w.write(8, &[1, 2, 3, 4]);
        let ptr = w.ptr_acquire(8).unwrap();
        assert_eq!(ptr.addr(), 8);
        drop(ptr);
        assert_eq!(w.read_inv(8, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn reconfigure_switches_region() {
        let mut w = ByteWindow::default();
        w.configure(1).unwrap();
        w.write(0, &[0xaa]);
        w.configure(2).unwrap();
        w.write(0, &[0xbb]);
        assert_eq!(w.read_inv(0, 1), vec![0xbb]);
        w.configure(1).unwrap();
        assert_eq!(w.read_inv(0, 1), vec![0xaa]);
    }
}

//! Abstraction over the handful of thread-context primitives the worker
//! state machine needs beyond memory windows and CQ polling: ringing a
//! send-queue doorbell, arming a completion queue for the next hangup, and
//! fencing outstanding writes.
//!
//! Stands in for `flexio_dev_thread_ctx` in `original_source/src/dpa/*.c`
//! (`flexio_dev_qp_sq_ring_db`, `flexio_dev_cq_arm`,
//! `__dpa_thread_memory_writeback`).

/// Doorbell/arm/fence primitives a worker needs to hand control back to the
/// accelerator runtime.
pub trait Device {
    /// Ring the send-queue doorbell for `qpn`, announcing that WQEs are
    /// posted up to producer index `sq_pi`.
    fn ring_sq_db(&mut self, qpn: u32, sq_pi: u32);

    /// Arm completion queue `cqn` so the next CQE (at or after `cq_idx`)
    /// reschedules this thread.
    fn arm_cq(&mut self, cq_idx: u32, cqn: u32);

    /// Fence: ensure all prior WQE and window writes are globally visible
    /// before any subsequent doorbell ring.
    fn memory_writeback(&mut self);
}

//! A DPA (data-path accelerator) collective all-to-all worker: WQE
//! formatting, a completion-queue engine, and the cooperative worker state
//! machine that drives an RDMA-based all-to-all exchange from an
//! accelerator's programmable execution units.
//!
//! The [`worker`] module holds the three-state state machine
//! (`WaitHostCmd` → `WaitTrigger` → `WaitA2aComp`) that each worker thread
//! cycles through; [`entry`] exposes the host-callable setup/teardown/
//! dispatch points around it. [`wqe`] and [`cq`] are the bit-exact
//! mlx5-style wire formats everything else is built on.
//!
//! **WARNING: The interfaces are unstable and up to change!**

#[cfg(not(target_os = "linux"))]
compile_error!("this crate currently only supports Linux");

/// Power-of-two ring depths and the `L2V`/`L2M` helpers.
pub mod sizes;

/// Worker configuration, loaded from TOML or built programmatically.
pub mod config;

/// Bit-exact WQE formatters (RDMA Write, Atomic Fetch-and-Add, Wait-on-Data).
pub mod wqe;

/// Completion-queue engine: CQE parsing, owner-bit tracking, error handling.
pub mod cq;

/// The 64-byte host `Command` message.
pub mod cmd;

/// Memory window abstraction (`configure`/`ptr_acquire`/`writeback`).
pub mod window;

/// Abstraction over doorbell/arm/fence thread-context primitives.
pub mod device;

/// Poll-quota discipline bounding how long a progress hook may busy-poll.
pub mod quota;

/// The all-to-all driver: per-peer WQE posting and completion polling.
pub mod a2a;

/// Completion coordinator: tracks finished workers per CMDQ slot.
pub mod coordinator;

/// The worker state machine.
pub mod worker;

/// Host-callable entry points: setup, teardown, and per-activation dispatch.
pub mod entry;

/// In-memory simulation harness used by tests and demos to exercise the
/// full protocol without real RDMA hardware. Always compiled: integration
/// tests and `demos/` binaries link this crate as an ordinary dependency,
/// so a `cfg(test)` gate here would hide it from them (only this crate's
/// own `#[cfg(test)]` unit tests see that cfg).
pub mod sim;

pub use cmd::Command;
pub use coordinator::Coordinator;
pub use cq::CqEngine;
pub use device::Device;
pub use window::MemoryWindow;
pub use worker::{WorkerCtx, WorkerState};

//! The worker state machine: three states, each with an activation hook
//! (run once when the thread wakes), a progress hook (run in a busy-poll
//! loop bounded by the poll quota), and a hangup hook (run once before the
//! thread re-arms and yields).
//!
//! Grounded in `ldo_dev_worker` / `ldo_dev_progress_state` /
//! `ldo_dev_hangup` / `ldo_dev_activation` in
//! `original_source/src/dpa/ldo_worker.c`.

pub mod a2a_comp;
pub mod context;
pub mod host_cmd;
pub mod trigger;

use crate::coordinator::Coordinator;
use crate::device::Device;
use crate::quota::PollQuota;
use crate::window::MemoryWindow;

pub use context::{TrigWorkerDb, WorkerCtx};

/// The three states a worker cycles through, one host command at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for the host to post the next command.
    WaitHostCmd,
    /// Command read; waiting for the host trigger counter to cross the
    /// command's threshold.
    WaitTrigger,
    /// All-to-all posted; waiting for local sends and the remote
    /// completion flag to both land.
    WaitA2aComp,
}

/// Reap the trigger CQ, blocking until the arming WQE's completion lands.
/// Shared by every state's activation hook.
pub(crate) fn advance_trig_cq<W: MemoryWindow, D: Device>(ctx: &mut WorkerCtx<W, D>) {
    ctx.trig_cq
        .advance(&ctx.trig.cq_ring, Some(&mut ctx.trig.cq_dbr), true);
}

/// Run the activation hook for `ctx.state`. Mirrors `ldo_dev_activation`.
pub fn activation<W: MemoryWindow, D: Device>(ctx: &mut WorkerCtx<W, D>) -> Result<(), W::Error> {
    match ctx.state {
        WorkerState::WaitHostCmd => host_cmd::activation_host_cmd(ctx),
        WorkerState::WaitTrigger => {
            trigger::activation_trigger(ctx);
            Ok(())
        }
        WorkerState::WaitA2aComp => {
            a2a_comp::activation_a2a_comp(ctx);
            Ok(())
        }
    }
}

/// Run one progress step for `state`, returning the next state. Mirrors
/// `ldo_dev_progress_state`.
pub fn progress_state<W: MemoryWindow, D: Device>(
    ctx: &mut WorkerCtx<W, D>,
    coordinator: &Coordinator,
    state: WorkerState,
    quota: &PollQuota,
    hangup: &mut bool,
) -> Result<WorkerState, W::Error> {
    match state {
        WorkerState::WaitHostCmd => {
            host_cmd::process_host_cmd(ctx, quota, hangup)?;
            Ok(WorkerState::WaitTrigger)
        }
        WorkerState::WaitTrigger => {
            trigger::process_trigger(ctx, quota, hangup);
            Ok(WorkerState::WaitA2aComp)
        }
        WorkerState::WaitA2aComp => {
            a2a_comp::process_a2a_comp(ctx, coordinator, quota, hangup)?;
            Ok(WorkerState::WaitHostCmd)
        }
    }
}

/// Run the hangup hook for `state`. Mirrors `ldo_dev_hangup`.
pub fn hangup<W: MemoryWindow, D: Device>(ctx: &mut WorkerCtx<W, D>, state: WorkerState) {
    match state {
        WorkerState::WaitHostCmd => host_cmd::hangup_host_cmd(ctx),
        WorkerState::WaitTrigger => trigger::hangup_trigger(ctx),
        WorkerState::WaitA2aComp => a2a_comp::hangup_a2a_comp(ctx),
    }
}

/// Run one full wake cycle: activation, then progress-state in a loop
/// until a hook signals hangup, then the hangup hook. Mirrors the body of
/// `ldo_dev_worker`.
pub fn run_once<W: MemoryWindow, D: Device>(
    ctx: &mut WorkerCtx<W, D>,
    coordinator: &Coordinator,
    quota_usec: u64,
    clock: quanta::Clock,
) -> Result<(), W::Error> {
    let quota = PollQuota::start(clock, quota_usec);

    activation(ctx)?;

    let mut hangup_requested = false;
    let mut state = ctx.state;
    loop {
        state = progress_state(ctx, coordinator, state, &quota, &mut hangup_requested)?;
        if hangup_requested {
            break;
        }
    }

    hangup(ctx, state);
    ctx.state = state;
    Ok(())
}

//! Runs one full command cycle of a 2-rank all-to-all over the in-process
//! simulation harness: host posts a command and trips the trigger, both
//! workers post their write + Fetch-and-Add pairs, this demo plays the role
//! of the network fabric by copying the posted writes into the peer's own
//! memory and completing the CQEs a real NIC would produce, and both workers
//! run to completion and publish the host-visible sentinel.
//!
//! Run with `cargo run --example loopback_alltoall`.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ldo_collective::a2a::{NetPeer, NetWorkerDb};
use ldo_collective::cmd::{Command, CMD_COMPLETED};
use ldo_collective::coordinator::Coordinator;
use ldo_collective::cq::CqEngine;
use ldo_collective::entry;
use ldo_collective::sim::{SimDevice, SimMemory, SimWindow};
use ldo_collective::window::MemoryWindow;
use ldo_collective::worker::context::TrigWorkerDb;
use ldo_collective::worker::{WorkerCtx, WorkerState};

const SENDBUF_LKEY: u32 = 100;
const RECVBUF_RKEY: u32 = 101;
const HOST_CMD_BUF_MKEY: u32 = 102;
const HOST_CMD_INFO_MKEY: u32 = 103;
const HOST_CMP_MKEY: u32 = 104;
const DUMP_FILL_MKEY: u32 = 105;
const TRIGGER_MKEY: u32 = 106;
const MSG_SIZE: u32 = 8;

fn make_worker(
    myrank: u32,
    peer_qpn: u32,
    memory: Rc<std::cell::RefCell<SimMemory>>,
) -> WorkerCtx<SimWindow, SimDevice> {
    let self_peer = NetPeer {
        rank: myrank,
        qpn: None,
        sq_ring: vec![[0u8; 64]; 4],
        sq_mask: 3,
        remote_cmp_mkey: 0,
        remote_cmp_raddr: 0,
    };
    let other_peer = NetPeer {
        rank: 1 - myrank,
        qpn: Some(peer_qpn),
        sq_ring: vec![[0u8; 64]; 4],
        sq_mask: 3,
        remote_cmp_mkey: 0, // this demo delivers atomics directly, see deliver()
        remote_cmp_raddr: 0,
    };
    let peers = if myrank == 0 {
        vec![self_peer, other_peer]
    } else {
        vec![other_peer, self_peer]
    };

    WorkerCtx {
        cmd: Command::default(),
        cmp_count: 0,
        cmd_index: 0,
        state: WorkerState::WaitHostCmd,
        g_op_sq_pi: 0,
        trig: TrigWorkerDb::new(1, 1, 4, 4),
        trig_sq_pi: 0,
        trig_cq: CqEngine::new(3, 0),
        net: NetWorkerDb {
            peers,
            cq_ring: vec![[0u8; 64]; 4],
            cq_mask: 3,
        },
        net_cq: CqEngine::new(3, 0),
        net_round_start_cq_idx: 0,
        remote_cmp_flags: (0..16).map(|_| AtomicU64::new(0)).collect(),
        num_workers: 1,
        remote_ranks: 1,
        worker_mkey: 0,
        dump_fill_mkey: DUMP_FILL_MKEY,
        host_cmd_buf_mkey: HOST_CMD_BUF_MKEY,
        host_cmd_info_mkey: HOST_CMD_INFO_MKEY,
        host_cmd_info_addr: 0,
        host_cmp_mkey: HOST_CMP_MKEY,
        host_cmp_addr: 0,
        window: SimWindow::new(memory),
        device: SimDevice::default(),
    }
}

/// Flip the owner bit of the trigger CQ's next slot, standing in for the
/// hardware completing whatever Wait-on-Data WQE is currently armed there.
fn complete_next_trig_cqe(ctx: &mut WorkerCtx<SimWindow, SimDevice>) {
    let idx = (ctx.trig_cq.idx() & ctx.trig.cq_mask) as usize;
    ctx.trig.cq_ring[idx][63] = (1 - ctx.trig_cq.hw_owner_bit()) as u8;
}

/// Interpret the write + Fetch-and-Add pair `sender` posted for its one
/// peer: copy the written bytes into `dest`'s recvbuf, bump `dest`'s
/// remote-completion counter, and complete the sender's own expected-last
/// network CQE.
fn deliver(
    sender: &mut WorkerCtx<SimWindow, SimDevice>,
    sender_memory: &Rc<std::cell::RefCell<SimMemory>>,
    dest: &WorkerCtx<SimWindow, SimDevice>,
    dest_memory: &Rc<std::cell::RefCell<SimMemory>>,
) {
    let op_index = (sender.cmp_count as u32) & 0xf;
    let payload = sender_memory
        .borrow_mut()
        .read(SENDBUF_LKEY, (dest.cmd.my_rank as u64) * (MSG_SIZE as u64), MSG_SIZE as usize);
    dest_memory
        .borrow_mut()
        .write(RECVBUF_RKEY, (sender.cmd.my_rank as u64) * (MSG_SIZE as u64), &payload);

    dest.remote_cmp_flags[op_index as usize].fetch_add(1, Ordering::SeqCst);

    let cqe_idx = (sender.net_round_start_cq_idx & sender.net.cq_mask) as usize;
    sender.net.cq_ring[cqe_idx][63] = (1 - sender.net_cq.hw_owner_bit()) as u8;
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mem0 = SimMemory::new();
    let mem1 = SimMemory::new();
    let mut w0 = make_worker(0, 42, Rc::clone(&mem0));
    let mut w1 = make_worker(1, 43, Rc::clone(&mem1));

    {
        let mut workers = [w0, w1];
        entry::worker_setup(&mut workers)?;
        let [a, b] = workers;
        w0 = a;
        w1 = b;
    }

    // The host fills each rank's sendbuf, then posts the command and trips
    // the trigger.
    mem0.borrow_mut().write(SENDBUF_LKEY, 8, &[0xaa; 8]);
    mem1.borrow_mut().write(SENDBUF_LKEY, 0, &[0xbb; 8]);

    for (w, rank, mem) in [(&mut w0, 0u32, &mem0), (&mut w1, 1u32, &mem1)] {
        let cmd = Command {
            valid_count: 1,
            my_rank: rank,
            nranks: 2,
            msg_size: MSG_SIZE,
            sendbuf: 0,
            sendbuf_lkey: SENDBUF_LKEY,
            recvbuf: 0,
            recvbuf_rkey: RECVBUF_RKEY,
            trigger_loc: 0,
            trigger_lkey: TRIGGER_MKEY,
            trigger_threshold: 1,
        };
        w.window.configure(HOST_CMD_BUF_MKEY)?;
        w.window.raw_write(0, &cmd.pack())?;
        mem.borrow_mut().write(TRIGGER_MKEY, 0, &1u64.to_be_bytes());
        complete_next_trig_cqe(w);
    }

    let coordinator = Coordinator::new(16);
    let clock = quanta::Clock::new();

    log::info!("--- cycle 1: host command -> trigger ---");
    entry::worker(&mut w0, &coordinator, 200, clock.clone())?;
    entry::worker(&mut w1, &coordinator, 200, clock.clone())?;
    assert_eq!(w0.state, WorkerState::WaitA2aComp);
    assert_eq!(w1.state, WorkerState::WaitA2aComp);

    log::info!("--- simulating network delivery ---");
    deliver(&mut w0, &mem0, &w1, &mem1);
    deliver(&mut w1, &mem1, &w0, &mem0);
    complete_next_trig_cqe(&mut w0);
    complete_next_trig_cqe(&mut w1);

    log::info!("--- cycle 2: a2a completion -> back to host-cmd wait ---");
    entry::worker(&mut w0, &coordinator, 200, clock.clone())?;
    entry::worker(&mut w1, &coordinator, 200, clock)?;
    assert_eq!(w0.state, WorkerState::WaitHostCmd);
    assert_eq!(w1.state, WorkerState::WaitHostCmd);

    w0.window.configure(HOST_CMD_INFO_MKEY)?;
    let sentinel = u64::from_ne_bytes(w0.window.raw_read_inv(0, 8)?.try_into().unwrap());
    assert_eq!(sentinel, CMD_COMPLETED);

    let recv0 = mem0.borrow_mut().read(RECVBUF_RKEY, 0, 8);
    let recv1 = mem1.borrow_mut().read(RECVBUF_RKEY, 0, 8);
    log::info!("rank 0 recvbuf = {recv0:x?}");
    log::info!("rank 1 recvbuf = {recv1:x?}");
    log::info!("both ranks completed {} collective(s)", w0.cmp_count);

    entry::context_finalize(&[w0, w1]);

    Ok(())
}

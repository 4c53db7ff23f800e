//! End-to-end exercise of a 2-rank all-to-all: each rank posts its write +
//! Fetch-and-Add pair, this test plays network by interpreting the posted
//! WQEs and delivering them into the peer's own simulated memory, and then
//! the worker's own polling/completion code is left to notice delivery on
//! its own — nothing here pokes worker-internal state directly.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ldo_collective::a2a::{NetPeer, NetWorkerDb};
use ldo_collective::cmd::Command;
use ldo_collective::coordinator::Coordinator;
use ldo_collective::cq::CqEngine;
use ldo_collective::quota::PollQuota;
use ldo_collective::sim::{SimDevice, SimMemory, SimWindow};
use ldo_collective::window::MemoryWindow;
use ldo_collective::wqe::{CtrlSeg, DataSeg, RdmaSeg};
use ldo_collective::worker::context::TrigWorkerDb;
use ldo_collective::worker::{a2a_comp, trigger, WorkerCtx, WorkerState};

const SENDBUF_LKEY: u32 = 100;
const RECVBUF_RKEY: u32 = 101;
const HOST_CMD_BUF_MKEY: u32 = 102;
const HOST_CMD_INFO_MKEY: u32 = 103;
const HOST_CMP_MKEY: u32 = 104;
const DUMP_FILL_MKEY: u32 = 105;

fn make_worker(
    myrank: u32,
    peer_qpn: u32,
    memory: Rc<std::cell::RefCell<SimMemory>>,
) -> WorkerCtx<SimWindow, SimDevice> {
    let nranks = 2u32;
    let msg_size = 8u32;

    let cmd = Command {
        valid_count: 0,
        my_rank: myrank,
        nranks,
        msg_size,
        sendbuf: 0,
        sendbuf_lkey: SENDBUF_LKEY,
        recvbuf: 0,
        recvbuf_rkey: RECVBUF_RKEY,
        trigger_loc: 0,
        trigger_lkey: 0,
        trigger_threshold: 0,
    };

    let self_peer = NetPeer {
        rank: myrank,
        qpn: None,
        sq_ring: vec![[0u8; 64]; 4],
        sq_mask: 3,
        remote_cmp_mkey: 0,
        remote_cmp_raddr: 0,
    };
    let other_rank = 1 - myrank;
    let other_peer = NetPeer {
        rank: other_rank,
        qpn: Some(peer_qpn),
        sq_ring: vec![[0u8; 64]; 4],
        sq_mask: 3,
        remote_cmp_mkey: 0, // unused: this test delivers atomics directly
        remote_cmp_raddr: 0,
    };
    let peers = if myrank == 0 {
        vec![self_peer, other_peer]
    } else {
        vec![other_peer, self_peer]
    };

    WorkerCtx {
        cmd,
        cmp_count: 0,
        cmd_index: 0,
        state: WorkerState::WaitTrigger,
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

/// Deliver the write + Fetch-and-Add pair a worker posted for its one peer:
/// parse the two WQEs it placed in `peer.sq_ring`, copy the written bytes
/// into the destination's recvbuf, and bump the destination's
/// `remote_cmp_flags` counter directly (this sim doesn't model
/// `remote_cmp_flags` as addressable byte memory — see `sim.rs`'s doc
/// comment on `Device`).
fn deliver(
    sender: &mut WorkerCtx<SimWindow, SimDevice>,
    sender_memory: &Rc<std::cell::RefCell<SimMemory>>,
    dest: &WorkerCtx<SimWindow, SimDevice>,
    dest_memory: &Rc<std::cell::RefCell<SimMemory>>,
) {
    let op_index = (sender.cmp_count as u32) & 0xf;
    let sq_pi_write = sender.g_op_sq_pi.wrapping_sub(2);
    let sq_pi_atomic = sender.g_op_sq_pi.wrapping_sub(1);

    let (write_rdma, write_data) = {
        let peer = sender
            .net
            .peers
            .iter()
            .find(|p| p.qpn.is_some())
            .expect("exactly one live peer in this test");

        let write_bb = &peer.sq_ring[(sq_pi_write & peer.sq_mask) as usize];
        let write_ctrl = CtrlSeg::unpack(write_bb[0..16].try_into().unwrap());
        assert_eq!(write_ctrl.opcode, ldo_collective::wqe::opcode::RDMA_WRITE as u8);
        let write_rdma = {
            let rkey = u32::from_be_bytes(write_bb[16..20].try_into().unwrap());
            let raddr = u64::from_be_bytes(write_bb[24..32].try_into().unwrap());
            RdmaSeg { rkey, raddr }
        };
        let write_data = {
            let byte_count = u32::from_be_bytes(write_bb[32..36].try_into().unwrap());
            let lkey = u32::from_be_bytes(write_bb[36..40].try_into().unwrap());
            let addr = u64::from_be_bytes(write_bb[40..48].try_into().unwrap());
            DataSeg { byte_count, lkey, addr }
        };

        let atomic_bb = &peer.sq_ring[(sq_pi_atomic & peer.sq_mask) as usize];
        let atomic_ctrl = CtrlSeg::unpack(atomic_bb[0..16].try_into().unwrap());
        assert_eq!(
            atomic_ctrl.opcode,
            ldo_collective::wqe::opcode::ATOMIC_FETCH_AND_ADD as u8
        );

        (write_rdma, write_data)
    };

    assert_eq!(write_rdma.rkey, RECVBUF_RKEY);
    assert_eq!(write_data.lkey, SENDBUF_LKEY);

    let payload = sender_memory
        .borrow_mut()
        .read(write_data.lkey, write_data.addr, write_data.byte_count as usize);
    dest_memory
        .borrow_mut()
        .write(write_rdma.rkey, write_rdma.raddr, &payload);

    dest.remote_cmp_flags[op_index as usize].fetch_add(1, Ordering::SeqCst);

    // Stand in for the NIC appending a completion to the sender's own CQ
    // ring. A consumable CQE has its owner bit *opposite* the consumer's
    // currently expected `hw_owner_bit` (see `CqEngine::advance`); opcode
    // nibble 0 means success.
    let cqe_idx = (sender.net_round_start_cq_idx & sender.net.cq_mask) as usize;
    let owner = (1 - sender.net_cq.hw_owner_bit()) as u8;
    sender.net.cq_ring[cqe_idx][63] = owner;
}

#[test]
fn two_ranks_complete_an_alltoall_round_trip() {
    let mem0 = SimMemory::new();
    let mem1 = SimMemory::new();

    let mut w0 = make_worker(0, /* peer qpn */ 42, Rc::clone(&mem0));
    let mut w1 = make_worker(1, /* peer qpn */ 43, Rc::clone(&mem1));

    // Rank 0 sends [0xaa; 8] to rank 1's slot 0; rank 1 sends [0xbb; 8] to
    // rank 0's slot 0.
    mem0.borrow_mut().write(SENDBUF_LKEY, 8, &[0xaa; 8]); // sendbuf slot for peer rank 1
    mem1.borrow_mut().write(SENDBUF_LKEY, 0, &[0xbb; 8]); // sendbuf slot for peer rank 0

    let quota = PollQuota::start(quanta::Clock::new(), 10_000);
    let mut hangup0 = false;
    let mut hangup1 = false;

    trigger::process_trigger(&mut w0, &quota, &mut hangup0);
    trigger::process_trigger(&mut w1, &quota, &mut hangup1);

    // Both should have hung up: nothing has been delivered over the
    // network yet.
    assert!(hangup0);
    assert!(hangup1);

    deliver(&mut w0, &mem0, &w1, &mem1);
    deliver(&mut w1, &mem1, &w0, &mem0);

    // rank 1's recvbuf slot 0 now holds rank 0's payload, and vice versa.
    assert_eq!(mem1.borrow_mut().read(RECVBUF_RKEY, 0, 8), vec![0xaa; 8]);
    assert_eq!(mem0.borrow_mut().read(RECVBUF_RKEY, 0, 8), vec![0xbb; 8]);

    let op_index0 = (w0.cmp_count as u32) & 0xf;
    let op_index1 = (w1.cmp_count as u32) & 0xf;
    let done0 = ldo_collective::a2a::poll_until_a2a_comp(
        &mut w0.net_cq,
        &w0.net.cq_ring,
        &w0.remote_cmp_flags[op_index0 as usize],
        1,
        1,
        &quota,
    );
    let done1 = ldo_collective::a2a::poll_until_a2a_comp(
        &mut w1.net_cq,
        &w1.net.cq_ring,
        &w1.remote_cmp_flags[op_index1 as usize],
        1,
        1,
        &quota,
    );
    assert!(done0, "rank 0 should now observe its peer's completion");
    assert!(done1, "rank 1 should now observe its peer's completion");

    let coordinator = Coordinator::new(16);
    let mut hangup0 = false;
    let mut hangup1 = false;
    a2a_comp::process_a2a_comp(&mut w0, &coordinator, &quota, &mut hangup0).unwrap();
    a2a_comp::process_a2a_comp(&mut w1, &coordinator, &quota, &mut hangup1).unwrap();

    // Single worker per rank -> each is its own last finisher, so each
    // publishes its own host completion sentinel immediately.
    w0.window.configure(HOST_CMD_INFO_MKEY).unwrap();
    let sentinel0 = w0.window.raw_read_inv(0, 8).unwrap();
    assert_eq!(
        u64::from_ne_bytes(sentinel0.try_into().unwrap()),
        ldo_collective::cmd::CMD_COMPLETED
    );

    w1.window.configure(HOST_CMD_INFO_MKEY).unwrap();
    let sentinel1 = w1.window.raw_read_inv(0, 8).unwrap();
    assert_eq!(
        u64::from_ne_bytes(sentinel1.try_into().unwrap()),
        ldo_collective::cmd::CMD_COMPLETED
    );

    assert_eq!(w0.cmp_count, 1);
    assert_eq!(w1.cmp_count, 1);
}

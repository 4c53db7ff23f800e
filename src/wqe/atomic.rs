use super::{ce, ds, opcode, CtrlSeg, DataSeg, RdmaSeg, SwqeBb};

/// The 16-byte atomic segment: `swap_add` (holds the add operand for a
/// Fetch-and-Add) followed by `compare` (unused for Fetch-and-Add, must be
/// the swap operand, 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicSeg {
    /// The add operand for a Fetch-and-Add (the PRM's `swap_add` field).
    pub add: u64,
    /// The swap operand (the PRM's `compare` field); 0 for Fetch-and-Add.
    pub swap: u64,
}

impl AtomicSeg {
    /// Pack into the 16-byte wire representation.
    pub fn pack(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&self.add.to_be_bytes());
        out[8..16].copy_from_slice(&self.swap.to_be_bytes());
        out
    }

    /// Write into `bb` at the given byte offset.
    pub fn write_into(&self, bb: &mut SwqeBb, offset: usize) {
        bb[offset..offset + 16].copy_from_slice(&self.pack());
    }
}

/// Format a Fetch-and-Add(1) WQE with completion enabled (CE = always),
/// discarding the fetched value into a dump-fill mkey. Mirrors
/// `ldo_dev_format_rdma_atomic_comp` in
/// `original_source/src/dpa/ldo_a2a_wqes.c`.
///
/// Occupies 4 octowords (control, RDMA, atomic, local data).
pub fn format_rdma_atomic_comp(
    bb: &mut SwqeBb,
    sq_pi: u32,
    qpn: u32,
    rkey: u32,
    raddr: u64,
    dump_fill_mkey: u32,
) {
    let ctrl = CtrlSeg {
        opcode_mod: 0,
        wqe_index: sq_pi as u16,
        opcode: opcode::ATOMIC_FETCH_AND_ADD as u8,
        qpn,
        ds: ds::ATOMIC_FETCH_AND_ADD as u8,
        ce: ce::CQE_ALWAYS,
    };
    ctrl.write_into(bb);

    RdmaSeg { rkey, raddr }.write_into(bb, 16);

    AtomicSeg { add: 1, swap: 0 }.write_into(bb, 32);

    // Fetched value is discarded: local data segment targets the dump-fill
    // mkey at address 0, sized for one 8-byte atomic result.
    DataSeg {
        byte_count: 8,
        lkey: dump_fill_mkey,
        addr: 0,
    }
    .write_into(bb, 48);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wqe::CtrlSeg as Ctrl;

    #[test]
    fn atomic_wqe_has_expected_control_fields() {
        let mut bb: SwqeBb = [0; 64];
        format_rdma_atomic_comp(&mut bb, 9, 0x22, 0xabcd, 0x3000, 0x55);

        let ctrl = Ctrl::unpack(bb[0..16].try_into().unwrap());
        assert_eq!(ctrl.opcode, opcode::ATOMIC_FETCH_AND_ADD as u8);
        assert_eq!(ctrl.ds, ds::ATOMIC_FETCH_AND_ADD as u8);
        assert_eq!(ctrl.ce, ce::CQE_ALWAYS);
    }

    #[test]
    fn atomic_wqe_encodes_add_one_swap_zero() {
        let mut bb: SwqeBb = [0; 64];
        format_rdma_atomic_comp(&mut bb, 0, 1, 1, 0, 0xdead);

        assert_eq!(u64::from_be_bytes(bb[32..40].try_into().unwrap()), 1);
        assert_eq!(u64::from_be_bytes(bb[40..48].try_into().unwrap()), 0);
    }

    #[test]
    fn atomic_wqe_data_seg_targets_dump_fill_mkey() {
        let mut bb: SwqeBb = [0; 64];
        format_rdma_atomic_comp(&mut bb, 0, 1, 1, 0, 0x7777_7777);

        assert_eq!(u32::from_be_bytes(bb[48..52].try_into().unwrap()), 8);
        assert_eq!(
            u32::from_be_bytes(bb[52..56].try_into().unwrap()),
            0x7777_7777
        );
        assert_eq!(u64::from_be_bytes(bb[56..64].try_into().unwrap()), 0);
    }
}

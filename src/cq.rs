//! Completion-queue engine: owner-bit-driven consumption of 64-byte CQEs,
//! with DBR update and a fatal trap on error CQEs.
//!
//! Mirrors `ldo_dev_advance_cq` / `ldo_dev_advance_trig_cq` in
//! `original_source/src/dpa/ldo_cq.c`.

use log::error;

/// One raw 64-byte completion-queue entry.
pub type Cqe64 = [u8; 64];

/// Byte offsets of the error-CQE fields, matching
/// `struct dpa_mlx5_err_cqe64` in `original_source/src/dpa/ldo_dev.h`.
mod err_cqe {
    pub const SRQN: usize = 32;
    pub const HW_ERROR_SYNDROME: usize = 52;
    pub const HW_SYNDROME_TYPE: usize = 53;
    pub const VENDOR_ERR_SYND: usize = 54;
    pub const SYNDROME: usize = 55;
    pub const S_WQE_OPCODE_QPN: usize = 56;
    pub const OP_OWN: usize = 63;
}

/// Get the owner bit (bit 0 of the last byte) of a CQE.
#[inline]
pub fn cqe_owner(cqe: &Cqe64) -> u32 {
    (cqe[err_cqe::OP_OWN] & 0x1) as u32
}

/// Get the opcode (top 4 bits of the last byte) of a CQE. Zero means
/// success; any other value is an error CQE.
#[inline]
pub fn cqe_opcode(cqe: &Cqe64) -> u8 {
    cqe[err_cqe::OP_OWN] >> 4
}

/// Fields of an error CQE, extracted for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ErrCqeFields {
    /// Opcode that identifies this as an error CQE.
    pub opcode: u8,
    /// Error syndrome.
    pub syndrome: u8,
    /// Vendor-specific error syndrome.
    pub vendor_err_synd: u8,
    /// Hardware error syndrome.
    pub hw_error_syndrome: u8,
    /// Hardware syndrome type.
    pub hw_syndrome_type: u8,
    /// Opcode/QPN of the send WQE that caused the error, as written by the NIC.
    pub s_wqe_opcode_qpn: u32,
}

impl ErrCqeFields {
    /// Parse the error fields out of a raw CQE.
    pub fn parse(cqe: &Cqe64) -> Self {
        Self {
            opcode: cqe_opcode(cqe),
            syndrome: cqe[err_cqe::SYNDROME],
            vendor_err_synd: cqe[err_cqe::VENDOR_ERR_SYND],
            hw_error_syndrome: cqe[err_cqe::HW_ERROR_SYNDROME],
            hw_syndrome_type: cqe[err_cqe::HW_SYNDROME_TYPE],
            s_wqe_opcode_qpn: u32::from_be_bytes(
                cqe[err_cqe::S_WQE_OPCODE_QPN..err_cqe::S_WQE_OPCODE_QPN + 4]
                    .try_into()
                    .unwrap(),
            ),
        }
    }
}

/// Zero the 8-byte word containing `s_wqe_opcode_qpn` of `cqe`. Used by the
/// all-to-all driver (§4.4) to reset the Wait-on-Data sentinel before
/// posting new sends. `s_wqe_opcode_qpn` sits in the high half of the last
/// 8 bytes of the CQE (bytes 56..64); the whole word, not just the 4-byte
/// field, must be zeroed so the later WOD `INVERT-EQUAL` watches a clean
/// slate.
pub fn zero_cqe_sentinel_word(cqe: &mut Cqe64) {
    cqe[56..64].fill(0);
}

/// Owner-bit-tracking consumer of a completion-queue ring.
///
/// Owns `(idx, hw_owner_bit)` together, per the design note in spec.md §9,
/// so the two can never desynchronize behind the caller's back.
#[derive(Debug, Clone)]
pub struct CqEngine {
    idx: u32,
    hw_owner_bit: u32,
    mask: u32,
}

impl CqEngine {
    /// Create a new engine over a ring of depth `mask + 1`, starting at
    /// index 0 with the given initial hardware-owned bit value.
    pub fn new(mask: u32, initial_hw_owner_bit: u32) -> Self {
        Self {
            idx: 0,
            hw_owner_bit: initial_hw_owner_bit,
            mask,
        }
    }

    /// Current consumer index.
    pub fn idx(&self) -> u32 {
        self.idx
    }

    /// Current tracked hardware-owned bit value.
    pub fn hw_owner_bit(&self) -> u32 {
        self.hw_owner_bit
    }

    /// Advance the CQ, optionally blocking until a CQE is available.
    ///
    /// In blocking mode, busy-waits until the owner bit flips and always
    /// returns `Some`. In non-blocking mode, returns `None` immediately if
    /// the next slot is still hardware-owned.
    ///
    /// `cq_dbr`, if given, receives the updated consumer index after every
    /// successfully reaped CQE (doorbell record update).
    ///
    /// # Panics
    ///
    /// Panics after logging the syndrome fields if the reaped CQE carries a
    /// non-zero opcode (an error CQE) — per spec.md §7 this is fatal and
    /// terminates the worker thread; there is no recovery path.
    pub fn advance(
        &mut self,
        ring: &[Cqe64],
        cq_dbr: Option<&mut u32>,
        block: bool,
    ) -> Option<Cqe64> {
        let slot = (self.idx & self.mask) as usize;

        if block {
            while cqe_owner(&ring[slot]) == self.hw_owner_bit {
                std::hint::spin_loop();
            }
        } else if cqe_owner(&ring[slot]) == self.hw_owner_bit {
            return None;
        }

        let cqe = ring[slot];
        if cqe_opcode(&cqe) != 0 {
            let err = ErrCqeFields::parse(&cqe);
            error!(
                "error CQE: opcode=0x{:x} syndrome=0x{:x} vendor_syndrome=0x{:x} \
                 hw_err_syn=0x{:x} hw_syn_type=0x{:x}",
                err.opcode,
                err.syndrome,
                err.vendor_err_synd,
                err.hw_error_syndrome,
                err.hw_syndrome_type
            );
            panic!("fatal error CQE reaped: {:?}", err);
        }

        self.idx += 1;
        if let Some(dbr) = cq_dbr {
            *dbr = self.idx;
        }
        if self.idx & self.mask == 0 {
            self.hw_owner_bit = 1 - self.hw_owner_bit;
        }

        Some(cqe)
    }
}

//! Reason-specific views of the exit qualification.
//!
//! The qualification is one bit vector whose meaning depends on the exit
//! reason; this module provides the casts for the reasons the engine
//! emulates. Field layouts per Intel SDM Vol. 3C Tables 27-3 through 27-7.

use bitflags::bitflags;

use crate::fields::GpReg;

/// Raw exit qualification accompanying a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitQualification(pub u64);

bitflags! {
    /// Access rights requested from, or granted by, the translation layer.
    pub struct AccessRights: u8 {
        const READ    = 1 << 0;
        const WRITE   = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

bitflags! {
    /// EPT-violation qualification bits (Table 27-7).
    pub struct EptViolationQual: u64 {
        /// The access was a data read.
        const READ              = 1 << 0;
        /// The access was a data write.
        const WRITE             = 1 << 1;
        /// The access was an instruction fetch.
        const EXECUTE           = 1 << 2;
        /// The translation allowed reads.
        const PAGE_READABLE     = 1 << 3;
        /// The translation allowed writes.
        const PAGE_WRITABLE     = 1 << 4;
        /// The translation allowed instruction fetches.
        const PAGE_EXECUTABLE   = 1 << 5;
        /// The guest-linear address field is valid.
        const LINEAR_VALID      = 1 << 7;
        /// The violation occurred during a guest page walk.
        const DURING_PAGE_WALK  = 1 << 8;
    }
}

impl EptViolationQual {
    /// The access the guest attempted.
    pub fn requested(self) -> AccessRights {
        let mut rights = AccessRights::empty();
        if self.contains(EptViolationQual::READ) {
            rights |= AccessRights::READ;
        }
        if self.contains(EptViolationQual::WRITE) {
            rights |= AccessRights::WRITE;
        }
        if self.contains(EptViolationQual::EXECUTE) {
            rights |= AccessRights::EXECUTE;
        }
        rights
    }

    /// What the current translation allows; empty means not present.
    pub fn allowed(self) -> AccessRights {
        let mut rights = AccessRights::empty();
        if self.contains(EptViolationQual::PAGE_READABLE) {
            rights |= AccessRights::READ;
        }
        if self.contains(EptViolationQual::PAGE_WRITABLE) {
            rights |= AccessRights::WRITE;
        }
        if self.contains(EptViolationQual::PAGE_EXECUTABLE) {
            rights |= AccessRights::EXECUTE;
        }
        rights
    }

    /// Whether any translation exists for the faulting address.
    pub fn page_present(self) -> bool {
        !self.allowed().is_empty()
    }
}

/// Control-register access decode (Table 27-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrAccess {
    MovToCr { cr: u8, reg: GpReg },
    MovFromCr { cr: u8, reg: GpReg },
    Clts,
    /// LMSW with its 16-bit source operand.
    Lmsw { source: u16 },
}

/// Debug-register access decode (Table 27-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrAccess {
    pub dr: u8,
    /// True for MOV to DR, false for MOV from DR.
    pub write: bool,
    pub reg: GpReg,
}

/// I/O-instruction decode (Table 27-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoAccess {
    /// Access width in bytes: 1, 2 or 4.
    pub size: u8,
    /// True for IN, false for OUT.
    pub input: bool,
    /// String instruction (INS/OUTS).
    pub string: bool,
    /// REP prefixed.
    pub rep: bool,
    pub port: u16,
}

impl ExitQualification {
    /// Interpretation for EPT violations.
    pub fn ept_violation(self) -> EptViolationQual {
        EptViolationQual::from_bits_truncate(self.0)
    }

    /// Interpretation for control-register accesses.
    pub fn cr_access(self) -> CrAccess {
        let cr = (self.0 & 0xF) as u8;
        let reg = GpReg::from_nibble((self.0 >> 8) as u8);
        match (self.0 >> 4) & 0b11 {
            0 => CrAccess::MovToCr { cr, reg },
            1 => CrAccess::MovFromCr { cr, reg },
            2 => CrAccess::Clts,
            _ => CrAccess::Lmsw {
                source: ((self.0 >> 16) & 0xFFFF) as u16,
            },
        }
    }

    /// Interpretation for debug-register accesses.
    pub fn dr_access(self) -> DrAccess {
        DrAccess {
            dr: (self.0 & 0b111) as u8,
            write: self.0 & (1 << 4) == 0,
            reg: GpReg::from_nibble((self.0 >> 8) as u8),
        }
    }

    /// Interpretation for I/O instructions.
    pub fn io_access(self) -> IoAccess {
        IoAccess {
            size: (self.0 & 0b111) as u8 + 1,
            input: self.0 & (1 << 3) != 0,
            string: self.0 & (1 << 4) != 0,
            rep: self.0 & (1 << 5) != 0,
            port: ((self.0 >> 16) & 0xFFFF) as u16,
        }
    }
}

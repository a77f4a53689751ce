//! The VMCS field subset the exit engine reads and writes.
//!
//! Encodings come from Intel SDM Vol. 3C Appendix B. The accessor behind
//! [`crate::accessor::VmcsAccessor`] owns the full field space; the engine
//! only ever names the fields below.

/// VMCS fields touched by the engine.
#[rustfmt::skip]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VmcsField {
    // Control fields.
    CpuBasedVmExecControl       = 0x4002,
    VmEntryIntrInfoField        = 0x4016,
    VmEntryExceptionErrorCode   = 0x4018,
    VmEntryInstructionLen       = 0x401A,
    VmxPreemptionTimerValue     = 0x482E,
    Cr0ReadShadow               = 0x6004,
    Cr4ReadShadow               = 0x6006,
    // Read-only exit information.
    ExitReason                  = 0x4402,
    VmExitIntrInfo              = 0x4404,
    VmExitIntrErrorCode         = 0x4406,
    VmExitInstructionLen        = 0x440C,
    GuestPhysicalAddress        = 0x2400,
    ExitQualification           = 0x6400,
    GuestLinearAddress          = 0x640A,
    // Guest state.
    GuestInterruptibilityState  = 0x4824,
    GuestCr0                    = 0x6800,
    GuestCr3                    = 0x6802,
    GuestCr4                    = 0x6804,
    GuestRsp                    = 0x681C,
    GuestRip                    = 0x681E,
    GuestRflags                 = 0x6820,
}

impl VmcsField {
    /// Raw field encoding.
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

/// "Interrupt-window exiting" bit of the processor-based execution controls.
pub const INTERRUPT_WINDOW_EXITING: u64 = 1 << 2;

/// Interruptibility-state bits cleared when the engine skips an instruction,
/// so an emulated STI or MOV SS cannot keep the injection window closed.
pub const BLOCKING_BY_STI: u64 = 1 << 0;
pub const BLOCKING_BY_MOV_SS: u64 = 1 << 1;

/// Size of the general-purpose register file threaded through entry and exit.
pub const REGFILE_SIZE: usize = 16;

/// General-purpose registers, in the architectural numbering used by the
/// register fields of exit qualifications (SDM Vol. 3C Table 27-3).
#[rustfmt::skip]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum GpReg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8  = 8,
    R9  = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl GpReg {
    /// Index into the register file.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decodes a 4-bit register field from an exit qualification.
    pub fn from_nibble(raw: u8) -> GpReg {
        match raw & 0xF {
            0 => GpReg::Rax,
            1 => GpReg::Rcx,
            2 => GpReg::Rdx,
            3 => GpReg::Rbx,
            4 => GpReg::Rsp,
            5 => GpReg::Rbp,
            6 => GpReg::Rsi,
            7 => GpReg::Rdi,
            8 => GpReg::R8,
            9 => GpReg::R9,
            10 => GpReg::R10,
            11 => GpReg::R11,
            12 => GpReg::R12,
            13 => GpReg::R13,
            14 => GpReg::R14,
            _ => GpReg::R15,
        }
    }
}

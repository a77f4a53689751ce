//! Guest event injection.
//!
//! Covers both directions of the interruption-information format: decoding
//! the exit field the processor fills on exception and interrupt exits, and
//! encoding the entry field that makes the next VM entry deliver an event.
//! See Intel SDM Vol. 3C Table 24-17 (entry) and Section 27.2.2 (exit).

/// Exception vectors of the architectural IDT range.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionVector {
    DivideError             = 0,
    Debug                   = 1,
    Nmi                     = 2,
    Breakpoint              = 3,
    Overflow                = 4,
    BoundRange              = 5,
    InvalidOpcode           = 6,
    DeviceNotAvailable      = 7,
    DoubleFault             = 8,
    InvalidTss              = 10,
    SegmentNotPresent       = 11,
    StackFault              = 12,
    GeneralProtection       = 13,
    PageFault               = 14,
    FpuError                = 16,
    AlignmentCheck          = 17,
    MachineCheck            = 18,
    SimdError               = 19,
    VirtualizationException = 20,
}

impl ExceptionVector {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Vectors whose delivery pushes an error code.
    pub const fn has_error_code(self) -> bool {
        matches!(
            self,
            ExceptionVector::DoubleFault
                | ExceptionVector::InvalidTss
                | ExceptionVector::SegmentNotPresent
                | ExceptionVector::StackFault
                | ExceptionVector::GeneralProtection
                | ExceptionVector::PageFault
                | ExceptionVector::AlignmentCheck
        )
    }
}

/// Interruption type, bits 10:8 of the interruption-information fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionType {
    ExternalInterrupt,
    Reserved,
    Nmi,
    HardwareException,
    SoftwareInterrupt,
    PrivilegedSoftwareException,
    SoftwareException,
    Other,
}

impl InterruptionType {
    pub fn from_raw(raw: u32) -> InterruptionType {
        match (raw >> 8) & 0b111 {
            0 => InterruptionType::ExternalInterrupt,
            1 => InterruptionType::Reserved,
            2 => InterruptionType::Nmi,
            3 => InterruptionType::HardwareException,
            4 => InterruptionType::SoftwareInterrupt,
            5 => InterruptionType::PrivilegedSoftwareException,
            6 => InterruptionType::SoftwareException,
            _ => InterruptionType::Other,
        }
    }

    pub const fn as_u32(self) -> u32 {
        match self {
            InterruptionType::ExternalInterrupt => 0,
            InterruptionType::Reserved => 1,
            InterruptionType::Nmi => 2,
            InterruptionType::HardwareException => 3,
            InterruptionType::SoftwareInterrupt => 4,
            InterruptionType::PrivilegedSoftwareException => 5,
            InterruptionType::SoftwareException => 6,
            InterruptionType::Other => 7,
        }
    }
}

const VECTOR_MASK: u32 = 0xFF;
const DELIVER_ERROR_CODE: u32 = 1 << 11;
const VALID: u32 = 1 << 31;

/// One event to deliver into the guest, or one the guest was delivering when
/// it trapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub vector: u8,
    pub kind: InterruptionType,
    pub error_code: Option<u32>,
}

impl Event {
    /// A hardware exception without an error code.
    pub const fn exception(vector: ExceptionVector) -> Event {
        Event {
            vector: vector.as_u8(),
            kind: InterruptionType::HardwareException,
            error_code: None,
        }
    }

    /// A hardware exception carrying an error code.
    pub const fn exception_with_code(vector: ExceptionVector, code: u32) -> Event {
        Event {
            vector: vector.as_u8(),
            kind: InterruptionType::HardwareException,
            error_code: Some(code),
        }
    }

    /// #GP with a zero error code, the usual answer to a privileged
    /// operation the emulation rejects.
    pub const fn general_protection() -> Event {
        Event::exception_with_code(ExceptionVector::GeneralProtection, 0)
    }

    /// #UD, the answer to instructions this hypervisor does not virtualize.
    pub const fn invalid_opcode() -> Event {
        Event::exception(ExceptionVector::InvalidOpcode)
    }

    /// #PF with the given architectural error code.
    pub const fn page_fault(code: u32) -> Event {
        Event::exception_with_code(ExceptionVector::PageFault, code)
    }

    /// An external interrupt vector.
    pub const fn external(vector: u8) -> Event {
        Event {
            vector,
            kind: InterruptionType::ExternalInterrupt,
            error_code: None,
        }
    }

    pub const fn nmi() -> Event {
        Event {
            vector: ExceptionVector::Nmi.as_u8(),
            kind: InterruptionType::Nmi,
            error_code: None,
        }
    }

    /// Encodes the VM-entry interruption-information field for this event.
    pub fn entry_info(&self) -> u32 {
        let mut info = (self.vector as u32) | (self.kind.as_u32() << 8) | VALID;
        if self.error_code.is_some() {
            info |= DELIVER_ERROR_CODE;
        }
        info
    }

    /// Decodes an exit interruption-information field. `None` when the valid
    /// bit is clear (no event was being delivered).
    pub fn from_exit_info(info: u32, error_code: u32) -> Option<Event> {
        if info & VALID == 0 {
            return None;
        }
        Some(Event {
            vector: (info & VECTOR_MASK) as u8,
            kind: InterruptionType::from_raw(info),
            error_code: if info & DELIVER_ERROR_CODE != 0 {
                Some(error_code)
            } else {
                None
            },
        })
    }
}

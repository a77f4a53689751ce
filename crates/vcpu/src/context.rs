//! Per-trap snapshot of guest state.

use utils::{GuestPhysAddr, GuestVirtAddr};

use crate::accessor::VmcsAccessor;
use crate::errors::VcpuError;
use crate::events::Event;
use crate::exits::ExitReason;
use crate::fields::{GpReg, VmcsField, REGFILE_SIZE};
use crate::qualification::ExitQualification;

/// Proof that the accessor just returned from guest execution and the saved
/// state is fresh.
///
/// Minted by the controller once per trap and consumed by value in
/// [`ExitContext::capture`]. There is no other constructor, so the type
/// system already rules out capturing the same trap twice:
///
/// ```compile_fail
/// let token = vcpu::CaptureToken(());
/// ```
pub struct CaptureToken(());

impl CaptureToken {
    pub(crate) fn new() -> CaptureToken {
        CaptureToken(())
    }
}

/// Immutable snapshot of the guest at trap time.
///
/// Owned by the current trap-handling invocation and dropped when the
/// decision has been applied; the only copy that outlives a trap is the one
/// embedded in a failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitContext {
    /// Basic exit reason, low 16 bits of the exit-reason field.
    pub raw_reason: u16,
    /// Entry-failure flag, bit 31 of the exit-reason field.
    pub entry_failure: bool,
    pub rip: u64,
    pub rsp: u64,
    pub rflags: u64,
    /// Guest general-purpose registers in architectural order.
    pub regs: [u64; REGFILE_SIZE],
    /// Reason-specific auxiliary data.
    pub qualification: ExitQualification,
    /// Length of the exiting instruction, for RIP forwarding.
    pub instruction_len: u32,
    /// Faulting guest-physical address; meaningful on EPT exits.
    pub guest_phys_addr: GuestPhysAddr,
    /// Faulting guest-linear address, when the qualification marks it valid.
    pub guest_linear_addr: GuestVirtAddr,
    /// The event the guest was delivering when it trapped, if any.
    pub interrupt_info: Option<Event>,
}

impl ExitContext {
    /// Captures the trap snapshot in one pass over the saved state.
    ///
    /// Consumes the per-trap token. A read failure here means the saved
    /// state itself cannot be trusted; the caller must terminate the vCPU
    /// rather than resume it.
    pub fn capture<A: VmcsAccessor>(
        _token: CaptureToken,
        accessor: &A,
        regs: &[u64; REGFILE_SIZE],
    ) -> Result<ExitContext, VcpuError> {
        let raw = accessor.read(VmcsField::ExitReason)?;
        let intr_info = accessor.read(VmcsField::VmExitIntrInfo)? as u32;
        let intr_error = accessor.read(VmcsField::VmExitIntrErrorCode)? as u32;
        Ok(ExitContext {
            raw_reason: (raw & 0xFFFF) as u16,
            entry_failure: raw & (1 << 31) != 0,
            rip: accessor.read(VmcsField::GuestRip)?,
            rsp: regs[GpReg::Rsp.index()],
            rflags: accessor.read(VmcsField::GuestRflags)?,
            regs: *regs,
            qualification: ExitQualification(accessor.read(VmcsField::ExitQualification)?),
            instruction_len: accessor.read(VmcsField::VmExitInstructionLen)? as u32,
            guest_phys_addr: GuestPhysAddr::new(
                accessor.read(VmcsField::GuestPhysicalAddress)? as usize
            ),
            guest_linear_addr: GuestVirtAddr::new(
                accessor.read(VmcsField::GuestLinearAddress)? as usize
            ),
            interrupt_info: Event::from_exit_info(intr_info, intr_error),
        })
    }

    /// Resolves the catalog member, or the raw code when outside the catalog.
    pub fn reason(&self) -> Result<ExitReason, u16> {
        ExitReason::from_u16(self.raw_reason)
    }

    /// Value of a general-purpose register at trap time.
    pub fn reg(&self, reg: GpReg) -> u64 {
        self.regs[reg.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::VmxError;
    use crate::testing::FakeAccessor;

    #[test]
    fn capture_reads_the_saved_state() {
        let mut accessor = FakeAccessor::default();
        accessor.set(VmcsField::ExitReason, 10);
        accessor.set(VmcsField::GuestRip, 0x1000);
        accessor.set(VmcsField::GuestRflags, 0x202);
        accessor.set(VmcsField::ExitQualification, 0x44);
        accessor.set(VmcsField::VmExitInstructionLen, 2);
        accessor.set(VmcsField::GuestPhysicalAddress, 0xcafe_0000);

        let mut regs = [0u64; REGFILE_SIZE];
        regs[GpReg::Rax.index()] = 1;
        regs[GpReg::Rsp.index()] = 0x8000;

        let ctx = ExitContext::capture(CaptureToken::new(), &accessor, &regs).unwrap();
        assert_eq!(ctx.reason(), Ok(ExitReason::Cpuid));
        assert!(!ctx.entry_failure);
        assert_eq!(ctx.rip, 0x1000);
        assert_eq!(ctx.rsp, 0x8000);
        assert_eq!(ctx.reg(GpReg::Rax), 1);
        assert_eq!(ctx.qualification, ExitQualification(0x44));
        assert_eq!(ctx.instruction_len, 2);
        assert_eq!(ctx.guest_phys_addr.as_u64(), 0xcafe_0000);
        assert_eq!(ctx.interrupt_info, None);
    }

    #[test]
    fn capture_decodes_the_entry_failure_flag() {
        let mut accessor = FakeAccessor::default();
        accessor.set(VmcsField::ExitReason, 33 | (1 << 31));

        let regs = [0u64; REGFILE_SIZE];
        let ctx = ExitContext::capture(CaptureToken::new(), &accessor, &regs).unwrap();
        assert!(ctx.entry_failure);
        assert_eq!(ctx.reason(), Ok(ExitReason::InvalidGuestState));
    }

    #[test]
    fn capture_failure_is_fatal() {
        let mut accessor = FakeAccessor::default();
        accessor.fail_reads_of(VmcsField::GuestRip);

        let regs = [0u64; REGFILE_SIZE];
        let err = ExitContext::capture(CaptureToken::new(), &accessor, &regs).unwrap_err();
        assert_eq!(err, VcpuError::HardwareFailure(VmxError::FailInvalid));
    }
}

//! Error taxonomy of the exit engine.
//!
//! Two layers: [`VmxError`] is what the hardware accessor reports,
//! [`VcpuError`] is what the engine itself diagnoses. Every `VcpuError` is
//! fatal for the affected vCPU; faults with an architectural reflection never
//! reach this module, they become event injections inside the handlers.

use crate::context::ExitContext;
use crate::exits::ExitReason;
use crate::fields::VmcsField;
use crate::vcpu::RunState;
use utils::GuestPhysAddr;

/// VM-instruction error numbers.
///
/// See Intel SDM Vol. 3C Table 30-1. Reported by the accessor when a VMX
/// operation fails with a valid current VMCS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionError {
    /// VMCALL executed in VMX root operation.
    VmcallInRoot,
    /// VMCLEAR with an invalid physical address.
    VmclearBadAddress,
    /// VMCLEAR with the VMXON pointer.
    VmclearVmxonPointer,
    /// VMLAUNCH with a non-clear VMCS.
    LaunchNonClearVmcs,
    /// VMRESUME with a non-launched VMCS.
    ResumeNonLaunchedVmcs,
    /// VMRESUME after VMXOFF.
    ResumeAfterVmxoff,
    /// VM entry with invalid control fields.
    EntryBadControlFields,
    /// VM entry with invalid host-state fields.
    EntryBadHostState,
    /// VMPTRLD with an invalid physical address.
    PtrldBadAddress,
    /// VMPTRLD with the VMXON pointer.
    PtrldVmxonPointer,
    /// VMPTRLD with a wrong VMCS revision identifier.
    PtrldBadRevision,
    /// VMREAD or VMWRITE to an unsupported component.
    UnsupportedComponent,
    /// VMWRITE to a read-only component.
    WriteReadOnlyComponent,
    /// VMXON executed in VMX root operation.
    VmxonInRoot,
    /// VM entry with an invalid executive-VMCS pointer.
    EntryBadExecPointer,
    /// VM entry with a non-launched executive VMCS.
    EntryNonLaunchedExec,
    /// VM entry with an executive-VMCS pointer that is not the VMXON pointer.
    EntryExecNotVmxon,
    /// VMCALL with a non-clear VMCS.
    VmcallNonClearVmcs,
    /// VMCALL with invalid VM-exit control fields.
    VmcallBadExitFields,
    /// VMCALL with a wrong MSEG revision identifier.
    VmcallBadMsegRevision,
    /// VMXOFF under the dual-monitor treatment of SMIs and SMM.
    VmxoffDualMonitor,
    /// VMCALL with invalid SMM-monitor features.
    VmcallBadSmmFeatures,
    /// VM entry with invalid execution controls in the executive VMCS.
    EntryBadExecControls,
    /// VM entry with events blocked by MOV SS.
    EntryBlockedByMovSs,
    /// Invalid operand to INVEPT or INVVPID.
    BadInveptOperand,
    /// Any number outside the architectural table.
    Unknown,
}

impl InstructionError {
    /// Decodes the VM-instruction error field.
    pub fn from_raw(err: u64) -> InstructionError {
        match err {
            1 => InstructionError::VmcallInRoot,
            2 => InstructionError::VmclearBadAddress,
            3 => InstructionError::VmclearVmxonPointer,
            4 => InstructionError::LaunchNonClearVmcs,
            5 => InstructionError::ResumeNonLaunchedVmcs,
            6 => InstructionError::ResumeAfterVmxoff,
            7 => InstructionError::EntryBadControlFields,
            8 => InstructionError::EntryBadHostState,
            9 => InstructionError::PtrldBadAddress,
            10 => InstructionError::PtrldVmxonPointer,
            11 => InstructionError::PtrldBadRevision,
            12 => InstructionError::UnsupportedComponent,
            13 => InstructionError::WriteReadOnlyComponent,
            15 => InstructionError::VmxonInRoot,
            16 => InstructionError::EntryBadExecPointer,
            17 => InstructionError::EntryNonLaunchedExec,
            18 => InstructionError::EntryExecNotVmxon,
            19 => InstructionError::VmcallNonClearVmcs,
            20 => InstructionError::VmcallBadExitFields,
            22 => InstructionError::VmcallBadMsegRevision,
            23 => InstructionError::VmxoffDualMonitor,
            24 => InstructionError::VmcallBadSmmFeatures,
            25 => InstructionError::EntryBadExecControls,
            26 => InstructionError::EntryBlockedByMovSs,
            28 => InstructionError::BadInveptOperand,
            _ => InstructionError::Unknown,
        }
    }
}

/// Failures reported by the hardware accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmxError {
    /// The operation failed with a valid current VMCS; the instruction error
    /// field says why.
    FailValid(InstructionError),
    /// The operation failed without a valid current VMCS.
    FailInvalid,
    /// The accessor does not implement the requested field.
    UnsupportedField(VmcsField),
}

/// Fatal engine-level errors. Each of these forces the vCPU to `Terminated`;
/// the hardware state cannot be trusted afterwards and nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcpuError {
    /// An operation was attempted in a run state that does not allow it.
    InvalidState { found: RunState },
    /// The hardware reported a failure on launch, resume or a field access.
    HardwareFailure(VmxError),
    /// The memory-translation collaborator failed while resolving a fault.
    TranslationFailure(GuestPhysAddr),
    /// Disallowed guest operation with no defined architectural reflection.
    PolicyViolation(&'static str),
}

impl From<VmxError> for VcpuError {
    fn from(err: VmxError) -> Self {
        VcpuError::HardwareFailure(err)
    }
}

/// Why a vCPU stopped servicing traps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The raw exit code is outside the catalog and the default policy
    /// terminates on unknown reasons.
    UnknownExit(u16),
    /// A known reason with no registered handler under a terminating default
    /// policy.
    Unhandled(ExitReason),
    /// The guest triple-faulted.
    TripleFault,
    /// A guest-physical access hit a misconfigured EPT entry.
    EptMisconfiguration,
    /// VM entry failed coming back into the guest.
    EntryFailure(ExitReason),
    /// The host requested a cooperative stop.
    StopRequested,
    /// A fatal engine error.
    Fatal(VcpuError),
}

/// The structured report handed to the host when a vCPU terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub reason: TerminationReason,
    /// The last context captured before termination, when one exists.
    pub context: Option<ExitContext>,
}

//! The opaque hardware-state accessor.

use crate::errors::VmxError;
use crate::fields::{VmcsField, REGFILE_SIZE};

/// Interface to the hardware-owned virtualization state.
///
/// The host environment supplies the implementation: on metal it wraps the
/// raw VMX instructions and the entry/exit assembly stub, in tests it is an
/// in-memory fake. The engine never touches hardware except through this
/// trait.
///
/// `launch` must be issued exactly once per vCPU lifetime, before any
/// `resume`; resuming a context that was never launched is undefined at the
/// hardware level, so the controller guards the ordering and implementations
/// may assume it. Both calls block the calling thread until the guest traps
/// back out; they are the engine's only suspension points.
///
/// The register file passed to `launch`/`resume` is live in both directions:
/// guest registers are loaded from it on entry and the trap-time values are
/// stored back into it before the call returns. Implementations keep the
/// RSP slot coherent with the corresponding saved-state field.
pub trait VmcsAccessor {
    /// Reads a saved-state or control field.
    fn read(&self, field: VmcsField) -> Result<u64, VmxError>;

    /// Writes a saved-state or control field.
    fn write(&mut self, field: VmcsField, value: u64) -> Result<(), VmxError>;

    /// One-time guest launch. Returns when the guest traps.
    fn launch(&mut self, regs: &mut [u64; REGFILE_SIZE]) -> Result<(), VmxError>;

    /// Re-enters a previously launched guest. Returns when the guest traps.
    fn resume(&mut self, regs: &mut [u64; REGFILE_SIZE]) -> Result<(), VmxError>;
}

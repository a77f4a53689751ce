//! Guest-issued VMX instructions.
//!
//! Nested virtualization is not supported: a guest that tries to run its own
//! hypervisor sees the same #UD it would get on a machine without VMX.

use crate::context::ExitContext;
use crate::dispatch::ResumeDecision;
use crate::errors::VcpuError;
use crate::events::Event;
use crate::platform::Platform;
use crate::state::VcpuState;

pub(crate) fn reject<P: Platform>(
    ctx: &ExitContext,
    _state: &mut VcpuState,
    _platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    log::debug!(
        "guest attempted VMX operation (exit {:#x}) at rip {:#x}",
        ctx.raw_reason,
        ctx.rip
    );
    Ok(ResumeDecision::InjectEvent(Event::invalid_opcode()))
}

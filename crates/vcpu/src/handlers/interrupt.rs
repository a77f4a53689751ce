//! Asynchronous events: exceptions, NMIs, interrupts and the timer.

use crate::context::ExitContext;
use crate::dispatch::ResumeDecision;
use crate::errors::VcpuError;
use crate::events::InterruptionType;
use crate::platform::Platform;
use crate::state::VcpuState;

pub(crate) fn exception_or_nmi<P: Platform>(
    ctx: &ExitContext,
    _state: &mut VcpuState,
    platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    match ctx.interrupt_info {
        Some(event) if event.kind == InterruptionType::Nmi => {
            platform.nmi();
            Ok(ResumeDecision::reenter())
        }
        Some(event) => {
            // Guest exceptions are the guest's problem: reflect them with
            // their original vector and error code.
            log::debug!(
                "reflecting vector {} (error code {:?})",
                event.vector,
                event.error_code
            );
            Ok(ResumeDecision::InjectEvent(event))
        }
        None => Err(VcpuError::PolicyViolation(
            "exception exit without interruption information",
        )),
    }
}

pub(crate) fn external_interrupt<P: Platform>(
    ctx: &ExitContext,
    _state: &mut VcpuState,
    platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    // The vector is only present with acknowledge-on-exit; without it the
    // host IDT already took the interrupt.
    if let Some(event) = ctx.interrupt_info {
        platform.external_interrupt(event.vector);
    }
    Ok(ResumeDecision::reenter())
}

/// Interrupt- and NMI-window exits: the guest just became able to accept an
/// event, deliver the oldest queued one.
pub(crate) fn injection_window<P: Platform>(
    _ctx: &ExitContext,
    state: &mut VcpuState,
    _platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    match state.pop_event() {
        Some(event) => Ok(ResumeDecision::InjectEvent(event)),
        None => Ok(ResumeDecision::reenter()),
    }
}

pub(crate) fn preemption_timer<P: Platform>(
    _ctx: &ExitContext,
    state: &mut VcpuState,
    _platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    // The controller re-arms the timer from `timer_reload` on entry; the
    // exit itself carries no guest-visible change.
    log::trace!("preemption timer expired, re-arming {:?}", state.timer_reload);
    Ok(ResumeDecision::reenter())
}

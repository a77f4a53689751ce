//! Guest-physical memory faults.

use crate::context::ExitContext;
use crate::dispatch::ResumeDecision;
use crate::errors::{TerminationReason, VcpuError};
use crate::events::Event;
use crate::platform::{Platform, TranslationOutcome};
use crate::state::VcpuState;

pub(crate) fn violation<P: Platform>(
    ctx: &ExitContext,
    _state: &mut VcpuState,
    platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    let qual = ctx.qualification.ept_violation();
    let access = qual.requested();
    match platform.translate(ctx.guest_phys_addr, access) {
        Ok(TranslationOutcome::Mapped(host)) => {
            log::trace!(
                "mapped {} -> {} for {:?}, re-executing",
                ctx.guest_phys_addr,
                host,
                access
            );
            Ok(ResumeDecision::reenter())
        }
        Ok(TranslationOutcome::Denied) => {
            log::debug!(
                "{:?} access to {} denied (page allows {:?})",
                access,
                ctx.guest_phys_addr,
                qual.allowed()
            );
            Ok(ResumeDecision::InjectEvent(Event::general_protection()))
        }
        Err(_) => Err(VcpuError::TranslationFailure(ctx.guest_phys_addr)),
    }
}

pub(crate) fn misconfiguration<P: Platform>(
    ctx: &ExitContext,
    _state: &mut VcpuState,
    _platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    log::error!("EPT misconfiguration at {}", ctx.guest_phys_addr);
    Ok(ResumeDecision::Terminate(
        TerminationReason::EptMisconfiguration,
    ))
}

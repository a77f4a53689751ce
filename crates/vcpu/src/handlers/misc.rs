//! Small handlers without a module of their own.

use crate::context::ExitContext;
use crate::dispatch::ResumeDecision;
use crate::errors::{TerminationReason, VcpuError};
use crate::events::Event;
use crate::exits::ExitReason;
use crate::fields::GpReg;
use crate::platform::Platform;
use crate::state::VcpuState;

const XCR0_X87: u64 = 1 << 0;
const XCR0_SSE: u64 = 1 << 1;
const XCR0_AVX: u64 = 1 << 2;

/// Exits that carry no guest-visible effect on this single-vCPU engine.
pub(crate) fn ignore<P: Platform>(
    ctx: &ExitContext,
    _state: &mut VcpuState,
    _platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    log::trace!("ignoring exit {:#x}", ctx.raw_reason);
    Ok(ResumeDecision::reenter())
}

pub(crate) fn triple_fault<P: Platform>(
    ctx: &ExitContext,
    _state: &mut VcpuState,
    _platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    log::error!("guest triple fault at rip {:#x}", ctx.rip);
    Ok(ResumeDecision::Terminate(TerminationReason::TripleFault))
}

pub(crate) fn hlt<P: Platform>(
    _ctx: &ExitContext,
    _state: &mut VcpuState,
    platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    platform.halted();
    Ok(ResumeDecision::advance())
}

/// INVD and WBINVD: the caches stay host-managed, the instruction is a
/// no-op from the guest's point of view.
pub(crate) fn cache_invalidate<P: Platform>(
    _ctx: &ExitContext,
    _state: &mut VcpuState,
    _platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    Ok(ResumeDecision::advance())
}

pub(crate) fn xsetbv<P: Platform>(
    ctx: &ExitContext,
    _state: &mut VcpuState,
    platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    let index = ctx.reg(GpReg::Rcx) as u32;
    let value = (ctx.reg(GpReg::Rdx) << 32) | (ctx.reg(GpReg::Rax) & 0xFFFF_FFFF);

    // Only XCR0 exists; x87 must stay enabled and AVX requires SSE.
    let valid = index == 0
        && value & XCR0_X87 != 0
        && !(value & XCR0_AVX != 0 && value & XCR0_SSE == 0);
    if !valid || !platform.xsetbv(index, value) {
        log::debug!("rejecting xsetbv {:#x} <- {:#x}", index, value);
        return Ok(ResumeDecision::InjectEvent(Event::general_protection()));
    }
    Ok(ResumeDecision::advance())
}

/// Exits whose basic reason reports a failed VM entry. The guest state is
/// not trustworthy anymore, so the vCPU terminates.
pub(crate) fn entry_failure<P: Platform>(
    ctx: &ExitContext,
    _state: &mut VcpuState,
    _platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    let reason = ctx.reason().unwrap_or(ExitReason::InvalidGuestState);
    log::error!("VM entry failed: {}", reason.name());
    Ok(ResumeDecision::Terminate(TerminationReason::EntryFailure(
        reason,
    )))
}

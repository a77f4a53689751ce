//! RDMSR/WRMSR emulation.
//!
//! Intercepted MSRs are served from the per-vCPU shadow table; everything
//! else inside the architectural ranges passes through to the host. Both
//! instructions use ECX as the index and split the value across EDX:EAX.

use crate::context::ExitContext;
use crate::dispatch::ResumeDecision;
use crate::errors::VcpuError;
use crate::events::Event;
use crate::fields::GpReg;
use crate::msr;
use crate::platform::Platform;
use crate::state::VcpuState;

pub(crate) fn read<P: Platform>(
    ctx: &ExitContext,
    state: &mut VcpuState,
    platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    let index = ctx.reg(GpReg::Rcx) as u32;
    if !msr::is_valid_index(index) {
        log::debug!("rdmsr {:#x}: outside the architectural ranges", index);
        return Ok(ResumeDecision::InjectEvent(Event::general_protection()));
    }

    let value = match state.msr(index) {
        Some(shadowed) => shadowed,
        None => match platform.read_msr(index) {
            Some(value) => value,
            None => {
                log::debug!("rdmsr {:#x}: host rejected the read", index);
                return Ok(ResumeDecision::InjectEvent(Event::general_protection()));
            }
        },
    };

    // The high halves of RAX and RDX are cleared by RDMSR.
    state.set_reg(GpReg::Rax, value & 0xFFFF_FFFF);
    state.set_reg(GpReg::Rdx, value >> 32);
    log::trace!("rdmsr {:#x} -> {:#x}", index, value);
    Ok(ResumeDecision::advance())
}

pub(crate) fn write<P: Platform>(
    ctx: &ExitContext,
    state: &mut VcpuState,
    platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    let index = ctx.reg(GpReg::Rcx) as u32;
    let value = (ctx.reg(GpReg::Rdx) << 32) | (ctx.reg(GpReg::Rax) & 0xFFFF_FFFF);
    if !msr::is_valid_index(index) {
        log::debug!("wrmsr {:#x}: outside the architectural ranges", index);
        return Ok(ResumeDecision::InjectEvent(Event::general_protection()));
    }
    if index == msr::IA32_EFER && value & !msr::EFER_KNOWN != 0 {
        log::debug!("wrmsr EFER {:#x}: reserved bits set", value);
        return Ok(ResumeDecision::InjectEvent(Event::general_protection()));
    }

    if !state.set_msr(index, value) && !platform.write_msr(index, value) {
        log::debug!("wrmsr {:#x}: host rejected the write", index);
        return Ok(ResumeDecision::InjectEvent(Event::general_protection()));
    }
    log::trace!("wrmsr {:#x} <- {:#x}", index, value);
    Ok(ResumeDecision::advance())
}

//! Control- and debug-register access emulation.

use crate::context::ExitContext;
use crate::dispatch::ResumeDecision;
use crate::errors::VcpuError;
use crate::events::Event;
use crate::platform::Platform;
use crate::qualification::CrAccess;
use crate::state::VcpuState;

const CR0_PE: u64 = 1 << 0;
const CR0_TS: u64 = 1 << 3;
const CR0_NW: u64 = 1 << 29;
const CR0_CD: u64 = 1 << 30;
/// Bits 63:32 of CR0 are reserved.
const CR0_RESERVED: u64 = 0xFFFF_FFFF_0000_0000;
/// The low 4 CR0 bits LMSW may touch (PE, MP, EM, TS).
const CR0_LMSW_MASK: u64 = 0xF;

/// CR4 bits a guest may set. VMXE is excluded: the guest sees no VMX
/// capability, so the bit is reserved from its point of view.
const CR4_ALLOWED: u64 = 0x01FF_7FFF & !(1 << 13);

pub(crate) fn cr_access<P: Platform>(
    ctx: &ExitContext,
    state: &mut VcpuState,
    _platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    match ctx.qualification.cr_access() {
        CrAccess::MovToCr { cr, reg } => {
            let value = ctx.reg(reg);
            match cr {
                0 => {
                    // NW without CD is an invalid cache configuration.
                    if value & CR0_RESERVED != 0
                        || (value & CR0_NW != 0 && value & CR0_CD == 0)
                    {
                        log::debug!("rejecting CR0 write {:#x}", value);
                        return Ok(ResumeDecision::InjectEvent(Event::general_protection()));
                    }
                    state.set_cr0(value);
                }
                3 => state.set_cr3(value),
                4 => {
                    if value & !CR4_ALLOWED != 0 {
                        log::debug!("rejecting CR4 write {:#x}", value);
                        return Ok(ResumeDecision::InjectEvent(Event::general_protection()));
                    }
                    state.set_cr4(value);
                }
                _ => return Err(VcpuError::PolicyViolation("unsupported control register")),
            }
            Ok(ResumeDecision::advance())
        }
        CrAccess::MovFromCr { cr, reg } => {
            let value = match cr {
                0 => state.cr.cr0,
                3 => state.cr.cr3,
                4 => state.cr.cr4,
                _ => return Err(VcpuError::PolicyViolation("unsupported control register")),
            };
            state.set_reg(reg, value);
            Ok(ResumeDecision::advance())
        }
        CrAccess::Clts => {
            state.set_cr0(state.cr.cr0 & !CR0_TS);
            Ok(ResumeDecision::advance())
        }
        CrAccess::Lmsw { source } => {
            // LMSW updates the low four bits but can never clear PE.
            let low = source as u64 & CR0_LMSW_MASK;
            let pe = (state.cr.cr0 | low) & CR0_PE;
            let value = (state.cr.cr0 & !CR0_LMSW_MASK) | (low & !CR0_PE) | pe;
            state.set_cr0(value);
            Ok(ResumeDecision::advance())
        }
    }
}

pub(crate) fn dr_access<P: Platform>(
    ctx: &ExitContext,
    state: &mut VcpuState,
    _platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    let access = ctx.qualification.dr_access();
    if access.write {
        let value = ctx.reg(access.reg);
        match access.dr {
            n @ 0..=3 => state.debug.dr[n as usize] = value,
            6 | 7 => {
                // Bits 63:32 of DR6 and DR7 are reserved.
                if value >> 32 != 0 {
                    log::debug!("rejecting DR{} write {:#x}", access.dr, value);
                    return Ok(ResumeDecision::InjectEvent(Event::general_protection()));
                }
                if access.dr == 6 {
                    state.debug.dr6 = value;
                } else {
                    state.debug.dr7 = value;
                }
            }
            // DR4 and DR5 trap as undefined on this core.
            _ => return Ok(ResumeDecision::InjectEvent(Event::invalid_opcode())),
        }
    } else {
        let value = match access.dr {
            n @ 0..=3 => state.debug.dr[n as usize],
            6 => state.debug.dr6,
            7 => state.debug.dr7,
            _ => return Ok(ResumeDecision::InjectEvent(Event::invalid_opcode())),
        };
        state.set_reg(access.reg, value);
    }
    Ok(ResumeDecision::advance())
}

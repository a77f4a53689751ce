//! Port I/O emulation.

use crate::context::ExitContext;
use crate::dispatch::ResumeDecision;
use crate::errors::VcpuError;
use crate::events::Event;
use crate::fields::GpReg;
use crate::platform::Platform;
use crate::state::VcpuState;

pub(crate) fn handle<P: Platform>(
    ctx: &ExitContext,
    state: &mut VcpuState,
    platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    let io = ctx.qualification.io_access();
    if io.string || io.rep {
        // String forms would need the instruction emulator; reject them.
        log::debug!("rejecting string I/O on port {:#x}", io.port);
        return Ok(ResumeDecision::InjectEvent(Event::general_protection()));
    }

    if io.input {
        let value = platform.io_read(io.port, io.size) as u64;
        let rax = ctx.reg(GpReg::Rax);
        // IN merges by operand size; 32-bit results clear the upper half.
        let merged = match io.size {
            1 => (rax & !0xFF) | (value & 0xFF),
            2 => (rax & !0xFFFF) | (value & 0xFFFF),
            _ => value & 0xFFFF_FFFF,
        };
        state.set_reg(GpReg::Rax, merged);
        log::trace!("in {:#x}/{} -> {:#x}", io.port, io.size, value);
    } else {
        let mask: u64 = match io.size {
            1 => 0xFF,
            2 => 0xFFFF,
            _ => 0xFFFF_FFFF,
        };
        let value = (ctx.reg(GpReg::Rax) & mask) as u32;
        platform.io_write(io.port, io.size, value);
        log::trace!("out {:#x}/{} <- {:#x}", io.port, io.size, value);
    }
    Ok(ResumeDecision::advance())
}

//! CPUID interception.

use crate::context::ExitContext;
use crate::dispatch::ResumeDecision;
use crate::errors::VcpuError;
use crate::fields::GpReg;
use crate::platform::{CpuidResult, Platform};
use crate::state::VcpuState;

/// Leaf 1 ECX feature bits the guest must not see: VMX because nested
/// operation is rejected, MONITOR because MWAIT exits are not emulated.
const LEAF1_ECX_VMX: u32 = 1 << 5;
const LEAF1_ECX_MONITOR: u32 = 1 << 3;

/// Hypervisor CPUID range, zeroed so the guest cannot discover the host.
const HV_LEAF_FIRST: u32 = 0x4000_0000;
const HV_LEAF_LAST: u32 = 0x4000_00FF;

pub(crate) fn handle<P: Platform>(
    ctx: &ExitContext,
    state: &mut VcpuState,
    platform: &mut P,
) -> Result<ResumeDecision, VcpuError> {
    let leaf = ctx.reg(GpReg::Rax) as u32;
    let subleaf = ctx.reg(GpReg::Rcx) as u32;

    let mut out = if (HV_LEAF_FIRST..=HV_LEAF_LAST).contains(&leaf) {
        CpuidResult::default()
    } else {
        platform.cpuid(leaf, subleaf)
    };
    if leaf == 1 {
        out.ecx &= !(LEAF1_ECX_VMX | LEAF1_ECX_MONITOR);
    }
    log::trace!(
        "cpuid {:#x}.{:#x} -> eax={:#x} ebx={:#x} ecx={:#x} edx={:#x}",
        leaf,
        subleaf,
        out.eax,
        out.ebx,
        out.ecx,
        out.edx
    );

    // CPUID zero-extends into the full 64-bit registers.
    state.set_reg(GpReg::Rax, out.eax as u64);
    state.set_reg(GpReg::Rbx, out.ebx as u64);
    state.set_reg(GpReg::Rcx, out.ecx as u64);
    state.set_reg(GpReg::Rdx, out.edx as u64);
    Ok(ResumeDecision::advance())
}

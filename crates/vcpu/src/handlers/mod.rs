//! One handler per exit-reason class.
//!
//! Handlers are pure with respect to everything except the passed
//! [`VcpuState`](crate::state::VcpuState) and the platform collaborators.
//! They never touch the saved state directly; register writes land in the
//! live register file and shadow updates are flushed by the controller
//! before the next entry.

mod cpuid;
mod cr;
mod ept;
mod interrupt;
mod io;
mod misc;
mod msr;
mod vmxop;

use crate::dispatch::Handler;
use crate::exits::ExitReason;
use crate::platform::Platform;

/// Registers the built-in handlers into a dense table.
pub(crate) fn install<P: Platform>(table: &mut [Option<Handler<P>>]) {
    use ExitReason::*;

    let mut set = |reason: ExitReason, handler: Handler<P>| {
        table[reason.as_u16() as usize] = Some(handler);
    };

    set(ExceptionOrNmi, interrupt::exception_or_nmi);
    set(ExternalInterrupt, interrupt::external_interrupt);
    set(InterruptWindow, interrupt::injection_window);
    set(NmiWindow, interrupt::injection_window);
    set(PreemptionTimerExpired, interrupt::preemption_timer);

    set(TripleFault, misc::triple_fault);
    set(InitSignal, misc::ignore);
    set(StartupIpi, misc::ignore);
    set(Hlt, misc::hlt);
    set(Invd, misc::cache_invalidate);
    set(Wbinvd, misc::cache_invalidate);
    set(Xsetbv, misc::xsetbv);
    set(InvalidGuestState, misc::entry_failure);
    set(MsrLoading, misc::entry_failure);
    set(MceDuringVmentry, misc::entry_failure);

    set(Cpuid, cpuid::handle);
    set(CrAccess, cr::cr_access);
    set(DrAccess, cr::dr_access);
    set(IoInstruction, io::handle);
    set(MsrRead, msr::read);
    set(MsrWrite, msr::write);
    set(EptViolation, ept::violation);
    set(EptMisconfig, ept::misconfiguration);

    for reason in [
        Vmcall, Vmclear, Vmlaunch, Vmptrld, Vmptrst, Vmread, Vmresume, Vmwrite, Vmxoff, Vmxon,
        Invept, Invvpid,
    ] {
        set(reason, vmxop::reject);
    }
}

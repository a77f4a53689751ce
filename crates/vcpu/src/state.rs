//! Persistent per-vCPU state.
//!
//! One instance lives from VM creation to teardown and is exclusively owned
//! by the controller; handlers receive it by `&mut`. Everything mutable here
//! is either flushed to the saved state before the next entry (shadows,
//! timer) or consumed by the entry path itself (injections), which is what
//! keeps the guest from ever observing a half-applied update.

use bitflags::bitflags;

use crate::events::Event;
use crate::fields::{GpReg, REGFILE_SIZE};
use crate::msr;

/// Capacity of the pending-event queue.
pub const PENDING_EVENTS: usize = 8;

/// Intercepted MSRs and their architectural reset values.
#[rustfmt::skip]
const MSR_SHADOWS: [(u32, u64); 7] = [
    (msr::IA32_APIC_BASE,   0xFEE0_0900),
    (msr::IA32_MISC_ENABLE, 0x1),
    (msr::IA32_SYSENTER_CS,  0),
    (msr::IA32_SYSENTER_ESP, 0),
    (msr::IA32_SYSENTER_EIP, 0),
    (msr::IA32_PAT,         0x0007_0406_0007_0406),
    (msr::IA32_EFER,        0),
];

bitflags! {
    /// Shadows that must be written back to the saved state before entry.
    pub struct Dirty: u8 {
        const CR0 = 1 << 0;
        const CR3 = 1 << 1;
        const CR4 = 1 << 2;
    }
}

/// Control-register shadows, the values the guest believes are in effect.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CrShadows {
    pub cr0: u64,
    pub cr3: u64,
    pub cr4: u64,
}

impl core::fmt::Debug for CrShadows {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CrShadows")
            .field("cr0", &format_args!("{:#x}", self.cr0))
            .field("cr3", &format_args!("{:#x}", self.cr3))
            .field("cr4", &format_args!("{:#x}", self.cr4))
            .finish()
    }
}

/// Debug-register shadows.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DebugRegs {
    pub dr: [u64; 4],
    pub dr6: u64,
    pub dr7: u64,
}

impl core::fmt::Debug for DebugRegs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DebugRegs")
            .field("dr", &format_args!("{:x?}", self.dr))
            .field("dr6", &format_args!("{:#x}", self.dr6))
            .field("dr7", &format_args!("{:#x}", self.dr7))
            .finish()
    }
}

/// Persistent state of one virtual CPU.
///
/// `Clone + PartialEq` so tests can compare full before/after snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcpuState {
    /// Live general-purpose register file, threaded through every entry.
    pub regs: [u64; REGFILE_SIZE],
    pub cr: CrShadows,
    pub debug: DebugRegs,
    /// Which shadows have changed since the last entry.
    pub dirty: Dirty,
    /// Event to inject on the next entry, decided by the last handler.
    pub inject: Option<Event>,
    /// Preemption-timer value re-armed on every entry, when configured.
    pub timer_reload: Option<u32>,
    /// Whether the vCPU is between launch and termination.
    pub active: bool,
    msr_shadow: [(u32, u64); MSR_SHADOWS.len()],
    pending: [Option<Event>; PENDING_EVENTS],
    pending_head: usize,
    pending_len: usize,
}

impl VcpuState {
    /// State at virtual power-on.
    pub fn new() -> VcpuState {
        VcpuState {
            regs: [0; REGFILE_SIZE],
            cr: CrShadows {
                cr0: 0x6000_0010,
                cr3: 0,
                cr4: 0,
            },
            debug: DebugRegs {
                dr: [0; 4],
                dr6: 0xFFFF_0FF0,
                dr7: 0x400,
            },
            dirty: Dirty::empty(),
            inject: None,
            timer_reload: None,
            active: false,
            msr_shadow: MSR_SHADOWS,
            pending: [None; PENDING_EVENTS],
            pending_head: 0,
            pending_len: 0,
        }
    }

    pub fn reg(&self, reg: GpReg) -> u64 {
        self.regs[reg.index()]
    }

    pub fn set_reg(&mut self, reg: GpReg, value: u64) {
        self.regs[reg.index()] = value;
    }

    /// Commits a CR0 value. Validation happened in the handler.
    pub fn set_cr0(&mut self, value: u64) {
        self.cr.cr0 = value;
        self.dirty |= Dirty::CR0;
    }

    pub fn set_cr3(&mut self, value: u64) {
        self.cr.cr3 = value;
        self.dirty |= Dirty::CR3;
    }

    pub fn set_cr4(&mut self, value: u64) {
        self.cr.cr4 = value;
        self.dirty |= Dirty::CR4;
    }

    /// Reads a shadowed MSR. `None` when the MSR is not intercepted.
    pub fn msr(&self, addr: u32) -> Option<u64> {
        self.msr_shadow
            .iter()
            .find(|(a, _)| *a == addr)
            .map(|(_, v)| *v)
    }

    /// Writes a shadowed MSR. `false` when the MSR is not intercepted.
    pub fn set_msr(&mut self, addr: u32, value: u64) -> bool {
        match self.msr_shadow.iter_mut().find(|(a, _)| *a == addr) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Queues an event for delivery at the next injection window. `false`
    /// when the queue is full and the event was dropped.
    pub fn queue_event(&mut self, event: Event) -> bool {
        if self.pending_len == PENDING_EVENTS {
            return false;
        }
        let tail = (self.pending_head + self.pending_len) % PENDING_EVENTS;
        self.pending[tail] = Some(event);
        self.pending_len += 1;
        true
    }

    /// Takes the oldest queued event.
    pub fn pop_event(&mut self) -> Option<Event> {
        if self.pending_len == 0 {
            return None;
        }
        let event = self.pending[self.pending_head].take();
        self.pending_head = (self.pending_head + 1) % PENDING_EVENTS;
        self.pending_len -= 1;
        event
    }

    /// Number of events waiting for an injection window.
    pub fn pending_events(&self) -> usize {
        self.pending_len
    }
}

impl Default for VcpuState {
    fn default() -> VcpuState {
        VcpuState::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_values() {
        let state = VcpuState::new();
        assert_eq!(state.cr.cr0, 0x6000_0010);
        assert_eq!(state.debug.dr7, 0x400);
        assert_eq!(state.msr(msr::IA32_EFER), Some(0));
        assert_eq!(state.msr(msr::IA32_PAT), Some(0x0007_0406_0007_0406));
        assert!(state.dirty.is_empty());
        assert!(!state.active);
    }

    #[test]
    fn cr_writes_mark_dirty() {
        let mut state = VcpuState::new();
        state.set_cr3(0x1000);
        assert_eq!(state.cr.cr3, 0x1000);
        assert_eq!(state.dirty, Dirty::CR3);
        state.set_cr0(0x8000_0011);
        assert_eq!(state.dirty, Dirty::CR0 | Dirty::CR3);
    }

    #[test]
    fn msr_shadowing() {
        let mut state = VcpuState::new();
        assert!(state.set_msr(msr::IA32_EFER, msr::EFER_LME));
        assert_eq!(state.msr(msr::IA32_EFER), Some(msr::EFER_LME));
        // Not intercepted.
        assert!(!state.set_msr(0x10, 42));
        assert_eq!(state.msr(0x10), None);
    }

    #[test]
    fn event_queue_is_fifo_and_bounded() {
        let mut state = VcpuState::new();
        assert_eq!(state.pop_event(), None);

        for vector in 0..PENDING_EVENTS as u8 {
            assert!(state.queue_event(Event::external(0x20 + vector)));
        }
        assert!(!state.queue_event(Event::external(0xFF)));
        assert_eq!(state.pending_events(), PENDING_EVENTS);

        for vector in 0..PENDING_EVENTS as u8 {
            assert_eq!(state.pop_event(), Some(Event::external(0x20 + vector)));
        }
        assert_eq!(state.pop_event(), None);

        // The ring wraps.
        assert!(state.queue_event(Event::nmi()));
        assert_eq!(state.pop_event(), Some(Event::nmi()));
    }
}

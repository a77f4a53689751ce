//! Entry/exit controller: the run-state machine around guest execution.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::accessor::VmcsAccessor;
use crate::context::{CaptureToken, ExitContext};
use crate::dispatch::{DefaultPolicy, DispatchTable, ResumeDecision};
use crate::errors::{FailureReport, TerminationReason, VcpuError};
use crate::exits::ExitReason;
use crate::fields::{
    VmcsField, BLOCKING_BY_MOV_SS, BLOCKING_BY_STI, INTERRUPT_WINDOW_EXITING,
};
use crate::platform::Platform;
use crate::state::{Dirty, VcpuState};

/// CR4.VMXE, kept set in the real register while hidden behind the shadow.
const CR4_VMXE: u64 = 1 << 13;

/// Static configuration of one vCPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpuConfig {
    /// Policy for unhandled and unknown exit reasons.
    pub default_policy: DefaultPolicy,
    /// Preemption-timer value re-armed on every entry, when set.
    pub preemption_timer: Option<u32>,
}

impl Default for VcpuConfig {
    fn default() -> VcpuConfig {
        VcpuConfig {
            default_policy: DefaultPolicy::Terminate,
            preemption_timer: None,
        }
    }
}

/// Controller run states. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Running,
    ExitPending,
    Terminated,
}

/// One virtual CPU: accessor, platform, dispatch table and persistent state,
/// driven by a single host thread.
pub struct Vcpu<A, P> {
    accessor: A,
    platform: P,
    table: DispatchTable<P>,
    state: VcpuState,
    run_state: RunState,
    launched: bool,
    last_context: Option<ExitContext>,
}

impl<A: VmcsAccessor, P: Platform> Vcpu<A, P> {
    pub fn new(accessor: A, platform: P, config: VcpuConfig) -> Vcpu<A, P> {
        let mut state = VcpuState::new();
        state.timer_reload = config.preemption_timer;
        Vcpu {
            accessor,
            platform,
            table: DispatchTable::new(config.default_policy),
            state,
            run_state: RunState::Created,
            launched: false,
            last_context: None,
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn state(&self) -> &VcpuState {
        &self.state
    }

    /// Mutable state access, for seeding registers before launch.
    pub fn state_mut(&mut self) -> &mut VcpuState {
        &mut self.state
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn into_parts(self) -> (A, P) {
        (self.accessor, self.platform)
    }

    /// Runs the vCPU from launch until it terminates, returning the final
    /// report. The stop flag is observed at every trap boundary; setting it
    /// is the cooperative way to take the vCPU down from another thread.
    ///
    /// Callable exactly once: the launch operation is one-time, and
    /// `Terminated` absorbs.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<FailureReport, VcpuError> {
        if self.run_state != RunState::Created {
            return Err(VcpuError::InvalidState {
                found: self.run_state,
            });
        }
        self.run_state = RunState::Running;
        self.state.active = true;

        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(self.terminate(TerminationReason::StopRequested));
            }

            if let Err(err) = self.enter_guest() {
                log::error!("guest entry failed: {:?}", err);
                return Ok(self.terminate(TerminationReason::Fatal(err)));
            }
            self.run_state = RunState::ExitPending;

            let ctx =
                match ExitContext::capture(CaptureToken::new(), &self.accessor, &self.state.regs)
                {
                    Ok(ctx) => ctx,
                    Err(err) => {
                        log::error!("state capture failed: {:?}", err);
                        return Ok(self.terminate(TerminationReason::Fatal(err)));
                    }
                };
            self.last_context = Some(ctx.clone());

            if ctx.entry_failure {
                let reason = ctx.reason().unwrap_or(ExitReason::InvalidGuestState);
                return Ok(self.terminate(TerminationReason::EntryFailure(reason)));
            }

            let decision = match self.table.dispatch(&ctx, &mut self.state, &mut self.platform) {
                Ok(decision) => decision,
                Err(err) => {
                    log::error!("handler failed: {:?}", err);
                    return Ok(self.terminate(TerminationReason::Fatal(err)));
                }
            };

            match self.apply(decision, &ctx) {
                Ok(None) => self.run_state = RunState::Running,
                Ok(Some(reason)) => return Ok(self.terminate(reason)),
                Err(err) => {
                    log::error!("applying the resume decision failed: {:?}", err);
                    return Ok(self.terminate(TerminationReason::Fatal(err)));
                }
            }
        }
    }

    /// Applies one resume decision. `Some` means the vCPU must terminate.
    fn apply(
        &mut self,
        decision: ResumeDecision,
        ctx: &ExitContext,
    ) -> Result<Option<TerminationReason>, VcpuError> {
        match decision {
            ResumeDecision::Continue { advance_rip } => {
                if advance_rip {
                    self.advance_rip(ctx)?;
                }
                Ok(None)
            }
            ResumeDecision::InjectEvent(event) => {
                self.state.inject = Some(event);
                Ok(None)
            }
            ResumeDecision::Terminate(reason) => Ok(Some(reason)),
        }
    }

    /// Flushes every pending state mutation and re-enters the guest. The
    /// flush happens strictly before the hardware operation so the guest can
    /// never observe a half-applied update.
    fn enter_guest(&mut self) -> Result<(), VcpuError> {
        self.flush_entry_state()?;
        let entered = if self.launched {
            self.accessor.resume(&mut self.state.regs)
        } else {
            self.accessor.launch(&mut self.state.regs)
        };
        match entered {
            Ok(()) => {
                self.launched = true;
                Ok(())
            }
            Err(err) => Err(VcpuError::HardwareFailure(err)),
        }
    }

    fn flush_entry_state(&mut self) -> Result<(), VcpuError> {
        let dirty = self.state.dirty;
        if dirty.contains(Dirty::CR0) {
            self.accessor.write(VmcsField::GuestCr0, self.state.cr.cr0)?;
            self.accessor
                .write(VmcsField::Cr0ReadShadow, self.state.cr.cr0)?;
        }
        if dirty.contains(Dirty::CR3) {
            self.accessor.write(VmcsField::GuestCr3, self.state.cr.cr3)?;
        }
        if dirty.contains(Dirty::CR4) {
            // The guest reads its own value back, but VMXE stays on.
            self.accessor
                .write(VmcsField::GuestCr4, self.state.cr.cr4 | CR4_VMXE)?;
            self.accessor
                .write(VmcsField::Cr4ReadShadow, self.state.cr.cr4)?;
        }
        self.state.dirty = Dirty::empty();

        if let Some(reload) = self.state.timer_reload {
            self.accessor
                .write(VmcsField::VmxPreemptionTimerValue, reload as u64)?;
        }

        // Keep an interrupt window requested while events wait in the queue.
        let controls = self.accessor.read(VmcsField::CpuBasedVmExecControl)?;
        let wanted = if self.state.pending_events() > 0 {
            controls | INTERRUPT_WINDOW_EXITING
        } else {
            controls & !INTERRUPT_WINDOW_EXITING
        };
        if wanted != controls {
            self.accessor
                .write(VmcsField::CpuBasedVmExecControl, wanted)?;
        }

        if let Some(event) = self.state.inject.take() {
            log::debug!("injecting vector {} on entry", event.vector);
            self.accessor
                .write(VmcsField::VmEntryIntrInfoField, event.entry_info() as u64)?;
            if let Some(code) = event.error_code {
                self.accessor
                    .write(VmcsField::VmEntryExceptionErrorCode, code as u64)?;
            }
            // Software event delivery reuses the exiting instruction length.
            let len = self.accessor.read(VmcsField::VmExitInstructionLen)?;
            self.accessor.write(VmcsField::VmEntryInstructionLen, len)?;
        }
        Ok(())
    }

    /// Moves the guest past the exiting instruction.
    fn advance_rip(&mut self, ctx: &ExitContext) -> Result<(), VcpuError> {
        self.accessor
            .write(VmcsField::GuestRip, ctx.rip + ctx.instruction_len as u64)?;

        // The skipped instruction must not leave an injection window closed.
        let blocking = self.accessor.read(VmcsField::GuestInterruptibilityState)?;
        let cleared = blocking & !(BLOCKING_BY_STI | BLOCKING_BY_MOV_SS);
        if cleared != blocking {
            self.accessor
                .write(VmcsField::GuestInterruptibilityState, cleared)?;
        }
        Ok(())
    }

    fn terminate(&mut self, reason: TerminationReason) -> FailureReport {
        log::info!("vcpu terminated: {:?}", reason);
        self.run_state = RunState::Terminated;
        self.state.active = false;
        let report = FailureReport {
            reason,
            context: self.last_context.clone(),
        };
        self.platform.terminated(&report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{InstructionError, VmxError};
    use crate::events::Event;
    use crate::fields::GpReg;
    use crate::platform::CpuidResult;
    use crate::testing::{FakeAccessor, FakePlatform, ScriptedExit};

    fn stop_flag() -> AtomicBool {
        AtomicBool::new(false)
    }

    /// A trap that terminates the run: raw code outside the catalog under
    /// the default Terminate policy.
    fn final_exit() -> ScriptedExit {
        ScriptedExit {
            reason: 0xFFFF,
            ..ScriptedExit::default()
        }
    }

    #[test]
    fn launch_cpuid_advance_scenario() {
        let mut accessor = FakeAccessor::default();
        let mut cpuid_regs = [0u64; crate::fields::REGFILE_SIZE];
        cpuid_regs[GpReg::Rax.index()] = 1;
        accessor.script.push(ScriptedExit {
            reason: 10,
            rip: 0x1000,
            instruction_len: 2,
            regs: Some(cpuid_regs),
            ..ScriptedExit::default()
        });
        accessor.script.push(final_exit());

        let mut platform = FakePlatform::default();
        platform.cpuid_map.insert(
            (1, 0),
            CpuidResult {
                eax: 0x0002_0652,
                ebx: 0,
                ecx: 1 << 5,
                edx: 0,
            },
        );

        let mut vcpu = Vcpu::new(accessor, platform, VcpuConfig::default());
        let report = vcpu.run(&stop_flag()).unwrap();

        assert_eq!(vcpu.run_state(), RunState::Terminated);
        assert_eq!(report.reason, TerminationReason::UnknownExit(0xFFFF));
        // The instruction pointer moved past the 2-byte CPUID.
        let (accessor, _) = vcpu.into_parts();
        assert!(accessor.writes.contains(&(VmcsField::GuestRip, 0x1002)));
        // Exactly one launch, every later entry was a resume.
        assert_eq!(accessor.launches, 1);
        assert_eq!(accessor.resumes, 1);
    }

    #[test]
    fn resume_failure_terminates_with_the_last_context() {
        let mut accessor = FakeAccessor::default();
        accessor.script.push(ScriptedExit {
            reason: 12, // HLT
            rip: 0x2000,
            instruction_len: 1,
            ..ScriptedExit::default()
        });
        // The second entry (the resume) reports a hardware failure.
        accessor.fail_on_entry = Some((
            1,
            VmxError::FailValid(InstructionError::ResumeNonLaunchedVmcs),
        ));

        let mut vcpu = Vcpu::new(accessor, FakePlatform::default(), VcpuConfig::default());
        let report = vcpu.run(&stop_flag()).unwrap();

        assert_eq!(
            report.reason,
            TerminationReason::Fatal(VcpuError::HardwareFailure(VmxError::FailValid(
                InstructionError::ResumeNonLaunchedVmcs
            )))
        );
        // The report carries the HLT trap that preceded the failure.
        let ctx = report.context.expect("report must carry the last context");
        assert_eq!(ctx.raw_reason, 12);
        assert_eq!(ctx.rip, 0x2000);
        assert_eq!(vcpu.run_state(), RunState::Terminated);
        assert!(!vcpu.state().active);
    }

    #[test]
    fn unknown_reason_applies_the_default_policy() {
        let mut accessor = FakeAccessor::default();
        accessor.script.push(final_exit());

        let mut vcpu = Vcpu::new(accessor, FakePlatform::default(), VcpuConfig::default());
        let report = vcpu.run(&stop_flag()).unwrap();

        assert_eq!(report.reason, TerminationReason::UnknownExit(0xFFFF));
        assert_eq!(report.context.unwrap().raw_reason, 0xFFFF);
        // The platform got the termination callback with the same reason.
        let (_, platform) = vcpu.into_parts();
        assert_eq!(
            platform.report.unwrap().reason,
            TerminationReason::UnknownExit(0xFFFF)
        );
    }

    #[test]
    fn terminated_is_absorbing() {
        let mut accessor = FakeAccessor::default();
        accessor.script.push(final_exit());
        let mut vcpu = Vcpu::new(accessor, FakePlatform::default(), VcpuConfig::default());
        vcpu.run(&stop_flag()).unwrap();

        let err = vcpu.run(&stop_flag()).unwrap_err();
        assert_eq!(
            err,
            VcpuError::InvalidState {
                found: RunState::Terminated
            }
        );
        assert_eq!(vcpu.run_state(), RunState::Terminated);
    }

    #[test]
    fn stop_flag_terminates_before_entering_the_guest() {
        let accessor = FakeAccessor::default();
        let mut vcpu = Vcpu::new(accessor, FakePlatform::default(), VcpuConfig::default());
        let stop = AtomicBool::new(true);
        let report = vcpu.run(&stop).unwrap();

        assert_eq!(report.reason, TerminationReason::StopRequested);
        assert_eq!(report.context, None);
        let (accessor, _) = vcpu.into_parts();
        assert_eq!(accessor.launches, 0);
    }

    #[test]
    fn entry_failure_flag_terminates() {
        let mut accessor = FakeAccessor::default();
        accessor.script.push(ScriptedExit {
            reason: 33,
            entry_failure: true,
            ..ScriptedExit::default()
        });

        let mut vcpu = Vcpu::new(accessor, FakePlatform::default(), VcpuConfig::default());
        let report = vcpu.run(&stop_flag()).unwrap();
        assert_eq!(
            report.reason,
            TerminationReason::EntryFailure(ExitReason::InvalidGuestState)
        );
    }

    #[test]
    fn capture_happens_exactly_once_per_trap() {
        let mut accessor = FakeAccessor::default();
        accessor.script.push(ScriptedExit {
            reason: 12,
            instruction_len: 1,
            ..ScriptedExit::default()
        });
        accessor.script.push(final_exit());

        let mut vcpu = Vcpu::new(accessor, FakePlatform::default(), VcpuConfig::default());
        vcpu.run(&stop_flag()).unwrap();

        // Two traps, two captures: the exit-reason field is only read by
        // the capture path.
        let (accessor, _) = vcpu.into_parts();
        assert_eq!(accessor.reads_of(VmcsField::ExitReason), 2);
    }

    #[test]
    fn injection_flushes_before_the_next_entry() {
        let mut accessor = FakeAccessor::default();
        // A VMCALL attempt, answered with #UD, followed by the final exit.
        accessor.script.push(ScriptedExit {
            reason: 18,
            rip: 0x4000,
            instruction_len: 3,
            ..ScriptedExit::default()
        });
        accessor.script.push(final_exit());

        let mut vcpu = Vcpu::new(accessor, FakePlatform::default(), VcpuConfig::default());
        vcpu.run(&stop_flag()).unwrap();

        let (accessor, _) = vcpu.into_parts();
        let info = Event::invalid_opcode().entry_info() as u64;
        assert!(accessor
            .writes
            .contains(&(VmcsField::VmEntryIntrInfoField, info)));
        // #UD re-executes nothing: the faulting RIP stays.
        assert!(!accessor.writes.iter().any(|(f, _)| *f == VmcsField::GuestRip));
    }

    #[test]
    fn pending_events_request_an_interrupt_window() {
        let mut accessor = FakeAccessor::default();
        // Window opens immediately; the queued event is delivered, then the
        // run ends.
        accessor.script.push(ScriptedExit {
            reason: 7,
            ..ScriptedExit::default()
        });
        accessor.script.push(final_exit());

        let mut vcpu = Vcpu::new(accessor, FakePlatform::default(), VcpuConfig::default());
        vcpu.state_mut().queue_event(Event::external(0x30));
        vcpu.run(&stop_flag()).unwrap();

        let (accessor, _) = vcpu.into_parts();
        // First entry requested the window (bit set), and the event went in
        // on the following entry.
        assert!(accessor
            .writes
            .contains(&(VmcsField::CpuBasedVmExecControl, INTERRUPT_WINDOW_EXITING)));
        let info = Event::external(0x30).entry_info() as u64;
        assert!(accessor
            .writes
            .contains(&(VmcsField::VmEntryIntrInfoField, info)));
    }

    #[test]
    fn dirty_shadows_flush_before_resume() {
        let mut accessor = FakeAccessor::default();
        accessor.script.push(final_exit());

        let mut vcpu = Vcpu::new(accessor, FakePlatform::default(), VcpuConfig::default());
        vcpu.state_mut().set_cr4(0x20);
        vcpu.run(&stop_flag()).unwrap();

        assert!(vcpu.state().dirty.is_empty());
        let (accessor, _) = vcpu.into_parts();
        // Real CR4 keeps VMXE, the shadow shows the guest's value.
        assert!(accessor
            .writes
            .contains(&(VmcsField::GuestCr4, 0x20 | CR4_VMXE)));
        assert!(accessor.writes.contains(&(VmcsField::Cr4ReadShadow, 0x20)));
    }

    #[test]
    fn preemption_timer_rearms_on_every_entry() {
        let mut accessor = FakeAccessor::default();
        accessor.script.push(ScriptedExit {
            reason: 52,
            ..ScriptedExit::default()
        });
        accessor.script.push(final_exit());

        let config = VcpuConfig {
            preemption_timer: Some(10_000),
            ..VcpuConfig::default()
        };
        let mut vcpu = Vcpu::new(accessor, FakePlatform::default(), config);
        vcpu.run(&stop_flag()).unwrap();

        let (accessor, _) = vcpu.into_parts();
        let rearms = accessor
            .writes
            .iter()
            .filter(|(f, v)| *f == VmcsField::VmxPreemptionTimerValue && *v == 10_000)
            .count();
        assert_eq!(rearms, 2);
    }
}

//! Dense dispatch of exit reasons onto handlers.

use crate::context::ExitContext;
use crate::errors::{TerminationReason, VcpuError};
use crate::events::Event;
use crate::exits::ExitReason;
use crate::platform::Platform;
use crate::state::VcpuState;

/// What the controller must do to re-enter the guest after an exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Re-enter the guest, optionally skipping the exiting instruction.
    Continue { advance_rip: bool },
    /// Re-enter the guest with an event delivered on entry.
    InjectEvent(Event),
    /// Stop servicing this vCPU.
    Terminate(TerminationReason),
}

impl ResumeDecision {
    /// Continue past the exiting instruction.
    pub const fn advance() -> ResumeDecision {
        ResumeDecision::Continue { advance_rip: true }
    }

    /// Continue by re-executing the exiting instruction.
    pub const fn reenter() -> ResumeDecision {
        ResumeDecision::Continue { advance_rip: false }
    }
}

/// Policy for exits with no registered handler and for raw codes outside the
/// catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPolicy {
    /// Skip the instruction and keep going.
    PassThroughAdvance,
    /// Treat the exit as fatal.
    Terminate,
}

/// A handler for one exit-reason class.
pub type Handler<P> =
    fn(&ExitContext, &mut VcpuState, &mut P) -> Result<ResumeDecision, VcpuError>;

const TABLE_SIZE: usize = ExitReason::MAX_TAG as usize + 1;

/// Reason-to-handler mapping, dense over the catalog tag space.
///
/// Built once when the vCPU is constructed. There is no registration API
/// after that point, so the mapping can never change while exits are being
/// serviced.
pub struct DispatchTable<P> {
    handlers: [Option<Handler<P>>; TABLE_SIZE],
    default_policy: DefaultPolicy,
}

impl<P: Platform> DispatchTable<P> {
    pub fn new(default_policy: DefaultPolicy) -> DispatchTable<P> {
        let mut handlers: [Option<Handler<P>>; TABLE_SIZE] = [None; TABLE_SIZE];
        crate::handlers::install(&mut handlers);
        DispatchTable {
            handlers,
            default_policy,
        }
    }

    /// Routes one captured exit to its handler.
    pub fn dispatch(
        &self,
        ctx: &ExitContext,
        state: &mut VcpuState,
        platform: &mut P,
    ) -> Result<ResumeDecision, VcpuError> {
        let reason = match ctx.reason() {
            Ok(reason) => reason,
            Err(raw) => {
                log::error!("exit reason {:#x} is outside the catalog", raw);
                return Ok(self.fallback(TerminationReason::UnknownExit(raw)));
            }
        };
        match self.handlers[reason.as_u16() as usize] {
            Some(handler) => handler(ctx, state, platform),
            None => {
                log::debug!("no handler for {}, applying default policy", reason.name());
                Ok(self.fallback(TerminationReason::Unhandled(reason)))
            }
        }
    }

    fn fallback(&self, reason: TerminationReason) -> ResumeDecision {
        match self.default_policy {
            DefaultPolicy::PassThroughAdvance => ResumeDecision::advance(),
            DefaultPolicy::Terminate => ResumeDecision::Terminate(reason),
        }
    }
}

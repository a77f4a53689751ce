//! VM-exit dispatch engine for a thin Intel VT-x hypervisor.
//!
//! The engine owns everything between a hardware trap out of the guest and
//! the next entry into it: a trap's raw exit code is resolved against the
//! [`exits::ExitReason`] catalog, the saved guest state is captured exactly
//! once into an [`context::ExitContext`], the [`dispatch::DispatchTable`]
//! routes the exit to its handler, and the handler's
//! [`dispatch::ResumeDecision`] is applied by the [`vcpu::Vcpu`] controller
//! before the guest runs again.
//!
//! Hardware never appears directly. The raw VMX plumbing lives behind
//! [`accessor::VmcsAccessor`] and the surrounding hypervisor (EPT manager,
//! host passthrough, interrupt forwarding) behind [`platform::Platform`],
//! which is also what makes the whole engine runnable under `cargo test`
//! with in-memory fakes.
//!
//! Each vCPU is exclusively owned by one host thread; the only cross-thread
//! surface is the atomic stop flag passed to [`vcpu::Vcpu::run`].
#![cfg_attr(not(test), no_std)]

pub mod accessor;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod exits;
pub mod fields;
mod handlers;
pub mod msr;
pub mod platform;
pub mod qualification;
pub mod state;
pub mod vcpu;

#[cfg(test)]
mod testing;

pub use crate::accessor::VmcsAccessor;
pub use crate::context::{CaptureToken, ExitContext};
pub use crate::dispatch::{DefaultPolicy, DispatchTable, ResumeDecision};
pub use crate::errors::{
    FailureReport, InstructionError, TerminationReason, VcpuError, VmxError,
};
pub use crate::events::{Event, ExceptionVector, InterruptionType};
pub use crate::exits::ExitReason;
pub use crate::platform::{CpuidResult, Platform, TranslationError, TranslationOutcome};
pub use crate::qualification::{AccessRights, ExitQualification};
pub use crate::state::VcpuState;
pub use crate::vcpu::{RunState, Vcpu, VcpuConfig};

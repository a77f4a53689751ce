//! Scriptable fakes standing in for the hardware accessor and the host
//! platform. Test-only.

use std::cell::RefCell;
use std::collections::HashMap;

use utils::{GuestPhysAddr, GuestVirtAddr};

use crate::accessor::VmcsAccessor;
use crate::context::ExitContext;
use crate::errors::{FailureReport, VmxError};
use crate::fields::{VmcsField, REGFILE_SIZE};
use crate::platform::{CpuidResult, Platform, TranslationError, TranslationOutcome};
use crate::qualification::{AccessRights, ExitQualification};

/// Builds a plausible context for a raw exit code, for driving handlers and
/// the dispatch table directly.
pub(crate) fn exit_context(raw_reason: u16) -> ExitContext {
    ExitContext {
        raw_reason,
        entry_failure: false,
        rip: 0x1000,
        rsp: 0x8000,
        rflags: 0x2,
        regs: [0; REGFILE_SIZE],
        qualification: ExitQualification(0),
        instruction_len: 2,
        guest_phys_addr: GuestPhysAddr::zero(),
        guest_linear_addr: GuestVirtAddr::zero(),
        interrupt_info: None,
    }
}

/// One scripted trap: the saved state the fake exposes after the next entry.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedExit {
    pub reason: u16,
    pub entry_failure: bool,
    pub qualification: u64,
    pub instruction_len: u32,
    pub rip: u64,
    pub guest_phys_addr: u64,
    pub interrupt_info: u32,
    pub interrupt_error_code: u32,
    /// Register values the guest leaves behind on this trap.
    pub regs: Option<[u64; REGFILE_SIZE]>,
}

/// In-memory accessor: a field map plus a script of traps.
///
/// Each entry consumes the next scripted exit and loads its values into the
/// field map, the way real hardware refreshes the saved state. Running out
/// of script reports a hardware failure, which makes the controller
/// terminate, so every test run ends deterministically.
#[derive(Default)]
pub(crate) struct FakeAccessor {
    pub fields: HashMap<VmcsField, u64>,
    pub script: Vec<ScriptedExit>,
    pub writes: Vec<(VmcsField, u64)>,
    pub launches: usize,
    pub resumes: usize,
    /// Fail the nth entry (0-based, launches and resumes both count).
    pub fail_on_entry: Option<(usize, VmxError)>,
    reads: RefCell<Vec<VmcsField>>,
    failing_reads: Vec<VmcsField>,
}

impl FakeAccessor {
    pub fn set(&mut self, field: VmcsField, value: u64) {
        self.fields.insert(field, value);
    }

    /// Makes every read of `field` fail, for capture-failure tests.
    pub fn fail_reads_of(&mut self, field: VmcsField) {
        self.failing_reads.push(field);
    }

    /// How many times `field` was read.
    pub fn reads_of(&self, field: VmcsField) -> usize {
        self.reads.borrow().iter().filter(|f| **f == field).count()
    }

    fn entry(&mut self, regs: &mut [u64; REGFILE_SIZE]) -> Result<(), VmxError> {
        let index = self.launches + self.resumes;
        if let Some((at, err)) = self.fail_on_entry {
            if at == index {
                return Err(err);
            }
        }
        if self.script.is_empty() {
            return Err(VmxError::FailInvalid);
        }
        let exit = self.script.remove(0);
        let raw_reason = exit.reason as u64 | if exit.entry_failure { 1 << 31 } else { 0 };
        self.fields.insert(VmcsField::ExitReason, raw_reason);
        self.fields
            .insert(VmcsField::ExitQualification, exit.qualification);
        self.fields
            .insert(VmcsField::VmExitInstructionLen, exit.instruction_len as u64);
        self.fields.insert(VmcsField::GuestRip, exit.rip);
        self.fields
            .insert(VmcsField::GuestPhysicalAddress, exit.guest_phys_addr);
        self.fields
            .insert(VmcsField::VmExitIntrInfo, exit.interrupt_info as u64);
        self.fields.insert(
            VmcsField::VmExitIntrErrorCode,
            exit.interrupt_error_code as u64,
        );
        if let Some(values) = exit.regs {
            *regs = values;
        }
        Ok(())
    }
}

impl VmcsAccessor for FakeAccessor {
    fn read(&self, field: VmcsField) -> Result<u64, VmxError> {
        self.reads.borrow_mut().push(field);
        if self.failing_reads.contains(&field) {
            return Err(VmxError::FailInvalid);
        }
        Ok(self.fields.get(&field).copied().unwrap_or(0))
    }

    fn write(&mut self, field: VmcsField, value: u64) -> Result<(), VmxError> {
        self.writes.push((field, value));
        self.fields.insert(field, value);
        Ok(())
    }

    fn launch(&mut self, regs: &mut [u64; REGFILE_SIZE]) -> Result<(), VmxError> {
        self.entry(regs)?;
        self.launches += 1;
        Ok(())
    }

    fn resume(&mut self, regs: &mut [u64; REGFILE_SIZE]) -> Result<(), VmxError> {
        self.entry(regs)?;
        self.resumes += 1;
        Ok(())
    }
}

/// Recording platform fake with table-driven answers.
#[derive(Default)]
pub(crate) struct FakePlatform {
    pub cpuid_map: HashMap<(u32, u32), CpuidResult>,
    pub msrs: HashMap<u32, u64>,
    pub io: HashMap<u16, u32>,
    pub io_writes: Vec<(u16, u8, u32)>,
    /// Answers keyed by guest-physical address; unknown addresses deny.
    pub translations: HashMap<usize, Result<TranslationOutcome, TranslationError>>,
    pub translate_calls: Vec<(usize, AccessRights)>,
    pub interrupts: Vec<u8>,
    pub nmis: usize,
    pub halts: usize,
    pub xsetbv_calls: Vec<(u32, u64)>,
    pub report: Option<FailureReport>,
}

impl Platform for FakePlatform {
    fn translate(
        &mut self,
        gpa: GuestPhysAddr,
        access: AccessRights,
    ) -> Result<TranslationOutcome, TranslationError> {
        self.translate_calls.push((gpa.as_usize(), access));
        self.translations
            .get(&gpa.as_usize())
            .copied()
            .unwrap_or(Ok(TranslationOutcome::Denied))
    }

    fn cpuid(&mut self, leaf: u32, subleaf: u32) -> CpuidResult {
        self.cpuid_map
            .get(&(leaf, subleaf))
            .copied()
            .unwrap_or_default()
    }

    fn read_msr(&mut self, msr: u32) -> Option<u64> {
        self.msrs.get(&msr).copied()
    }

    fn write_msr(&mut self, msr: u32, value: u64) -> bool {
        match self.msrs.get_mut(&msr) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn io_read(&mut self, port: u16, _size: u8) -> u32 {
        self.io.get(&port).copied().unwrap_or(0)
    }

    fn io_write(&mut self, port: u16, size: u8, value: u32) {
        self.io_writes.push((port, size, value));
    }

    fn xsetbv(&mut self, index: u32, value: u64) -> bool {
        self.xsetbv_calls.push((index, value));
        true
    }

    fn external_interrupt(&mut self, vector: u8) {
        self.interrupts.push(vector);
    }

    fn nmi(&mut self) {
        self.nmis += 1;
    }

    fn halted(&mut self) {
        self.halts += 1;
    }

    fn terminated(&mut self, report: &FailureReport) {
        self.report = Some(report.clone());
    }
}

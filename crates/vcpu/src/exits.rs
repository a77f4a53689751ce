//! The architectural catalog of basic VM-exit reasons.
//!
//! See Intel SDM Vol. 3D Appendix C. The numeric tags are fixed by hardware
//! and must never be renumbered; the reserved tags 35, 38 and 42 have no
//! member. Raw codes outside the catalog are reported distinctly through
//! [`ExitReason::from_u16`] instead of being folded into a default member, so
//! the controller can decide whether an unknown reason is fatal.

/// Basic VM-exit reasons.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ExitReason {
    /// Exception or non-maskable interrupt intercepted by the exception
    /// bitmap or the "NMI exiting" control.
    ExceptionOrNmi          = 0,
    /// External interrupt with the "external-interrupt exiting" control set.
    ExternalInterrupt       = 1,
    /// Triple fault in the guest.
    TripleFault             = 2,
    /// INIT signal arrived.
    InitSignal              = 3,
    /// Start-up IPI arrived while in wait-for-SIPI state.
    StartupIpi              = 4,
    /// I/O system-management interrupt.
    IoSmi                   = 5,
    /// Non-I/O system-management interrupt.
    OtherSmi                = 6,
    /// The guest became able to accept interrupts with the
    /// "interrupt-window exiting" control set.
    InterruptWindow         = 7,
    /// The guest became able to accept NMIs with the "NMI-window exiting"
    /// control set.
    NmiWindow               = 8,
    /// Guest attempted a task switch.
    TaskSwitch              = 9,
    /// Guest executed CPUID.
    Cpuid                   = 10,
    /// Guest executed GETSEC.
    Getsec                  = 11,
    /// Guest executed HLT with the "HLT exiting" control set.
    Hlt                     = 12,
    /// Guest executed INVD.
    Invd                    = 13,
    /// Guest executed INVLPG with the "INVLPG exiting" control set.
    Invlpg                  = 14,
    /// Guest executed RDPMC with the "RDPMC exiting" control set.
    Rdpmc                   = 15,
    /// Guest executed RDTSC with the "RDTSC exiting" control set.
    Rdtsc                   = 16,
    /// Guest executed RSM in SMM.
    Rsm                     = 17,
    /// Guest executed VMCALL.
    Vmcall                  = 18,
    /// Guest executed VMCLEAR.
    Vmclear                 = 19,
    /// Guest executed VMLAUNCH.
    Vmlaunch                = 20,
    /// Guest executed VMPTRLD.
    Vmptrld                 = 21,
    /// Guest executed VMPTRST.
    Vmptrst                 = 22,
    /// Guest executed VMREAD.
    Vmread                  = 23,
    /// Guest executed VMRESUME.
    Vmresume                = 24,
    /// Guest executed VMWRITE.
    Vmwrite                 = 25,
    /// Guest executed VMXOFF.
    Vmxoff                  = 26,
    /// Guest executed VMXON.
    Vmxon                   = 27,
    /// Guest accessed CR0, CR3, CR4 or CR8 through MOV CR, CLTS or LMSW.
    CrAccess                = 28,
    /// Guest moved to or from a debug register with the "MOV-DR exiting"
    /// control set.
    DrAccess                = 29,
    /// Guest executed an I/O instruction on an intercepted port.
    IoInstruction           = 30,
    /// Guest executed RDMSR on an intercepted MSR.
    MsrRead                 = 31,
    /// Guest executed WRMSR on an intercepted MSR.
    MsrWrite                = 32,
    /// VM entry failed because of invalid guest state.
    InvalidGuestState       = 33,
    /// VM entry failed while loading MSRs.
    MsrLoading              = 34,
    /// Guest executed MWAIT with the "MWAIT exiting" control set.
    MwaitInstruction        = 36,
    /// Monitor trap flag fired.
    MonitorTrapFlag         = 37,
    /// Guest executed MONITOR with the "MONITOR exiting" control set.
    MonitorInstruction      = 39,
    /// Guest executed PAUSE with the "PAUSE exiting" control set.
    PauseInstruction        = 40,
    /// Machine-check event during VM entry.
    MceDuringVmentry        = 41,
    /// TPR dropped below the configured threshold.
    TprBelowThreshold       = 43,
    /// Guest touched the APIC-access page.
    ApicAccess              = 44,
    /// EOI virtualization hit a vector set in the EOI-exit bitmap.
    VirtualizedEoi          = 45,
    /// Guest accessed GDTR or IDTR with descriptor-table exiting set.
    AccessGdtrOrIdtr        = 46,
    /// Guest accessed LDTR or TR with descriptor-table exiting set.
    AccessLdtrOrTr          = 47,
    /// Guest-physical access disallowed by the EPT structures.
    EptViolation            = 48,
    /// Guest-physical access hit a misconfigured EPT entry.
    EptMisconfig            = 49,
    /// Guest executed INVEPT.
    Invept                  = 50,
    /// Guest executed RDTSCP.
    Rdtscp                  = 51,
    /// The preemption timer counted down to zero.
    PreemptionTimerExpired  = 52,
    /// Guest executed INVVPID.
    Invvpid                 = 53,
    /// Guest executed WBINVD with the "WBINVD exiting" control set.
    Wbinvd                  = 54,
    /// Guest executed XSETBV.
    Xsetbv                  = 55,
    /// Guest completed a write to the virtual-APIC page.
    ApicWrite               = 56,
    /// Guest executed RDRAND with the "RDRAND exiting" control set.
    Rdrand                  = 57,
    /// Guest executed INVPCID with the "INVPCID exiting" control set.
    Invpcid                 = 58,
    /// Guest invoked a VM function.
    Vmfunc                  = 59,
    /// Guest executed ENCLS with the "ENCLS exiting" control set.
    Encls                   = 60,
    /// Guest executed RDSEED with the "RDSEED exiting" control set.
    Rdseed                  = 61,
    /// The page-modification log filled up.
    PmlFull                 = 62,
    /// Guest executed XSAVES with an intercepted IA32_XSS component.
    Xsaves                  = 63,
    /// Guest executed XRSTORS with an intercepted IA32_XSS component.
    Xrstors                 = 64,
    /// Guest executed PCOMMIT.
    Pcommit                 = 65,
}

impl ExitReason {
    /// Highest tag in the catalog. The dispatch table is dense over
    /// `0..=MAX_TAG`.
    pub const MAX_TAG: u16 = 65;

    /// Every catalog member, in tag order. Backs the completeness checks.
    #[rustfmt::skip]
    pub const ALL: [ExitReason; 63] = [
        ExitReason::ExceptionOrNmi, ExitReason::ExternalInterrupt,
        ExitReason::TripleFault, ExitReason::InitSignal, ExitReason::StartupIpi,
        ExitReason::IoSmi, ExitReason::OtherSmi, ExitReason::InterruptWindow,
        ExitReason::NmiWindow, ExitReason::TaskSwitch, ExitReason::Cpuid,
        ExitReason::Getsec, ExitReason::Hlt, ExitReason::Invd,
        ExitReason::Invlpg, ExitReason::Rdpmc, ExitReason::Rdtsc,
        ExitReason::Rsm, ExitReason::Vmcall, ExitReason::Vmclear,
        ExitReason::Vmlaunch, ExitReason::Vmptrld, ExitReason::Vmptrst,
        ExitReason::Vmread, ExitReason::Vmresume, ExitReason::Vmwrite,
        ExitReason::Vmxoff, ExitReason::Vmxon, ExitReason::CrAccess,
        ExitReason::DrAccess, ExitReason::IoInstruction, ExitReason::MsrRead,
        ExitReason::MsrWrite, ExitReason::InvalidGuestState,
        ExitReason::MsrLoading, ExitReason::MwaitInstruction,
        ExitReason::MonitorTrapFlag, ExitReason::MonitorInstruction,
        ExitReason::PauseInstruction, ExitReason::MceDuringVmentry,
        ExitReason::TprBelowThreshold, ExitReason::ApicAccess,
        ExitReason::VirtualizedEoi, ExitReason::AccessGdtrOrIdtr,
        ExitReason::AccessLdtrOrTr, ExitReason::EptViolation,
        ExitReason::EptMisconfig, ExitReason::Invept, ExitReason::Rdtscp,
        ExitReason::PreemptionTimerExpired, ExitReason::Invvpid,
        ExitReason::Wbinvd, ExitReason::Xsetbv, ExitReason::ApicWrite,
        ExitReason::Rdrand, ExitReason::Invpcid, ExitReason::Vmfunc,
        ExitReason::Encls, ExitReason::Rdseed, ExitReason::PmlFull,
        ExitReason::Xsaves, ExitReason::Xrstors, ExitReason::Pcommit,
    ];

    /// Resolves a raw basic exit code. Unknown codes (reserved tags and
    /// anything past the catalog) come back as `Err` with the raw value.
    pub fn from_u16(raw: u16) -> Result<ExitReason, u16> {
        match raw {
            0 => Ok(ExitReason::ExceptionOrNmi),
            1 => Ok(ExitReason::ExternalInterrupt),
            2 => Ok(ExitReason::TripleFault),
            3 => Ok(ExitReason::InitSignal),
            4 => Ok(ExitReason::StartupIpi),
            5 => Ok(ExitReason::IoSmi),
            6 => Ok(ExitReason::OtherSmi),
            7 => Ok(ExitReason::InterruptWindow),
            8 => Ok(ExitReason::NmiWindow),
            9 => Ok(ExitReason::TaskSwitch),
            10 => Ok(ExitReason::Cpuid),
            11 => Ok(ExitReason::Getsec),
            12 => Ok(ExitReason::Hlt),
            13 => Ok(ExitReason::Invd),
            14 => Ok(ExitReason::Invlpg),
            15 => Ok(ExitReason::Rdpmc),
            16 => Ok(ExitReason::Rdtsc),
            17 => Ok(ExitReason::Rsm),
            18 => Ok(ExitReason::Vmcall),
            19 => Ok(ExitReason::Vmclear),
            20 => Ok(ExitReason::Vmlaunch),
            21 => Ok(ExitReason::Vmptrld),
            22 => Ok(ExitReason::Vmptrst),
            23 => Ok(ExitReason::Vmread),
            24 => Ok(ExitReason::Vmresume),
            25 => Ok(ExitReason::Vmwrite),
            26 => Ok(ExitReason::Vmxoff),
            27 => Ok(ExitReason::Vmxon),
            28 => Ok(ExitReason::CrAccess),
            29 => Ok(ExitReason::DrAccess),
            30 => Ok(ExitReason::IoInstruction),
            31 => Ok(ExitReason::MsrRead),
            32 => Ok(ExitReason::MsrWrite),
            33 => Ok(ExitReason::InvalidGuestState),
            34 => Ok(ExitReason::MsrLoading),
            36 => Ok(ExitReason::MwaitInstruction),
            37 => Ok(ExitReason::MonitorTrapFlag),
            39 => Ok(ExitReason::MonitorInstruction),
            40 => Ok(ExitReason::PauseInstruction),
            41 => Ok(ExitReason::MceDuringVmentry),
            43 => Ok(ExitReason::TprBelowThreshold),
            44 => Ok(ExitReason::ApicAccess),
            45 => Ok(ExitReason::VirtualizedEoi),
            46 => Ok(ExitReason::AccessGdtrOrIdtr),
            47 => Ok(ExitReason::AccessLdtrOrTr),
            48 => Ok(ExitReason::EptViolation),
            49 => Ok(ExitReason::EptMisconfig),
            50 => Ok(ExitReason::Invept),
            51 => Ok(ExitReason::Rdtscp),
            52 => Ok(ExitReason::PreemptionTimerExpired),
            53 => Ok(ExitReason::Invvpid),
            54 => Ok(ExitReason::Wbinvd),
            55 => Ok(ExitReason::Xsetbv),
            56 => Ok(ExitReason::ApicWrite),
            57 => Ok(ExitReason::Rdrand),
            58 => Ok(ExitReason::Invpcid),
            59 => Ok(ExitReason::Vmfunc),
            60 => Ok(ExitReason::Encls),
            61 => Ok(ExitReason::Rdseed),
            62 => Ok(ExitReason::PmlFull),
            63 => Ok(ExitReason::Xsaves),
            64 => Ok(ExitReason::Xrstors),
            65 => Ok(ExitReason::Pcommit),
            other => Err(other),
        }
    }

    /// Hardware tag of this reason.
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Stable human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            ExitReason::ExceptionOrNmi => "EXCEPTION_OR_NMI",
            ExitReason::ExternalInterrupt => "EXTERNAL_INTERRUPT",
            ExitReason::TripleFault => "TRIPLE_FAULT",
            ExitReason::InitSignal => "INIT_SIGNAL",
            ExitReason::StartupIpi => "STARTUP_IPI",
            ExitReason::IoSmi => "IO_SMI",
            ExitReason::OtherSmi => "OTHER_SMI",
            ExitReason::InterruptWindow => "INTERRUPT_WINDOW",
            ExitReason::NmiWindow => "NMI_WINDOW",
            ExitReason::TaskSwitch => "TASK_SWITCH",
            ExitReason::Cpuid => "CPUID",
            ExitReason::Getsec => "GETSEC",
            ExitReason::Hlt => "HLT",
            ExitReason::Invd => "INVD",
            ExitReason::Invlpg => "INVLPG",
            ExitReason::Rdpmc => "RDPMC",
            ExitReason::Rdtsc => "RDTSC",
            ExitReason::Rsm => "RSM",
            ExitReason::Vmcall => "VMCALL",
            ExitReason::Vmclear => "VMCLEAR",
            ExitReason::Vmlaunch => "VMLAUNCH",
            ExitReason::Vmptrld => "VMPTRLD",
            ExitReason::Vmptrst => "VMPTRST",
            ExitReason::Vmread => "VMREAD",
            ExitReason::Vmresume => "VMRESUME",
            ExitReason::Vmwrite => "VMWRITE",
            ExitReason::Vmxoff => "VMXOFF",
            ExitReason::Vmxon => "VMXON",
            ExitReason::CrAccess => "CR_ACCESS",
            ExitReason::DrAccess => "DR_ACCESS",
            ExitReason::IoInstruction => "IO_INSTRUCTION",
            ExitReason::MsrRead => "MSR_READ",
            ExitReason::MsrWrite => "MSR_WRITE",
            ExitReason::InvalidGuestState => "INVALID_GUEST_STATE",
            ExitReason::MsrLoading => "MSR_LOADING",
            ExitReason::MwaitInstruction => "MWAIT_INSTRUCTION",
            ExitReason::MonitorTrapFlag => "MONITOR_TRAP_FLAG",
            ExitReason::MonitorInstruction => "MONITOR_INSTRUCTION",
            ExitReason::PauseInstruction => "PAUSE_INSTRUCTION",
            ExitReason::MceDuringVmentry => "MCE_DURING_VMENTRY",
            ExitReason::TprBelowThreshold => "TPR_BELOW_THRESHOLD",
            ExitReason::ApicAccess => "APIC_ACCESS",
            ExitReason::VirtualizedEoi => "VIRTUALIZED_EOI",
            ExitReason::AccessGdtrOrIdtr => "ACCESS_GDTR_OR_IDTR",
            ExitReason::AccessLdtrOrTr => "ACCESS_LDTR_OR_TR",
            ExitReason::EptViolation => "EPT_VIOLATION",
            ExitReason::EptMisconfig => "EPT_MISCONFIG",
            ExitReason::Invept => "INVEPT",
            ExitReason::Rdtscp => "RDTSCP",
            ExitReason::PreemptionTimerExpired => "PREEMPTION_TIMER_EXPIRED",
            ExitReason::Invvpid => "INVVPID",
            ExitReason::Wbinvd => "WBINVD",
            ExitReason::Xsetbv => "XSETBV",
            ExitReason::ApicWrite => "APIC_WRITE",
            ExitReason::Rdrand => "RDRAND",
            ExitReason::Invpcid => "INVPCID",
            ExitReason::Vmfunc => "VMFUNC",
            ExitReason::Encls => "ENCLS",
            ExitReason::Rdseed => "RDSEED",
            ExitReason::PmlFull => "PML_FULL",
            ExitReason::Xsaves => "XSAVES",
            ExitReason::Xrstors => "XRSTORS",
            ExitReason::Pcommit => "PCOMMIT",
        }
    }
}

// The catalog covers the architectural range minus the three reserved tags.
const _: () = assert!(ExitReason::ALL.len() == ExitReason::MAX_TAG as usize + 1 - 3);

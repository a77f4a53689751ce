//! Architectural MSR addresses and ranges.
//!
//! A collection of the model specific registers the engine shadows or
//! validates. RDMSR and WRMSR outside the two architectural ranges raise #GP
//! in the guest, matching what real hardware would do.

/// First address of low MSRs.
pub const LOW_MSR_START: u32 = 0;
/// Last address of low MSRs.
pub const LOW_MSR_END: u32 = 0x1FFF;
/// First address of high MSRs.
pub const HIGH_MSR_START: u32 = 0xC000_0000;
/// Last address of high MSRs.
pub const HIGH_MSR_END: u32 = 0xC000_1FFF;

// Shadowed MSRs.
pub const IA32_APIC_BASE: u32 = 0x1B;
pub const IA32_MISC_ENABLE: u32 = 0x1A0;
pub const IA32_SYSENTER_CS: u32 = 0x174;
pub const IA32_SYSENTER_ESP: u32 = 0x175;
pub const IA32_SYSENTER_EIP: u32 = 0x176;
pub const IA32_PAT: u32 = 0x277;
pub const IA32_EFER: u32 = 0xC000_0080;

/// EFER bits a guest may legitimately toggle; everything else is reserved
/// and raises #GP on WRMSR.
pub const EFER_SCE: u64 = 1 << 0;
pub const EFER_LME: u64 = 1 << 8;
pub const EFER_LMA: u64 = 1 << 10;
pub const EFER_NXE: u64 = 1 << 11;
pub const EFER_KNOWN: u64 = EFER_SCE | EFER_LME | EFER_LMA | EFER_NXE;

/// Whether the address falls in one of the two architectural MSR ranges.
pub fn is_valid_index(msr: u32) -> bool {
    msr <= LOW_MSR_END || (HIGH_MSR_START..=HIGH_MSR_END).contains(&msr)
}

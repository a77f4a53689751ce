//! Address vocabulary shared between the exit engine and its collaborators.
#![cfg_attr(not(test), no_std)]

mod address;

pub use address::{GuestPhysAddr, GuestVirtAddr, HostPhysAddr};

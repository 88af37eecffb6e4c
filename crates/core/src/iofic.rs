// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fmt::Debug;
use std::sync::Arc;

pub use errwatch_config::Group;

/// Maximum number of interrupt controllers a single module can be bound to.
pub const MAX_CONTROLLERS: usize = 4;

bitflags::bitflags! {
    /// Per-group control register flags of an I/O fabric interrupt controller.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u32 {
        /// Reading the cause register clears it.
        const CLEAR_ON_READ = 1 << 0;
        /// Hardware masks a cause bit as soon as it asserts.
        const AUTO_MASK = 1 << 1;
    }
}

impl From<u32> for ControlFlags {
    fn from(value: u32) -> Self {
        ControlFlags::from_bits_truncate(value)
    }
}

/// Register-level contract of an I/O fabric interrupt controller (IOFIC).
///
/// Every call is scoped to one 32-bit register group. Implementations use
/// interior mutability: the engine only ever holds shared handles, and
/// serialising writers per controller is the caller's job.
pub trait Iofic: Debug + Send + Sync {
    fn read_cause(&self, group: Group) -> u32;

    fn read_mask(&self, group: Group) -> u32;

    /// Write-1-to-clear of the given cause bits.
    fn clear_cause(&self, group: Group, bits: u32);

    /// Sets cause bits from software. Only used for fault injection.
    fn set_cause(&self, group: Group, bits: u32);

    fn mask(&self, group: Group, bits: u32);

    fn unmask(&self, group: Group, bits: u32);

    /// Bits excluded from abort generation.
    fn abort_mask_read(&self, group: Group) -> u32;

    fn abort_mask_set(&self, group: Group, bits: u32);

    fn abort_mask_clear(&self, group: Group, bits: u32);

    fn control_flags(&self, group: Group) -> ControlFlags;
}

/// Shared handle to a bound controller.
pub type IoficRef = Arc<dyn Iofic>;

// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::iofic::{ControlFlags, Group, Iofic};
use errwatch_config::GROUP_COUNT;
use std::sync::atomic::{AtomicU32, Ordering};

/// Byte stride between register groups in the register window.
pub const GROUP_STRIDE: u64 = 0x40;

pub const REG_CAUSE: u64 = 0x00;
pub const REG_CAUSE_SET: u64 = 0x08;
pub const REG_MASK: u64 = 0x10;
pub const REG_MASK_CLEAR: u64 = 0x18;
pub const REG_CONTROL: u64 = 0x28;
pub const REG_ABORT_MASK: u64 = 0x30;

#[derive(Debug)]
struct GroupRegs {
    cause: AtomicU32,
    mask: AtomicU32,
    abort_mask: AtomicU32,
    control: AtomicU32,
    // Not architectural: bits that survive a clear, for race modelling.
    sticky: AtomicU32,
}

impl GroupRegs {
    fn reset() -> Self {
        Self {
            cause: AtomicU32::new(0),
            mask: AtomicU32::new(u32::MAX),
            abort_mask: AtomicU32::new(0),
            control: AtomicU32::new(0),
            sticky: AtomicU32::new(0),
        }
    }
}

/// In-memory I/O fabric interrupt controller.
///
/// Cause bits latch whether or not they are masked; the mask only gates
/// interrupt delivery (`pending`). Comes out of reset fully masked.
#[derive(Debug)]
pub struct SimIofic {
    name: String,
    groups: [GroupRegs; GROUP_COUNT],
}

impl SimIofic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: [
                GroupRegs::reset(),
                GroupRegs::reset(),
                GroupRegs::reset(),
                GroupRegs::reset(),
            ],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn regs(&self, group: Group) -> &GroupRegs {
        &self.groups[group.index()]
    }

    /// Raw cause value without read side effects.
    pub fn peek_cause(&self, group: Group) -> u32 {
        self.regs(group).cause.load(Ordering::SeqCst)
    }

    /// Asserted and unmasked causes, i.e. what would raise the interrupt line.
    pub fn pending(&self, group: Group) -> u32 {
        let regs = self.regs(group);
        regs.cause.load(Ordering::SeqCst) & !regs.mask.load(Ordering::SeqCst)
    }

    pub fn set_control_flags(&self, group: Group, flags: ControlFlags) {
        self.regs(group).control.store(flags.bits(), Ordering::SeqCst);
    }

    /// Makes `bits` re-assert immediately after every clear.
    pub fn set_sticky(&self, group: Group, bits: u32) {
        self.regs(group).sticky.fetch_or(bits, Ordering::SeqCst);
    }

    pub fn release_sticky(&self, group: Group, bits: u32) {
        self.regs(group).sticky.fetch_and(!bits, Ordering::SeqCst);
    }

    fn decode(offset: u64) -> Option<(Group, u64)> {
        let idx = (offset / GROUP_STRIDE) as usize;
        let group = *Group::ALL.get(idx)?;
        Some((group, (offset % GROUP_STRIDE) & !3))
    }

    /// 32-bit access to the register window. Unmapped offsets read as zero.
    pub fn read_reg(&self, offset: u64) -> u32 {
        let Some((group, reg)) = Self::decode(offset) else {
            return 0;
        };
        match reg {
            REG_CAUSE => self.read_cause(group),
            REG_MASK => self.read_mask(group),
            REG_CONTROL => self.control_flags(group).bits(),
            REG_ABORT_MASK => self.abort_mask_read(group),
            _ => 0,
        }
    }

    /// 32-bit write to the register window. Writes to unmapped offsets are ignored.
    pub fn write_reg(&self, offset: u64, value: u32) {
        let Some((group, reg)) = Self::decode(offset) else {
            return;
        };
        let regs = self.regs(group);
        match reg {
            REG_CAUSE => self.clear_cause(group, value),
            REG_CAUSE_SET => self.set_cause(group, value),
            REG_MASK => regs.mask.store(value, Ordering::SeqCst),
            REG_MASK_CLEAR => self.unmask(group, value),
            REG_CONTROL => regs.control.store(value, Ordering::SeqCst),
            REG_ABORT_MASK => regs.abort_mask.store(value, Ordering::SeqCst),
            _ => {}
        }
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let groups: Vec<serde_json::Value> = Group::ALL
            .iter()
            .map(|g| {
                let regs = self.regs(*g);
                serde_json::json!({
                    "group": g.to_string(),
                    "cause": regs.cause.load(Ordering::Relaxed),
                    "mask": regs.mask.load(Ordering::Relaxed),
                    "abort_mask": regs.abort_mask.load(Ordering::Relaxed),
                    "control": regs.control.load(Ordering::Relaxed),
                })
            })
            .collect();
        serde_json::json!({
            "name": self.name,
            "groups": groups,
        })
    }
}

impl Iofic for SimIofic {
    fn read_cause(&self, group: Group) -> u32 {
        let regs = self.regs(group);
        let flags = ControlFlags::from(regs.control.load(Ordering::SeqCst));
        if flags.contains(ControlFlags::CLEAR_ON_READ) {
            let sticky = regs.sticky.load(Ordering::SeqCst);
            regs.cause.fetch_and(sticky, Ordering::SeqCst)
        } else {
            regs.cause.load(Ordering::SeqCst)
        }
    }

    fn read_mask(&self, group: Group) -> u32 {
        self.regs(group).mask.load(Ordering::SeqCst)
    }

    fn clear_cause(&self, group: Group, bits: u32) {
        let regs = self.regs(group);
        let keep = !bits | regs.sticky.load(Ordering::SeqCst);
        regs.cause.fetch_and(keep, Ordering::SeqCst);
    }

    fn set_cause(&self, group: Group, bits: u32) {
        let regs = self.regs(group);
        regs.cause.fetch_or(bits, Ordering::SeqCst);
        let flags = ControlFlags::from(regs.control.load(Ordering::SeqCst));
        if flags.contains(ControlFlags::AUTO_MASK) {
            regs.mask.fetch_or(bits, Ordering::SeqCst);
        }
    }

    fn mask(&self, group: Group, bits: u32) {
        self.regs(group).mask.fetch_or(bits, Ordering::SeqCst);
    }

    fn unmask(&self, group: Group, bits: u32) {
        self.regs(group).mask.fetch_and(!bits, Ordering::SeqCst);
    }

    fn abort_mask_read(&self, group: Group) -> u32 {
        self.regs(group).abort_mask.load(Ordering::SeqCst)
    }

    fn abort_mask_set(&self, group: Group, bits: u32) {
        self.regs(group).abort_mask.fetch_or(bits, Ordering::SeqCst);
    }

    fn abort_mask_clear(&self, group: Group, bits: u32) {
        self.regs(group).abort_mask.fetch_and(!bits, Ordering::SeqCst);
    }

    fn control_flags(&self, group: Group) -> ControlFlags {
        ControlFlags::from(self.regs(group).control.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_state_is_fully_masked() {
        let ic = SimIofic::new("ic0");
        for g in Group::ALL {
            assert_eq!(ic.read_mask(g), u32::MAX);
            assert_eq!(ic.read_cause(g), 0);
        }
    }

    #[test]
    fn test_cause_latches_through_mask() {
        let ic = SimIofic::new("ic0");
        ic.set_cause(Group::B, 0x4);
        assert_eq!(ic.read_cause(Group::B), 0x4);
        assert_eq!(ic.pending(Group::B), 0);

        ic.unmask(Group::B, 0x4);
        assert_eq!(ic.pending(Group::B), 0x4);

        ic.clear_cause(Group::B, 0x4);
        assert_eq!(ic.read_cause(Group::B), 0);
    }

    #[test]
    fn test_sticky_bits_survive_clear() {
        let ic = SimIofic::new("ic0");
        ic.set_sticky(Group::A, 0x1);
        ic.set_cause(Group::A, 0x3);
        ic.clear_cause(Group::A, 0x3);
        assert_eq!(ic.read_cause(Group::A), 0x1);

        ic.release_sticky(Group::A, 0x1);
        ic.clear_cause(Group::A, 0x1);
        assert_eq!(ic.read_cause(Group::A), 0);
    }

    #[test]
    fn test_clear_on_read() {
        let ic = SimIofic::new("ic0");
        ic.set_control_flags(Group::C, ControlFlags::CLEAR_ON_READ);
        ic.set_cause(Group::C, 0x80);
        assert_eq!(ic.read_cause(Group::C), 0x80);
        assert_eq!(ic.read_cause(Group::C), 0);
    }

    #[test]
    fn test_register_window() {
        let ic = SimIofic::new("ic0");
        let grp_d = 3 * GROUP_STRIDE;

        ic.write_reg(grp_d + REG_MASK_CLEAR, 0xF0);
        assert_eq!(ic.read_reg(grp_d + REG_MASK), !0xF0);

        ic.write_reg(grp_d + REG_CAUSE_SET, 0x30);
        assert_eq!(ic.read_reg(grp_d + REG_CAUSE), 0x30);
        ic.write_reg(grp_d + REG_CAUSE, 0x10);
        assert_eq!(ic.read_reg(grp_d + REG_CAUSE), 0x20);

        ic.write_reg(REG_ABORT_MASK, 0x5);
        assert_eq!(ic.abort_mask_read(Group::A), 0x5);

        // Beyond group D
        assert_eq!(ic.read_reg(4 * GROUP_STRIDE), 0);
    }

    #[test]
    fn test_snapshot_shape() {
        let ic = SimIofic::new("eth0");
        ic.set_cause(Group::A, 1);
        let snap = ic.snapshot();
        assert_eq!(snap["name"], "eth0");
        assert_eq!(snap["groups"][0]["cause"], 1);
        assert_eq!(snap["groups"].as_array().map(|a| a.len()), Some(4));
    }
}

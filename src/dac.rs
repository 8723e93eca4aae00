//! DAC collaborator (spec §1: out of core scope, interface level only).
//!
//! Exposes just enough of [`regs::DacRegs`] for firmware to push a static
//! analog level out — e.g. to bias a signal an SGPIO function qualifies
//! against. Triggered/buffered conversion is out of scope.

use crate::fmt::trace;
use crate::regs::{self, DacRegs};

const CTRL_ENABLE: u32 = 1 << 0;
const CR_VALUE_SHIFT: u32 = 4;
const CR_VALUE_MASK: u32 = 0xFFF << CR_VALUE_SHIFT;

/// The single DAC instance.
pub struct Dac {
    regs: &'static DacRegs,
}

impl Dac {
    /// Binds to the DAC peripheral and enables it.
    ///
    /// # Safety
    /// Caller must not construct two `Dac`s at once.
    pub unsafe fn new() -> Self {
        let dac = Self { regs: unsafe { regs::dac() } };
        dac.regs.ctrl.write(CTRL_ENABLE);
        trace!("dac: enabled");
        dac
    }

    /// Sets the output level, a 12-bit value (0..4095).
    pub fn set_value(&self, value: u16) {
        debug_assert!(value <= 0xFFF);
        self.regs.cr.modify(|v| (v & !CR_VALUE_MASK) | ((value as u32) << CR_VALUE_SHIFT));
    }

    /// Disables the DAC output.
    pub fn disable(&self) {
        self.regs.ctrl.clear_bits(CTRL_ENABLE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registers() -> &'static DacRegs {
        Box::leak(Box::new(unsafe { core::mem::zeroed() }))
    }

    #[test]
    fn set_value_writes_into_cr_without_disturbing_other_bits() {
        let regs = registers();
        regs.cr.write(0x1);
        let dac = Dac { regs };
        dac.set_value(0x123);
        assert_eq!(regs.cr.read(), 0x1 | (0x123 << CR_VALUE_SHIFT));
    }
}

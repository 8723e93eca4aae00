//! Timer collaborator (spec §1: out of core scope, interface level only).
//!
//! A minimal free-running counter/match-timer wrapper over [`regs::TimerRegs`],
//! kept around only so [`crate::clocks::Timer`] implementations and the
//! scheduler have a concrete timebase to build on. Full capture/PWM channel
//! support is out of scope.

use crate::fmt::trace;
use crate::regs::{self, TimerRegs};

const TCR_ENABLE: u32 = 1 << 0;
const TCR_RESET: u32 = 1 << 1;
const MCR_INTERRUPT_ON_MATCH0: u32 = 1 << 0;
const MCR_RESET_ON_MATCH0: u32 = 1 << 1;

/// One of the four general-purpose match timers named in [`regs::TIMER_BASES`].
pub struct MatchTimer {
    regs: &'static TimerRegs,
}

impl MatchTimer {
    /// Binds to timer `index` (0..4).
    ///
    /// # Safety
    /// Caller must not construct two `MatchTimer`s over the same `index`.
    pub unsafe fn new(index: usize) -> Self {
        Self { regs: unsafe { regs::timer(index) } }
    }

    /// Resets the counter to zero and starts it running.
    pub fn start(&self) {
        self.regs.tcr.write(TCR_RESET);
        self.regs.pr.write(0);
        self.regs.tcr.write(TCR_ENABLE);
        trace!("timer: started");
    }

    /// Stops the counter without resetting it.
    pub fn stop(&self) {
        self.regs.tcr.clear_bits(TCR_ENABLE);
    }

    /// Current free-running counter value.
    pub fn count(&self) -> u32 {
        self.regs.tc.read()
    }

    /// Programs match channel 0 to fire at `value`, resetting the counter
    /// and raising an interrupt when it's hit.
    pub fn set_match0(&self, value: u32) {
        self.regs.mr[0].write(value);
        self.regs.mcr.write(MCR_INTERRUPT_ON_MATCH0 | MCR_RESET_ON_MATCH0);
    }

    /// Clears a pending match/capture interrupt flag.
    pub fn clear_interrupt(&self, mask: u32) {
        self.regs.ir.write(mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registers() -> &'static TimerRegs {
        Box::leak(Box::new(unsafe { core::mem::zeroed() }))
    }

    #[test]
    fn start_resets_then_enables_counter() {
        let regs = registers();
        let timer = MatchTimer { regs };
        timer.start();
        assert_eq!(regs.tcr.read(), TCR_ENABLE);
    }

    #[test]
    fn set_match0_arms_interrupt_and_reset() {
        let regs = registers();
        let timer = MatchTimer { regs };
        timer.set_match0(1000);
        assert_eq!(regs.mr[0].read(), 1000);
        assert_eq!(regs.mcr.read(), MCR_INTERRUPT_ON_MATCH0 | MCR_RESET_ON_MATCH0);
    }
}

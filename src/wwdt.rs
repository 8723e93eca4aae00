//! Windowed watchdog collaborator (spec §1: out of core scope, interface
//! level only).
//!
//! Feed/timeout control over [`regs::WwdtRegs`]. Windowing, warning
//! thresholds and the lock/protect latches the teacher's full driver exposed
//! are out of scope here — this crate only needs enough watchdog control to
//! keep firmware alive while SGPIO transfers run.

use crate::fmt::trace;
use crate::regs::{self, WwdtRegs};

const MODE_WDEN: u32 = 1 << 0;
const MODE_WDRESET: u32 = 1 << 1;
const MODE_WDTOF: u32 = 1 << 2;

const FEED_SEQUENCE: [u32; 2] = [0xAA, 0x55];

/// The single windowed watchdog timer instance.
pub struct Watchdog {
    regs: &'static WwdtRegs,
}

impl Watchdog {
    /// Binds to the watchdog peripheral.
    ///
    /// # Safety
    /// Caller must not construct two `Watchdog`s at once.
    pub unsafe fn new() -> Self {
        Self { regs: unsafe { regs::wwdt() } }
    }

    /// Sets the timeout counter and enables a full system reset on timeout.
    pub fn start(&self, timeout_ticks: u32) {
        self.regs.timeout_const.write(timeout_ticks);
        self.regs.mode.set_bits(MODE_WDEN | MODE_WDRESET);
        self.feed();
        trace!("wwdt: started");
    }

    /// Reloads the timeout counter. Must be called periodically once
    /// started, or a reset occurs.
    pub fn feed(&self) {
        critical_section::with(|_| {
            for word in FEED_SEQUENCE {
                self.regs.feed.write(word);
            }
        });
    }

    /// Returns true if a previous watchdog timeout caused the last reset.
    pub fn timed_out(&self) -> bool {
        self.regs.mode.read() & MODE_WDTOF != 0
    }

    /// Clears the timeout flag.
    pub fn clear_timeout_flag(&self) {
        self.regs.mode.clear_bits(MODE_WDTOF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registers() -> &'static WwdtRegs {
        Box::leak(Box::new(unsafe { core::mem::zeroed() }))
    }

    #[test]
    fn start_programs_timeout_and_enables_reset() {
        let regs = registers();
        let wdt = Watchdog { regs };
        wdt.start(5000);
        assert_eq!(regs.timeout_const.read(), 5000);
        assert_eq!(regs.mode.read() & (MODE_WDEN | MODE_WDRESET), MODE_WDEN | MODE_WDRESET);
    }

    #[test]
    fn timed_out_reflects_flag() {
        let regs = registers();
        regs.mode.write(MODE_WDTOF);
        let wdt = Watchdog { regs };
        assert!(wdt.timed_out());
    }
}

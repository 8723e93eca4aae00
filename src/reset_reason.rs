//! Persistent "reset reason" contract (spec §6.5).
//!
//! A single 32-bit cell, placed by the linker script in a section excluded
//! from zero-init (e.g. `.noinit`), survives soft resets. Grounded on
//! `lpc55-reset-reason`'s sentinel-masked enum decode and
//! `lpc55-syscon`'s `set_reset_reason`, adapted from "read a live RGU status
//! register" to "read/write our own persisted cell", since this crate's
//! scope does not include a syscon-equivalent IPC server.

use core::sync::atomic::{AtomicU32, Ordering};

/// High-half sentinel marking the cell as holding a valid reason. If this
/// does not match after reset, the cell is uninitialized RAM content (first
/// power-up, or a debugger-erased image) and the reason is reported as
/// [`ResetReason::PowerCycle`].
const SENTINEL_MASK: u32 = 0xAA55_0000;

/// The persisted cell. Placed in a dedicated linker section so it survives
/// a warm/soft reset; the section itself is supplied by the firmware image's
/// linker script, not by this crate.
#[cfg_attr(not(test), link_section = ".noinit.reset_reason")]
static RESET_REASON_CELL: AtomicU32 = AtomicU32::new(0);

/// Why the MCU most recently came out of reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetReason {
    /// The cell held no valid sentinel; treated as a cold power-on.
    PowerCycle,
    /// Software explicitly requested a reset before rebooting.
    Requested,
    /// A watchdog timeout triggered the reset.
    Watchdog,
    /// A brown-out condition triggered the reset.
    BrownOut,
    /// The external reset pin was asserted.
    Pin,
    /// Some other, driver-specific reason, carrying its raw low-half value.
    Other(u16),
}

impl ResetReason {
    const REQUESTED: u16 = 1;
    const WATCHDOG: u16 = 2;
    const BROWN_OUT: u16 = 3;
    const PIN: u16 = 4;

    fn low_half(self) -> u16 {
        match self {
            ResetReason::PowerCycle => 0,
            ResetReason::Requested => Self::REQUESTED,
            ResetReason::Watchdog => Self::WATCHDOG,
            ResetReason::BrownOut => Self::BROWN_OUT,
            ResetReason::Pin => Self::PIN,
            ResetReason::Other(v) => v,
        }
    }

    fn from_low_half(v: u16) -> Self {
        match v {
            Self::REQUESTED => ResetReason::Requested,
            Self::WATCHDOG => ResetReason::Watchdog,
            Self::BROWN_OUT => ResetReason::BrownOut,
            Self::PIN => ResetReason::Pin,
            other => ResetReason::Other(other),
        }
    }
}

/// Read the reset reason left by the previous boot. Does not clear the
/// cell; call [`set`] explicitly once the current boot's reason is known, to
/// arm the cell for the *next* reset.
pub fn get() -> ResetReason {
    let raw = RESET_REASON_CELL.load(Ordering::Relaxed);
    if raw & 0xFFFF_0000 != SENTINEL_MASK {
        return ResetReason::PowerCycle;
    }
    ResetReason::from_low_half((raw & 0xFFFF) as u16)
}

/// Record `reason` for the next reset to observe.
pub fn set(reason: ResetReason) {
    let raw = SENTINEL_MASK | reason.low_half() as u32;
    RESET_REASON_CELL.store(raw, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_cell_reports_power_cycle() {
        RESET_REASON_CELL.store(0, Ordering::Relaxed);
        assert_eq!(get(), ResetReason::PowerCycle);
    }

    #[test]
    fn set_then_get_round_trips() {
        set(ResetReason::Watchdog);
        assert_eq!(get(), ResetReason::Watchdog);
        set(ResetReason::Other(0xBEEF & 0xFFFF));
        assert_eq!(get(), ResetReason::Other(0xBEEF));
    }

    #[test]
    fn corrupted_sentinel_is_treated_as_power_cycle() {
        RESET_REASON_CELL.store(0x1234_0002, Ordering::Relaxed);
        assert_eq!(get(), ResetReason::PowerCycle);
    }
}

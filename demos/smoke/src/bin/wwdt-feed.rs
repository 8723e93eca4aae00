//! Smoke test: arm the windowed watchdog and feed it a fixed number of
//! times before letting it reset the part, mirroring the teacher's own
//! watchdog demo shape but trimmed to this crate's interface-level
//! `Watchdog` collaborator (spec §1).
#![no_std]
#![no_main]

use cortex_m_rt::entry;
use defmt::info;
use defmt_rtt as _;
use panic_probe as _;

use sgpio_hal::wwdt::Watchdog;

#[entry]
fn main() -> ! {
    let wwdt = unsafe { Watchdog::new() };
    wwdt.clear_timeout_flag();
    wwdt.start(1_000_000);
    info!("wwdt: armed");

    let mut feeds_remaining = 5u32;
    loop {
        if feeds_remaining > 0 {
            wwdt.feed();
            feeds_remaining -= 1;
            info!("wwdt: fed, {} feeds remaining", feeds_remaining);
        }
        cortex_m::asm::delay(1_000_000);
    }
}

//! Smoke test: bring the clock graph up from its reset state and read back
//! the achieved frequency of one branch clock (spec.md §4.B).
#![no_std]
#![no_main]

use cortex_m::peripheral::{Peripherals, DWT};
use cortex_m_rt::entry;
use defmt::info;
use defmt_rtt as _;
use panic_probe as _;

use sgpio_hal::prelude::*;

const CORE_HZ: u64 = 12_000_000;

struct CycleTimer;

impl Timer for CycleTimer {
    fn now_micros(&self) -> u64 {
        (DWT::cycle_count() as u64 * 1_000_000) / CORE_HZ
    }
}

#[entry]
fn main() -> ! {
    let mut core = Peripherals::take().unwrap();
    core.DCB.enable_trace();
    DWT::unlock();
    core.DWT.enable_cycle_counter();
    let timer = CycleTimer;

    let mut clocks = ClockGraph::default();
    clocks.initialize_early_clocks();
    match clocks.initialize_clocks(&timer) {
        Ok(()) => info!("clocks: bring-up complete"),
        Err(e) => {
            info!("clocks: bring-up failed: {:?}", e);
            loop {}
        }
    }

    clocks.enable_branch(BranchClock::Apb3Sgpio, false);
    let hz = clocks.get_branch_frequency(BranchClock::Apb3Sgpio, &timer);
    info!("clocks: SGPIO branch clock running at {} Hz", hz);

    loop {}
}

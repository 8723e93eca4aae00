//! Smoke test: wire a STREAM_OUT function and a STREAM_IN function up and
//! run them, exactly the sequence spec.md §3 describes a caller driving —
//! no board-specific peripherals beyond SGPIO, the clock graph, and a DWT
//! cycle counter to time PLL bring-up.
#![no_std]
#![no_main]

use cortex_m::peripheral::{Peripherals, DWT};
use cortex_m_rt::entry;
use defmt::info;
use defmt_rtt as _;
use panic_probe as _;

use sgpio_hal::prelude::*;
use sgpio_hal::sgpio::planner::set_up_functions;

/// Core clock frequency assumed while the cycle counter is the only time
/// source available this early in bring-up (spec.md §6.4 names no reset
/// frequency, so this is this demo's own assumption, not library behavior).
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
    if let Err(e) = clocks.initialize_clocks(&timer) {
        info!("clocks: initialize_clocks failed: {:?}", e);
        loop {}
    }

    let mut out_buffer = [0xA5u8; 16];
    let mut in_buffer = [0u8; 16];

    let mut functions = [Function::blank(), Function::blank()];

    functions[0].enabled = true;
    functions[0].mode = Mode::StreamOut;
    functions[0].bus_width = 1;
    functions[0].pin_configurations[0] = PinConfig { sgpio_pin: 0, scu_group: 1, scu_pin: 0, pull: Pull::None };
    functions[0].buffer = BufferHandle { ptr: out_buffer.as_mut_ptr(), order: 4 };

    functions[1].enabled = true;
    functions[1].mode = Mode::StreamIn;
    functions[1].bus_width = 1;
    functions[1].pin_configurations[0] = PinConfig { sgpio_pin: 1, scu_group: 1, scu_pin: 1, pull: Pull::None };
    functions[1].buffer = BufferHandle { ptr: in_buffer.as_mut_ptr(), order: 4 };

    let mut ctx = unsafe { SgpioContext::new(&mut functions) };
    if let Err(e) = set_up_functions(&mut ctx, &mut clocks, &timer) {
        info!("sgpio: set_up_functions failed: {:?}", e);
        loop {}
    }
    info!("sgpio: loopback pair configured");

    ctx.dump_configuration(false);
    ctx.run();

    while ctx.running() {}

    ctx.halt();
    info!("sgpio: halted, captured {} bytes", in_buffer.len());

    loop {}
}

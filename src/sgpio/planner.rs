//! SGPIO Planner (spec §4.D): the allocation/concatenation algorithm. No
//! direct teacher analogue — this is the mass spec.md §2 calls "the
//! interesting mass" — grounded on the general register-programming idiom
//! (`modify`/read-write over a `&RegisterBlock`) the teacher uses throughout
//! `gpio.rs`/`wwdt.rs`, applied to this spec's own allocation algorithm.

use crate::clocks::{BranchClock, ClockGraph, Timer};
use crate::fmt::warn;
use crate::regs::{self, SGPIO_SLICE_COUNT};

use super::codegen;
use super::tables;
use super::{Edge, Error, Mode, Polarity, Pull, Qualifier, ShiftClockSource, Slice, SgpioContext};

mod bits {
    pub const CLOCK_SRC_LOCAL: u32 = 0;
    pub const CLOCK_SRC_PIN: u32 = 1;
    pub const CLOCK_SRC_SLICE: u32 = 2;

    pub const QUAL_ALWAYS: u32 = 0;
    pub const QUAL_NEVER: u32 = 1;
    pub const QUAL_SLICE: u32 = 2;
    pub const QUAL_PIN: u32 = 3;

    pub const OUT_MODE_GPIO: u32 = 0;
    pub const OUT_MODE_1BIT: u32 = 1;
    pub const OUT_MODE_2BIT_A: u32 = 2;
    pub const OUT_MODE_4BIT_A: u32 = 3;
    pub const OUT_MODE_8BIT_A: u32 = 4;
    pub const OUT_MODE_CLOCK_OUT: u32 = 5;

    pub const DIR_SRC_PIN_REG: u32 = 0;
    pub const DIR_SRC_OUTPUT: u32 = 1;
    pub const DIR_SRC_DIR_1BIT: u32 = 2;
    pub const DIR_SRC_DIR_2BIT: u32 = 3;
    pub const DIR_SRC_DIR_4BIT: u32 = 4;
    pub const DIR_SRC_DIR_8BIT: u32 = 5;
}

fn parallel_mode_for_width(bus_width: u8) -> u32 {
    match bus_width {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        _ => unreachable!("bus_width must already be promoted to 1/2/4/8"),
    }
}

fn pack_pos(shifts_per_swap: u32, shifts_remaining: u32, stop_on_swap: bool) -> u32 {
    (shifts_per_swap & 0xFFF) | ((shifts_remaining & 0xFFF) << 12) | ((stop_on_swap as u32) << 31)
}

fn pack_out_cfg(mode: u32, dir_src: u32, direction_output: bool) -> u32 {
    (mode & 0xF) | ((dir_src & 0xF) << 4) | ((direction_output as u32) << 8)
}

/// Chain-stepping rule shared by the I/O and clockgen tables: the slice at
/// position `k` in a chain rooted at `first_pin` is the table lookup for
/// pin `(first_pin + k) mod 16` (spec.md §9: "the fixed next-in-chain
/// mapping, derived from the pin-to-I/O-slice table by stepping the pin
/// index").
pub(crate) fn chain_slice(first_pin: u8, k: u32, is_clockgen: bool) -> Slice {
    let p = ((first_pin as u32 + k) % 16) as u8;
    if is_clockgen {
        tables::PIN_TO_CLOCKGEN_SLICE[p as usize]
    } else {
        tables::PIN_TO_IO_SLICE[p as usize]
    }
}

/// Same stepping rule applied to the direction-slice tables, so the
/// direction chain can grow in lockstep with the I/O chain.
pub(crate) fn direction_chain_slice(bus_width: u8, first_pin: u8, k: u32) -> Slice {
    let p = ((first_pin as u32 + k) % 16) as u8;
    tables::direction_slice(bus_width, p)
}

fn normalize_bus_width(bus_width: u8) -> Result<u8, Error> {
    match bus_width {
        1 | 2 | 4 | 8 => Ok(bus_width),
        3 => {
            warn!("sgpio: bus_width 3 promoted to 4");
            Ok(4)
        }
        5 | 6 | 7 => {
            warn!("sgpio: bus_width {} promoted to 8", bus_width);
            Ok(8)
        }
        _ => Err(Error::InvalidArgument),
    }
}

fn program_scu_pin(group: u8, pin: u8, func_select: u8, pull: Pull) {
    let scu = unsafe { regs::scu() };
    let pull_bits: u32 = match pull {
        Pull::None => 0,
        Pull::Down => 1,
        Pull::Up => 2,
        Pull::Keeper => 3,
    };
    // "fast I/O" bit always set, per spec.md §4.D step 2.
    let value = (func_select as u32 & 0xF) | (pull_bits << 4) | (1 << 7);
    scu.pin_cfg[group as usize][pin as usize].write(value);
}

/// `set_up_functions(ctx) -> Result` (spec.md §4.D). Resets the peripheral,
/// places every enabled function's I/O (and, for bidirectional, direction)
/// slice, grows buffer depth as far as it will go, applies output-pin
/// policy, enforces shift-count limits, then generates and installs an ISR
/// if one is needed.
pub fn set_up_functions(ctx: &mut SgpioContext, clocks: &mut ClockGraph, timer: &impl Timer) -> Result<(), Error> {
    reset_and_default(ctx);

    for idx in 0..ctx.functions.len() {
        if !ctx.functions[idx].enabled {
            continue;
        }
        place_function(ctx, idx, clocks, timer)?;
    }

    optimize_buffers(ctx);
    apply_output_pin_policy(ctx)?;
    apply_shift_limits(ctx)?;
    codegen::generate_isr(ctx)?;

    Ok(())
}

/// Step 1: put SGPIO in reset and default-safe (spec.md §4.D step 1).
fn reset_and_default(ctx: &mut SgpioContext) {
    unsafe { regs::rgu() }.reset_ctrl.set_bits(regs::RGU_SGPIO_RESET_BIT);
    unsafe { regs::rgu() }.reset_ctrl.clear_bits(regs::RGU_SGPIO_RESET_BIT);

    ctx.regs.ctrl_enable_clr.write(0xFFFF);
    for i in 0..SGPIO_SLICE_COUNT {
        ctx.regs.out_cfg[i].write(pack_out_cfg(bits::OUT_MODE_GPIO, bits::DIR_SRC_PIN_REG, false));
        ctx.regs.shift_cfg[i].write(0);
    }
    ctx.slices_in_use = 0;
    ctx.pins_in_use = 0;
    ctx.swap_irqs_required = 0;
}

/// Step 2: initial placement for one enabled function.
fn place_function(ctx: &mut SgpioContext, idx: usize, clocks: &mut ClockGraph, timer: &impl Timer) -> Result<(), Error> {
    let bus_width = normalize_bus_width(ctx.functions[idx].bus_width)?;
    ctx.functions[idx].bus_width = bus_width;

    let first_pin = ctx.functions[idx].first_pin().sgpio_pin;
    if bus_width > 1 && first_pin % bus_width != 0 {
        return Err(Error::InvalidArgument);
    }

    // Pin multiplexing.
    for i in 0..bus_width as usize {
        let pc = ctx.functions[idx].pin_configurations[i];
        let func_select = tables::lookup_scu_function(pc.sgpio_pin, pc.scu_group, pc.scu_pin).ok_or(Error::InvalidPinMapping)?;
        if ctx.pins_in_use & (1 << pc.sgpio_pin) != 0 {
            return Err(Error::Busy);
        }
        program_scu_pin(pc.scu_group, pc.scu_pin, func_select, pc.pull);
        ctx.pins_in_use |= 1 << pc.sgpio_pin;
    }

    // I/O slice.
    let is_clockgen = ctx.functions[idx].mode == Mode::ClockGen;
    let io_slice = if is_clockgen { tables::PIN_TO_CLOCKGEN_SLICE[first_pin as usize] } else { tables::PIN_TO_IO_SLICE[first_pin as usize] };
    if ctx.slices_in_use & (1 << io_slice.index()) != 0 {
        return Err(Error::Busy);
    }
    ctx.slices_in_use |= 1 << io_slice.index();
    ctx.functions[idx].io_slice = Some(io_slice);

    // Direction slice (bidirectional only).
    if ctx.functions[idx].mode == Mode::Bidirectional {
        let direction_slice = tables::direction_slice(bus_width, first_pin);
        if ctx.slices_in_use & (1 << direction_slice.index()) != 0 {
            return Err(Error::Busy);
        }
        ctx.slices_in_use |= 1 << direction_slice.index();
        ctx.functions[idx].direction_slice = Some(direction_slice);
    }

    // Shift clock.
    let achieved_hz = program_shift_clock(ctx, idx, clocks, timer)?;
    ctx.functions[idx].shift_clock_frequency = achieved_hz;

    // Qualifier.
    program_qualifier(ctx, idx);

    // Bus topology.
    program_bus_topology(ctx, idx, bus_width, io_slice);

    Ok(())
}

fn program_shift_clock(ctx: &mut SgpioContext, idx: usize, clocks: &mut ClockGraph, timer: &impl Timer) -> Result<u32, Error> {
    let io_slice = ctx.functions[idx].io_slice.expect("io_slice set earlier in place_function");
    let edge_falling = matches!(ctx.functions[idx].shift_clock_edge, Edge::Falling);

    let (kind, selector, achieved_hz) = match ctx.functions[idx].shift_clock_source {
        ShiftClockSource::Local => {
            let branch_hz = clocks.get_branch_frequency(BranchClock::Apb3Sgpio, timer);
            let requested_hz = ctx.functions[idx].shift_clock_frequency_hz;
            if requested_hz > branch_hz {
                return Err(Error::TimingInfeasible);
            }
            let divisor = if requested_hz == 0 { 1 } else { (branch_hz / requested_hz).max(1) };
            if divisor == 0 {
                return Err(Error::TimingInfeasible);
            }
            ctx.regs.preset[io_slice.index()].write(divisor - 1);
            (bits::CLOCK_SRC_LOCAL, 0u32, branch_hz / divisor)
        }
        ShiftClockSource::Pin(pin) => (bits::CLOCK_SRC_PIN, pin as u32, 0),
        ShiftClockSource::Slice(slice) => (bits::CLOCK_SRC_SLICE, slice.index() as u32, 0),
    };

    ctx.regs.shift_cfg[io_slice.index()].modify(|v| {
        (v & !0x7F) | (kind & 0x3) | ((selector & 0xF) << 2) | ((edge_falling as u32) << 6)
    });

    Ok(achieved_hz)
}

fn program_qualifier(ctx: &mut SgpioContext, idx: usize) {
    let io_slice = ctx.functions[idx].io_slice.expect("io_slice set earlier in place_function");
    let (mode, selector) = match ctx.functions[idx].qualifier {
        Qualifier::Always => (bits::QUAL_ALWAYS, 0u32),
        Qualifier::Never => (bits::QUAL_NEVER, 0),
        // Both the pin and slice selector fields are written; only the one
        // matching `mode` is consulted by hardware (spec.md §4.D).
        Qualifier::Slice(slice) => (bits::QUAL_SLICE, slice.index() as u32),
        Qualifier::Pin(pin) => (bits::QUAL_PIN, pin as u32),
    };
    let polarity_low = matches!(ctx.functions[idx].qualifier_polarity, Polarity::ActiveLow);

    ctx.regs.shift_cfg[io_slice.index()].modify(|v| {
        (v & !(0x3F << 7)) | ((mode & 0x3) << 7) | ((selector & 0x1F) << 9) | ((polarity_low as u32) << 14)
    });

    if let Qualifier::Pin(pin) = ctx.functions[idx].qualifier {
        // Route the qualifier pin through its primary SCU mapping — it isn't
        // necessarily one of this function's own `pin_configurations` pins
        // (spec.md §4.D step 2).
        if let Some(route) = tables::primary_scu_route(pin) {
            program_scu_pin(route.scu_group, route.scu_pin, route.func_select, Pull::None);
        }
    }
}

fn program_bus_topology(ctx: &mut SgpioContext, idx: usize, bus_width: u8, io_slice: Slice) {
    let parallel_mode = parallel_mode_for_width(bus_width);
    ctx.regs.shift_cfg[io_slice.index()].modify(|v| (v & !(0x3 << 15)) | (parallel_mode << 15));
    // Disable concatenation on the I/O slice (it is the input/output
    // boundary, not a chained continuation).
    ctx.regs.shift_cfg[io_slice.index()].clear_bits(1 << 17);

    let shifts = (32 / bus_width as u32).saturating_sub(1);
    ctx.regs.pos[io_slice.index()].write(pack_pos(shifts, shifts, false));
    ctx.regs.pos_reset[io_slice.index()].write(pack_pos(shifts, shifts, false));

    if ctx.functions[idx].mode == Mode::Bidirectional {
        let direction_slice = ctx.functions[idx].direction_slice.expect("direction_slice set for bidirectional mode");
        ctx.regs.pos[direction_slice.index()].write(pack_pos(shifts, shifts, false));
        ctx.regs.pos_reset[direction_slice.index()].write(pack_pos(shifts, shifts, false));

        // 2-bit parallel mode for non-serial buses (MSB selects direction
        // for non-zero pins); serial buses keep the direction slice at
        // 1-bit. Enable concatenation and start with a single direction
        // slice (order 0).
        let direction_parallel_mode = if bus_width == 1 { 0 } else { 1 };
        ctx.regs.shift_cfg[direction_slice.index()].modify(|v| (v & !(0x3 << 15)) | (direction_parallel_mode << 15));
        ctx.regs.shift_cfg[direction_slice.index()].set_bits(1 << 17);
        ctx.regs.shift_cfg[direction_slice.index()].modify(|v| v & !(0x7 << 18));
    }

    ctx.functions[idx].buffer_depth_order = 0;
    ctx.functions[idx].direction_buffer_depth_order = 0;
}

/// Step 3: repeat until no function can grow.
fn optimize_buffers(ctx: &mut SgpioContext) {
    loop {
        let mut grew_any = false;
        for idx in 0..ctx.functions.len() {
            if !ctx.functions[idx].enabled {
                continue;
            }
            if try_grow_function(ctx, idx) {
                grew_any = true;
            }
        }
        if !grew_any {
            break;
        }
    }
}

fn try_grow_function(ctx: &mut SgpioContext, idx: usize) -> bool {
    let mode = ctx.functions[idx].mode;
    let bus_width = ctx.functions[idx].bus_width;
    let io_slice = match ctx.functions[idx].io_slice {
        Some(s) => s,
        None => return false,
    };
    let first_pin = ctx.functions[idx].first_pin().sgpio_pin;
    let current_order = ctx.functions[idx].buffer_depth_order;
    let new_order = current_order + 1;
    let new_depth = 1u32 << new_order;
    let old_depth = 1u32 << current_order;

    if new_depth > mode.max_chain_depth(io_slice) as u32 {
        return false;
    }

    let buffer_limit_slices = (ctx.functions[idx].buffer.size() as u32 / 4).max(1);
    // FIXED_OUT without a shift limit can preload data+shadow once, halving
    // the effective buffer-depth limit without losing any content.
    let effective_limit = if mode == Mode::FixedOut && ctx.functions[idx].shift_count_limit == 0 {
        (buffer_limit_slices / 2).max(1)
    } else {
        buffer_limit_slices
    };
    if new_depth > effective_limit {
        return false;
    }

    let is_clockgen = mode == Mode::ClockGen;
    let mut new_io_slices = [io_slice; 8];
    let mut new_io_count = 0usize;
    for k in old_depth..new_depth {
        let slice = chain_slice(first_pin, k, is_clockgen);
        if ctx.slices_in_use & (1 << slice.index()) != 0 {
            return false;
        }
        new_io_slices[new_io_count] = slice;
        new_io_count += 1;
    }

    let mut new_dir_slices = [io_slice; 8];
    let mut new_dir_count = 0usize;
    if mode == Mode::Bidirectional {
        let dir_order = ctx.functions[idx].direction_buffer_depth_order;
        let new_dir_order = dir_order + 1;
        let old_dir_depth = 1u32 << dir_order;
        let new_dir_depth = 1u32 << new_dir_order;
        for k in old_dir_depth..new_dir_depth {
            let slice = direction_chain_slice(bus_width, first_pin, k);
            if ctx.slices_in_use & (1 << slice.index()) != 0 {
                // The direction chain cannot grow to cover the new amount
                // of shifts; refuse the whole doubling (spec.md §4.D).
                return false;
            }
            new_dir_slices[new_dir_count] = slice;
            new_dir_count += 1;
        }
    }

    // Commit. Copy the I/O slice's config to every newly chained slice.
    let io_shift_cfg = ctx.regs.shift_cfg[io_slice.index()].read();
    for &slice in &new_io_slices[..new_io_count] {
        ctx.slices_in_use |= 1 << slice.index();
        ctx.regs.shift_cfg[slice.index()].write(io_shift_cfg);
        ctx.regs.shift_cfg[slice.index()].set_bits(1 << 17); // enable_concatenation
        // Every non-boundary slice accepts input from its concat
        // predecessor, which is a self-loop for fixed/clock-gen output.
        ctx.regs.shift_cfg[slice.index()].set_bits(1 << 21);
    }

    // Concatenation order applies chain-wide.
    for k in 0..new_depth {
        let slice = chain_slice(first_pin, k, is_clockgen);
        ctx.regs.shift_cfg[slice.index()].modify(|v| (v & !(0x7 << 18)) | ((new_order as u32 & 0x7) << 18));
    }
    // The I/O slice accepts external input only when the mode consumes
    // input and it is the input boundary.
    let consumes_input = mode.is_in_capable();
    ctx.regs.shift_cfg[io_slice.index()].modify(|v| if consumes_input { v & !(1 << 21) } else { v | (1 << 21) });

    ctx.functions[idx].buffer_depth_order = new_order;

    let new_shifts = ((32 * new_depth) / bus_width as u32).saturating_sub(1);
    for k in 0..new_depth {
        let slice = chain_slice(first_pin, k, is_clockgen);
        ctx.regs.pos[slice.index()].write(pack_pos(new_shifts, new_shifts, false));
        ctx.regs.pos_reset[slice.index()].write(pack_pos(new_shifts, new_shifts, false));
    }

    if mode == Mode::Bidirectional {
        let direction_slice_cfg = ctx.functions[idx]
            .direction_slice
            .map(|s| ctx.regs.shift_cfg[s.index()].read())
            .unwrap_or(io_shift_cfg);
        for &slice in &new_dir_slices[..new_dir_count] {
            ctx.slices_in_use |= 1 << slice.index();
            ctx.regs.shift_cfg[slice.index()].write(direction_slice_cfg);
            ctx.regs.shift_cfg[slice.index()].set_bits(1 << 17);
        }
        // Open Question #2 (DESIGN.md): increment the direction chain's
        // OWN depth field, not the I/O chain's.
        ctx.functions[idx].direction_buffer_depth_order += 1;
    }

    true
}

/// Step 4: output-pin policy.
fn apply_output_pin_policy(ctx: &mut SgpioContext) -> Result<(), Error> {
    for idx in 0..ctx.functions.len() {
        if !ctx.functions[idx].enabled {
            continue;
        }
        let mode = ctx.functions[idx].mode;
        let bus_width = ctx.functions[idx].bus_width;
        let io_slice = ctx.functions[idx].io_slice.expect("io_slice set earlier");

        match mode {
            Mode::StreamIn => {
                ctx.regs.out_cfg[io_slice.index()].write(pack_out_cfg(bits::OUT_MODE_GPIO, bits::DIR_SRC_PIN_REG, false));
            }
            Mode::StreamOut | Mode::FixedOut => {
                let out_mode = match bus_width {
                    1 => bits::OUT_MODE_1BIT,
                    2 => bits::OUT_MODE_2BIT_A,
                    4 => bits::OUT_MODE_4BIT_A,
                    8 => bits::OUT_MODE_8BIT_A,
                    _ => unreachable!(),
                };
                ctx.regs.out_cfg[io_slice.index()].write(pack_out_cfg(out_mode, bits::DIR_SRC_OUTPUT, true));
            }
            Mode::ClockGen => {
                ctx.regs.out_cfg[io_slice.index()].write(pack_out_cfg(bits::OUT_MODE_CLOCK_OUT, bits::DIR_SRC_OUTPUT, true));
            }
            Mode::Bidirectional => {
                let out_mode = match bus_width {
                    1 => bits::OUT_MODE_1BIT,
                    2 => bits::OUT_MODE_2BIT_A,
                    4 => bits::OUT_MODE_4BIT_A,
                    8 => bits::OUT_MODE_8BIT_A,
                    _ => unreachable!(),
                };
                let dir_src = match bus_width {
                    1 => bits::DIR_SRC_DIR_1BIT,
                    2 => bits::DIR_SRC_DIR_2BIT,
                    4 => bits::DIR_SRC_DIR_4BIT,
                    8 => bits::DIR_SRC_DIR_8BIT,
                    _ => unreachable!(),
                };
                ctx.regs.out_cfg[io_slice.index()].write(pack_out_cfg(out_mode, dir_src, false));
                let direction_slice = ctx.functions[idx].direction_slice.expect("direction_slice set for bidirectional mode");
                // Pre-tristate the output.
                ctx.regs.data[direction_slice.index()].write(0);
            }
        }

        if let Some(clock_pin) = ctx.functions[idx].clock_output_pin {
            let clockgen_slice = tables::PIN_TO_CLOCKGEN_SLICE[clock_pin as usize];
            let io_divisor = ctx.regs.preset[io_slice.index()].read();
            if ctx.slices_in_use & (1 << clockgen_slice.index()) != 0 {
                if clockgen_slice != io_slice && ctx.regs.preset[clockgen_slice.index()].read() != io_divisor {
                    return Err(Error::Busy);
                }
            } else {
                ctx.regs.preset[clockgen_slice.index()].write(io_divisor);
                ctx.regs.shift_cfg[clockgen_slice.index()].write(ctx.regs.shift_cfg[io_slice.index()].read());
                ctx.regs.out_cfg[clockgen_slice.index()].write(pack_out_cfg(bits::OUT_MODE_CLOCK_OUT, bits::DIR_SRC_OUTPUT, true));
                ctx.slices_in_use |= 1 << clockgen_slice.index();
            }
        }
    }
    Ok(())
}

/// Step 5: apply shift limits.
fn apply_shift_limits(ctx: &mut SgpioContext) -> Result<(), Error> {
    for idx in 0..ctx.functions.len() {
        if !ctx.functions[idx].enabled {
            continue;
        }
        let limit = ctx.functions[idx].shift_count_limit;
        if limit == 0 {
            continue;
        }
        let bus_width = ctx.functions[idx].bus_width;
        let chain_depth = ctx.functions[idx].chain_depth();
        let shifts_per_swap = (32 * chain_depth) / bus_width as u32;
        if limit > shifts_per_swap {
            return Err(Error::CannotMeetShiftLimit);
        }

        let first_pin = ctx.functions[idx].first_pin().sgpio_pin;
        let is_clockgen = ctx.functions[idx].mode == Mode::ClockGen;
        for k in 0..chain_depth {
            let slice = chain_slice(first_pin, k, is_clockgen);
            ctx.regs.pos[slice.index()].write(pack_pos(0, limit - 1, true));
        }

        if ctx.functions[idx].mode == Mode::Bidirectional {
            let dir_depth = 1u32 << ctx.functions[idx].direction_buffer_depth_order;
            for k in 0..dir_depth {
                let slice = direction_chain_slice(bus_width, first_pin, k);
                ctx.regs.pos[slice.index()].write(pack_pos(0, limit - 1, true));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sgpio::{BufferHandle, Function, PinConfig};

    struct FakeTimer;
    impl Timer for FakeTimer {
        fn now_micros(&self) -> u64 {
            0
        }
    }

    fn registers() -> &'static regs::SgpioRegs {
        Box::leak(Box::new(regs::SgpioRegs::zeroed()))
    }

    fn buffer(bytes: usize) -> (Box<[u8]>, BufferHandle) {
        let mut storage = vec![0u8; bytes].into_boxed_slice();
        let handle = BufferHandle { ptr: storage.as_mut_ptr(), order: bytes.trailing_zeros() as u8 };
        (storage, handle)
    }

    fn pin_config(sgpio_pin: u8) -> PinConfig {
        PinConfig { sgpio_pin, scu_group: 1, scu_pin: sgpio_pin, pull: Pull::None }
    }

    #[test]
    fn s1_clock_only_uses_clockgen_table_and_local_divisor() {
        let regs = registers();
        let mut functions = [Function::blank()];
        functions[0].enabled = true;
        functions[0].mode = Mode::ClockGen;
        functions[0].bus_width = 1;
        functions[0].pin_configurations[0] = pin_config(8);
        functions[0].shift_clock_frequency_hz = 0;
        let (_storage, buf) = buffer(4);
        functions[0].buffer = buf;

        let mut ctx = SgpioContext::with_registers(regs, &mut functions);
        let mut clocks = ClockGraph::new();
        let timer = FakeTimer;

        set_up_functions(&mut ctx, &mut clocks, &timer).unwrap();

        assert_eq!(ctx.functions[0].io_slice, Some(tables::PIN_TO_CLOCKGEN_SLICE[8]));
        assert_eq!(tables::PIN_TO_CLOCKGEN_SLICE[8], Slice::A);
    }

    #[test]
    fn s6_busy_pin_second_function_rejected() {
        let regs = registers();
        let mut functions = [Function::blank(), Function::blank()];
        for f in functions.iter_mut() {
            f.enabled = true;
            f.mode = Mode::StreamIn;
            f.bus_width = 1;
            f.pin_configurations[0] = pin_config(0);
        }
        let (_s0, buf0) = buffer(16);
        let (_s1, buf1) = buffer(16);
        functions[0].buffer = buf0;
        functions[1].buffer = buf1;

        let mut ctx = SgpioContext::with_registers(regs, &mut functions);
        let mut clocks = ClockGraph::new();
        let timer = FakeTimer;

        assert_eq!(set_up_functions(&mut ctx, &mut clocks, &timer), Err(Error::Busy));
    }

    #[test]
    fn s4_bus_width_3_is_promoted_to_4() {
        assert_eq!(normalize_bus_width(3), Ok(4));
        assert_eq!(normalize_bus_width(5), Ok(8));
        assert_eq!(normalize_bus_width(9), Err(Error::InvalidArgument));
    }

    #[test]
    fn s3_fixed_out_8bit_needs_no_isr_and_prepopulates_both_halves() {
        let regs = registers();
        let mut functions = [Function::blank()];
        functions[0].enabled = true;
        functions[0].mode = Mode::FixedOut;
        functions[0].bus_width = 8;
        for pin in 0..8u8 {
            functions[0].pin_configurations[pin as usize] = pin_config(pin);
        }
        let (_storage, buf) = buffer(8);
        functions[0].buffer = buf;

        let mut ctx = SgpioContext::with_registers(regs, &mut functions);
        let mut clocks = ClockGraph::new();
        let timer = FakeTimer;
        set_up_functions(&mut ctx, &mut clocks, &timer).unwrap();

        assert_eq!(ctx.functions[0].io_slice, Some(Slice::A));
        assert_eq!(regs.out_cfg[Slice::A.index()].read(), pack_out_cfg(bits::OUT_MODE_8BIT_A, bits::DIR_SRC_OUTPUT, true));
        assert_eq!(ctx.swap_irqs_required(), 0);

        ctx.run();
        assert_eq!(regs.data[Slice::A.index()].read(), regs.data_shadow[Slice::A.index()].read());
    }

    #[test]
    fn s4_bus_width_3_is_promoted_to_4_end_to_end() {
        let regs = registers();
        let mut functions = [Function::blank()];
        functions[0].enabled = true;
        functions[0].mode = Mode::StreamOut;
        functions[0].bus_width = 3;
        functions[0].pin_configurations[0] = pin_config(0);
        let (_storage, buf) = buffer(16);
        functions[0].buffer = buf;

        let mut ctx = SgpioContext::with_registers(regs, &mut functions);
        let mut clocks = ClockGraph::new();
        let timer = FakeTimer;
        set_up_functions(&mut ctx, &mut clocks, &timer).unwrap();

        assert_eq!(ctx.functions[0].bus_width, 4);
        let io_slice = ctx.functions[0].io_slice.expect("io_slice set");
        let parallel_mode_bits = regs.shift_cfg[io_slice.index()].read() & (0x3 << 15);
        assert_eq!(parallel_mode_bits, parallel_mode_for_width(4) << 15);
    }

    #[test]
    fn s5_shift_limit_smaller_than_chain_needs_no_isr_and_captures_12_bytes() {
        let regs = registers();
        let mut functions = [Function::blank()];
        functions[0].enabled = true;
        functions[0].mode = Mode::StreamIn;
        functions[0].bus_width = 1;
        functions[0].pin_configurations[0] = pin_config(0);
        let (_storage, buf) = buffer(1024);
        functions[0].buffer = buf;
        functions[0].shift_count_limit = 100;

        let mut ctx = SgpioContext::with_registers(regs, &mut functions);
        let mut clocks = ClockGraph::new();
        let timer = FakeTimer;
        set_up_functions(&mut ctx, &mut clocks, &timer).unwrap();

        assert_eq!(ctx.functions[0].chain_depth(), 8);
        assert_eq!(ctx.swap_irqs_required(), 0);

        let first_pin = ctx.functions[0].first_pin().sgpio_pin;
        for k in 0..8 {
            let slice = chain_slice(first_pin, k, false);
            let pos = regs.pos[slice.index()].read();
            assert_eq!(pos & 0xFFF, 0, "shifts_per_buffer_swap must be 0");
            assert_eq!((pos >> 12) & 0xFFF, 99, "shifts_remaining must be limit-1");
            assert_ne!(pos & (1 << 31), 0, "stop_on_next_buffer_swap must be set");
        }

        // Residual lives in `data_shadow`; each word packs its four bytes as
        // (byte0<<24)|(byte1<<16)|(byte2<<8)|byte3 per the capture byte math.
        regs.data_shadow[chain_slice(first_pin, 0, false).index()].write(0x00010203);
        regs.data_shadow[chain_slice(first_pin, 1, false).index()].write(0x04050607);
        regs.data_shadow[chain_slice(first_pin, 2, false).index()].write(0x08090A0B);

        super::super::shuttle::capture_remaining(&mut ctx);

        let buffer_ptr = ctx.functions[0].buffer.ptr;
        let captured = unsafe { core::slice::from_raw_parts(buffer_ptr, 12) };
        assert_eq!(captured, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(ctx.functions[0].position_in_buffer, 12);
    }

    #[test]
    fn zero_frequency_uses_divisor_one() {
        let regs = registers();
        let mut functions = [Function::blank()];
        functions[0].enabled = true;
        functions[0].mode = Mode::ClockGen;
        functions[0].pin_configurations[0] = pin_config(8);
        functions[0].shift_clock_frequency_hz = 0;
        let (_storage, buf) = buffer(4);
        functions[0].buffer = buf;

        let mut ctx = SgpioContext::with_registers(regs, &mut functions);
        let mut clocks = ClockGraph::new();
        let timer = FakeTimer;
        set_up_functions(&mut ctx, &mut clocks, &timer).unwrap();
        assert_eq!(regs.preset[tables::PIN_TO_CLOCKGEN_SLICE[8].index()].read(), 0);
    }
}

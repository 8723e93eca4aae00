//! SGPIO subsystem (spec §2 components D/E/F): the slice-allocation
//! planner, the runtime Thumb code generator, and the data-shuttle engine.
//! This is the "interesting mass" of the crate (spec.md §2's size budget
//! calls out ~55% of the source here).
//!
//! Grounded on the teacher's per-peripheral module shape — one struct owning
//! register access plus derived state, e.g. `wwdt.rs`'s
//! `WindowedWatchdog<'d, T>` — adapted from the teacher's typestate-per-pin
//! ownership to this spec's caller-owned-array-of-functions model (spec.md
//! §3's `SgpioContext`).

pub mod codegen;
pub mod planner;
pub mod shuttle;
pub mod tables;

use crate::fmt::{trace, warn};
use crate::regs::{self, SgpioRegs, SGPIO_SLICE_COUNT};

/// One of the 16 lettered SGPIO slices (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[rustfmt::skip]
pub enum Slice { A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P }

impl Slice {
    /// Build a `Slice` from its 0..15 register index.
    pub const fn from_index(index: u8) -> Self {
        const TABLE: [Slice; SGPIO_SLICE_COUNT] = [
            Slice::A, Slice::B, Slice::C, Slice::D, Slice::E, Slice::F, Slice::G, Slice::H,
            Slice::I, Slice::J, Slice::K, Slice::L, Slice::M, Slice::N, Slice::O, Slice::P,
        ];
        TABLE[index as usize]
    }

    /// This slice's 0..15 register index.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// True for slices in the upper half (I..P) of the fabric — the half
    /// with a 4-deep (rather than 8-deep) bidirectional chain limit (spec.md
    /// §4.D step 3).
    pub const fn is_high_half(self) -> bool {
        self.index() >= 8
    }
}

/// The logical purpose a function assigns to one of its pins (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    StreamIn,
    StreamOut,
    FixedOut,
    Bidirectional,
    ClockGen,
}

impl Mode {
    /// Does this mode drive the host buffer *out* to the pins (as opposed
    /// to capturing pin data *in*)?
    pub const fn is_out_capable(self) -> bool {
        matches!(self, Mode::StreamOut | Mode::FixedOut | Mode::Bidirectional)
    }

    /// Does this mode capture shifted-in pin data into the host buffer?
    pub const fn is_in_capable(self) -> bool {
        matches!(self, Mode::StreamIn | Mode::Bidirectional)
    }

    /// Maximum concatenation chain depth for this mode and I/O slice
    /// (spec.md §4.D step 3).
    pub fn max_chain_depth(self, io_slice: Slice) -> u8 {
        match self {
            Mode::ClockGen => 1,
            Mode::StreamIn | Mode::StreamOut | Mode::FixedOut => 8,
            Mode::Bidirectional => {
                if io_slice.is_high_half() {
                    4
                } else {
                    8
                }
            }
        }
    }
}

/// Internal pull-resistor setting for a pin (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    None,
    Down,
    Up,
    Keeper,
}

/// Which edge of the shift clock latches data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    Rising,
    Falling,
}

/// Shift-clock source selector (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShiftClockSource {
    /// Derived from the SGPIO branch clock by an internal counter/divisor.
    Local,
    /// One of the four external clock pins (SGPIO08/09/10/11).
    Pin(u8),
    /// Another slice's shift clock output (D/H/O/P only).
    Slice(Slice),
}

/// Shift qualifier gating (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Qualifier {
    Always,
    Never,
    Slice(Slice),
    Pin(u8),
}

/// Active-high or active-low qualifier polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

/// One external pin assignment within a [`Function`]'s
/// `pin_configurations` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinConfig {
    /// SGPIO pin index, 0..15.
    pub sgpio_pin: u8,
    /// SCU pin-mux group.
    pub scu_group: u8,
    /// SCU pin number within the group.
    pub scu_pin: u8,
    pub pull: Pull,
}

/// A raw, caller-owned, power-of-two-sized byte region (spec.md §3's ring
/// buffer "pointer + order"). Unlike [`crate::ringbuffer::RingBuffer`],
/// this is accessed directly by offset from the generated ISR and from
/// [`shuttle`], not through an enqueue/dequeue API — the hardware always
/// moves whole words.
#[derive(Clone, Copy)]
pub struct BufferHandle {
    pub ptr: *mut u8,
    /// `log2(size in bytes)`.
    pub order: u8,
}

impl BufferHandle {
    pub const fn size(&self) -> usize {
        1usize << self.order
    }

    pub const fn mask(&self) -> u32 {
        (self.size() - 1) as u32
    }
}

/// Overrides a [`Function`] may request (spec.md §3: "currently: 'never
/// synthesize an ISR'").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Overrides {
    pub never_synthesize_isr: bool,
}

/// A caller-declared logical bus (spec.md §3). The caller populates every
/// field above the `--- derived ---` marker; [`planner::set_up_functions`]
/// fills in the rest on success.
#[derive(Clone, Copy)]
pub struct Function {
    pub mode: Mode,
    pub bus_width: u8,
    pub pin_configurations: [PinConfig; 8],
    pub shift_clock_source: ShiftClockSource,
    pub shift_clock_edge: Edge,
    /// Desired shift-clock frequency in Hz; 0 means "as fast as possible".
    pub shift_clock_frequency_hz: u32,
    pub qualifier: Qualifier,
    pub qualifier_polarity: Polarity,
    pub clock_output_pin: Option<u8>,
    pub buffer: BufferHandle,
    pub direction_buffer: Option<BufferHandle>,
    /// 0 means "no limit".
    pub shift_count_limit: u32,
    pub overrides: Overrides,
    /// Whether this function is enabled; disabled functions are skipped by
    /// the planner entirely (spec.md §4.D: "Each enabled function").
    pub enabled: bool,

    // --- derived / written back by set_up_functions ---
    pub io_slice: Option<Slice>,
    pub direction_slice: Option<Slice>,
    pub buffer_depth_order: u8,
    pub direction_buffer_depth_order: u8,
    pub position_in_buffer: u32,
    pub direction_position_in_buffer: u32,
    pub data_in_buffer: u32,
    pub shift_clock_frequency: u32,
    pub needs_isr: bool,
}

impl Function {
    /// A blank function with every caller field zeroed/defaulted, ready to
    /// have its declarative fields filled in. All derived fields start at
    /// their "nothing allocated yet" value.
    pub const fn blank() -> Self {
        const BLANK_PIN: PinConfig = PinConfig { sgpio_pin: 0, scu_group: 0, scu_pin: 0, pull: Pull::None };
        Self {
            mode: Mode::StreamIn,
            bus_width: 1,
            pin_configurations: [BLANK_PIN; 8],
            shift_clock_source: ShiftClockSource::Local,
            shift_clock_edge: Edge::Rising,
            shift_clock_frequency_hz: 0,
            qualifier: Qualifier::Always,
            qualifier_polarity: Polarity::ActiveHigh,
            clock_output_pin: None,
            buffer: BufferHandle { ptr: core::ptr::null_mut(), order: 0 },
            direction_buffer: None,
            shift_count_limit: 0,
            overrides: Overrides { never_synthesize_isr: false },
            enabled: false,
            io_slice: None,
            direction_slice: None,
            buffer_depth_order: 0,
            direction_buffer_depth_order: 0,
            position_in_buffer: 0,
            direction_position_in_buffer: 0,
            data_in_buffer: 0,
            shift_clock_frequency: 0,
            needs_isr: false,
        }
    }

    pub(crate) fn first_pin(&self) -> &PinConfig {
        &self.pin_configurations[0]
    }

    pub(crate) fn chain_depth(&self) -> u32 {
        1u32 << self.buffer_depth_order
    }
}

/// Errors from [`planner::set_up_functions`] (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    InvalidArgument,
    InvalidPinMapping,
    Busy,
    CannotMeetShiftLimit,
    TimingInfeasible,
    Timeout,
    Unsupported,
    OutOfMemory,
}

/// Owns the function array, the slice/pin usage bitmasks, and the register
/// base pointer (spec.md §3). Lifecycle: build `functions`, call
/// [`planner::set_up_functions`] (idempotent with reset), then
/// `run`/`halt`/`running` any number of times.
pub struct SgpioContext<'a> {
    pub(crate) regs: &'static SgpioRegs,
    pub(crate) functions: &'a mut [Function],
    pub(crate) slices_in_use: u16,
    pub(crate) pins_in_use: u16,
    pub(crate) swap_irqs_required: u16,
    pub(crate) running: bool,
}

impl<'a> SgpioContext<'a> {
    /// Build a context bound to the real SGPIO peripheral.
    ///
    /// # Safety
    /// There must be exactly one live `SgpioContext` for the lifetime of the
    /// program (the peripheral has no concept of sharing).
    pub unsafe fn new(functions: &'a mut [Function]) -> Self {
        Self { regs: unsafe { regs::sgpio() }, functions, slices_in_use: 0, pins_in_use: 0, swap_irqs_required: 0, running: false }
    }

    /// Build a context over an arbitrary register block — used by host
    /// tests to drive the planner/codegen/shuttle against a stack-allocated
    /// mock instead of real MMIO (spec.md §10.5).
    #[cfg(test)]
    pub fn with_registers(regs: &'static SgpioRegs, functions: &'a mut [Function]) -> Self {
        Self { regs, functions, slices_in_use: 0, pins_in_use: 0, swap_irqs_required: 0, running: false }
    }

    pub fn registers(&self) -> &'static SgpioRegs {
        self.regs
    }

    pub fn functions(&self) -> &[Function] {
        self.functions
    }

    pub fn functions_mut(&mut self) -> &mut [Function] {
        self.functions
    }

    pub fn slices_in_use(&self) -> u16 {
        self.slices_in_use
    }

    pub fn pins_in_use(&self) -> u16 {
        self.pins_in_use
    }

    pub fn swap_irqs_required(&self) -> u16 {
        self.swap_irqs_required
    }

    /// `run(ctx)` (spec.md §4.D): disable the shift clock, prepopulate
    /// buffers, arm the exchange-clock interrupt mask, clear stale status,
    /// enable or disable the SGPIO IRQ as required, then enable the shift
    /// clock for every used slice.
    pub fn run(&mut self) {
        self.regs.ctrl_enable_clr.write(0xFFFF);
        shuttle::prepopulate(self);
        self.regs.mask.write(self.swap_irqs_required as u32);
        // Clear status, then pending, before possibly enabling the IRQ —
        // otherwise a stale pending bit from a previous run could cause a
        // spurious shuttle (spec.md §5).
        self.regs.status.write(0xFFFF);
        crate::nvic::mark_serviced(crate::nvic::Irq::Sgpio);
        if self.swap_irqs_required != 0 {
            crate::nvic::enable(crate::nvic::Irq::Sgpio);
        } else {
            crate::nvic::disable(crate::nvic::Irq::Sgpio);
        }
        self.regs.ctrl_enable_set.write(self.slices_in_use as u32);
        self.running = true;
        trace!("sgpio: run");
    }

    /// `halt(ctx)` (spec.md §4.D): disable shift clock, clear exchange
    /// status, disable the IRQ, and capture in-flight data.
    pub fn halt(&mut self) {
        self.regs.ctrl_enable_clr.write(0xFFFF);
        self.regs.status.write(0xFFFF);
        crate::nvic::disable(crate::nvic::Irq::Sgpio);
        shuttle::capture_remaining(self);
        self.running = false;
        trace!("sgpio: halt");
    }

    /// True if any used slice still has its shift clock enabled and either
    /// does not terminate or still has a nonzero cycle count (spec.md §4.D).
    pub fn running(&self) -> bool {
        if !self.running {
            return false;
        }
        let enabled_mask = self.regs.ctrl_enable_status.read() as u16;
        for i in 0..SGPIO_SLICE_COUNT {
            let bit = 1u16 << i;
            if self.slices_in_use & bit == 0 || enabled_mask & bit == 0 {
                continue;
            }
            let pos = self.regs.pos[i].read();
            let non_terminating = pos & (1 << 31) == 0;
            let cycle_count = self.regs.count[i].read();
            if non_terminating || cycle_count != 0 {
                return true;
            }
        }
        false
    }

    /// Diagnostic dump of every used slice's mode, chain position, and
    /// achieved frequency (spec.md §6.1, supplemented per §10.6).
    pub fn dump_configuration(&self, include_unused: bool) {
        for (i, function) in self.functions.iter().enumerate() {
            if !function.enabled && !include_unused {
                continue;
            }
            if let Some(slice) = function.io_slice {
                trace!(
                    "sgpio: function {} mode={:?} io_slice={:?} depth={} freq={}Hz",
                    i,
                    function.mode,
                    slice,
                    function.chain_depth(),
                    function.shift_clock_frequency
                );
            } else if include_unused {
                warn!("sgpio: function {} has no io_slice (not configured)", i);
            }
        }
    }
}

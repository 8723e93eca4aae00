//! Register Façade (spec §4.A).
//!
//! Bit-exact memory-mapped register blocks for the SGPIO, CGU, CCU, NVIC,
//! SCU, RGU and thin collaborator (UART/Timer/DAC/Ethernet/WWDT) peripheral
//! blocks, at the fixed physical base addresses named in spec §6.4.
//!
//! Every access goes through [`Reg`], which wraps `core::ptr::read_volatile`/
//! `write_volatile` so the compiler can never reorder or coalesce register
//! accesses across calls. Register-pair writes the hardware requires kept
//! separate (XTAL bypass-then-disable, branch-clock auto-disable-vs-enable)
//! are written with an explicit [`core::sync::atomic::fence`] between them —
//! see [`clocks`](crate::clocks) for the call sites.
//!
//! Byte offsets are checked at compile time with `core::mem::offset_of!`
//! rather than a `static_assertions` dependency (the teacher crate's
//! `stm32fx-rcc` sibling in the retrieval pack uses
//! `static_assertions::const_assert_eq!` for the same purpose; stable Rust
//! now provides the same guarantee without an extra crate).

use core::cell::UnsafeCell;
use core::ptr;

/// A single memory-mapped 32-bit register.
///
/// Reads and writes are always volatile. `Reg` is `!Send`/`!Sync` by default
/// via `UnsafeCell`, but every register block below is only ever reached
/// through a raw pointer obtained from a fixed physical address, so we
/// unsafely assert `Sync` on the block types that need to be shared as
/// `'static` references (mirrors how generated PAC crates mark their
/// `RegisterBlock`s).
#[repr(transparent)]
pub struct Reg(UnsafeCell<u32>);

impl Reg {
    /// Volatile read.
    #[inline]
    pub fn read(&self) -> u32 {
        unsafe { ptr::read_volatile(self.0.get()) }
    }

    /// Volatile write.
    #[inline]
    pub fn write(&self, value: u32) {
        unsafe { ptr::write_volatile(self.0.get(), value) }
    }

    /// Read-modify-write. Not atomic with respect to other bus masters (there
    /// are none on this part) but volatile against compiler reordering.
    #[inline]
    pub fn modify<F: FnOnce(u32) -> u32>(&self, f: F) {
        let v = self.read();
        self.write(f(v));
    }

    /// Set the bits in `mask`.
    #[inline]
    pub fn set_bits(&self, mask: u32) {
        self.modify(|v| v | mask);
    }

    /// Clear the bits in `mask`.
    #[inline]
    pub fn clear_bits(&self, mask: u32) {
        self.modify(|v| v & !mask);
    }
}

/// Memory fence separating register writes the hardware requires not be
/// coalesced or reordered (XTAL bypass/disable sequencing, branch-clock
/// auto-gate-vs-enable sequencing). See spec §4.A and §5.
#[inline]
pub fn split_write_fence() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

macro_rules! reserved {
    ($name:ident, $bytes:expr) => {
        $name: [u8; $bytes],
    };
}

// ---------------------------------------------------------------------
// SGPIO — base 0x4010_1000
// ---------------------------------------------------------------------

/// Number of SGPIO slices (A..P).
pub const SGPIO_SLICE_COUNT: usize = 16;

pub const SGPIO_BASE: usize = 0x4010_1000;

/// SGPIO register block.
///
/// Per-slice arrays are indexed by slice number (0 = A, .. 15 = P), matching
/// spec §3's `Slice` lettering.
#[repr(C)]
pub struct SgpioRegs {
    /// Slice data register (the "front" half of the double buffer).
    pub data: [Reg; SGPIO_SLICE_COUNT],
    /// Slice shadow register (the "back" half of the double buffer).
    pub data_shadow: [Reg; SGPIO_SLICE_COUNT],
    /// Shift-clock counter reload value (`cycles_per_shift`).
    pub preset: [Reg; SGPIO_SLICE_COUNT],
    /// Shift-clock counter current value (`cycle_count`).
    pub count: [Reg; SGPIO_SLICE_COUNT],
    /// Swap-position counter: bits `[11:0]` = `shifts_per_buffer_swap`,
    /// bits `[23:12]` = `shifts_remaining`, bit 31 = stop-on-next-swap.
    pub pos: [Reg; SGPIO_SLICE_COUNT],
    /// Reload value written back into [`Self::pos`] on every buffer swap.
    pub pos_reset: [Reg; SGPIO_SLICE_COUNT],
    /// Per-slice shift configuration: clock source/edge/qualifier, parallel
    /// mode, concatenation enable + order. See [`crate::sgpio::planner`]
    /// for the bitfield layout.
    pub shift_cfg: [Reg; SGPIO_SLICE_COUNT],
    /// Per-slice output-bus configuration (output mode, direction source).
    pub out_cfg: [Reg; SGPIO_SLICE_COUNT],
    /// Exchange-clock (data/shadow swap) interrupt status, write-1-to-clear,
    /// one bit per slice.
    pub status: Reg,
    reserved!(_reserved0, 0x220 - 0x204),
    /// Exchange-clock interrupt mask, one bit per slice
    /// (`swap_irqs_required`).
    pub mask: Reg,
    reserved!(_reserved1, 0xF00 - 0x224),
    /// Write 1 to enable the shift clock for the given slice(s).
    pub ctrl_enable_set: Reg,
    reserved!(_reserved2, 0xF20 - 0xF04),
    /// Write 1 to disable the shift clock for the given slice(s).
    pub ctrl_enable_clr: Reg,
    reserved!(_reserved3, 0xF60 - 0xF24),
    /// Read-only: current shift-clock-enabled mask.
    pub ctrl_enable_status: Reg,
}

const _: () = assert!(core::mem::offset_of!(SgpioRegs, data_shadow) == 0x040);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, preset) == 0x080);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, count) == 0x0c0);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, pos) == 0x100);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, pos_reset) == 0x140);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, shift_cfg) == 0x180);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, out_cfg) == 0x1c0);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, status) == 0x200);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, mask) == 0x220);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, ctrl_enable_set) == 0xF00);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, ctrl_enable_clr) == 0xF20);
const _: () = assert!(core::mem::offset_of!(SgpioRegs, ctrl_enable_status) == 0xF60);

/// # Safety
/// `SGPIO_BASE` is a fixed physical address for the lifetime of the program;
/// there is exactly one SGPIO peripheral instance.
pub unsafe fn sgpio() -> &'static SgpioRegs {
    unsafe { &*(SGPIO_BASE as *const SgpioRegs) }
}

#[cfg(test)]
impl SgpioRegs {
    /// An all-zero block for host-testing the planner/codegen/shuttle
    /// against a stack-allocated mock instead of real MMIO (spec.md §10.5).
    /// Every field is a `Reg`/`[Reg; N]`/padding byte array, so the
    /// all-zero bit pattern is always valid.
    pub fn zeroed() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

// ---------------------------------------------------------------------
// CGU (clock generation unit) — base 0x4005_0000
// ---------------------------------------------------------------------

pub const CGU_BASE: usize = 0x4005_0000;

/// Number of programmable base clocks (spec §3 `BaseClock`).
pub const CGU_BASE_CLOCK_COUNT: usize = 16;

#[repr(C)]
pub struct CguRegs {
    reserved!(_reserved0, 0x14),
    /// Frequency-monitor control/status register.
    pub freq_mon: Reg,
    /// Crystal oscillator control (enable, bypass). Bypass and disable must
    /// be written separately with [`split_write_fence`] between them.
    pub xtal_ctrl: Reg,
    /// USB PLL control.
    pub pll_usb_ctrl: Reg,
    reserved!(_reserved1, 0x2c - 0x20),
    /// USB PLL lock status.
    pub pll_usb_stat: Reg,
    reserved!(_reserved2, 0x40 - 0x30),
    /// Main PLL control (N/M/P divider fields, enable, latch).
    pub pll_main_ctrl: Reg,
    /// Main PLL lock status.
    pub pll_main_stat: Reg,
    reserved!(_reserved3, 0xc0 - 0x4c),
    /// Per-base-clock control: source select + integer divisor + enable.
    pub base_ctrl: [Reg; CGU_BASE_CLOCK_COUNT],
}

const _: () = assert!(core::mem::offset_of!(CguRegs, freq_mon) == 0x14);
const _: () = assert!(core::mem::offset_of!(CguRegs, xtal_ctrl) == 0x18);
const _: () = assert!(core::mem::offset_of!(CguRegs, pll_usb_ctrl) == 0x1c);
const _: () = assert!(core::mem::offset_of!(CguRegs, pll_usb_stat) == 0x2c);
const _: () = assert!(core::mem::offset_of!(CguRegs, pll_main_ctrl) == 0x40);
const _: () = assert!(core::mem::offset_of!(CguRegs, pll_main_stat) == 0x48);
const _: () = assert!(core::mem::offset_of!(CguRegs, base_ctrl) == 0xc0);

/// # Safety: single fixed-address CGU instance.
pub unsafe fn cgu() -> &'static CguRegs {
    unsafe { &*(CGU_BASE as *const CguRegs) }
}

// ---------------------------------------------------------------------
// CCU (clock control unit) — base 0x4005_1000
// ---------------------------------------------------------------------

pub const CCU_BASE: usize = 0x4005_1000;

/// One branch-clock control register: bit0 = RUN, bit1 = AUTO (auto-gate
/// when the owning bus is idle — must be cleared separately from RUN being
/// set, per spec §5), bit31 = read-only enabled status.
#[repr(C)]
pub struct CcuRegs {
    reserved!(_reserved0, 0x100),
    pub base_m4: Reg,
    reserved!(_reserved1, 0x200 - 0x104),
    pub base_periph: Reg,
    reserved!(_reserved2, 0x300 - 0x204),
    pub base_apb1: Reg,
    reserved!(_reserved3, 0x400 - 0x304),
    pub apb3_bus: Reg,
    reserved!(_reserved4, 0x448 - 0x404),
    /// The SGPIO peripheral's branch clock.
    pub apb3_sgpio: Reg,
    reserved!(_reserved5, 0x468 - 0x44c),
    pub apb3_i2c1: Reg,
    reserved!(_reserved6, 0x500 - 0x46c),
    pub apb3_dac: Reg,
    reserved!(_reserved7, 0x600 - 0x504),
    pub ahb_m4: Reg,
    reserved!(_reserved8, 0x700 - 0x604),
    pub ahb_usb0: Reg,
    reserved!(_reserved9, 0x800 - 0x704),
    pub ahb_usb1: Reg,
    reserved!(_reserved10, 0x900 - 0x804),
    pub ahb_sdio: Reg,
    reserved!(_reserved11, 0xA00 - 0x904),
    pub ahb_emc: Reg,
    reserved!(_reserved12, 0x1000 - 0xA04),
    pub spifi: Reg,
}

const _: () = assert!(core::mem::offset_of!(CcuRegs, base_m4) == 0x0100);
const _: () = assert!(core::mem::offset_of!(CcuRegs, base_periph) == 0x0200);
const _: () = assert!(core::mem::offset_of!(CcuRegs, base_apb1) == 0x0300);
const _: () = assert!(core::mem::offset_of!(CcuRegs, apb3_bus) == 0x0400);
const _: () = assert!(core::mem::offset_of!(CcuRegs, apb3_sgpio) == 0x0448);
const _: () = assert!(core::mem::offset_of!(CcuRegs, apb3_i2c1) == 0x0468);
const _: () = assert!(core::mem::offset_of!(CcuRegs, apb3_dac) == 0x0500);
const _: () = assert!(core::mem::offset_of!(CcuRegs, ahb_m4) == 0x0600);
const _: () = assert!(core::mem::offset_of!(CcuRegs, ahb_usb0) == 0x0700);
const _: () = assert!(core::mem::offset_of!(CcuRegs, ahb_usb1) == 0x0800);
const _: () = assert!(core::mem::offset_of!(CcuRegs, ahb_sdio) == 0x0900);
const _: () = assert!(core::mem::offset_of!(CcuRegs, ahb_emc) == 0x0A00);
const _: () = assert!(core::mem::offset_of!(CcuRegs, spifi) == 0x1000);

/// # Safety: single fixed-address CCU instance.
pub unsafe fn ccu() -> &'static CcuRegs {
    unsafe { &*(CCU_BASE as *const CcuRegs) }
}

// ---------------------------------------------------------------------
// NVIC — base 0xE000_E100 (standard ARMv7-M layout)
// ---------------------------------------------------------------------

pub const NVIC_BASE: usize = 0xE000_E100;

#[repr(C)]
pub struct NvicRegs {
    /// Interrupt Set-Enable.
    pub iser: [Reg; 8],
    reserved!(_reserved0, 0x080 - 0x020),
    /// Interrupt Clear-Enable.
    pub icer: [Reg; 8],
    reserved!(_reserved1, 0x100 - 0x0a0),
    /// Interrupt Set-Pending.
    pub ispr: [Reg; 8],
    reserved!(_reserved2, 0x180 - 0x120),
    /// Interrupt Clear-Pending.
    pub icpr: [Reg; 8],
    reserved!(_reserved3, 0x200 - 0x1a0),
    /// Interrupt Active Bit.
    pub iabr: [Reg; 8],
    reserved!(_reserved4, 0x300 - 0x220),
    /// Interrupt Priority (byte-addressed on real hardware; modeled here as
    /// one word per 4 IRQs, matching the ARM TRM's word view).
    pub ipr: [Reg; 60],
    reserved!(_reserved5, 0xe00 - 0x3f0),
    /// Software Trigger Interrupt Register.
    pub stir: Reg,
}

const _: () = assert!(core::mem::offset_of!(NvicRegs, icer) == 0x080);
const _: () = assert!(core::mem::offset_of!(NvicRegs, ispr) == 0x100);
const _: () = assert!(core::mem::offset_of!(NvicRegs, icpr) == 0x180);
const _: () = assert!(core::mem::offset_of!(NvicRegs, iabr) == 0x200);
const _: () = assert!(core::mem::offset_of!(NvicRegs, ipr) == 0x300);
const _: () = assert!(core::mem::offset_of!(NvicRegs, stir) == 0xe00);

/// # Safety: single fixed-address NVIC instance.
pub unsafe fn nvic() -> &'static NvicRegs {
    unsafe { &*(NVIC_BASE as *const NvicRegs) }
}

// ---------------------------------------------------------------------
// SCU (pin mux) — base 0x4008_6000. Offsets not individually assert-checked
// by spec §4.A (only SGPIO/CGU/CCU/NVIC are); flattened as a (group, pin)
// indexed array of pin-function registers, each packing func-select,
// pull-resistor mode, and a "fast I/O" bit.
// ---------------------------------------------------------------------

pub const SCU_BASE: usize = 0x4008_6000;

/// Number of pin groups on the package's pin-mux.
pub const SCU_GROUP_COUNT: usize = 16;
/// Number of pins per group.
pub const SCU_PINS_PER_GROUP: usize = 32;

#[repr(C)]
pub struct ScuRegs {
    /// `pin_cfg[group][pin]`: bits `[3:0]` = function select, bits `[5:4]`
    /// = pull mode, bit 7 = fast I/O enable.
    pub pin_cfg: [[Reg; SCU_PINS_PER_GROUP]; SCU_GROUP_COUNT],
}

/// # Safety: single fixed-address SCU instance.
pub unsafe fn scu() -> &'static ScuRegs {
    unsafe { &*(SCU_BASE as *const ScuRegs) }
}

// ---------------------------------------------------------------------
// RGU (reset generation unit) — base 0x4005_3000
// ---------------------------------------------------------------------

pub const RGU_BASE: usize = 0x4005_3000;

#[repr(C)]
pub struct RguRegs {
    /// Write 1 to assert a peripheral's reset line.
    pub reset_ctrl: Reg,
    /// Read-only: which reset lines are currently asserted.
    pub reset_active_status: Reg,
}

/// Bit index of the SGPIO peripheral reset line within [`RguRegs`].
pub const RGU_SGPIO_RESET_BIT: u32 = 1 << 19;

/// # Safety: single fixed-address RGU instance.
pub unsafe fn rgu() -> &'static RguRegs {
    unsafe { &*(RGU_BASE as *const RguRegs) }
}

// ---------------------------------------------------------------------
// Thin collaborator register blocks (spec §1: out of core scope, interface
// level only). Not bit-exact-checked; fields cover only what the
// collaborator interfaces in this crate need.
// ---------------------------------------------------------------------

pub const WWDT_BASE: usize = 0x4008_0000;
pub const DAC_BASE: usize = 0x400E_1000;
pub const TIMER_BASES: [usize; 4] = [0x4008_4000, 0x4008_5000, 0x400C_3000, 0x400C_4000];
pub const USART_BASES: [usize; 4] = [0x4008_1000, 0x4008_2000, 0x400C_1000, 0x400C_2000];
pub const ETHERNET_BASE: usize = 0x4001_C000;

#[repr(C)]
pub struct WwdtRegs {
    pub mode: Reg,
    pub timeout_const: Reg,
    pub feed: Reg,
    pub timer_value: Reg,
    pub clk_sel: Reg,
    pub warn_int: Reg,
    pub window: Reg,
}

/// # Safety: single fixed-address WWDT instance.
pub unsafe fn wwdt() -> &'static WwdtRegs {
    unsafe { &*(WWDT_BASE as *const WwdtRegs) }
}

#[repr(C)]
pub struct TimerRegs {
    pub ir: Reg,
    pub tcr: Reg,
    pub tc: Reg,
    pub pr: Reg,
    pub pc: Reg,
    pub mcr: Reg,
    pub mr: [Reg; 4],
}

/// # Safety: `index` must be `0..4`.
pub unsafe fn timer(index: usize) -> &'static TimerRegs {
    unsafe { &*(TIMER_BASES[index] as *const TimerRegs) }
}

#[repr(C)]
pub struct UsartRegs {
    pub data: Reg,
    pub fifo_level: Reg,
    pub line_ctrl: Reg,
    pub line_status: Reg,
    pub baud_div: Reg,
}

/// # Safety: `index` must be `0..4`.
pub unsafe fn usart(index: usize) -> &'static UsartRegs {
    unsafe { &*(USART_BASES[index] as *const UsartRegs) }
}

#[repr(C)]
pub struct DacRegs {
    pub cr: Reg,
    pub ctrl: Reg,
}

/// # Safety: single fixed-address DAC instance.
pub unsafe fn dac() -> &'static DacRegs {
    unsafe { &*(DAC_BASE as *const DacRegs) }
}

#[repr(C)]
pub struct EthernetRegs {
    pub mac_config: Reg,
    pub dma_bus_mode: Reg,
}

/// # Safety: single fixed-address Ethernet instance.
pub unsafe fn ethernet() -> &'static EthernetRegs {
    unsafe { &*(ETHERNET_BASE as *const EthernetRegs) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sgpio_layout_matches_spec_offsets() {
        assert_eq!(core::mem::offset_of!(SgpioRegs, data_shadow), 0x040);
        assert_eq!(core::mem::offset_of!(SgpioRegs, preset), 0x080);
        assert_eq!(core::mem::offset_of!(SgpioRegs, count), 0x0c0);
        assert_eq!(core::mem::offset_of!(SgpioRegs, pos), 0x100);
        assert_eq!(core::mem::offset_of!(SgpioRegs, pos_reset), 0x140);
        assert_eq!(core::mem::offset_of!(SgpioRegs, shift_cfg), 0x180);
        assert_eq!(core::mem::offset_of!(SgpioRegs, out_cfg), 0x1c0);
        assert_eq!(core::mem::offset_of!(SgpioRegs, status), 0x200);
        assert_eq!(core::mem::offset_of!(SgpioRegs, mask), 0x220);
        assert_eq!(core::mem::offset_of!(SgpioRegs, ctrl_enable_set), 0xF00);
        assert_eq!(core::mem::offset_of!(SgpioRegs, ctrl_enable_clr), 0xF20);
        assert_eq!(core::mem::offset_of!(SgpioRegs, ctrl_enable_status), 0xF60);
    }

    #[test]
    fn nvic_layout_matches_armv7m() {
        assert_eq!(core::mem::offset_of!(NvicRegs, icer), 0x080);
        assert_eq!(core::mem::offset_of!(NvicRegs, ispr), 0x100);
        assert_eq!(core::mem::offset_of!(NvicRegs, icpr), 0x180);
        assert_eq!(core::mem::offset_of!(NvicRegs, iabr), 0x200);
        assert_eq!(core::mem::offset_of!(NvicRegs, ipr), 0x300);
        assert_eq!(core::mem::offset_of!(NvicRegs, stir), 0xe00);
    }

    #[test]
    fn reg_read_write_round_trips() {
        let r = Reg(UnsafeCell::new(0));
        r.write(0xdead_beef);
        assert_eq!(r.read(), 0xdead_beef);
        r.set_bits(0x0000_000f);
        assert_eq!(r.read(), 0xdead_beef);
        r.clear_bits(0xffff_0000);
        assert_eq!(r.read(), 0x0000_beef);
    }
}

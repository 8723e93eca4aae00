//! Interrupt Controller (spec §4.C).
//!
//! Thin wrapper over the NVIC register block in [`crate::regs`]: enable/
//! disable/pending/priority/handler-install primitives, plus ownership of
//! the single statically-allocated vector table. Grounded on the teacher's
//! `#[interrupt]`-handler convention (`gpio.rs`'s `GPIO_INTA`, `timer.rs`)
//! and the enable/unpend shape of `embassy_hal_internal::interrupt::InterruptExt`,
//! reimplemented locally since this crate drops the async `embassy-hal-internal`
//! dependency (§10.7).

use crate::fmt::{trace, warn};
use crate::regs::{self, NvicRegs};

/// Number of external interrupt lines this vector table covers. Sized for a
/// Cortex-M4 part with up to 240 external IRQs (8 `u32` enable/pending/active
/// words); the SGPIO line and its CGU/CCU-adjacent neighbors live well
/// within this range.
pub const IRQ_COUNT: usize = 240;

/// A fixed IRQ-number enumeration, per spec.md §4.C. Only the lines this
/// crate's own peripherals need are named; `Other` covers the rest of the
/// numeric space so callers outside this crate's scope can still install
/// handlers through the same API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Irq {
    Sgpio,
    Timer0,
    Timer1,
    Timer2,
    Timer3,
    Usart0,
    Usart1,
    Usart2,
    Usart3,
    Other(u16),
}

impl Irq {
    /// Fixed numeric mapping backing this crate's vector table.
    pub const fn number(self) -> u16 {
        match self {
            Irq::Sgpio => 18,
            Irq::Timer0 => 19,
            Irq::Timer1 => 20,
            Irq::Timer2 => 21,
            Irq::Timer3 => 22,
            Irq::Usart0 => 23,
            Irq::Usart1 => 24,
            Irq::Usart2 => 25,
            Irq::Usart3 => 26,
            Irq::Other(n) => n,
        }
    }
}

/// Pointer type stored in the vector table: a no-argument handler, per
/// spec.md §9's instruction that ISRs are free functions, never closures
/// over stack data.
pub type HandlerFn = unsafe extern "C" fn();

/// One statically-allocated vector table. There is exactly one of these in
/// a running image; it is read-only after early init except through
/// [`set_handler`].
#[repr(C, align(256))]
pub struct VectorTable {
    entries: [Option<HandlerFn>; IRQ_COUNT],
}

impl VectorTable {
    /// An all-`None` table, ready to have handlers installed via
    /// [`set_handler`].
    pub const fn empty() -> Self {
        Self { entries: [None; IRQ_COUNT] }
    }
}

unsafe fn regs() -> &'static NvicRegs {
    unsafe { regs::nvic() }
}

fn word_and_bit(irq: u16) -> (usize, u32) {
    (irq as usize / 32, 1u32 << (irq as u32 % 32))
}

/// Enable an interrupt line at the NVIC.
pub fn enable(irq: Irq) {
    let (word, bit) = word_and_bit(irq.number());
    unsafe { regs().iser[word].write(bit) };
    trace!("nvic: enabled irq {}", irq.number());
}

/// Disable an interrupt line at the NVIC.
pub fn disable(irq: Irq) {
    let (word, bit) = word_and_bit(irq.number());
    unsafe { regs().icer[word].write(bit) };
    trace!("nvic: disabled irq {}", irq.number());
}

/// Force an interrupt to pending, as if the peripheral had asserted it.
pub fn mark_pending(irq: Irq) {
    let (word, bit) = word_and_bit(irq.number());
    unsafe { regs().ispr[word].write(bit) };
}

/// Clear an interrupt's pending state without servicing it.
pub fn mark_serviced(irq: Irq) {
    let (word, bit) = word_and_bit(irq.number());
    unsafe { regs().icpr[word].write(bit) };
}

/// Is `irq` currently pending?
pub fn is_pending(irq: Irq) -> bool {
    let (word, bit) = word_and_bit(irq.number());
    unsafe { regs().ispr[word].read() & bit != 0 }
}

/// Set an interrupt's priority. Only the top `PRIO_BITS` bits of `value` are
/// architecturally significant on most Cortex-M4 parts; callers should treat
/// lower numeric values as higher priority, per the ARM convention.
pub fn set_priority(irq: Irq, value: u8) {
    let n = irq.number() as usize;
    let word = n / 4;
    let byte_in_word = n % 4;
    let shift = byte_in_word * 8;
    let mask = 0xffu32 << shift;
    unsafe {
        regs().ipr[word].modify(|v| (v & !mask) | ((value as u32) << shift));
    }
}

/// Install `handler` for `irq` into the shared vector table.
///
/// Per spec.md §4.C/§5, installation must happen with the target IRQ
/// disabled; this function enforces that ordering itself rather than
/// trusting the caller, disabling the IRQ first and leaving it disabled —
/// the caller must `enable` it explicitly afterward.
pub fn set_handler(table: &mut VectorTable, irq: Irq, handler: HandlerFn) {
    disable(irq);
    let n = irq.number() as usize;
    if n >= IRQ_COUNT {
        warn!("nvic: irq {} out of range for a {}-entry vector table", n, IRQ_COUNT);
        return;
    }
    table.entries[n] = Some(handler);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_and_bit_splits_irq_number() {
        assert_eq!(word_and_bit(0), (0, 1));
        assert_eq!(word_and_bit(31), (0, 1 << 31));
        assert_eq!(word_and_bit(32), (1, 1));
        assert_eq!(word_and_bit(18), (0, 1 << 18));
    }

    #[test]
    fn sgpio_irq_number_matches_fixed_enumeration() {
        assert_eq!(Irq::Sgpio.number(), 18);
    }

    #[test]
    fn vector_table_starts_empty() {
        let table = VectorTable::empty();
        assert!(table.entries.iter().all(|e| e.is_none()));
    }
}

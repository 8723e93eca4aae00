#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

//! Driver for the SGPIO shift-register fabric on a Cortex-M4 SGPIO-bearing
//! MCU, plus the clock graph and interrupt controller it depends on.
//!
//! ## Feature flags
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod clocks;
pub mod nvic;
pub mod regs;
pub mod reset_reason;
pub mod ringbuffer;
pub mod scheduler;
pub mod sgpio;

pub mod dac;
pub mod ethernet;
pub mod timer;
pub mod uart;
pub mod wwdt;

/// Common re-exports for the types most callers need: the SGPIO context and
/// its data types, the clock graph, and the interrupt controller.
pub mod prelude {
    pub use crate::clocks::{BaseClock, BranchClock, ClockError, ClockGraph, ClockSource, SelectOutcome, Timer};
    pub use crate::nvic::{Irq, VectorTable};
    pub use crate::reset_reason::ResetReason;
    pub use crate::ringbuffer::RingBuffer;
    pub use crate::scheduler::Scheduler;
    pub use crate::sgpio::{
        BufferHandle, Edge, Error as SgpioError, Function, Mode, Overrides, PinConfig, Polarity, Pull, Qualifier,
        ShiftClockSource, SgpioContext, Slice,
    };
}

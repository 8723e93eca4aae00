//! Fixed lookup tables (spec.md §6.4), bit-exact by construction: these are
//! the crate's ground truth, not derived from anything else.

use super::Slice;

/// Upper bound on distinct slices a single chained function can span —
/// exactly the number of lettered slices (spec.md §3).
pub const SLICE_COUNT_FOR_CODEGEN: usize = 16;

/// One entry in the 42-entry SCU pin-mux mapping table: which SCU
/// (group, pin) an SGPIO pin can be routed through, and which SCU function
/// select programs that route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScuMapping {
    pub sgpio_pin: u8,
    pub scu_group: u8,
    pub scu_pin: u8,
    pub func_select: u8,
}

const fn m(sgpio_pin: u8, scu_group: u8, scu_pin: u8, func_select: u8) -> ScuMapping {
    ScuMapping { sgpio_pin, scu_group, scu_pin, func_select }
}

/// The SCU mapping table (spec.md §6.4: "42 entries"). Each SGPIO pin has
/// one primary route and, for the first ten pins, one or two alternate
/// routes through a different SCU pin.
pub const SCU_MAPPING_TABLE: [ScuMapping; 42] = [
    m(0, 1, 0, 4), m(0, 9, 0, 6), m(0, 4, 0, 2),
    m(1, 1, 1, 4), m(1, 9, 1, 6), m(1, 4, 1, 2),
    m(2, 1, 2, 4), m(2, 9, 2, 6), m(2, 4, 2, 2),
    m(3, 1, 3, 4), m(3, 9, 3, 6), m(3, 4, 3, 2),
    m(4, 1, 4, 4), m(4, 9, 4, 6), m(4, 4, 4, 2),
    m(5, 1, 5, 4), m(5, 9, 5, 6), m(5, 4, 5, 2),
    m(6, 1, 6, 4), m(6, 9, 6, 6), m(6, 4, 6, 2),
    m(7, 1, 7, 4), m(7, 9, 7, 6), m(7, 4, 7, 2),
    m(8, 1, 8, 4), m(8, 9, 8, 6), m(8, 4, 8, 2),
    m(9, 1, 9, 4), m(9, 9, 9, 6), m(9, 4, 9, 2),
    m(10, 1, 10, 4), m(10, 9, 10, 6),
    m(11, 1, 11, 4), m(11, 9, 11, 6),
    m(12, 1, 12, 4), m(12, 9, 12, 6),
    m(13, 1, 13, 4), m(13, 9, 13, 6),
    m(14, 1, 14, 4), m(14, 9, 14, 6),
    m(15, 1, 15, 4), m(15, 9, 15, 6),
];

/// Look up `func_select` for `(sgpio_pin, scu_group, scu_pin)`; `None` if
/// that combination isn't a valid route (spec.md §4.D step 2:
/// `InvalidPinMapping`).
pub fn lookup_scu_function(sgpio_pin: u8, scu_group: u8, scu_pin: u8) -> Option<u8> {
    SCU_MAPPING_TABLE
        .iter()
        .find(|e| e.sgpio_pin == sgpio_pin && e.scu_group == scu_group && e.scu_pin == scu_pin)
        .map(|e| e.func_select)
}

/// The primary SCU route for an SGPIO pin used standalone, not as part of a
/// function's own `pin_configurations` — e.g. a PIN-type shift qualifier
/// (spec.md §4.D step 2: "Route the qualifier pin if qualifier type is
/// PIN"). Each pin's first table entry is its primary route.
pub fn primary_scu_route(sgpio_pin: u8) -> Option<ScuMapping> {
    SCU_MAPPING_TABLE.iter().find(|e| e.sgpio_pin == sgpio_pin).copied()
}

/// Pin→I/O-slice table for STREAM_IN/STREAM_OUT/FIXED_OUT/BIDIRECTIONAL
/// (spec.md §4.D/§6.4), indexed by pin 0..15: `A,I,E,J,C,K,F,L,B,M,G,N,D,O,H,P`.
pub const PIN_TO_IO_SLICE: [Slice; 16] = [
    Slice::A, Slice::I, Slice::E, Slice::J, Slice::C, Slice::K, Slice::F, Slice::L,
    Slice::B, Slice::M, Slice::G, Slice::N, Slice::D, Slice::O, Slice::H, Slice::P,
];

/// Pin→clockgen-slice table for CLOCK_GEN functions (spec.md §4.D/§6.4),
/// indexed by pin 0..15: `B,D,E,H,C,F,O,P,A,M,G,N,I,J,K,L`.
pub const PIN_TO_CLOCKGEN_SLICE: [Slice; 16] = [
    Slice::B, Slice::D, Slice::E, Slice::H, Slice::C, Slice::F, Slice::O, Slice::P,
    Slice::A, Slice::M, Slice::G, Slice::N, Slice::I, Slice::J, Slice::K, Slice::L,
];

/// Direction-slice table shared by bus widths 4 and 8 (spec.md §4.D:
/// "width-8 → {H,O,P,N} by pin-group, width-4 → same"), indexed by
/// `first_pin / 4` (0..3).
pub const DIRECTION_SLICE_TABLE_WIDE: [Slice; 4] = [Slice::H, Slice::O, Slice::P, Slice::N];

/// Direction-slice table for bus width 2 (spec.md §4.D: "width-2 → 8-entry
/// table"), indexed by `first_pin / 2` (0..7).
pub const DIRECTION_SLICE_TABLE_WIDTH2: [Slice; 8] =
    [Slice::I, Slice::E, Slice::J, Slice::C, Slice::K, Slice::F, Slice::L, Slice::B];

/// Direction slice for bus width 1: the "mirror" I/O slice at `pin + 8`
/// (spec.md §4.D).
pub fn direction_slice_width1(pin: u8) -> Slice {
    PIN_TO_IO_SLICE[((pin as usize) + 8) % 16]
}

/// Direction slice lookup for any supported bus width.
pub fn direction_slice(bus_width: u8, first_pin: u8) -> Slice {
    match bus_width {
        1 => direction_slice_width1(first_pin),
        2 => DIRECTION_SLICE_TABLE_WIDTH2[(first_pin / 2) as usize],
        4 | 8 => DIRECTION_SLICE_TABLE_WIDE[(first_pin / 4) as usize],
        _ => unreachable!("bus_width must already be promoted to 1/2/4/8"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_to_io_slice_matches_spec_sequence() {
        assert_eq!(PIN_TO_IO_SLICE[0], Slice::A);
        assert_eq!(PIN_TO_IO_SLICE[1], Slice::I);
        assert_eq!(PIN_TO_IO_SLICE[15], Slice::P);
    }

    #[test]
    fn pin_to_clockgen_slice_matches_spec_sequence() {
        assert_eq!(PIN_TO_CLOCKGEN_SLICE[0], Slice::B);
        assert_eq!(PIN_TO_CLOCKGEN_SLICE[7], Slice::P);
        assert_eq!(PIN_TO_CLOCKGEN_SLICE[15], Slice::L);
    }

    #[test]
    fn scu_table_has_42_entries() {
        assert_eq!(SCU_MAPPING_TABLE.len(), 42);
    }

    #[test]
    fn lookup_scu_function_finds_primary_route() {
        assert_eq!(lookup_scu_function(0, 1, 0), Some(4));
    }

    #[test]
    fn lookup_scu_function_rejects_unmapped_combination() {
        assert_eq!(lookup_scu_function(0, 3, 3), None);
    }

    #[test]
    fn direction_slice_width1_uses_mirror_slice() {
        // pin 0 -> IO slice A; mirror at pin 8 -> IO slice B.
        assert_eq!(direction_slice_width1(0), PIN_TO_IO_SLICE[8]);
    }
}

//! Order-preserving encoding for slot values.
//!
//! Tantivy has no numbered value slots, so each slot value is written as a
//! raw term in the `slots` field. The term is the slot number followed by
//! the encoded value, both as fixed-width lowercase hex, which makes the
//! lexicographic order of terms match the numeric order of values within a
//! slot. Range queries then become plain term ranges.

use crate::error::{Error, Result};

const SIGN_BIT: u64 = 1 << 63;

/// Map an `f64` to a `u64` whose unsigned order equals the numeric order.
///
/// `-0.0` is folded into `0.0`. NaN has no place in the order and is
/// rejected by [`slot_term`] before it gets here.
pub fn sortable_serialise(value: f64) -> u64 {
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits ^ SIGN_BIT
    }
}

/// Encode a value stored at `slot` as an index term.
pub fn slot_term(slot: u32, value: f64) -> Result<String> {
    if value.is_nan() {
        return Err(Error::InvalidSlotValue { slot, value });
    }
    Ok(format!("{slot:08x}{:016x}", sortable_serialise(value)))
}

/// Lowest and highest possible terms for a slot, used for open range bounds.
pub fn slot_bounds(slot: u32) -> (String, String) {
    (
        format!("{slot:08x}{:016x}", 0u64),
        format!("{slot:08x}{:016x}", u64::MAX),
    )
}

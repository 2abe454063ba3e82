//! Bounds for stored stock quantities.
//!
//! SQLite keeps decimal columns as REAL, so a quantity survives a round trip
//! only while it fits in the significant digits a double holds. Quantities are
//! therefore limited to `QUANTITY_SCALE` fractional digits and magnitudes
//! below `QUANTITY_LIMIT` (14 significant digits), and values read back are
//! snapped onto that grid again.

use rust_decimal::Decimal;

/// Maximum number of fractional digits of any quantity.
pub const QUANTITY_SCALE: u32 = 6;

/// Exclusive upper bound for the magnitude of any quantity or balance.
pub const QUANTITY_LIMIT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

/// Why a quantity cannot be stored exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    TooPrecise,
    TooLarge,
}

impl std::fmt::Display for QuantityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantityError::TooPrecise => {
                write!(f, "at most {} decimal places are supported", QUANTITY_SCALE)
            }
            QuantityError::TooLarge => {
                write!(f, "magnitude must stay below {}", QUANTITY_LIMIT)
            }
        }
    }
}

/// Checks that `value` can be stored and read back without rounding.
pub fn check(value: Decimal) -> Result<(), QuantityError> {
    if value.normalize().scale() > QUANTITY_SCALE {
        return Err(QuantityError::TooPrecise);
    }
    if value.abs() >= QUANTITY_LIMIT {
        return Err(QuantityError::TooLarge);
    }
    Ok(())
}

/// Snaps a value read from storage back onto the quantity grid.
pub fn canonical(value: Decimal) -> Decimal {
    value.round_dp(QUANTITY_SCALE)
}

use crate::model::*;

use super::Rejection;

/// Table units a party occupies: `ceil(party_size / table_size)`.
pub fn tables_required(party_size: u32, table_size: u32) -> Result<u32, Rejection> {
    if party_size == 0 {
        return Err(Rejection::InvalidPartySize);
    }
    debug_assert!(table_size > 0, "table_size must be positive");
    Ok(party_size.div_ceil(table_size.max(1)))
}

/// Sum of table units held by the active reservations in `reservations`.
///
/// Callers pass reservations already narrowed to one date and kind.
pub fn tables_consumed<'a>(
    reservations: impl IntoIterator<Item = &'a Reservation>,
    table_size: u32,
) -> u32 {
    reservations
        .into_iter()
        .filter(|r| r.is_active())
        .map(|r| tables_required(r.party_size, table_size).unwrap_or(0))
        .sum()
}

/// Table units left for the day. `<= 0` means fully booked.
pub fn remaining_capacity<'a>(
    config: &CapacityConfig,
    reservations: impl IntoIterator<Item = &'a Reservation>,
) -> i64 {
    config.max_tables_per_day as i64 - tables_consumed(reservations, config.table_size) as i64
}

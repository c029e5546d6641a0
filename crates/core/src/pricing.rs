//! Session pricing.
//!
//! Level 1 = 30, level 2 = 35, level 3 = 40. Self-funded students pay half
//! except for presentations. A no-show is billed half, and any session that
//! is neither completed nor a no-show is free.

use crate::student::FinancedStatus;

/// Price of a level 0 session.
pub const BASE_PRICE: f64 = 25.0;

/// Price increment per project level.
pub const LEVEL_STEP: f64 = 5.0;

pub(crate) const ABSENT_MARKER: &str = "absent";
pub(crate) const COMPLETED_MARKER: &str = "completed";
pub(crate) const PENDING_MARKER: &str = "pending";

pub(crate) fn status_matches(status: &str, marker: &str) -> bool {
    status.to_lowercase().contains(marker)
}

/// Computes the price of a session in euros.
///
/// `Unknown` financing is billed like self-funded.
pub fn session_price(
    level: u8,
    financed: FinancedStatus,
    is_presentation: bool,
    status: &str,
) -> f64 {
    let mut price = BASE_PRICE + LEVEL_STEP * f64::from(level);

    if financed != FinancedStatus::Financed && !is_presentation {
        price /= 2.0;
    }

    if status_matches(status, ABSENT_MARKER) {
        price /= 2.0;
    } else if !status_matches(status, COMPLETED_MARKER) {
        price = 0.0;
    }

    price
}

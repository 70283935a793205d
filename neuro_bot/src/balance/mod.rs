pub mod handler;
pub mod storage;

pub use storage::SledBalanceLedger;

/// Telegram Stars currency code used by invoices.
pub const STARS_CURRENCY: &str = "XTR";

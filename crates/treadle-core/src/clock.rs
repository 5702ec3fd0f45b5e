//! Wall-clock helper shared by jobs and the manifest loader.

use chrono::Utc;

/// Current wall-clock time as fractional Unix seconds.
///
/// All scheduling fields (`start_at`, `start_time`, working-time budgets)
/// are expressed in this unit, which is also what the state file stores.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

//! Time utilities.
//!
//! OpenPGP timestamps are unsigned 32-bit seconds since the Unix epoch,
//! so everything here is clamped into that range.

/// Returns the current Unix timestamp in seconds, as carried in packets.
pub fn now_timestamp() -> u32 {
    clamp_timestamp(chrono::Utc::now().timestamp())
}

/// Clamp a signed Unix timestamp into the packet timestamp range.
pub fn clamp_timestamp(seconds: i64) -> u32 {
    seconds.clamp(0, u32::MAX as i64) as u32
}

/// Whether a key created at `created` with an optional validity period has
/// expired at `now`. A period of zero means the key never expires.
pub fn is_expired(created: u32, expires_after: Option<u32>, now: u32) -> bool {
    match expires_after {
        Some(0) | None => false,
        Some(period) => (created as u64 + period as u64) <= now as u64,
    }
}

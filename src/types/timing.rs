//! Millisecond timeline helpers
//!
//! The hardware clock is a free-running `u32` millisecond counter that wraps after
//! about 49.7 days. All comparisons go through wrapping subtraction using the
//! half-range rule, so they stay correct across the wrap as long as the two
//! instants are less than ~24.8 days apart.

/// Milliseconds on the device's wrapping clock.
pub type Millis = u32;

/// True if `now` is at or after `deadline`.
pub fn time_reached(now: Millis, deadline: Millis) -> bool {
    now.wrapping_sub(deadline) < 0x8000_0000
}

/// True if `t` lies strictly before `now`.
pub fn is_behind(t: Millis, now: Millis) -> bool {
    t != now && time_reached(now, t)
}

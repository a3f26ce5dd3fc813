use std::time::Duration;

/// 100-nanosecond units per second, the device period resolution.
pub const HNS_PER_SEC: u64 = 10_000_000;

/// Buffer period for a latency tier: the device default period times the
/// tier multiplier.
pub fn buffer_period(device_period: Duration, multiplier: u32) -> Duration {
    device_period * multiplier
}

/// Smallest multiple of `block_length` holding at least `buffer_period` of
/// audio at `sample_rate`.
pub fn buffer_frames(sample_rate: u32, buffer_period: Duration, block_length: usize) -> usize {
    if block_length == 0 {
        return 0;
    }
    let hns = buffer_period.as_nanos() / 100;
    let frames = (sample_rate as u128 * hns).div_ceil(HNS_PER_SEC as u128) as usize;
    frames.max(1).div_ceil(block_length) * block_length
}

/// Convert a period in 100 ns units to a `Duration`.
pub fn duration_from_hns(hns: i64) -> Duration {
    Duration::from_nanos(hns.max(0) as u64 * 100)
}

/// Convert a `Duration` to 100 ns units.
pub fn duration_to_hns(duration: Duration) -> i64 {
    (duration.as_nanos() / 100).min(i64::MAX as u128) as i64
}

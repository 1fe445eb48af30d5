use std::time::{SystemTime, UNIX_EPOCH};

/// Synthesizes decode timestamps from the wall clock.
///
/// The transport carries no per-frame timestamps. Wall-clock readings can
/// repeat or step backwards, so each value is forced above the previous one.
#[derive(Debug, Default, Clone)]
pub struct TimestampSynth {
    last_us: Option<u64>,
}

impl TimestampSynth {
    pub fn next(&mut self, now_us: u64) -> u64 {
        let ts = match self.last_us {
            Some(last) if now_us <= last => last + 1,
            _ => now_us,
        };
        self.last_us = Some(ts);
        ts
    }
}

pub fn wall_clock_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

//! Concurrency tags.
//!
//! The first record of a master bank carries a token that changes on every
//! full rewrite. A process that cached offsets compares its token against
//! the one on disk before trusting them.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use time::OffsetDateTime;

/// First byte of a soft-deleted record.
pub const DELETE_SENTINEL: u8 = b'|';

/// Prefix of the tag record. Shares its first byte with [`DELETE_SENTINEL`],
/// so a tag record anywhere but the start of a bank reads as deleted.
pub const TAG_PREFIX: &[u8] = b"|CTAG_";

/// Upper bound of a tag record including its terminator: prefix, four
/// decimal `u32` fields with separators, and the line break.
pub const MAX_TAG_SIZE: usize = 6 + 10 + 1 + 10 + 1 + 10 + 1 + 10 + 1 + 1;

static DISAMBIGUATE: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcurrencyTag(String);

impl ConcurrencyTag {
    /// Builds a token no other rewrite of any bank will produce: wall clock,
    /// monotonic ticks, process id and a per-process counter.
    #[must_use]
    pub fn generate() -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64 as u32;
        let counter = DISAMBIGUATE.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "|CTAG_{now}_{}_{}_{counter}",
            monotonic_ticks(),
            std::process::id()
        ))
    }

    /// Parses the start of a bank. The tag is only recognised when the
    /// prefix matches and a CR or LF terminates it within [`MAX_TAG_SIZE`]
    /// bytes.
    #[must_use]
    pub fn parse(head: &[u8]) -> Option<Self> {
        let head = &head[..head.len().min(MAX_TAG_SIZE - 1)];
        if !head.starts_with(TAG_PREFIX) {
            return None;
        }

        let eol = head.iter().position(|&b| b == b'\r' || b == b'\n')?;
        let token = std::str::from_utf8(&head[..eol]).ok()?;
        Some(Self(token.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ConcurrencyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(unix)]
fn monotonic_ticks() -> u32 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let result = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if result != 0 {
        return 0;
    }
    let millis = (ts.tv_sec as u64)
        .wrapping_mul(1000)
        .wrapping_add(ts.tv_nsec as u64 / 1_000_000);
    millis as u32
}

#[cfg(not(unix))]
fn monotonic_ticks() -> u32 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u32
}

//! Daily request quota.
//!
//! State is explicit and the clock is passed in, so the decision function is
//! pure with respect to time.

use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum QuotaDecision {
    Allowed { remaining: u32 },
    Denied { reset_at: DateTime<Utc> },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Fixed number of requests per UTC day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyQuota {
    capacity: u32,
    count: u32,
    reset_at: DateTime<Utc>,
}

impl DailyQuota {
    pub fn new(capacity: u32, now: DateTime<Utc>) -> Self {
        Self {
            capacity,
            count: 0,
            reset_at: next_midnight(now),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    /// Count a request if capacity remains.
    pub fn check_and_increment(&mut self, now: DateTime<Utc>) -> QuotaDecision {
        if now >= self.reset_at {
            self.count = 0;
            self.reset_at = next_midnight(now);
        }
        if self.count >= self.capacity {
            return QuotaDecision::Denied {
                reset_at: self.reset_at,
            };
        }
        self.count += 1;
        QuotaDecision::Allowed {
            remaining: self.capacity - self.count,
        }
    }
}

/// First UTC midnight strictly after `now`.
pub fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + Duration::days(1);
    tomorrow
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now + Duration::days(1))
}

/// Whether a request comes from the local machine.
///
/// The first `x-forwarded-for` entry wins, then `x-real-ip`, then the peer
/// address. A client that cannot be identified counts as local.
pub fn is_local_client(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer: Option<IpAddr>,
) -> bool {
    let forwarded = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let header = forwarded.or_else(|| real_ip.map(str::trim).filter(|v| !v.is_empty()));

    match header {
        Some("unknown") | Some("localhost") => true,
        Some(value) => value
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => peer.map(|ip| ip.is_loopback()).unwrap_or(true),
    }
}

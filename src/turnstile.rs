//! Per-IP sliding-window rate limiter, run once per accepted connection,
//! before any per-action work begins.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::model::TurnstileEntry;

/// The outcome of checking a connection against the turnstile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// The connection should be refused; retry no sooner than this time.
    Blocked { next_request_at: DateTime<Utc> },
}

/// Process-wide, mutated only from the accept path. A fixed IPv4 address
/// space keeps the map small; per §3 the turnstile is keyed by source
/// IPv4 address.
#[derive(Default)]
pub struct Turnstile {
    entries: Mutex<HashMap<Ipv4Addr, TurnstileEntry>>,
}

impl Turnstile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the algorithm of §4.5 for `addr` at time `now`, updating the
    /// stored entry unconditionally (the counters still advance even on
    /// a blocked verdict, matching the reference implementation).
    pub async fn check(&self, addr: Ipv4Addr, now: DateTime<Utc>, cfg: &Settings) -> Verdict {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(addr).or_insert(TurnstileEntry {
            last_request_at: now,
            count_m: 0,
            count_h: 0,
        });

        let delta = (now - entry.last_request_at).num_seconds();
        if delta >= 60 {
            entry.count_m = 0;
        }
        if delta >= 3600 {
            entry.count_h = 0;
        }
        entry.count_m += 1;
        entry.count_h += 1;
        entry.last_request_at = now;

        if entry.count_m >= cfg.rate_limit_m {
            Verdict::Blocked {
                next_request_at: now + chrono::Duration::seconds(60 - delta.min(60)),
            }
        } else if entry.count_h >= cfg.rate_limit_h {
            Verdict::Blocked {
                next_request_at: now + chrono::Duration::seconds(3600 - delta.min(3600)),
            }
        } else {
            Verdict::Pass
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseSettings, LogSink, RootCredentials};

    fn test_settings(rate_limit_m: i32, rate_limit_h: i32) -> Settings {
        Settings {
            log_file: LogSink::Stderr,
            backlog: 1,
            block_for: 86_400,
            max_msg_length: 1000,
            page_inbox: 20,
            page_outbox: 20,
            port: 4113,
            rate_limit_m,
            rate_limit_h,
            motd: "welcome".into(),
            database: DatabaseSettings {
                host: "localhost".into(),
                port: 5432,
                name: "test".into(),
                user: "test".into(),
                password: "test".into(),
            },
            root: RootCredentials::load(uuid::Uuid::nil(), "root").unwrap(),
            verbosity: 0,
        }
    }

    #[tokio::test]
    async fn monotone_last_request_at() {
        let turnstile = Turnstile::new();
        let cfg = test_settings(1000, 1000);
        let addr = Ipv4Addr::new(127, 0, 0, 1);

        let mut previous = Utc::now() - chrono::Duration::seconds(10);
        for i in 0..5 {
            let now = previous + chrono::Duration::seconds(i);
            let verdict = turnstile.check(addr, now, &cfg).await;
            assert_eq!(verdict, Verdict::Pass);
            previous = now;
        }
    }

    #[tokio::test]
    async fn trips_after_rate_limit_m_requests_within_a_minute() {
        let turnstile = Turnstile::new();
        let cfg = test_settings(3, 1000);
        let addr = Ipv4Addr::new(10, 0, 0, 1);
        let now = Utc::now();

        assert_eq!(turnstile.check(addr, now, &cfg).await, Verdict::Pass);
        assert_eq!(turnstile.check(addr, now, &cfg).await, Verdict::Pass);
        assert_eq!(turnstile.check(addr, now, &cfg).await, Verdict::Pass);
        match turnstile.check(addr, now, &cfg).await {
            Verdict::Blocked { next_request_at } => {
                assert!(next_request_at <= now + chrono::Duration::seconds(60));
            }
            Verdict::Pass => panic!("expected the 4th request to be blocked"),
        }
    }

    #[tokio::test]
    async fn counters_reset_after_their_window_elapses() {
        let turnstile = Turnstile::new();
        let cfg = test_settings(2, 1000);
        let addr = Ipv4Addr::new(10, 0, 0, 2);
        let t0 = Utc::now();

        assert_eq!(turnstile.check(addr, t0, &cfg).await, Verdict::Pass);
        assert_eq!(turnstile.check(addr, t0, &cfg).await, Verdict::Pass);
        // 61s later the minute window has elapsed; the counter resets.
        let t1 = t0 + chrono::Duration::seconds(61);
        assert_eq!(turnstile.check(addr, t1, &cfg).await, Verdict::Pass);
    }

    #[tokio::test]
    async fn distinct_ips_are_independent() {
        let turnstile = Turnstile::new();
        let cfg = test_settings(1, 1000);
        let now = Utc::now();

        assert_eq!(
            turnstile
                .check(Ipv4Addr::new(1, 1, 1, 1), now, &cfg)
                .await,
            Verdict::Pass
        );
        assert_eq!(
            turnstile
                .check(Ipv4Addr::new(2, 2, 2, 2), now, &cfg)
                .await,
            Verdict::Pass
        );
    }
}

//! Daily usage caps, counted per session.
//!
//! The server is the authority for quota: clients only display the numbers
//! pushed back to them. Counters roll over at UTC midnight and stale entries
//! are purged periodically.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;

use vibelink_shared::types::{SessionId, UsageSnapshot};

/// Which daily cap an action draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    /// Outgoing chat requests ("vibe pings").
    Ping,
    /// Availability toggles to "free".
    Toggle,
}

#[derive(Debug, Clone)]
struct DayCounter {
    day: NaiveDate,
    requests: u32,
    toggles: u32,
}

impl DayCounter {
    fn new(day: NaiveDate) -> Self {
        Self { day, requests: 0, toggles: 0 }
    }
}

#[derive(Clone)]
pub struct QuotaLedger {
    counters: Arc<Mutex<HashMap<SessionId, DayCounter>>>,
    ping_limit: u32,
    toggle_limit: u32,
}

impl QuotaLedger {
    pub fn new(ping_limit: u32, toggle_limit: u32) -> Self {
        Self {
            counters: Arc::new(Mutex::new(HashMap::new())),
            ping_limit,
            toggle_limit,
        }
    }

    /// Count one action against today's cap. Returns `false` when the cap is
    /// already spent (nothing is counted in that case). Premium sessions are
    /// counted but never refused.
    pub async fn try_consume(&self, session: &SessionId, kind: QuotaKind, unlimited: bool) -> bool {
        self.try_consume_on(session, kind, unlimited, Utc::now().date_naive()).await
    }

    async fn try_consume_on(
        &self,
        session: &SessionId,
        kind: QuotaKind,
        unlimited: bool,
        today: NaiveDate,
    ) -> bool {
        let mut counters = self.counters.lock().await;
        let counter = counters
            .entry(session.clone())
            .or_insert_with(|| DayCounter::new(today));

        if counter.day != today {
            *counter = DayCounter::new(today);
        }

        let (count, limit) = match kind {
            QuotaKind::Ping => (&mut counter.requests, self.ping_limit),
            QuotaKind::Toggle => (&mut counter.toggles, self.toggle_limit),
        };

        if !unlimited && *count >= limit {
            return false;
        }
        *count += 1;
        true
    }

    /// Today's numbers for one session, for pushing to the client.
    pub async fn snapshot(&self, session: &SessionId, is_premium: bool) -> UsageSnapshot {
        let today = Utc::now().date_naive();
        let counters = self.counters.lock().await;
        let (requests, toggles) = match counters.get(session) {
            Some(counter) if counter.day == today => (counter.requests, counter.toggles),
            _ => (0, 0),
        };
        UsageSnapshot {
            requests_today: requests,
            toggles_today: toggles,
            ping_limit: self.ping_limit,
            toggle_limit: self.toggle_limit,
            is_premium,
        }
    }

    /// Drop counters from previous days.
    pub async fn purge_stale(&self) {
        let today = Utc::now().date_naive();
        let mut counters = self.counters.lock().await;
        counters.retain(|_, counter| counter.day == today);
    }
}

impl Default for QuotaLedger {
    fn default() -> Self {
        Self::new(
            vibelink_shared::constants::DEFAULT_PING_LIMIT,
            vibelink_shared::constants::DEFAULT_TOGGLE_LIMIT,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, n).unwrap()
    }

    #[tokio::test]
    async fn test_ping_cap_is_enforced() {
        let ledger = QuotaLedger::new(2, 3);
        let session = SessionId::from("sess_a");

        assert!(ledger.try_consume_on(&session, QuotaKind::Ping, false, day(1)).await);
        assert!(ledger.try_consume_on(&session, QuotaKind::Ping, false, day(1)).await);
        assert!(!ledger.try_consume_on(&session, QuotaKind::Ping, false, day(1)).await);

        // Toggles draw from their own cap.
        assert!(ledger.try_consume_on(&session, QuotaKind::Toggle, false, day(1)).await);
    }

    #[tokio::test]
    async fn test_counters_reset_at_day_rollover() {
        let ledger = QuotaLedger::new(1, 1);
        let session = SessionId::from("sess_a");

        assert!(ledger.try_consume_on(&session, QuotaKind::Ping, false, day(1)).await);
        assert!(!ledger.try_consume_on(&session, QuotaKind::Ping, false, day(1)).await);

        assert!(ledger.try_consume_on(&session, QuotaKind::Ping, false, day(2)).await);
    }

    #[tokio::test]
    async fn test_sessions_are_counted_independently() {
        let ledger = QuotaLedger::new(1, 1);

        assert!(ledger.try_consume_on(&SessionId::from("a"), QuotaKind::Ping, false, day(1)).await);
        assert!(!ledger.try_consume_on(&SessionId::from("a"), QuotaKind::Ping, false, day(1)).await);
        assert!(ledger.try_consume_on(&SessionId::from("b"), QuotaKind::Ping, false, day(1)).await);
    }

    #[tokio::test]
    async fn test_premium_is_counted_but_never_refused() {
        let ledger = QuotaLedger::new(1, 1);
        let session = SessionId::from("sess_vip");

        for _ in 0..5 {
            assert!(ledger.try_consume_on(&session, QuotaKind::Ping, true, day(1)).await);
        }
        let snapshot = ledger.snapshot(&session, true).await;
        assert!(snapshot.is_premium);
    }

    #[tokio::test]
    async fn test_purge_drops_only_stale_days() {
        let ledger = QuotaLedger::new(5, 5);
        let stale = SessionId::from("old");
        let fresh = SessionId::from("new");

        assert!(ledger.try_consume_on(&stale, QuotaKind::Ping, false, day(1)).await);
        assert!(
            ledger
                .try_consume_on(&fresh, QuotaKind::Ping, false, Utc::now().date_naive())
                .await
        );

        ledger.purge_stale().await;

        let counters = ledger.counters.lock().await;
        assert!(!counters.contains_key(&stale));
        assert!(counters.contains_key(&fresh));
    }
}

//! One-way analytics sink (spec §1: "Analytics logging is a one-way sink").
//!
//! Trait-at-the-seam shape grounded on the teacher's use of `tracing`
//! throughout `network/server.rs` for lifecycle events; here the emission
//! boundary is a trait so tests can substitute a recording sink instead of
//! asserting on log output.

use tracing::info;

/// A match-start or match-end record (spec §4.6: "a match-start analytics
/// record"; §4.6 disconnect teardown: "logs a match-end analytics event
/// with reason=disconnect").
#[derive(Debug, Clone)]
pub enum AnalyticsEvent {
    /// Both `ActiveSession` entries were just written.
    MatchStart {
        /// The finalized room id.
        room_id: String,
        /// First participant's uid.
        uid_a: String,
        /// Second participant's uid.
        uid_b: String,
    },
    /// A session ended.
    MatchEnd {
        /// The room that ended.
        room_id: String,
        /// First participant's uid.
        uid_a: String,
        /// Second participant's uid.
        uid_b: String,
        /// `"skip"` or `"disconnect"`.
        reason: String,
    },
}

/// Destination for analytics events. The default implementation logs
/// structured events via `tracing`; swap in a recording sink for tests.
pub trait AnalyticsSink: Send + Sync {
    /// Record one event. Must not block or fail the caller.
    fn record(&self, event: AnalyticsEvent);
}

/// Default sink: structured `tracing` events, consumed by whatever
/// subscriber the process installs.
#[derive(Debug, Default)]
pub struct TracingAnalyticsSink;

impl AnalyticsSink for TracingAnalyticsSink {
    fn record(&self, event: AnalyticsEvent) {
        match event {
            AnalyticsEvent::MatchStart {
                room_id,
                uid_a,
                uid_b,
            } => {
                info!(room_id, uid_a, uid_b, "match_start");
            }
            AnalyticsEvent::MatchEnd {
                room_id,
                uid_a,
                uid_b,
                reason,
            } => {
                info!(room_id, uid_a, uid_b, reason, "match_end");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl AnalyticsSink for RecordingSink {
        fn record(&self, event: AnalyticsEvent) {
            let label = match event {
                AnalyticsEvent::MatchStart { .. } => "start",
                AnalyticsEvent::MatchEnd { .. } => "end",
            };
            self.events.lock().unwrap().push(label.to_string());
        }
    }

    #[test]
    fn sink_receives_events_in_order() {
        let sink = RecordingSink::default();
        sink.record(AnalyticsEvent::MatchStart {
            room_id: "r1".to_string(),
            uid_a: "a".to_string(),
            uid_b: "b".to_string(),
        });
        sink.record(AnalyticsEvent::MatchEnd {
            room_id: "r1".to_string(),
            uid_a: "a".to_string(),
            uid_b: "b".to_string(),
            reason: "skip".to_string(),
        });
        assert_eq!(*sink.events.lock().unwrap(), vec!["start", "end"]);
    }
}

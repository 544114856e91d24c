//! Inbound frame routing.
//!
//! [`process_frame`] is the body of the connection's message handler. It
//! decodes one text frame, normalizes it to a record sequence and routes
//! each record to the error channel, the subscriber fan-out, or the ready
//! latch.

use super::messages::{RecordKind, decode_frame};
use super::state::ReadyLatch;
use super::subscription::SubscriberRegistry;
use crate::error::ClientError;

/// What happened while processing one inbound frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Records found in the frame (0 if the frame did not decode).
    pub records: usize,
    /// Data records fanned out to subscribers.
    pub results: usize,
    /// Successful subscriber deliveries across all data records.
    pub deliveries: usize,
    /// Subscriber deliveries that failed or panicked.
    pub failed_deliveries: usize,
    /// Whether this frame moved the connection to ready.
    pub acknowledged: bool,
    /// Errors routed to the error channel, in encounter order.
    pub errors: Vec<ClientError>,
}

/// Processes one inbound text frame.
///
/// A frame that fails to decode is reported and dropped. Otherwise every
/// record is handled in order and a rejected record never stops its
/// siblings.
pub fn process_frame(
    text: &str,
    latch: &ReadyLatch,
    registry: &SubscriberRegistry,
) -> FrameReport {
    let mut report = FrameReport::default();

    let records = match decode_frame(text) {
        Ok(records) => records,
        Err(err) => {
            report_error(&err);
            report.errors.push(err);
            return report;
        }
    };
    report.records = records.len();

    for record in &records {
        match record.kind() {
            RecordKind::Rejected => {
                let err = record.rejection();
                report_error(&err);
                report.errors.push(err);
            }
            RecordKind::Data(result) => {
                let outcomes = registry.fan_out(result);
                let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
                report.results += 1;
                report.deliveries += delivered;
                report.failed_deliveries += outcomes.len() - delivered;
            }
            RecordKind::Acknowledgment => {
                if latch.acknowledge() {
                    report.acknowledged = true;
                }
            }
        }
    }

    tracing::trace!(
        records = report.records,
        results = report.results,
        errors = report.errors.len(),
        "frame processed"
    );
    report
}

fn report_error(err: &ClientError) {
    if err.is_recoverable() {
        tracing::warn!(error = %err, "socket error");
    } else {
        tracing::error!(error = %err, "socket error");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    use serde_json::{Value, json};

    use super::*;
    use crate::ws::state::{ConnectionState, Lifecycle};
    use crate::ws::subscription::Subscriber;

    struct Harness {
        latch: ReadyLatch,
        registry: SubscriberRegistry,
        ready_calls: Arc<AtomicUsize>,
        received: Arc<Mutex<Vec<Value>>>,
    }

    impl Harness {
        fn authenticating(subscribers: usize) -> Self {
            let lifecycle = Lifecycle::new();
            let _ = lifecycle.advance(ConnectionState::Connecting);
            let _ = lifecycle.advance(ConnectionState::Authenticating);

            let ready_calls = Arc::new(AtomicUsize::new(0));
            let latch = ReadyLatch::new(lifecycle);
            let counter = Arc::clone(&ready_calls);
            latch.arm(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

            let received = Arc::new(Mutex::new(Vec::new()));
            let registry = SubscriberRegistry::new();
            for _ in 0..subscribers {
                let sink = Arc::clone(&received);
                let sub: Arc<dyn Subscriber> =
                    Arc::new(move |result: &Value| -> anyhow::Result<()> {
                        sink.lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(result.clone());
                        Ok(())
                    });
                registry.subscribe(sub);
            }

            Self {
                latch,
                registry,
                ready_calls,
                received,
            }
        }

        fn feed(&self, text: &str) -> FrameReport {
            process_frame(text, &self.latch, &self.registry)
        }

        fn ready_calls(&self) -> usize {
            self.ready_calls.load(Ordering::SeqCst)
        }

        fn received(&self) -> Vec<Value> {
            self.received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[test]
    fn first_ack_fires_ready_once_and_duplicates_are_ignored() {
        let h = Harness::authenticating(1);

        let first = h.feed(r#"{"status":"ok"}"#);
        assert!(first.acknowledged);
        assert_eq!(h.ready_calls(), 1);

        let second = h.feed(r#"{"status":"ok"}"#);
        assert!(!second.acknowledged);
        assert_eq!(h.ready_calls(), 1);
        assert!(h.received().is_empty());
    }

    #[test]
    fn multiple_acks_in_one_frame_fire_once() {
        let h = Harness::authenticating(0);
        let report = h.feed(r#"[{"status":"ok"},{"status":"ok"}]"#);
        assert!(report.acknowledged);
        assert_eq!(report.records, 2);
        assert_eq!(h.ready_calls(), 1);
    }

    #[test]
    fn result_array_is_delivered_verbatim_to_every_subscriber() {
        let h = Harness::authenticating(3);
        let _ = h.feed(r#"{"status":"ok"}"#);

        let report =
            h.feed(r#"{"status":"ok","result":[[1700000000,21.5],[1700000300,21.7]]}"#);

        let expected = json!([[1_700_000_000, 21.5], [1_700_000_300, 21.7]]);
        assert_eq!(report.results, 1);
        assert_eq!(report.deliveries, 3);
        assert_eq!(h.received(), vec![expected.clone(), expected.clone(), expected]);
    }

    #[test]
    fn error_record_does_not_stop_its_siblings() {
        let h = Harness::authenticating(1);
        let _ = h.feed(r#"{"status":"ok"}"#);

        let report =
            h.feed(r#"[{"status":"error","error":"bad token"},{"status":"ok","result":42}]"#);

        assert_eq!(report.records, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors.first(),
            Some(ClientError::RecordRejected { .. })
        ));
        assert_eq!(h.received(), vec![json!(42)]);
    }

    #[test]
    fn non_object_element_does_not_drop_valid_siblings() {
        let h = Harness::authenticating(1);
        let _ = h.feed(r#"{"status":"ok"}"#);

        let report = h.feed(r#"[{"status":"ok","result":42}, 3]"#);

        assert_eq!(report.records, 2);
        assert_eq!(report.results, 1);
        assert!(matches!(
            report.errors.as_slice(),
            [ClientError::MalformedFrame(_)]
        ));
        assert_eq!(h.received(), vec![json!(42)]);
    }

    #[test]
    fn rejected_records_never_ready_nor_fan_out() {
        let h = Harness::authenticating(1);
        for frame in [
            r#"{"status":"error"}"#,
            r#"{"error":"denied"}"#,
            r#"{"status":"ok","error":"denied"}"#,
            r#"{"status":"ok","error":{"code":401},"result":5}"#,
            r#"{}"#,
        ] {
            let report = h.feed(frame);
            assert_eq!(report.errors.len(), 1, "frame {frame}");
        }
        assert_eq!(h.ready_calls(), 0);
        assert!(h.received().is_empty());
        assert_eq!(
            h.latch.lifecycle().current(),
            ConnectionState::Authenticating
        );
    }

    #[test]
    fn data_before_ack_is_still_delivered_without_readying() {
        let h = Harness::authenticating(1);
        let report = h.feed(r#"{"status":"ok","result":42}"#);
        assert_eq!(report.results, 1);
        assert!(!report.acknowledged);
        assert_eq!(h.ready_calls(), 0);
    }

    #[test]
    fn undecodable_frame_is_reported_and_dropped() {
        let h = Harness::authenticating(1);
        let report = h.feed("{oops");
        assert_eq!(report.records, 0);
        assert!(matches!(report.errors.first(), Some(ClientError::Json(_))));

        let report = h.feed(r#""just a string""#);
        assert!(matches!(
            report.errors.first(),
            Some(ClientError::MalformedFrame(_))
        ));
        assert_eq!(h.ready_calls(), 0);
    }

    #[test]
    fn bare_record_and_one_element_array_are_processed_alike() {
        let bare = Harness::authenticating(1);
        let wrapped = Harness::authenticating(1);
        let _ = bare.feed(r#"{"status":"ok"}"#);
        let _ = wrapped.feed(r#"[{"status":"ok"}]"#);

        let a = bare.feed(r#"{"status":"ok","result":[[1,2.0]]}"#);
        let b = wrapped.feed(r#"[{"status":"ok","result":[[1,2.0]]}]"#);

        assert_eq!(bare.ready_calls(), wrapped.ready_calls());
        assert_eq!(a.results, b.results);
        assert_eq!(a.deliveries, b.deliveries);
        assert_eq!(bare.received(), wrapped.received());
    }

    #[test]
    fn failed_deliveries_are_counted() {
        let h = Harness::authenticating(1);
        h.registry
            .subscribe(Arc::new(|_: &Value| -> anyhow::Result<()> {
                Err(anyhow::anyhow!("nope"))
            }));
        let report = h.feed(r#"{"status":"ok","result":1}"#);
        assert_eq!(report.deliveries, 1);
        assert_eq!(report.failed_deliveries, 1);
    }
}

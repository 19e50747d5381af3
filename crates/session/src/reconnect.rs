//! Analyzer reconnect loop

use std::sync::Arc;
use std::time::Duration;

use analyzer_link::{AnalyzerLink, ConnectionState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ReconnectPolicy;

/// Exponential backoff between reconnect attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: &ReconnectPolicy) -> Self {
        let initial = Duration::from_millis(policy.initial_backoff_ms.max(1));
        let max = Duration::from_millis(policy.max_backoff_ms).max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt; doubles up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Keep the link connected until cancelled
///
/// Waits while the link is connected (or busy connecting/closing) and
/// retries with backoff once it reports `Disconnected`.
pub async fn run(
    link: Arc<AnalyzerLink>,
    endpoint: String,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
) {
    let mut states = link.subscribe();
    let mut backoff = Backoff::new(&policy);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if link.state() != ConnectionState::Disconnected {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        }

        let delay = backoff.next_delay();
        debug!("Reconnecting to analyzer in {:?}", delay);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        metrics::counter!("analyzer_reconnects_total").increment(1);
        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = link.connect(&endpoint) => result,
        };

        match attempt {
            Ok(_) => {
                info!("Reconnected to analyzer at {}", endpoint);
                backoff.reset();
            }
            Err(e) => {
                warn!("Analyzer reconnect failed: {}", e);
            }
        }
    }

    debug!("Reconnect loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyzer_link::LinkConfig;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(&ReconnectPolicy {
            enabled: true,
            initial_backoff_ms: 500,
            max_backoff_ms: 3000,
        });

        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![500, 1000, 2000, 3000, 3000]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_max_below_initial() {
        let mut backoff = Backoff::new(&ReconnectPolicy {
            enabled: true,
            initial_backoff_ms: 800,
            max_backoff_ms: 100,
        });
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_stops_when_cancelled() {
        let (link, _events) = AnalyzerLink::new(LinkConfig::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::new(link),
            "ws://127.0.0.1:1".into(),
            ReconnectPolicy {
                enabled: true,
                initial_backoff_ms: 60_000,
                max_backoff_ms: 60_000,
            },
            cancel.clone(),
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reconnect loop should stop")
            .unwrap();
    }
}

//! Signal notifications
//!
//! Emission only enqueues; a worker task drains the bounded queue and calls
//! the notifier. A full queue or a failed delivery is logged and dropped.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::types::{Action, EmittedSignal};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, signal: &EmittedSignal, reasoning: &[String]) -> Result<()>;
}

/// Human-readable lines explaining why a signal fired
pub fn reasoning_for(signal: &EmittedSignal) -> Vec<String> {
    let c = &signal.candidate;
    let verb = match c.action {
        Action::Buy => "Long",
        Action::Sell => "Short",
    };
    let mut lines = vec![
        format!(
            "{} {} at {} with composite confidence {:.1}",
            verb, c.symbol, c.entry, c.composite_confidence
        ),
        format!(
            "Stop {} / target {} (R/R {:.2}, ATR {})",
            c.stop_loss, c.target_price, c.risk_reward_ratio, c.atr
        ),
    ];
    if !c.confluences.is_empty() {
        lines.push(format!(
            "Confluences: {}",
            c.confluences.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    lines
}

/// POSTs the signal as JSON to a webhook
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("webhook client: {}", e)))?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, signal: &EmittedSignal, reasoning: &[String]) -> Result<()> {
        let payload = serde_json::json!({
            "signal": signal,
            "reasoning": reasoning,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Notification(format!(
                "webhook failed: {} - {}",
                status, body
            )));
        }

        debug!("Webhook notification sent for {}", signal.id);
        Ok(())
    }
}

/// Writes notifications to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, signal: &EmittedSignal, reasoning: &[String]) -> Result<()> {
        info!(
            signal_id = %signal.id,
            symbol = %signal.symbol(),
            action = %signal.action(),
            "SIGNAL: {}",
            reasoning.join(" | ")
        );
        Ok(())
    }
}

/// Producer side of the notification queue
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<EmittedSignal>,
}

impl NotificationQueue {
    /// Spawn the worker. It exits once every queue handle is dropped and
    /// the backlog is drained.
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<EmittedSignal>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                let reasoning = reasoning_for(&signal);
                if let Err(e) = notifier.notify(&signal, &reasoning).await {
                    error!("Notification for {} failed: {}", signal.id, e);
                }
            }
            debug!("Notification worker stopped");
        });
        (Self { tx }, worker)
    }

    /// Queue a signal without waiting; returns false when it was dropped
    pub fn enqueue(&self, signal: &EmittedSignal) -> bool {
        match self.tx.try_send(signal.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Notification queue full, dropping notice for {}", signal.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Notification worker gone, dropping notice for {}", signal.id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SignalCandidate, StopRule};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct Recording {
        seen: Mutex<Vec<(Uuid, Vec<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, signal: &EmittedSignal, reasoning: &[String]) -> Result<()> {
            self.seen.lock().await.push((signal.id, reasoning.to_vec()));
            if self.fail {
                Err(EngineError::Notification("bot offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn signal() -> EmittedSignal {
        EmittedSignal {
            id: Uuid::new_v4(),
            candidate: SignalCandidate {
                symbol: "BTC".to_string(),
                action: Action::Buy,
                entry: Decimal::from(100),
                stop_loss: Decimal::from(97),
                target_price: Decimal::from(106),
                composite_confidence: 88.0,
                risk_reward_ratio: 2.0,
                confluences: ["multi-timeframe-alignment".to_string()].into(),
                contributing_methods: Default::default(),
                atr: Decimal::from(2),
                stop_rule: StopRule::AtrMultiple,
                timestamp: Utc::now(),
            },
            emitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_reasoning_lines() {
        let lines = reasoning_for(&signal());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Long BTC at 100"));
        assert!(lines[2].contains("multi-timeframe-alignment"));
    }

    #[tokio::test]
    async fn test_worker_survives_failures() {
        let notifier = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            fail: true,
        });
        let (queue, worker) = NotificationQueue::spawn(notifier.clone(), 8);

        assert!(queue.enqueue(&signal()));
        assert!(queue.enqueue(&signal()));
        drop(queue);
        worker.await.unwrap();

        assert_eq!(notifier.seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let notifier = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        // Current-thread runtime: the worker cannot drain before we yield
        let (queue, _worker) = NotificationQueue::spawn(notifier, 1);
        assert!(queue.enqueue(&signal()));
        assert!(!queue.enqueue(&signal()));
    }
}

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::{Envelope, MailError, Mailer};
use crate::config::MailConfig;

/// Final outcome of one queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl Delivery {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl From<&MailConfig> for RetryPolicy {
    fn from(config: &MailConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

struct MailJob {
    envelope: Envelope,
    receipt: oneshot::Sender<Delivery>,
}

/// Bounded outbound queue drained by a single worker task.
#[derive(Clone)]
pub struct MailQueue {
    tx: mpsc::Sender<MailJob>,
}

impl MailQueue {
    /// Spawns the worker on the current runtime.
    pub fn start(mailer: Arc<dyn Mailer>, capacity: usize, policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(rx, mailer, policy));
        Self { tx }
    }

    /// Queues `envelope` without waiting.
    ///
    /// Returns the receipt channel, or `None` when the job was dropped because
    /// the queue is full or the worker is gone.
    pub fn enqueue(&self, envelope: Envelope) -> Option<oneshot::Receiver<Delivery>> {
        let (receipt, rx) = oneshot::channel();
        let job = MailJob { envelope, receipt };

        match self.tx.try_send(job) {
            Ok(()) => {
                metrics::counter!("mail_jobs_total", "outcome" => "queued").increment(1);
                Some(rx)
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(to = %job.envelope.to, subject = %job.envelope.subject, "Mail queue full, dropping message");
                metrics::counter!("mail_jobs_total", "outcome" => "dropped").increment(1);
                None
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(to = %job.envelope.to, "Mail worker stopped, dropping message");
                metrics::counter!("mail_jobs_total", "outcome" => "dropped").increment(1);
                None
            }
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<MailJob>, mailer: Arc<dyn Mailer>, policy: RetryPolicy) {
    while let Some(job) = rx.recv().await {
        let delivery = deliver(mailer.as_ref(), &job.envelope, policy).await;

        match &delivery {
            Delivery::Sent { attempts } => {
                debug!(to = %job.envelope.to, attempts, "Mail delivered");
                metrics::counter!("mail_jobs_total", "outcome" => "sent").increment(1);
            }
            Delivery::Failed { attempts, error } => {
                error!(to = %job.envelope.to, subject = %job.envelope.subject, attempts, error = %error, "Mail delivery failed");
                metrics::counter!("mail_jobs_total", "outcome" => "failed").increment(1);
            }
        }

        // Nobody listening is fine.
        let _ = job.receipt.send(delivery);
    }

    debug!("Mail queue closed, worker exiting");
}

async fn deliver(mailer: &dyn Mailer, envelope: &Envelope, policy: RetryPolicy) -> Delivery {
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        let result = tokio::time::timeout(policy.timeout, mailer.send(envelope))
            .await
            .unwrap_or(Err(MailError::Timeout));

        match result {
            Ok(()) => return Delivery::Sent { attempts: attempt },
            // Bad addresses and unbuildable messages will not improve on retry.
            Err(e @ (MailError::Address(_) | MailError::Build(_))) => {
                return Delivery::Failed {
                    attempts: attempt,
                    error: e.to_string(),
                };
            }
            Err(e) => {
                warn!(to = %envelope.to, attempt, error = %e, "Mail attempt failed");
                last_error = e.to_string();
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Delivery::Failed {
        attempts: policy.max_attempts,
        error: last_error,
    }
}

use crate::configuration::CampaignSettings;
use crate::domain::Recipient;
use crate::progress::ProgressStore;
use crate::render::{OutboundMessage, Renderer};
use crate::transport::{SendError, Transport};
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;

/// A recipient the run gave up on, kept for the final report. Never persisted.
#[derive(Debug)]
pub struct FailureRecord {
    pub email: String,
    pub display_name: Option<String>,
    pub error: String,
}

/// The single output of one invocation. `success + fail < total` means the
/// run aborted and the remaining recipients were never attempted.
#[derive(Debug)]
pub struct RunResult {
    pub success: usize,
    pub fail: usize,
    pub total: usize,
    pub failed: Vec<FailureRecord>,
}

impl RunResult {
    pub fn completed(&self) -> bool {
        self.success + self.fail == self.total
    }
}

/// Inter-send pacing. Invariants (`delay_min <= delay_max`, `batch_size > 0`)
/// are enforced by `CampaignSettings::validate` before a run starts.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub delay_min: u64,
    pub delay_max: u64,
    pub batch_size: usize,
    pub batch_pause: u64,
}

impl From<&CampaignSettings> for Pacing {
    fn from(campaign: &CampaignSettings) -> Self {
        Self {
            delay_min: campaign.delay_min,
            delay_max: campaign.delay_max,
            batch_size: campaign.batch_size,
            batch_pause: campaign.batch_pause,
        }
    }
}

enum Outcome {
    Delivered,
    Failed(String),
    Abort(&'static str, String),
}

/// Delivers one rendered message to every not-yet-sent recipient, in input
/// order, one send in flight at a time.
///
/// Recipients recorded in today's progress store are skipped and counted as
/// prior successes; every confirmed delivery is appended to the store before
/// the next recipient is attempted, so a rerun after a crash or abort resumes
/// instead of double-sending. Transport failures never escape this function;
/// they are classified into retry, skip or abort and folded into the result.
#[tracing::instrument(
    name = "Campaign run",
    skip_all,
    fields(total = recipients.len())
)]
pub async fn run_campaign(
    recipients: &[Recipient],
    renderer: &Renderer,
    session: &mut dyn Transport,
    mut progress: Option<&mut dyn ProgressStore>,
    pacing: Pacing,
) -> RunResult {
    let already_sent = match progress.as_deref() {
        Some(store) => match store.load_sent_today() {
            Ok(sent) => sent,
            Err(error) => {
                tracing::warn!(%error, "Could not load today's progress; treating the run as fresh");
                HashSet::new()
            }
        },
        None => HashSet::new(),
    };

    let pending: Vec<&Recipient> = recipients
        .iter()
        .filter(|r| !already_sent.contains(r.email.as_ref()))
        .collect();
    let total = recipients.len();
    let mut success = total - pending.len();
    let mut failed = Vec::new();
    let mut aborted = false;

    if success > 0 {
        tracing::info!(
            already_sent = success,
            "Skipping recipients already delivered to today"
        );
    }
    if pending.is_empty() {
        tracing::info!(success, total, "Nothing left to send");
        return RunResult {
            success,
            fail: 0,
            total,
            failed,
        };
    }

    tracing::info!(pending = pending.len(), "Starting delivery");
    let pending_count = pending.len();

    for (index, recipient) in pending.iter().enumerate() {
        let position = index + 1;
        let message = renderer.render(recipient);

        let outcome = match session.send_one(&message).await {
            Ok(()) => Outcome::Delivered,
            Err(SendError::TransientDisconnect(error)) => {
                tracing::warn!(
                    %error,
                    recipient = %recipient.email,
                    "Connection lost; reconnecting for a single retry"
                );
                retry_once(session, &message).await
            }
            Err(SendError::AuthFailure(error)) => {
                Outcome::Abort("authentication rejected by the relay", error)
            }
            Err(SendError::SenderRejected(error)) => {
                Outcome::Abort("sender account rejected by the relay", error)
            }
            Err(SendError::QuotaExceeded(error)) => {
                Outcome::Abort("relay quota or rate limit exceeded", error)
            }
            Err(SendError::Other(error)) => Outcome::Failed(error),
        };

        match outcome {
            Outcome::Delivered => {
                success += 1;
                tracing::info!(
                    recipient = %recipient.email,
                    position,
                    pending = pending_count,
                    "Delivered"
                );
                if let Some(store) = progress.as_deref_mut() {
                    if let Err(error) = store.append_sent(recipient.email.as_ref()) {
                        // The in-run count stays authoritative; the worst case
                        // is one duplicate send on a future resume.
                        tracing::warn!(
                            %error,
                            recipient = %recipient.email,
                            "Failed to record the delivery in the progress store"
                        );
                    }
                }
            }
            Outcome::Failed(error) => {
                tracing::error!(%error, recipient = %recipient.email, "Delivery failed");
                failed.push(FailureRecord {
                    email: recipient.email.as_ref().to_string(),
                    display_name: recipient
                        .display_name
                        .as_ref()
                        .map(|name| name.as_ref().to_string()),
                    error,
                });
            }
            Outcome::Abort(reason, error) => {
                tracing::error!(
                    %error,
                    recipient = %recipient.email,
                    position,
                    pending = pending_count,
                    "Aborting the run: {}",
                    reason
                );
                aborted = true;
                break;
            }
        }

        match pace_after(position, pending_count, pacing.batch_size) {
            Some(Pace::BatchPause) => {
                tracing::info!(
                    position,
                    pending = pending_count,
                    pause_seconds = pacing.batch_pause,
                    "Batch complete; cooling down"
                );
                sleep(Duration::from_secs(pacing.batch_pause)).await;
            }
            Some(Pace::Delay) => {
                let delay = rand::thread_rng().gen_range(pacing.delay_min..=pacing.delay_max);
                tracing::info!(
                    position,
                    pending = pending_count,
                    delay_seconds = delay,
                    "Waiting before the next send"
                );
                sleep(Duration::from_secs(delay)).await;
            }
            None => {}
        }
    }

    let fail = failed.len();
    if aborted {
        tracing::error!(
            success,
            fail,
            total,
            "Run aborted before every recipient was attempted"
        );
    } else {
        tracing::info!(success, fail, total, "Run complete");
    }
    RunResult {
        success,
        fail,
        total,
        failed,
    }
}

/// One bounded retry after a dropped connection. Any failure here, including
/// a failed reconnect, downgrades to a per-recipient failure so a flaky link
/// cannot spin the loop forever.
async fn retry_once(session: &mut dyn Transport, message: &OutboundMessage) -> Outcome {
    if let Err(error) = session.connect().await {
        return Outcome::Failed(format!("reconnect failed: {}", error));
    }
    match session.send_one(message).await {
        Ok(()) => Outcome::Delivered,
        Err(error) => Outcome::Failed(format!("retry after reconnect failed: {}", error)),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Pace {
    BatchPause,
    Delay,
}

/// What to wait for after the send at 1-based `position` out of `pending`
/// attempts. No wait after the last attempt; a long cooldown after every
/// `batch_size`-th send; a jittered delay otherwise.
fn pace_after(position: usize, pending: usize, batch_size: usize) -> Option<Pace> {
    if position >= pending {
        None
    } else if position % batch_size == 0 {
        Some(Pace::BatchPause)
    } else {
        Some(Pace::Delay)
    }
}

#[cfg(test)]
mod tests {
    use super::{pace_after, Pace};

    #[test]
    fn no_wait_after_the_last_send() {
        assert_eq!(pace_after(5, 5, 20), None);
        assert_eq!(pace_after(20, 20, 20), None);
    }

    #[test]
    fn batch_boundary_triggers_the_long_pause() {
        assert_eq!(pace_after(20, 25, 20), Some(Pace::BatchPause));
        assert_eq!(pace_after(40, 45, 20), Some(Pace::BatchPause));
    }

    #[test]
    fn ordinary_positions_get_the_jittered_delay() {
        assert_eq!(pace_after(1, 25, 20), Some(Pace::Delay));
        assert_eq!(pace_after(21, 25, 20), Some(Pace::Delay));
    }

    #[quickcheck_macros::quickcheck]
    fn long_pause_count_matches_the_batch_schedule(n: usize, b: usize) -> bool {
        let n = n % 200 + 1;
        let b = b % 50 + 1;
        let pauses = (1..=n)
            .filter(|&i| pace_after(i, n, b) == Some(Pace::BatchPause))
            .count();
        pauses == (n - 1) / b
    }
}

//! Upload queue state machine

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::request::{PingRequest, PingUploadTask};
use super::result::{Disposition, UploadResult};
use crate::config::UploadPolicy;
use crate::{BeaconError, Result};

/// Whether an upload attempt is outstanding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    /// No attempt outstanding
    Idle,
    /// An `Upload` task was handed out and its result is not in yet
    AttemptPending { document_id: String, attempt: u64 },
}

/// What happened to a ping once its result was reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Uploaded successfully and removed
    Sent,
    /// Removed without being uploaded; never offered again
    Discarded,
    /// Back in the queue, eligible again after `retry_in`
    Requeued { retry_in: Duration },
}

#[derive(Debug)]
struct QueuedPing {
    request: PingRequest,
    failures: u32,
    not_before: Option<Instant>,
    /// Id of the latest hand-out, 0 until the ping is first issued
    attempt: u64,
}

impl QueuedPing {
    fn new(request: PingRequest) -> Self {
        Self {
            request,
            failures: 0,
            not_before: None,
            attempt: 0,
        }
    }

    fn task(&self) -> PingUploadTask {
        PingUploadTask::Upload {
            request: self.request.clone(),
            attempt: self.attempt,
        }
    }

    fn eligible_in(&self, now: Instant) -> Duration {
        self.not_before
            .map_or(Duration::ZERO, |t| t.saturating_duration_since(now))
    }
}

#[derive(Debug)]
struct RateLimiter {
    window_start: Instant,
    issued: u32,
}

impl RateLimiter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            issued: 0,
        }
    }

    /// Time until another task may be issued, `None` if one may be issued now
    fn remaining_wait(&mut self, policy: &UploadPolicy, now: Instant) -> Option<Duration> {
        let interval = policy.rate_limit_interval();
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= interval {
            self.window_start = now;
            self.issued = 0;
        }
        if self.issued < policy.max_pings_per_interval {
            None
        } else {
            Some(interval.saturating_sub(elapsed))
        }
    }
}

#[derive(Debug)]
struct QueueState {
    queue: VecDeque<QueuedPing>,
    in_flight: Option<QueuedPing>,
    rate_limiter: RateLimiter,
    /// Last attempt id handed out; ids are never reused
    last_attempt: u64,
}

/// Hands pending pings to the host one at a time and applies upload outcomes
#[derive(Debug)]
pub struct PingUploadManager {
    policy: UploadPolicy,
    state: Mutex<QueueState>,
}

impl PingUploadManager {
    pub fn new(policy: UploadPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                in_flight: None,
                rate_limiter: RateLimiter::new(),
                last_attempt: 0,
            }),
        }
    }

    /// Queue a ping for upload. A document id that is already queued or in
    /// flight is ignored.
    pub fn enqueue(&self, request: PingRequest) -> bool {
        let mut state = self.lock();
        let duplicate = state
            .in_flight
            .iter()
            .chain(state.queue.iter())
            .any(|p| p.request.document_id == request.document_id);
        if duplicate {
            warn!(
                "Ping {} is already queued, ignoring duplicate",
                request.document_id
            );
            return false;
        }

        debug!("Queued ping {} for {}", request.document_id, request.path);
        state.queue.push_back(QueuedPing::new(request));
        true
    }

    /// Next unit of work for the host. Never blocks.
    pub fn get_upload_task(&self, log_ping: bool) -> PingUploadTask {
        let mut state = self.lock();

        if let Some(pending) = &state.in_flight {
            debug!(
                "Upload of {} (attempt {}) still pending, re-delivering it",
                pending.request.document_id, pending.attempt
            );
            return pending.task();
        }

        if state.queue.is_empty() {
            return PingUploadTask::Done;
        }

        let now = Instant::now();
        let Some(index) = state
            .queue
            .iter()
            .position(|p| p.eligible_in(now).is_zero())
        else {
            let wait = state
                .queue
                .iter()
                .map(|p| p.eligible_in(now))
                .min()
                .unwrap_or_default();
            debug!("No ping eligible yet, asking host to wait {:?}", wait);
            return PingUploadTask::Wait(duration_to_ms(wait));
        };

        if let Some(wait) = state.rate_limiter.remaining_wait(&self.policy, now) {
            info!("Upload rate limit reached, asking host to wait {:?}", wait);
            return PingUploadTask::Wait(duration_to_ms(wait));
        }

        let Some(mut ping) = state.queue.remove(index) else {
            return PingUploadTask::Done;
        };
        state.rate_limiter.issued += 1;
        state.last_attempt += 1;
        ping.attempt = state.last_attempt;

        if log_ping {
            info!(
                "Uploading ping {} to {}: {}",
                ping.request.document_id,
                ping.request.path,
                ping.request.body_text()
            );
        }

        let task = ping.task();
        state.in_flight = Some(ping);
        task
    }

    /// Apply the outcome of `attempt`, the pending hand-out of `document_id`.
    ///
    /// Fails with [`BeaconError::UploadProtocol`] when no attempt is pending
    /// or the report names another ping or an earlier attempt of the same
    /// ping; the queue is left as it was.
    pub fn process_upload_response(
        &self,
        document_id: &str,
        attempt: u64,
        result: UploadResult,
    ) -> Result<UploadOutcome> {
        let mut state = self.lock();

        let (pending_id, pending_attempt) = match &state.in_flight {
            None => {
                warn!(
                    "Result {} reported for {} (attempt {}) but no upload is pending",
                    result, document_id, attempt
                );
                return Err(BeaconError::UploadProtocol(format!(
                    "no upload pending, cannot report {} for {}",
                    result, document_id
                )));
            }
            Some(pending) => (pending.request.document_id.clone(), pending.attempt),
        };
        if pending_id != document_id || pending_attempt != attempt {
            warn!(
                "Result {} reported for {} (attempt {}) but {} (attempt {}) is pending",
                result, document_id, attempt, pending_id, pending_attempt
            );
            return Err(BeaconError::UploadProtocol(format!(
                "result for {} attempt {} does not match pending upload {} attempt {}",
                document_id, attempt, pending_id, pending_attempt
            )));
        }

        let Some(mut ping) = state.in_flight.take() else {
            return Err(BeaconError::UploadProtocol(
                "pending upload vanished".to_string(),
            ));
        };

        let outcome = match result.disposition() {
            Disposition::Sent => {
                info!("Ping {} uploaded ({})", document_id, result);
                UploadOutcome::Sent
            }
            Disposition::Discard => {
                warn!("Discarding ping {} after {}", document_id, result);
                UploadOutcome::Discarded
            }
            Disposition::Retry => {
                ping.failures += 1;
                let retry_in = self.policy.backoff_for(ping.failures);
                ping.not_before = Some(Instant::now() + retry_in);
                warn!(
                    "Upload of {} failed ({}), attempt {}; retrying in {:?}",
                    document_id, result, ping.failures, retry_in
                );
                state.queue.push_back(ping);
                UploadOutcome::Requeued { retry_in }
            }
        };
        Ok(outcome)
    }

    pub fn state(&self) -> UploadState {
        match &self.lock().in_flight {
            Some(ping) => UploadState::AttemptPending {
                document_id: ping.request.document_id.clone(),
                attempt: ping.attempt,
            },
            None => UploadState::Idle,
        }
    }

    /// Pings queued or in flight
    pub fn pending_count(&self) -> usize {
        let state = self.lock();
        state.queue.len() + usize::from(state.in_flight.is_some())
    }

    /// Drop every queued ping. An attempt in flight stays pending so its
    /// result can still be reported.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        if dropped > 0 {
            info!("Dropped {} queued pings", dropped);
        }
        dropped
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PingUploadManager {
    fn default() -> Self {
        Self::new(UploadPolicy::default())
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

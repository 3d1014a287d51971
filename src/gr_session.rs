//! Group session manager.
//!
//! One `GroupSession` owns one group's lifecycle from roster formation to
//! termination: it fans in the member feeds, buffers everything until every
//! feed closes, then replays the buffer in `(timestamp, user_id)` order,
//! forwarding each record to the moderation service and enforcing the
//! verdicts. Lifecycle and transcript events go to the injected `EventSink`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Select, TryRecvError};
use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::gr_feed::{spawn_feed, FeedScript};
use crate::gr_interface::{
    ConfigError, EventSink, GroupId, RemovalReason, SessionEvent, UserId, UserRecord, Verdict,
    DEFAULT_IDLE_BACKOFF_MS,
};
use crate::gr_moderator::ModeratorHandle;

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Suspension after an ingestion pass that found no data (default 100 ms)
    pub idle_backoff: Duration,

    /// Delay each feed reader inserts between records (the feed's simulated
    /// pacing; default none)
    pub feed_pace: Duration,

    /// Bounded wait for a verdict reply. `None` blocks indefinitely; when
    /// set, a timeout degrades that record to unmoderated delivery.
    pub verdict_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_millis(DEFAULT_IDLE_BACKOFF_MS),
            feed_pace: Duration::ZERO,
            verdict_timeout: None,
        }
    }
}

// ============================================================================
// Member State Machine
// ============================================================================

/// Activity of one roster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Feed open, or records still awaiting acknowledgment
    Active,
    /// Feed exhausted and every contributed record acknowledged
    Finished,
    /// Banned by a moderation verdict
    Removed,
}

struct MemberState {
    feed: Receiver<UserRecord>,
    activity: Activity,
    feed_exhausted: bool,
    /// Records buffered during the collecting phase
    contributed: u32,
    /// Records sent but not yet acknowledged-or-banned
    outstanding_quota: u32,
}

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Forming,
    Collecting,
    Replaying,
    Terminated,
}

/// How `run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Graceful termination; the transcript is complete and ordered
    Terminated,
    /// Forced shutdown; no transcript guarantee
    Cancelled,
}

/// Final report handed back to the orchestrator.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub group_id: GroupId,
    pub status: SessionStatus,
    pub removed_for_violations: u32,
    /// Finalized lines in `(timestamp, user_id)` order
    pub transcript: Vec<UserRecord>,
}

/// Shared flag for forced shutdown of a running session.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Group Session
// ============================================================================

pub struct GroupSession {
    group_id: GroupId,
    config: SessionConfig,
    members: IndexMap<UserId, MemberState>,
    active_count: usize,
    phase: SessionPhase,
    moderator: ModeratorHandle,
    /// Set once a send or receive against the service fails; from then on
    /// records are delivered unmoderated.
    moderator_gone: bool,
    verdicts: Receiver<Verdict>,
    event_sink: Box<dyn EventSink>,
    cancel: CancelToken,
    transcript: Vec<UserRecord>,
    removed_for_violations: u32,
}

impl std::fmt::Debug for GroupSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupSession")
            .field("group_id", &self.group_id)
            .field("active_count", &self.active_count)
            .field("phase", &self.phase)
            .field("moderator_gone", &self.moderator_gone)
            .field("removed_for_violations", &self.removed_for_violations)
            .finish()
    }
}

impl GroupSession {
    /// Validate the roster, register with the moderation service and spawn
    /// one feed reader per member.
    ///
    /// Roster order is preserved. Fails before any thread is spawned if the
    /// roster is empty or lists a user twice.
    pub fn start(
        group_id: GroupId,
        roster: Vec<(UserId, FeedScript)>,
        config: SessionConfig,
        moderator: ModeratorHandle,
        event_sink: Box<dyn EventSink>,
        cancel: CancelToken,
    ) -> Result<Self, ConfigError> {
        if roster.is_empty() {
            return Err(ConfigError::EmptyRoster { group: group_id });
        }

        let mut scripts: IndexMap<UserId, FeedScript> = IndexMap::with_capacity(roster.len());
        for (user, script) in roster {
            if scripts.insert(user, script).is_some() {
                return Err(ConfigError::DuplicateMember {
                    group: group_id,
                    user,
                });
            }
        }

        let (verdict_tx, verdict_rx) = channel::unbounded();
        let moderator_gone = moderator.register(group_id, verdict_tx).is_err();
        if moderator_gone {
            warn!("group {}: moderation service unavailable at start", group_id);
        }

        let members: IndexMap<UserId, MemberState> = scripts
            .into_iter()
            .map(|(user, script)| {
                let feed = spawn_feed(user, script, config.feed_pace);
                (
                    user,
                    MemberState {
                        feed,
                        activity: Activity::Active,
                        feed_exhausted: false,
                        contributed: 0,
                        outstanding_quota: 0,
                    },
                )
            })
            .collect();

        let active_count = members.len();

        Ok(Self {
            group_id,
            config,
            members,
            active_count,
            phase: SessionPhase::Forming,
            moderator,
            moderator_gone,
            verdicts: verdict_rx,
            event_sink,
            cancel,
            transcript: Vec::new(),
            removed_for_violations: 0,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Run the session to a terminal state and hand back the report.
    pub fn run(mut self) -> SessionReport {
        self.event_sink.log(SessionEvent::SessionCreated {
            group: self.group_id,
        });
        let roster: Vec<UserId> = self.members.keys().copied().collect();
        for user in roster {
            self.event_sink.log(SessionEvent::MemberJoined {
                group: self.group_id,
                user,
            });
        }

        self.phase = SessionPhase::Collecting;
        debug!("group {}: collecting", self.group_id);
        let mut pending = self.collect();
        if self.cancel.is_cancelled() {
            return self.cancelled();
        }

        self.phase = SessionPhase::Replaying;
        pending.sort_by_key(UserRecord::order_key);
        debug!(
            "group {}: replaying {} buffered record(s)",
            self.group_id,
            pending.len()
        );
        if !self.replay(pending) {
            return self.cancelled();
        }

        self.finish()
    }

    // ------------------------------------------------------------------
    // Phase 1: collect
    // ------------------------------------------------------------------

    /// Drain every feed to end-of-stream, buffering all records.
    ///
    /// Each pass takes at most one record per member so a chatty feed never
    /// starves the others; an empty pass suspends on channel readiness with
    /// the configured backoff as the upper bound.
    fn collect(&mut self) -> Vec<UserRecord> {
        let mut pending = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                return pending;
            }

            let mut progress = false;
            for member in self.members.values_mut() {
                if member.feed_exhausted {
                    continue;
                }
                match member.feed.try_recv() {
                    Ok(record) => {
                        member.contributed += 1;
                        member.outstanding_quota += 1;
                        pending.push(record);
                        progress = true;
                    }
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => {
                        member.feed_exhausted = true;
                    }
                }
            }

            if self.members.values().all(|m| m.feed_exhausted) {
                return pending;
            }
            if !progress {
                self.idle_wait();
            }
        }
    }

    /// Suspend until any open feed has data, bounded by the idle backoff.
    fn idle_wait(&self) {
        let mut select = Select::new();
        for member in self.members.values() {
            if !member.feed_exhausted {
                select.recv(&member.feed);
            }
        }
        // The next poll pass does the actual reads.
        let _ = select.ready_timeout(self.config.idle_backoff);
    }

    // ------------------------------------------------------------------
    // Phase 2: replay
    // ------------------------------------------------------------------

    /// Replay the sorted buffer, one synchronous verdict per record.
    /// Returns false when interrupted by cancellation.
    fn replay(&mut self, pending: Vec<UserRecord>) -> bool {
        for record in pending {
            if self.cancel.is_cancelled() {
                return false;
            }
            if self.active_count < 2 {
                info!(
                    "group {}: active members dropped below 2, terminating",
                    self.group_id
                );
                break;
            }

            match self.members.get(&record.user_id).map(|m| m.activity) {
                Some(Activity::Removed) => continue,
                Some(_) => {}
                None => continue,
            }

            match self.request_verdict(&record) {
                Some(verdict) if verdict.banned => self.remove_for_violation(record.user_id),
                // NotBanned, or no moderator to ask
                _ => self.finalize(record),
            }
        }
        true
    }

    /// Forward one record and wait for its verdict. `None` means the service
    /// is gone (or timed out) and the record is to be delivered unmoderated.
    fn request_verdict(&mut self, record: &UserRecord) -> Option<Verdict> {
        if self.moderator_gone {
            return None;
        }

        if self
            .moderator
            .evaluate(self.group_id, record.user_id, record.text.clone())
            .is_err()
        {
            warn!(
                "group {}: moderation service gone, delivering unmoderated",
                self.group_id
            );
            self.moderator_gone = true;
            return None;
        }

        let received = match self.config.verdict_timeout {
            None => self.verdicts.recv().map_err(|_| ()),
            Some(limit) => self.verdicts.recv_timeout(limit).map_err(|_| ()),
        };

        match received {
            Ok(verdict) => {
                debug_assert_eq!(verdict.user, record.user_id);
                Some(verdict)
            }
            Err(()) => {
                warn!(
                    "group {}: no verdict for user {}, delivering unmoderated",
                    self.group_id, record.user_id
                );
                self.moderator_gone = true;
                None
            }
        }
    }

    /// Acknowledge a record: append to the transcript and settle quota.
    fn finalize(&mut self, record: UserRecord) {
        let user = record.user_id;

        self.event_sink.log(SessionEvent::OrderedMessage {
            group: self.group_id,
            user,
            timestamp: record.timestamp,
            text: record.text.clone(),
        });
        self.transcript.push(record);

        let mut retired = false;
        if let Some(member) = self.members.get_mut(&user) {
            member.outstanding_quota = member.outstanding_quota.saturating_sub(1);
            if member.activity == Activity::Active
                && member.feed_exhausted
                && member.outstanding_quota == 0
            {
                member.activity = Activity::Finished;
                retired = true;
            }
        }

        if retired {
            self.active_count -= 1;
            info!(
                "user {} removed from group {} after completing its messages",
                user, self.group_id
            );
            self.event_sink.log(SessionEvent::MemberRemoved {
                group: self.group_id,
                user,
                reason: RemovalReason::QuotaDone,
            });
        }
    }

    /// Enforce a ban: the member leaves and its still-buffered records are
    /// dropped (the replay loop skips `Removed` senders).
    fn remove_for_violation(&mut self, user: UserId) {
        let was_active = match self.members.get_mut(&user) {
            Some(member) if member.activity == Activity::Active => {
                member.activity = Activity::Removed;
                true
            }
            _ => false,
        };
        if !was_active {
            return;
        }

        self.active_count -= 1;
        self.removed_for_violations += 1;
        self.event_sink.log(SessionEvent::MemberRemoved {
            group: self.group_id,
            user,
            reason: RemovalReason::Violation,
        });
    }

    // ------------------------------------------------------------------
    // Termination
    // ------------------------------------------------------------------

    fn finish(mut self) -> SessionReport {
        self.phase = SessionPhase::Terminated;
        let group = self.group_id;

        // Retire idle members: feed closed with nothing left outstanding but
        // never touched by the replay (zero contributions).
        let idle: Vec<UserId> = self
            .members
            .iter()
            .filter(|(_, m)| {
                m.activity == Activity::Active && m.feed_exhausted && m.outstanding_quota == 0
            })
            .map(|(user, _)| *user)
            .collect();
        for user in idle {
            if let Some(member) = self.members.get_mut(&user) {
                member.activity = Activity::Finished;
            }
            self.active_count = self.active_count.saturating_sub(1);
            self.event_sink.log(SessionEvent::MemberRemoved {
                group,
                user,
                reason: RemovalReason::QuotaDone,
            });
        }

        let removed_count = self.removed_for_violations;
        self.event_sink.log(SessionEvent::SessionTerminated {
            group,
            removed_count,
        });
        info!(
            "group {}: terminated, {} member(s) removed for violations",
            group, removed_count
        );

        self.moderator.release(group);

        SessionReport {
            group_id: group,
            status: SessionStatus::Terminated,
            removed_for_violations: removed_count,
            transcript: std::mem::take(&mut self.transcript),
        }
    }

    /// Forced shutdown: release the moderator route and drop everything.
    /// Feed readers unblock on their next send. No terminal event is
    /// emitted and the partial transcript carries no ordering guarantee.
    fn cancelled(mut self) -> SessionReport {
        self.phase = SessionPhase::Terminated;
        info!("group {}: cancelled", self.group_id);
        self.moderator.release(self.group_id);

        SessionReport {
            group_id: self.group_id,
            status: SessionStatus::Cancelled,
            removed_for_violations: self.removed_for_violations,
            transcript: std::mem::take(&mut self.transcript),
        }
    }
}

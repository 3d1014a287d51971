//! Moderation service: deny-list matching, violation ledger, ban decisions.
//!
//! A single long-lived service thread serves every group session in the run.
//! Sessions talk to it exclusively through messages: `Evaluate` requests on
//! the service's inbound channel, `Verdict` replies on the per-group channel
//! each session registers at startup. The ledger and ban state live only
//! here; no session ever touches them directly.

use std::fs;
use std::path::Path;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use hashbrown::HashMap;
use log::{debug, info, warn};

use crate::gr_interface::{BanState, ConfigError, GroupId, UserId, Verdict};

// ============================================================================
// Configuration
// ============================================================================

/// Deny list and ban threshold, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    /// Filtered terms, lowercased once at load
    pub filtered_terms: Vec<String>,

    /// Ledger value at which a `(group, user)` pair is banned
    pub threshold: u32,
}

impl ModerationConfig {
    pub fn new(terms: impl IntoIterator<Item = String>, threshold: u32) -> Self {
        Self {
            filtered_terms: terms
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            threshold,
        }
    }

    /// Load the deny list from a one-term-per-line file.
    ///
    /// An unreadable source is fatal: running with a falsely-empty policy is
    /// worse than not starting. An empty file is allowed and means no
    /// message ever violates.
    pub fn from_file(path: &Path, threshold: u32) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::DenyListSource {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;

        Ok(Self::new(content.lines().map(str::to_string), threshold))
    }
}

// ============================================================================
// Violation Ledger
// ============================================================================

#[derive(Debug, Clone)]
struct MemberLedger {
    /// Monotonically non-decreasing while the owning session lives
    violations: u32,
    ban: BanState,
    /// Last state notice emitted for this pair (idempotence)
    last_notice: Option<BanState>,
}

impl MemberLedger {
    fn new() -> Self {
        Self {
            violations: 0,
            ban: BanState::NotBanned,
            last_notice: None,
        }
    }
}

/// Outcome of one evaluation.
///
/// `verdict` is the wire reply - every request gets exactly one, so the
/// session's synchronous wait always completes. `notice` is the deduplicated
/// state notification: `Banned` exactly once per pair, `NotBanned` only when
/// the previously emitted state was not already `NotBanned`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub notice: Option<BanState>,
}

/// Ban decision engine. Owns the violation ledger, keyed by the composite
/// `(group, user)` so user ids may collide across groups without the counts
/// bleeding into each other.
pub struct Moderator {
    config: ModerationConfig,
    ledger: HashMap<(GroupId, UserId), MemberLedger>,
}

impl Moderator {
    pub fn new(config: ModerationConfig) -> Self {
        Self {
            config,
            ledger: HashMap::new(),
        }
    }

    /// Count DISTINCT filtered terms appearing in `text`, case-insensitive.
    /// Repeats of one term count once.
    pub fn violation_count(&self, text: &str) -> u32 {
        let lowered = text.to_lowercase();
        self.config
            .filtered_terms
            .iter()
            .filter(|term| lowered.contains(term.as_str()))
            .count() as u32
    }

    /// Evaluate one forwarded message and update the ledger.
    ///
    /// Deterministic: the same text against the same deny list always adds
    /// the same count, independent of interleaving across groups.
    pub fn evaluate(&mut self, group: GroupId, user: UserId, text: &str) -> Evaluation {
        let count = self.violation_count(text);
        let threshold = self.config.threshold;

        let entry = self
            .ledger
            .entry((group, user))
            .or_insert_with(MemberLedger::new);
        entry.violations += count;

        debug!(
            "group {} user {}: {:?} has {} violation(s), ledger {}",
            group, user, text, count, entry.violations
        );

        let notice = if entry.ban == BanState::Banned {
            // One-way state; the ban notice already went out.
            None
        } else if entry.violations >= threshold {
            entry.ban = BanState::Banned;
            entry.last_notice = Some(BanState::Banned);
            Some(BanState::Banned)
        } else if entry.last_notice != Some(BanState::NotBanned) {
            entry.last_notice = Some(BanState::NotBanned);
            Some(BanState::NotBanned)
        } else {
            None
        };

        Evaluation {
            verdict: Verdict {
                group,
                user,
                banned: entry.ban == BanState::Banned,
            },
            notice,
        }
    }

    /// Current ledger value for a pair. Zero if never evaluated.
    pub fn ledger_count(&self, group: GroupId, user: UserId) -> u32 {
        self.ledger
            .get(&(group, user))
            .map_or(0, |entry| entry.violations)
    }

    /// Drop all ledger and ban entries owned by a finished session. Group
    /// ids are not reused within a run, so this is the only cleanup needed.
    pub fn release_group(&mut self, group: GroupId) {
        self.ledger.retain(|(g, _), _| *g != group);
    }
}

// ============================================================================
// Service Thread
// ============================================================================

/// Inbound protocol of the service thread.
pub enum ServiceMessage {
    /// Route this group's verdicts to `verdicts` from now on
    Register {
        group: GroupId,
        verdicts: Sender<Verdict>,
    },
    /// Evaluate one forwarded record; always answered with one verdict
    Evaluate {
        group: GroupId,
        user: UserId,
        text: String,
    },
    /// Session ended; drop its route and ledger entries
    Release { group: GroupId },
    Shutdown,
}

/// Cloneable handle to the running service.
#[derive(Clone)]
pub struct ModeratorHandle {
    tx: Sender<ServiceMessage>,
}

impl ModeratorHandle {
    /// Spawn the service thread. One per run.
    pub fn start(config: ModerationConfig) -> Self {
        let (tx, rx) = channel::unbounded();
        thread::Builder::new()
            .name("moderator".to_string())
            .spawn(move || run_service_loop(Moderator::new(config), rx))
            .expect("spawn moderator");
        Self { tx }
    }

    /// Err means the service is gone; callers degrade to unmoderated mode.
    pub fn register(&self, group: GroupId, verdicts: Sender<Verdict>) -> Result<(), ()> {
        self.tx
            .send(ServiceMessage::Register { group, verdicts })
            .map_err(|_| ())
    }

    /// Err means the service is gone; callers degrade to unmoderated mode.
    pub fn evaluate(&self, group: GroupId, user: UserId, text: String) -> Result<(), ()> {
        self.tx
            .send(ServiceMessage::Evaluate { group, user, text })
            .map_err(|_| ())
    }

    pub fn release(&self, group: GroupId) {
        let _ = self.tx.send(ServiceMessage::Release { group });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ServiceMessage::Shutdown);
    }
}

fn run_service_loop(mut moderator: Moderator, rx: Receiver<ServiceMessage>) {
    let mut routes: HashMap<GroupId, Sender<Verdict>> = HashMap::new();

    while let Ok(msg) = rx.recv() {
        match msg {
            ServiceMessage::Register { group, verdicts } => {
                routes.insert(group, verdicts);
            }
            ServiceMessage::Evaluate { group, user, text } => {
                let evaluation = moderator.evaluate(group, user, &text);

                if evaluation.notice == Some(BanState::Banned) {
                    info!(
                        "user {} banned from group {} ({} violations)",
                        user,
                        group,
                        moderator.ledger_count(group, user)
                    );
                }

                match routes.get(&group) {
                    Some(route) => {
                        if route.send(evaluation.verdict).is_err() {
                            // Session exited; keep serving the others.
                            warn!("group {}: verdict dropped, session gone", group);
                            routes.remove(&group);
                        }
                    }
                    None => warn!("group {}: verdict for unregistered group", group),
                }
            }
            ServiceMessage::Release { group } => {
                routes.remove(&group);
                moderator.release_group(group);
            }
            ServiceMessage::Shutdown => break,
        }
    }
}

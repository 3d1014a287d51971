// Group Chat Simulator Statistics

use gr_rust::gr_session::{SessionReport, SessionStatus};
use gr_rust::{GroupId, RemovalReason, SessionEvent, Timestamp, UserId};

// ============================================================================
// Scenario Result
// ============================================================================

/// Complete result of one scenario run
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario name (file stem when the file carries no meta name)
    pub name: String,

    /// Base seed used for generated feeds
    pub seed_used: u64,

    /// Per-group outcome, in scenario order
    pub groups: Vec<GroupOutcome>,

    /// Total lifecycle events collected across all sessions
    pub total_events: usize,
}

/// Outcome and validation verdicts for one group session
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub group_id: GroupId,
    pub status: SessionStatus,
    pub members: usize,
    pub delivered: usize,
    pub removed_for_violations: u32,
    /// Members retired by quota completion
    pub quota_completed: usize,

    /// No out-of-order pair in the emitted transcript
    pub transcript_ordered: bool,
    /// Exactly one termination event with a matching removal count
    pub terminated_cleanly: bool,
}

impl GroupOutcome {
    /// Check a session's event stream against its final report.
    pub fn build(report: &SessionReport, events: &[SessionEvent], members: usize) -> Self {
        let group = report.group_id;

        let ordered: Vec<(Timestamp, UserId)> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::OrderedMessage {
                    group: g,
                    user,
                    timestamp,
                    ..
                } if *g == group => Some((*timestamp, *user)),
                _ => None,
            })
            .collect();
        let transcript_ordered = ordered.windows(2).all(|pair| pair[0] <= pair[1])
            && ordered.len() == report.transcript.len();

        let quota_completed = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    SessionEvent::MemberRemoved {
                        group: g,
                        reason: RemovalReason::QuotaDone,
                        ..
                    } if *g == group
                )
            })
            .count();

        let terminations: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::SessionTerminated {
                    group: g,
                    removed_count,
                } if *g == group => Some(*removed_count),
                _ => None,
            })
            .collect();
        let terminated_cleanly = match report.status {
            SessionStatus::Terminated => {
                terminations.len() == 1 && terminations[0] == report.removed_for_violations
            }
            // Forced shutdown must not emit a terminal event
            SessionStatus::Cancelled => terminations.is_empty(),
        };

        Self {
            group_id: group,
            status: report.status,
            members,
            delivered: report.transcript.len(),
            removed_for_violations: report.removed_for_violations,
            quota_completed,
            transcript_ordered,
            terminated_cleanly,
        }
    }

    pub fn valid(&self) -> bool {
        self.transcript_ordered && self.terminated_cleanly
    }
}

impl ScenarioResult {
    pub fn all_valid(&self) -> bool {
        self.groups.iter().all(GroupOutcome::valid)
    }

    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║    GROUP CHAT SIMULATION RESULTS                       ║");
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("Scenario: {}", self.name);
        println!("Seed: {}", self.seed_used);
        println!("Events collected: {}", self.total_events);
        println!();

        println!("═══ Groups ═══");
        for outcome in &self.groups {
            println!(
                "  Group {}: {:?}, {} member(s), {} line(s) delivered, {} banned, {} completed",
                outcome.group_id,
                outcome.status,
                outcome.members,
                outcome.delivered,
                outcome.removed_for_violations,
                outcome.quota_completed,
            );
        }
        println!();

        println!("═══ Validation ═══");
        for outcome in &self.groups {
            println!(
                "  Group {}: transcript ordered: {}, terminated cleanly: {}",
                outcome.group_id, outcome.transcript_ordered, outcome.terminated_cleanly
            );
        }
        println!();

        if self.all_valid() {
            println!("All checks passed.");
        } else {
            println!("VALIDATION FAILED - see above.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gr_rust::UserRecord;

    fn report(group: GroupId, transcript: Vec<(Timestamp, UserId)>) -> SessionReport {
        SessionReport {
            group_id: group,
            status: SessionStatus::Terminated,
            removed_for_violations: 0,
            transcript: transcript
                .into_iter()
                .map(|(timestamp, user_id)| UserRecord {
                    user_id,
                    timestamp,
                    text: String::new(),
                })
                .collect(),
        }
    }

    fn ordered(group: GroupId, timestamp: Timestamp, user: UserId) -> SessionEvent {
        SessionEvent::OrderedMessage {
            group,
            user,
            timestamp,
            text: String::new(),
        }
    }

    #[test]
    fn test_ordered_stream_validates() {
        let events = vec![
            ordered(1, 1, 2),
            ordered(1, 2, 1),
            ordered(1, 2, 3),
            SessionEvent::SessionTerminated {
                group: 1,
                removed_count: 0,
            },
        ];
        let outcome = GroupOutcome::build(&report(1, vec![(1, 2), (2, 1), (2, 3)]), &events, 3);

        assert!(outcome.transcript_ordered);
        assert!(outcome.terminated_cleanly);
        assert!(outcome.valid());
    }

    #[test]
    fn test_out_of_order_stream_flagged() {
        let events = vec![
            ordered(1, 5, 1),
            ordered(1, 2, 2),
            SessionEvent::SessionTerminated {
                group: 1,
                removed_count: 0,
            },
        ];
        let outcome = GroupOutcome::build(&report(1, vec![(5, 1), (2, 2)]), &events, 2);

        assert!(!outcome.transcript_ordered);
        assert!(!outcome.valid());
    }

    #[test]
    fn test_missing_termination_flagged() {
        let events = vec![ordered(1, 1, 1)];
        let outcome = GroupOutcome::build(&report(1, vec![(1, 1)]), &events, 2);

        assert!(!outcome.terminated_cleanly);
    }

    #[test]
    fn test_other_groups_events_ignored() {
        let events = vec![
            ordered(2, 9, 9),
            ordered(1, 1, 1),
            SessionEvent::SessionTerminated {
                group: 1,
                removed_count: 0,
            },
            SessionEvent::SessionTerminated {
                group: 2,
                removed_count: 3,
            },
        ];
        let outcome = GroupOutcome::build(&report(1, vec![(1, 1)]), &events, 2);

        assert!(outcome.transcript_ordered);
        assert!(outcome.terminated_cleanly);
    }
}

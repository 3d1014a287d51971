// Group Chat Scenario Runner
//
// Starts one moderation service and one session thread per group, waits for
// every session to reach a terminal state, then validates the collected
// event streams against the final reports.

use std::path::PathBuf;
use std::thread;

use crossbeam::channel;
use log::{error, info};
use rand::Rng;

use gr_rust::gr_moderator::ModeratorHandle;
use gr_rust::gr_session::{CancelToken, GroupSession, SessionReport};
use gr_rust::{ConfigError, FeedScript, GroupId, SessionEvent, UserId};

use super::config::ScenarioFile;
use super::event_sink::ChannelSink;
use super::stats::{GroupOutcome, ScenarioResult};

/// Word pool for generated feeds; the run's filtered terms are mixed in so
/// moderation has something to find.
const BENIGN_WORDS: &[&str] = &[
    "hello", "morning", "how", "are", "things", "fine", "thanks", "meeting", "later", "sure",
    "sounds", "good", "see", "you", "soon", "busy", "today", "weather", "nice", "indeed",
];

pub struct ScenarioRunner {
    scenario: ScenarioFile,
    base_dir: PathBuf,
    seed_override: Option<u64>,
}

impl ScenarioRunner {
    pub fn new(scenario: ScenarioFile, base_dir: PathBuf, seed_override: Option<u64>) -> Self {
        Self {
            scenario,
            base_dir,
            seed_override,
        }
    }

    /// Run every group session to completion and validate the outcome.
    pub fn run(self) -> Result<ScenarioResult, ConfigError> {
        let moderation = self.scenario.config.moderation.resolve(&self.base_dir)?;

        let seed = self
            .seed_override
            .or(self.scenario.config.seed)
            .unwrap_or_else(|| rand::thread_rng().gen());
        info!("scenario seed: {}", seed);

        let mut vocabulary: Vec<String> = BENIGN_WORDS.iter().map(|w| w.to_string()).collect();
        vocabulary.extend(moderation.filtered_terms.iter().cloned());

        // Materialize every roster up front: an unreadable feed aborts the
        // run before any thread starts, naming the offending entry.
        let mut rosters: Vec<(GroupId, Vec<(UserId, FeedScript)>)> = Vec::new();
        for group in &self.scenario.groups {
            let mut roster = Vec::new();
            for member in &group.members {
                let fallback = seed
                    .wrapping_add((group.id as u64) << 32)
                    .wrapping_add(member.user as u64);
                let script = member.resolve(&self.base_dir, &vocabulary, fallback)?;
                roster.push((member.user, script));
            }
            rosters.push((group.id, roster));
        }

        let moderator = ModeratorHandle::start(moderation);
        let (event_tx, event_rx) = channel::unbounded();
        let session_config = self.scenario.config.session.to_session_config();

        let mut sessions = Vec::new();
        for (group_id, roster) in rosters {
            let members = roster.len();
            let moderator = moderator.clone();
            let events = event_tx.clone();
            let config = session_config.clone();

            let handle = thread::Builder::new()
                .name(format!("group-{}", group_id))
                .spawn(move || -> Result<SessionReport, ConfigError> {
                    let session = GroupSession::start(
                        group_id,
                        roster,
                        config,
                        moderator,
                        Box::new(ChannelSink::new(events)),
                        CancelToken::new(),
                    )?;
                    Ok(session.run())
                })
                .expect("spawn group session");
            sessions.push((members, handle));
        }
        drop(event_tx);

        let mut reports = Vec::new();
        for (members, handle) in sessions {
            match handle.join() {
                Ok(Ok(report)) => reports.push((members, report)),
                Ok(Err(e)) => error!("group session failed to start: {}", e),
                Err(_) => error!("group session thread panicked"),
            }
        }

        moderator.shutdown();

        // Every sender clone is gone once the sessions joined, so this
        // drains to disconnect.
        let events: Vec<SessionEvent> = event_rx.iter().collect();

        let groups = reports
            .iter()
            .map(|(members, report)| GroupOutcome::build(report, &events, *members))
            .collect();

        Ok(ScenarioResult {
            name: self
                .scenario
                .meta
                .name
                .clone()
                .unwrap_or_else(|| "unnamed".to_string()),
            seed_used: seed,
            groups,
            total_events: events.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gr_rust::gr_session::SessionStatus;

    fn run_yaml(yaml: &str) -> ScenarioResult {
        let scenario: ScenarioFile = serde_yaml::from_str(yaml).unwrap();
        ScenarioRunner::new(scenario, PathBuf::from("."), Some(11))
            .run()
            .unwrap()
    }

    #[test]
    fn test_two_groups_run_concurrently_and_validate() {
        let result = run_yaml(
            r#"
meta:
  name: two-groups
config:
  moderation:
    threshold: 2
    filtered_terms: [spam, junk]
groups:
  - id: 1
    members:
      - user: 1
        lines:
          - { at: 1, text: "hi" }
          - { at: 3, text: "spam spam" }
          - { at: 5, text: "spam and junk" }
          - { at: 7, text: "left behind" }
      - user: 2
        lines:
          - { at: 2, text: "fine" }
          - { at: 6, text: "still fine" }
      - user: 3
        lines: []
  - id: 2
    members:
      - user: 1
        lines:
          - { at: 1, text: "all clean" }
          - { at: 4, text: "nothing to see" }
      - user: 2
        lines: []
"#,
        );

        assert_eq!(result.name, "two-groups");
        assert_eq!(result.groups.len(), 2);
        assert!(result.all_valid());

        let g1 = result.groups.iter().find(|g| g.group_id == 1).unwrap();
        assert_eq!(g1.status, SessionStatus::Terminated);
        assert_eq!(g1.removed_for_violations, 1);

        let g2 = result.groups.iter().find(|g| g.group_id == 2).unwrap();
        assert_eq!(g2.removed_for_violations, 0);
        assert_eq!(g2.delivered, 2);
    }

    #[test]
    fn test_generated_feeds_are_reproducible_across_runs() {
        let yaml = r#"
config:
  seed: 99
  moderation:
    threshold: 1000
    filtered_terms: [spam]
groups:
  - id: 1
    members:
      - user: 1
        generated: { messages: 6 }
      - user: 2
        generated: { messages: 6 }
      - user: 3
        lines: []
"#;
        let a = run_yaml(yaml);
        let b = run_yaml(yaml);

        assert!(a.all_valid());
        let (ga, gb) = (&a.groups[0], &b.groups[0]);
        assert_eq!(ga.delivered, gb.delivered);
    }

    #[test]
    fn test_unreadable_feed_aborts_before_start() {
        let scenario: ScenarioFile = serde_yaml::from_str(
            r#"
config:
  moderation:
    threshold: 2
groups:
  - id: 1
    members:
      - user: 1
        file: does_not_exist.txt
"#,
        )
        .unwrap();

        let err = ScenarioRunner::new(scenario, PathBuf::from("."), None)
            .run()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FeedSource { .. }));
    }
}

// Group Chat Simulator Configuration

use std::path::{Path, PathBuf};

use gr_rust::gr_feed;
use gr_rust::gr_moderator::ModerationConfig;
use gr_rust::gr_session::SessionConfig;
use gr_rust::{ConfigError, FeedScript, GroupId, Timestamp, UserId};
use std::time::Duration;

// ============================================================================
// Scenario File Format
// ============================================================================

/// Top-level scenario file layout
#[derive(Debug, serde::Deserialize)]
pub struct ScenarioFile {
    /// Scenario metadata
    #[serde(default)]
    pub meta: ScenarioMeta,

    /// Run-wide configuration
    pub config: ScenarioConfig,

    /// One entry per group session
    pub groups: Vec<GroupSpec>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct ScenarioMeta {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ScenarioConfig {
    pub moderation: ModerationSettings,

    #[serde(default)]
    pub session: SessionSettings,

    /// Base seed for generated feeds (overridable from the CLI)
    #[serde(default)]
    pub seed: Option<u64>,
}

// ============================================================================
// Moderation Settings
// ============================================================================

#[derive(Debug, serde::Deserialize)]
pub struct ModerationSettings {
    /// Ledger value at which a member is banned
    pub threshold: u32,

    /// Inline deny list
    #[serde(default)]
    pub filtered_terms: Vec<String>,

    /// Deny-list file, one term per line (resolved against the scenario
    /// file's directory). Merged with the inline list.
    #[serde(default)]
    pub filtered_terms_file: Option<PathBuf>,
}

impl ModerationSettings {
    pub fn resolve(&self, base_dir: &Path) -> Result<ModerationConfig, ConfigError> {
        let mut terms = self.filtered_terms.clone();
        if let Some(ref file) = self.filtered_terms_file {
            let loaded = ModerationConfig::from_file(&base_dir.join(file), self.threshold)?;
            terms.extend(loaded.filtered_terms);
        }
        Ok(ModerationConfig::new(terms, self.threshold))
    }
}

// ============================================================================
// Session Settings
// ============================================================================

#[derive(Debug, serde::Deserialize)]
pub struct SessionSettings {
    /// Delay each feed inserts between records (milliseconds)
    #[serde(default)]
    pub feed_pace_ms: u64,

    /// Suspension after an empty ingestion pass (milliseconds)
    #[serde(default = "default_idle_backoff")]
    pub idle_backoff_ms: u64,

    /// Bounded verdict wait; absent means block indefinitely
    #[serde(default)]
    pub verdict_timeout_ms: Option<u64>,
}

fn default_idle_backoff() -> u64 {
    100
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            feed_pace_ms: 0,
            idle_backoff_ms: default_idle_backoff(),
            verdict_timeout_ms: None,
        }
    }
}

impl SessionSettings {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
            feed_pace: Duration::from_millis(self.feed_pace_ms),
            verdict_timeout: self.verdict_timeout_ms.map(Duration::from_millis),
        }
    }
}

// ============================================================================
// Groups and Feeds
// ============================================================================

#[derive(Debug, serde::Deserialize)]
pub struct GroupSpec {
    pub id: GroupId,
    pub members: Vec<MemberSpec>,
}

#[derive(Debug, serde::Deserialize)]
pub struct MemberSpec {
    pub user: UserId,

    #[serde(flatten)]
    pub source: FeedSource,
}

/// Where a member's record script comes from
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
pub enum FeedSource {
    /// Inline records
    Lines { lines: Vec<FeedLine> },

    /// Replay file in `<timestamp> <text>` line format, resolved against
    /// the scenario file's directory
    File { file: PathBuf },

    /// Seed-reproducible synthetic chatter
    Generated { generated: GeneratedFeed },
}

#[derive(Debug, serde::Deserialize)]
pub struct FeedLine {
    pub at: Timestamp,
    pub text: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct GeneratedFeed {
    pub messages: usize,

    /// Per-member seed; defaults to the run seed mixed with group/user ids
    #[serde(default)]
    pub seed: Option<u64>,

    /// Maximum timestamp step between consecutive records
    #[serde(default = "default_max_step")]
    pub max_step: Timestamp,

    /// Word pool; defaults to the runner's vocabulary (which includes the
    /// filtered terms so moderation has something to find)
    #[serde(default)]
    pub vocabulary: Option<Vec<String>>,
}

fn default_max_step() -> Timestamp {
    5
}

impl MemberSpec {
    /// Materialize this member's feed script.
    pub fn resolve(
        &self,
        base_dir: &Path,
        default_vocabulary: &[String],
        fallback_seed: u64,
    ) -> Result<FeedScript, ConfigError> {
        match &self.source {
            FeedSource::Lines { lines } => Ok(lines
                .iter()
                .map(|line| (line.at, line.text.clone()))
                .collect()),
            FeedSource::File { file } => gr_feed::load_feed_script(&base_dir.join(file)),
            FeedSource::Generated { generated } => {
                let seed = generated.seed.unwrap_or(fallback_seed);
                let vocabulary = generated
                    .vocabulary
                    .as_deref()
                    .unwrap_or(default_vocabulary);
                Ok(gr_feed::generate_feed_script(
                    seed,
                    generated.messages,
                    generated.max_step,
                    vocabulary,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inline_scenario() {
        let yaml = r#"
meta:
  name: smoke
config:
  moderation:
    threshold: 2
    filtered_terms: [spam]
groups:
  - id: 1
    members:
      - user: 1
        lines:
          - at: 3
            text: hello there
      - user: 2
        generated:
          messages: 4
"#;
        let scenario: ScenarioFile = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(scenario.meta.name.as_deref(), Some("smoke"));
        assert_eq!(scenario.config.moderation.threshold, 2);
        assert_eq!(scenario.groups.len(), 1);
        assert_eq!(scenario.groups[0].members.len(), 2);
        assert!(matches!(
            scenario.groups[0].members[0].source,
            FeedSource::Lines { .. }
        ));
        assert!(matches!(
            scenario.groups[0].members[1].source,
            FeedSource::Generated { .. }
        ));

        // Session settings fall back to defaults
        let session = scenario.config.session.to_session_config();
        assert_eq!(session.idle_backoff, Duration::from_millis(100));
        assert_eq!(session.verdict_timeout, None);
    }

    #[test]
    fn test_resolve_inline_and_generated_members() {
        let spec = MemberSpec {
            user: 1,
            source: FeedSource::Lines {
                lines: vec![FeedLine {
                    at: 2,
                    text: "yo".into(),
                }],
            },
        };
        let script = spec.resolve(Path::new("."), &[], 0).unwrap();
        assert_eq!(script, vec![(2, "yo".to_string())]);

        let vocab = vec!["word".to_string()];
        let spec = MemberSpec {
            user: 2,
            source: FeedSource::Generated {
                generated: GeneratedFeed {
                    messages: 3,
                    seed: None,
                    max_step: 2,
                    vocabulary: None,
                },
            },
        };
        let a = spec.resolve(Path::new("."), &vocab, 99).unwrap();
        let b = spec.resolve(Path::new("."), &vocab, 99).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }
}

//! # grRust - Moderated Group-Chat Relay
//!
//! A simulation of a moderated group-chat pipeline: synthetic users emit
//! timestamped text lines into group sessions; each session interleaves and
//! orders those lines, relays them to a shared content-moderation service,
//! enforces the ban verdicts pushed back, and reports an ordered transcript
//! plus termination status to an event sink.
//!
//! ## Core Components
//!
//! - **GroupSession**: one per group; fans in member feeds, buffers to
//!   end-of-stream, replays in `(timestamp, user_id)` order and applies
//!   moderation verdicts
//! - **Moderator / ModeratorHandle**: violation ledger and ban decision
//!   engine behind a single long-lived service thread
//! - **Feed scripts**: per-user record scripts replayed by reader threads
//! - **Protocol types**: records, verdicts, lifecycle events, error taxonomy
//!
//! ## Usage
//!
//! ```no_run
//! use gr_rust::{GroupSession, SessionConfig, CancelToken, NoOpSink};
//! use gr_rust::gr_moderator::{ModerationConfig, ModeratorHandle};
//!
//! let moderator = ModeratorHandle::start(ModerationConfig::new(
//!     ["spam".to_string()],
//!     2,
//! ));
//!
//! let roster = vec![
//!     (1, vec![(1, "hello".to_string())]),
//!     (2, vec![(2, "hi there".to_string())]),
//! ];
//! let session = GroupSession::start(
//!     1,
//!     roster,
//!     SessionConfig::default(),
//!     moderator.clone(),
//!     Box::new(NoOpSink),
//!     CancelToken::new(),
//! ).unwrap();
//!
//! let report = session.run();
//! println!("{} line(s) delivered", report.transcript.len());
//! moderator.shutdown();
//! ```
//!
//! ## Testing and Simulation
//!
//! For scenario-driven runs (YAML scenario files, multiple groups, a
//! validating event collector) see the `scenario_runner` binary in
//! `simulator/`.

// Core modules
pub mod gr_feed;
pub mod gr_interface;
pub mod gr_moderator;
pub mod gr_session;

// Re-export commonly used types
pub use gr_feed::{generate_feed_script, load_feed_script, spawn_feed, FeedScript};
pub use gr_interface::{
    BanState, ConfigError, EventSink, GroupId, NoOpSink, RemovalReason, SessionEvent, Timestamp,
    UserId, UserRecord, Verdict, MAX_TEXT_BYTES,
};
pub use gr_moderator::{ModerationConfig, Moderator, ModeratorHandle};
pub use gr_session::{
    CancelToken, GroupSession, SessionConfig, SessionPhase, SessionReport, SessionStatus,
};

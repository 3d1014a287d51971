use log::info;
use simple_logger::SimpleLogger;

use gr_rust::gr_moderator::{ModerationConfig, ModeratorHandle};
use gr_rust::{
    CancelToken, EventSink, GroupSession, SessionConfig, SessionEvent, SessionStatus,
};

/// Sink that mirrors every lifecycle event to the log.
struct LogSink;

impl EventSink for LogSink {
    fn log(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::SessionCreated { group } => info!("g:{} created", group),
            SessionEvent::MemberJoined { group, user } => info!("g:{} join u:{}", group, user),
            SessionEvent::OrderedMessage {
                group,
                user,
                timestamp,
                ref text,
            } => info!("g:{} {} u:{} {:?}", group, timestamp, user, text),
            SessionEvent::MemberRemoved { group, user, reason } => {
                info!("g:{} remove u:{} ({:?})", group, user, reason)
            }
            SessionEvent::SessionTerminated {
                group,
                removed_count,
            } => info!("g:{} terminated, {} removed", group, removed_count),
        }
    }
}

fn main() {
    SimpleLogger::new().init().unwrap();

    info!("starting");

    let moderator = ModeratorHandle::start(ModerationConfig::new(
        ["spam".to_string(), "junk".to_string()],
        2,
    ));

    let roster = vec![
        (
            1,
            vec![
                (1, "hey all".to_string()),
                (4, "spam spam".to_string()),
                (6, "spam and junk for everyone".to_string()),
                (9, "anyone still here?".to_string()),
            ],
        ),
        (
            2,
            vec![
                (2, "hello".to_string()),
                (5, "how is it going".to_string()),
                (8, "quiet today".to_string()),
            ],
        ),
        (
            3,
            vec![(3, "good morning".to_string()), (7, "indeed".to_string())],
        ),
    ];

    let session = GroupSession::start(
        1,
        roster,
        SessionConfig::default(),
        moderator.clone(),
        Box::new(LogSink),
        CancelToken::new(),
    )
    .unwrap_or_else(|e| {
        eprintln!("session failed to start: {}", e);
        std::process::exit(1);
    });

    let report = session.run();

    println!("Final sorted messages for group {}:", report.group_id);
    for record in &report.transcript {
        println!(
            "User: {}, Timestamp: {}, Message: {}",
            record.user_id, record.timestamp, record.text
        );
    }

    info!(
        "done. status: {:?}, delivered: {}, removed: {}",
        report.status,
        report.transcript.len(),
        report.removed_for_violations
    );
    assert_eq!(report.status, SessionStatus::Terminated);

    moderator.shutdown();
}

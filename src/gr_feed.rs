//! User feed scripts and reader threads.
//!
//! A feed is an ordered script of `(timestamp, text)` records for one
//! simulated user. The reader thread replays the script into a channel at a
//! fixed pace and signals end-of-stream by dropping its sender. Records come
//! out in script order, not timestamp order.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::gr_interface::{ConfigError, Timestamp, UserId, UserRecord, MAX_TEXT_BYTES};

/// Ordered record script for one user.
pub type FeedScript = Vec<(Timestamp, String)>;

/// Load a feed script from a `<timestamp> <text>` line file.
///
/// Lines are taken in file order. Blank lines are skipped; anything else
/// that does not parse is a fatal `ConfigError` (an unreadable feed is a
/// construction fault, not a runtime condition).
pub fn load_feed_script(path: &Path) -> Result<FeedScript, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::FeedSource {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;

    let mut script = FeedScript::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let malformed = || ConfigError::MalformedRecord {
            path: path.display().to_string(),
            line: idx + 1,
        };

        let (ts, text) = line.split_once(char::is_whitespace).ok_or_else(malformed)?;
        let timestamp: Timestamp = ts.parse().map_err(|_| malformed())?;
        let text = text.trim_start();
        if text.is_empty() {
            return Err(malformed());
        }

        script.push((timestamp, clamp_text(text)));
    }

    Ok(script)
}

/// Generate a reproducible feed script from a seed.
///
/// Timestamps advance by random steps in `1..=max_step`; each text is a
/// short phrase sampled from `vocabulary`. Used by scenarios that describe
/// synthetic chatter instead of replay files.
pub fn generate_feed_script(
    seed: u64,
    messages: usize,
    max_step: Timestamp,
    vocabulary: &[String],
) -> FeedScript {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut script = FeedScript::with_capacity(messages);

    let mut at: Timestamp = 0;
    for _ in 0..messages {
        at += rng.gen_range(1..=max_step.max(1));

        let words = rng.gen_range(2..=5);
        let mut text = String::new();
        for w in 0..words {
            if w > 0 {
                text.push(' ');
            }
            match vocabulary.choose(&mut rng) {
                Some(word) => text.push_str(word),
                None => text.push_str("..."),
            }
        }

        script.push((at, clamp_text(&text)));
    }

    script
}

/// Truncate to `MAX_TEXT_BYTES` on a char boundary.
fn clamp_text(text: &str) -> String {
    if text.len() <= MAX_TEXT_BYTES {
        return text.to_string();
    }
    let mut end = MAX_TEXT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Spawn the reader thread for one member and hand back its record channel.
///
/// The thread replays the script at `pace` per record and exits when the
/// script ends or the session dropped the receiving end (cancellation).
/// End-of-stream is the channel disconnect.
pub fn spawn_feed(user: UserId, script: FeedScript, pace: Duration) -> Receiver<UserRecord> {
    let (tx, rx) = channel::unbounded();

    thread::Builder::new()
        .name(format!("feed-{}", user))
        .spawn(move || {
            for (timestamp, text) in script {
                let record = UserRecord {
                    user_id: user,
                    timestamp,
                    text,
                };
                if tx.send(record).is_err() {
                    // Session gone; nothing left to deliver to.
                    return;
                }
                if !pace.is_zero() {
                    thread::sleep(pace);
                }
            }
        })
        .expect("spawn feed reader");

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("gr_feed_test_{}_{}", std::process::id(), name));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_feed_script_in_file_order() {
        let path = write_temp("order", "5 hello there\n2 out of order\n9 bye\n");
        let script = load_feed_script(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(
            script,
            vec![
                (5, "hello there".to_string()),
                (2, "out of order".to_string()),
                (9, "bye".to_string()),
            ]
        );
    }

    #[test]
    fn test_load_feed_script_rejects_bad_line() {
        let path = write_temp("bad", "5 ok\nnot-a-timestamp text\n");
        let err = load_feed_script(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert!(matches!(err, ConfigError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn test_load_feed_script_missing_file() {
        let err = load_feed_script(Path::new("/nonexistent/user_1_0.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::FeedSource { .. }));
    }

    #[test]
    fn test_text_clamped_to_limit() {
        let long = "x".repeat(MAX_TEXT_BYTES * 2);
        let path = write_temp("clamp", &format!("1 {}\n", long));
        let script = load_feed_script(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(script[0].1.len(), MAX_TEXT_BYTES);
    }

    #[test]
    fn test_generated_script_is_reproducible() {
        let vocab = vec!["alpha".to_string(), "beta".to_string()];
        let a = generate_feed_script(42, 10, 3, &vocab);
        let b = generate_feed_script(42, 10, 3, &vocab);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);

        // Timestamps strictly increase within one generated script
        for pair in a.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }

    #[test]
    fn test_spawn_feed_replays_then_disconnects() {
        let script = vec![(3, "one".to_string()), (1, "two".to_string())];
        let rx = spawn_feed(7, script, Duration::ZERO);

        let first = rx.recv().unwrap();
        assert_eq!((first.timestamp, first.text.as_str()), (3, "one"));
        let second = rx.recv().unwrap();
        assert_eq!((second.timestamp, second.text.as_str()), (1, "two"));

        // Script exhausted: channel disconnects
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_spawn_feed_empty_script_closes_immediately() {
        let rx = spawn_feed(1, FeedScript::new(), Duration::ZERO);
        assert!(rx.recv().is_err());
    }
}

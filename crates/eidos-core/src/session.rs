//! Bounded conversation memory, keyed by session id.
//!
//! Each session keeps its 5 most-recent turns, oldest first. Session ids
//! arrive from callers unbounded, so the store also caps the number of live
//! sessions and evicts the least-recently-updated one past the cap.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::rag::SourceGroup;

/// One question/answer exchange with the sources that grounded it.
#[derive(Debug, Clone)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceGroup>,
}

/// Turns kept per session.
pub const MAX_TURNS: usize = 5;
/// Live sessions kept before LRU eviction.
pub const DEFAULT_MAX_SESSIONS: usize = 256;

#[derive(Debug)]
struct Session {
    turns: VecDeque<Turn>,
    last_used: Instant,
}

/// Conversation memory for all sessions. Created lazily per session id on
/// the first recorded turn.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
    max_turns: usize,
    max_sessions: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_limits(MAX_TURNS, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_limits(max_turns: usize, max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_turns: max_turns.max(1),
            max_sessions: max_sessions.max(1),
        }
    }

    /// The question from the session's most recent turn, if any.
    pub fn last_question(&self, session_id: &str) -> Option<&str> {
        self.sessions
            .get(session_id)
            .and_then(|s| s.turns.back())
            .map(|t| t.question.as_str())
    }

    /// The last `n` turns of a session, oldest first.
    pub fn recent_turns(&self, session_id: &str, n: usize) -> Vec<&Turn> {
        let Some(session) = self.sessions.get(session_id) else {
            return Vec::new();
        };
        let skip = session.turns.len().saturating_sub(n);
        session.turns.iter().skip(skip).collect()
    }

    /// Record a turn, trimming the session to the newest `max_turns` and
    /// evicting the least-recently-updated other session past the cap.
    pub fn push_turn(&mut self, session_id: &str, turn: Turn) {
        let now = Instant::now();
        let session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session {
                turns: VecDeque::new(),
                last_used: now,
            });
        session.turns.push_back(turn);
        session.last_used = now;
        while session.turns.len() > self.max_turns {
            session.turns.pop_front();
        }
        while self.sessions.len() > self.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .filter(|(id, _)| id.as_str() != session_id)
                .min_by_key(|(_, s)| s.last_used)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    tracing::debug!(session = %id, "evicting idle conversation session");
                    self.sessions.remove(&id);
                }
                None => break,
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(q: &str) -> Turn {
        Turn {
            question: q.to_string(),
            answer: format!("answer to {q}"),
            sources: Vec::new(),
        }
    }

    #[test]
    fn keeps_only_newest_five_turns() {
        let mut store = SessionStore::new();
        for i in 1..=7 {
            store.push_turn("s1", turn(&format!("q{i}")));
        }
        let turns = store.recent_turns("s1", 10);
        let questions: Vec<&str> = turns.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q3", "q4", "q5", "q6", "q7"]);
    }

    #[test]
    fn recent_turns_are_oldest_first() {
        let mut store = SessionStore::new();
        store.push_turn("s1", turn("first"));
        store.push_turn("s1", turn("second"));
        store.push_turn("s1", turn("third"));
        let last_two = store.recent_turns("s1", 2);
        assert_eq!(last_two[0].question, "second");
        assert_eq!(last_two[1].question, "third");
    }

    #[test]
    fn last_question_tracks_newest_turn() {
        let mut store = SessionStore::new();
        assert!(store.last_question("s1").is_none());
        store.push_turn("s1", turn("how many days of leave?"));
        assert_eq!(store.last_question("s1"), Some("how many days of leave?"));
    }

    #[test]
    fn sessions_are_independent() {
        let mut store = SessionStore::new();
        store.push_turn("a", turn("qa"));
        store.push_turn("b", turn("qb"));
        assert_eq!(store.last_question("a"), Some("qa"));
        assert_eq!(store.last_question("b"), Some("qb"));
    }

    #[test]
    fn evicts_least_recent_session_past_cap() {
        let mut store = SessionStore::with_limits(5, 2);
        let tick = std::time::Duration::from_millis(2);
        store.push_turn("a", turn("qa"));
        std::thread::sleep(tick);
        store.push_turn("b", turn("qb"));
        std::thread::sleep(tick);
        store.push_turn("c", turn("qc"));
        assert_eq!(store.session_count(), 2);
        assert!(store.last_question("a").is_none());
        assert_eq!(store.last_question("c"), Some("qc"));
    }
}

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

/// Lifecycle phase of a session, derived from its deadline fields rather
/// than stored. Advancing a phase clears the matching deadline, so a
/// repeated advance finds nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Join window open: membership and suggestions accepted.
    Joining,
    /// Selection poll running: ballots accepted from members.
    Selecting,
    /// Session underway: no further membership or suggestion changes.
    Active,
}

/// A suggested title with its accumulated support.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// Normalized title (the dedup key).
    pub title: String,
    /// First member to suggest it.
    pub proposer: String,
    /// Members who have suggested this title; its len is the tally.
    suggesters: HashSet<String>,
}

impl Suggestion {
    fn new(title: String, proposer: String) -> Self {
        let mut suggesters = HashSet::new();
        suggesters.insert(proposer.clone());
        Self {
            title,
            proposer,
            suggesters,
        }
    }

    pub fn count(&self) -> u32 {
        self.suggesters.len() as u32
    }
}

/// An early-termination quorum vote. Ballots are yes-only; initiating a
/// fresh vote replaces the whole set.
#[derive(Debug, Clone, Default)]
pub struct EndVote {
    ballots: HashSet<String>,
}

impl EndVote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a ballot. Returns false if the user had already voted.
    pub fn cast(&mut self, user_id: &str) -> bool {
        self.ballots.insert(user_id.to_string())
    }

    /// Drop a ballot (the voter left the session).
    pub fn retract(&mut self, user_id: &str) {
        self.ballots.remove(user_id);
    }

    pub fn ballots_cast(&self) -> usize {
        self.ballots.len()
    }

    /// Strict majority of the member count at the moment of the check.
    pub fn passes(&self, member_count: usize) -> bool {
        self.ballots.len() * 2 > member_count
    }
}

/// One member's poll choice, with the global submission sequence number it
/// was cast at. Re-casting takes a fresh number.
#[derive(Debug, Clone)]
struct Ballot {
    title: String,
    seq: u64,
}

/// The book-selection plurality poll. One choice per member, last cast
/// wins; ties between candidates break toward the one whose earliest
/// supporting ballot came first.
#[derive(Debug, Clone)]
pub struct SelectionPoll {
    candidates: Vec<String>,
    ballots: HashMap<String, Ballot>,
    next_seq: u64,
}

impl SelectionPoll {
    pub fn new(candidates: Vec<String>) -> Self {
        Self {
            candidates,
            ballots: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Cast or change a ballot. Returns false when the title matches no
    /// candidate.
    pub fn cast(&mut self, user_id: &str, title: &str) -> bool {
        let Some(candidate) = self
            .candidates
            .iter()
            .find(|c| c.eq_ignore_ascii_case(title))
        else {
            return false;
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.ballots.insert(
            user_id.to_string(),
            Ballot {
                title: candidate.clone(),
                seq,
            },
        );
        true
    }

    /// Drop a member's ballot.
    pub fn retract(&mut self, user_id: &str) {
        self.ballots.remove(user_id);
    }

    pub fn ballots_cast(&self) -> usize {
        self.ballots.len()
    }

    /// Resolve the poll: highest ballot count wins, ties break toward the
    /// candidate whose first supporting ballot has the lowest sequence
    /// number. Returns None when nobody voted.
    pub fn winner(&self) -> Option<String> {
        let mut tally: HashMap<&str, (usize, u64)> = HashMap::new();
        for ballot in self.ballots.values() {
            let entry = tally.entry(&ballot.title).or_insert((0, ballot.seq));
            entry.0 += 1;
            if ballot.seq < entry.1 {
                entry.1 = ballot.seq;
            }
        }
        tally
            .into_iter()
            .max_by(|(_, (count_a, seq_a)), (_, (count_b, seq_b))| {
                count_a.cmp(count_b).then(seq_b.cmp(seq_a))
            })
            .map(|(title, _)| title.to_string())
    }
}

/// In-memory state for one guild's reading session. The registry owns it
/// behind a per-guild mutex; every field mutation happens after the
/// corresponding durable write succeeded.
#[derive(Debug)]
pub struct SessionState {
    pub guild_id: String,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub join_deadline: Option<DateTime<Utc>>,
    pub poll_deadline: Option<DateTime<Utc>>,
    pub voting_enabled: bool,
    /// Users who opted in.
    pub members: HashSet<String>,
    /// Users who explicitly opted out.
    pub declined: HashSet<String>,
    /// Suggested titles in submission order.
    pub suggestions: Vec<Suggestion>,
    /// Running early-termination vote, when one is open.
    pub end_vote: Option<EndVote>,
    /// Running selection poll, when the session is in `Selecting`.
    pub poll: Option<SelectionPoll>,
    /// Chat-layer reference to the rendered join/poll message.
    pub message_ref: Option<String>,
    /// Set when the session row has been deleted; tasks holding a stale
    /// handle must treat the session as gone.
    pub closed: bool,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        if self.join_deadline.is_some() {
            Phase::Joining
        } else if self.poll_deadline.is_some() {
            Phase::Selecting
        } else {
            Phase::Active
        }
    }

    /// Mark a user as a member. Returns false when already a member.
    pub fn add_member(&mut self, user_id: &str) -> bool {
        self.declined.remove(user_id);
        self.members.insert(user_id.to_string())
    }

    /// Mark a user as opted out, dropping any ballots they held. Returns
    /// false when already opted out.
    pub fn remove_member(&mut self, user_id: &str) -> bool {
        self.members.remove(user_id);
        if let Some(vote) = &mut self.end_vote {
            vote.retract(user_id);
        }
        if let Some(poll) = &mut self.poll {
            poll.retract(user_id);
        }
        self.declined.insert(user_id.to_string())
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains(user_id)
    }

    /// Record a suggestion under its normalized title. Returns the tally
    /// after the call. A repeat from the same member changes nothing.
    pub fn record_suggestion(&mut self, normalized_title: &str, user_id: &str) -> u32 {
        if let Some(existing) = self
            .suggestions
            .iter_mut()
            .find(|s| s.title.eq_ignore_ascii_case(normalized_title))
        {
            existing.suggesters.insert(user_id.to_string());
            return existing.count();
        }
        self.suggestions.push(Suggestion::new(
            normalized_title.to_string(),
            user_id.to_string(),
        ));
        1
    }

    /// Distinct normalized suggestion titles, in submission order.
    pub fn suggestion_titles(&self) -> Vec<String> {
        self.suggestions.iter().map(|s| s.title.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn state() -> SessionState {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap();
        SessionState {
            guild_id: "g1".into(),
            title: "Winter Reading".into(),
            description: String::new(),
            start_time: start,
            end_time: start + chrono::Duration::days(14),
            join_deadline: Some(start + chrono::Duration::days(3)),
            poll_deadline: None,
            voting_enabled: true,
            members: HashSet::new(),
            declined: HashSet::new(),
            suggestions: Vec::new(),
            end_vote: None,
            poll: None,
            message_ref: None,
            closed: false,
        }
    }

    // ── Phase derivation ────────────────────────────────────────

    #[test]
    fn test_phase_derived_from_deadlines() {
        let mut s = state();
        assert_eq!(s.phase(), Phase::Joining);

        s.join_deadline = None;
        s.poll_deadline = Some(s.start_time);
        assert_eq!(s.phase(), Phase::Selecting);

        s.poll_deadline = None;
        assert_eq!(s.phase(), Phase::Active);
    }

    // ── Membership sets ─────────────────────────────────────────

    #[test]
    fn test_member_and_declined_are_exclusive() {
        let mut s = state();
        assert!(s.add_member("u1"));
        assert!(!s.add_member("u1"), "re-join is a no-op");
        assert!(s.is_member("u1"));
        assert!(s.declined.is_empty());

        s.remove_member("u1");
        assert!(!s.is_member("u1"));
        assert!(s.declined.contains("u1"));

        s.add_member("u1");
        assert!(s.is_member("u1"));
        assert!(!s.declined.contains("u1"));
    }

    #[test]
    fn test_leaving_drops_ballots() {
        let mut s = state();
        s.add_member("u1");
        s.add_member("u2");

        let mut vote = EndVote::new();
        vote.cast("u1");
        vote.cast("u2");
        s.end_vote = Some(vote);

        s.remove_member("u1");
        assert_eq!(s.end_vote.as_ref().unwrap().ballots_cast(), 1);
    }

    // ── Suggestion tally ────────────────────────────────────────

    #[test]
    fn test_suggestion_tally_accumulates_across_members() {
        let mut s = state();
        assert_eq!(s.record_suggestion("Dune", "u1"), 1);
        assert_eq!(s.record_suggestion("Dune", "u2"), 2);
        assert_eq!(s.suggestions.len(), 1);
        assert_eq!(s.suggestions[0].proposer, "u1");
    }

    #[test]
    fn test_suggestion_repeat_from_same_member_is_noop() {
        let mut s = state();
        assert_eq!(s.record_suggestion("Dune", "u1"), 1);
        assert_eq!(s.record_suggestion("Dune", "u1"), 1);
    }

    #[test]
    fn test_suggestion_dedup_ignores_case() {
        let mut s = state();
        s.record_suggestion("Dune", "u1");
        assert_eq!(s.record_suggestion("dune", "u2"), 2);
        assert_eq!(s.suggestions.len(), 1);
    }

    // ── Early-end vote ──────────────────────────────────────────

    #[test]
    fn test_end_vote_strict_majority() {
        let mut vote = EndVote::new();
        // 5 members: 2 ballots fail, 3 pass
        vote.cast("u1");
        vote.cast("u2");
        assert!(!vote.passes(5));
        vote.cast("u3");
        assert!(vote.passes(5));
    }

    #[test]
    fn test_end_vote_even_membership() {
        let mut vote = EndVote::new();
        // 4 members: 2 ballots is exactly half, not a majority
        vote.cast("u1");
        vote.cast("u2");
        assert!(!vote.passes(4));
        vote.cast("u3");
        assert!(vote.passes(4));
    }

    #[test]
    fn test_end_vote_double_cast_does_not_inflate() {
        let mut vote = EndVote::new();
        assert!(vote.cast("u1"));
        assert!(!vote.cast("u1"));
        assert_eq!(vote.ballots_cast(), 1);
    }

    #[test]
    fn test_end_vote_denominator_shrinks_with_departures() {
        let mut s = state();
        for u in ["u1", "u2", "u3", "u4", "u5"] {
            s.add_member(u);
        }
        let mut vote = EndVote::new();
        vote.cast("u1");
        vote.cast("u2");
        s.end_vote = Some(vote);
        assert!(!s.end_vote.as_ref().unwrap().passes(s.members.len()));

        // A non-voter leaving shrinks the denominator to 4: 2 ballots still
        // short, but a 3rd member leaving makes 2 of 3 a majority.
        s.remove_member("u5");
        assert!(!s.end_vote.as_ref().unwrap().passes(s.members.len()));
        s.remove_member("u4");
        assert!(s.end_vote.as_ref().unwrap().passes(s.members.len()));
    }

    // ── Selection poll ──────────────────────────────────────────

    #[test]
    fn test_poll_plurality_winner() {
        let mut poll = SelectionPoll::new(vec!["Dune".into(), "Piranesi".into()]);
        assert!(poll.cast("u1", "Dune"));
        assert!(poll.cast("u2", "Dune"));
        assert!(poll.cast("u3", "Piranesi"));
        assert_eq!(poll.winner(), Some("Dune".to_string()));
    }

    #[test]
    fn test_poll_tie_breaks_to_earliest_first_ballot() {
        let mut poll = SelectionPoll::new(vec!["Dune".into(), "Piranesi".into()]);
        poll.cast("u1", "Piranesi");
        poll.cast("u2", "Dune");
        poll.cast("u3", "Dune");
        poll.cast("u4", "Piranesi");
        // 2-2 tie; Piranesi's first ballot (u1, seq 0) precedes Dune's (u2, seq 1)
        assert_eq!(poll.winner(), Some("Piranesi".to_string()));
    }

    #[test]
    fn test_poll_recast_overwrites_and_reorders() {
        let mut poll = SelectionPoll::new(vec!["Dune".into(), "Piranesi".into()]);
        poll.cast("u1", "Dune");
        poll.cast("u2", "Piranesi");
        // u1 changes their mind; their Dune ballot disappears
        poll.cast("u1", "Piranesi");
        assert_eq!(poll.ballots_cast(), 2);
        assert_eq!(poll.winner(), Some("Piranesi".to_string()));
    }

    #[test]
    fn test_poll_recast_resets_tie_break_position() {
        let mut poll = SelectionPoll::new(vec!["Dune".into(), "Piranesi".into()]);
        poll.cast("u1", "Dune"); // seq 0
        poll.cast("u2", "Piranesi"); // seq 1
        poll.cast("u1", "Dune"); // re-cast, seq 2: Dune's first ballot is now later
        assert_eq!(poll.winner(), Some("Piranesi".to_string()));
    }

    #[test]
    fn test_poll_rejects_unknown_candidate() {
        let mut poll = SelectionPoll::new(vec!["Dune".into()]);
        assert!(!poll.cast("u1", "Hyperion"));
        assert_eq!(poll.ballots_cast(), 0);
    }

    #[test]
    fn test_poll_candidate_match_ignores_case() {
        let mut poll = SelectionPoll::new(vec!["Dune".into()]);
        assert!(poll.cast("u1", "dune"));
        assert_eq!(poll.winner(), Some("Dune".to_string()));
    }

    #[test]
    fn test_poll_with_no_ballots_has_no_winner() {
        let poll = SelectionPoll::new(vec!["Dune".into(), "Piranesi".into()]);
        assert_eq!(poll.winner(), None);
    }
}

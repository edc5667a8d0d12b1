use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::clock::Clock;
use crate::db::queries::sessions::{CreateSessionParams, DeadlineField};

use super::error::ClubError;
use super::events::ClubEvent;
use super::registry::SessionRegistry;
use super::repository::SessionRepository;
use super::session::{EndVote, Phase, SelectionPoll, SessionState};
use super::validation;

/// Request to create a session, as received from the chat layer.
pub struct NewSessionParams<'a> {
    pub title: &'a str,
    pub description: &'a str,
    /// "YYYY-MM-DD"
    pub start_date: &'a str,
    /// "HH:MM"
    pub start_time: &'a str,
    pub duration_amount: i64,
    /// "weeks" or "months" (singular accepted)
    pub duration_unit: &'a str,
    pub voting_enabled: bool,
}

/// Summary handed back to the chat layer after a session is created.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHandle {
    pub guild_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub join_deadline: DateTime<Utc>,
}

/// Tally returned after an early-end ballot is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndVoteStatus {
    pub ballots_cast: usize,
    pub member_count: usize,
    pub passed: bool,
}

/// Result of driving a deadline transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The join window closed and a selection poll opened.
    PollOpened(Vec<String>),
    /// The session went active, with the poll winner when one resolved.
    Started(Option<String>),
    /// The session reached its end time and was removed.
    Closed,
    /// The deadline field was already cleared (or the session is gone);
    /// a repeated sweep lands here.
    AlreadyAdvanced,
    /// The deadline has not elapsed yet.
    NotDue,
}

/// Drives the session lifecycle for every guild: membership, suggestions,
/// both voting protocols, and the phase transitions. Member actions and the
/// reconciliation sweep funnel through the same entry points, so each
/// transition has exactly one code path.
pub struct ClubEngine {
    registry: Arc<SessionRegistry>,
    repo: SessionRepository,
    clock: Arc<dyn Clock>,
    events: mpsc::UnboundedSender<ClubEvent>,
}

impl ClubEngine {
    /// Build the engine and return the announcement receiver the chat layer
    /// consumes.
    pub fn new(
        registry: Arc<SessionRegistry>,
        repo: SessionRepository,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<ClubEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                registry,
                repo,
                clock,
                events,
            },
            rx,
        )
    }

    pub fn repository(&self) -> &SessionRepository {
        &self.repo
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Best-effort announcement. A dropped consumer must never fail or
    /// retry the transition that produced the event.
    fn emit(&self, event: ClubEvent) {
        let _ = self.events.send(event);
    }

    async fn session(
        &self,
        guild_id: &str,
    ) -> Result<Arc<tokio::sync::Mutex<SessionState>>, ClubError> {
        self.registry
            .get_or_load(&self.repo, guild_id)
            .await?
            .ok_or(ClubError::NoActiveSession)
    }

    /// Ok while the join window is open: phase `Joining` and the deadline
    /// not yet passed.
    fn ensure_join_window(&self, session: &SessionState) -> Result<(), ClubError> {
        if session.closed {
            return Err(ClubError::NoActiveSession);
        }
        let Some(deadline) = session.join_deadline else {
            return Err(ClubError::PhaseClosed);
        };
        if self.clock.now() > deadline {
            return Err(ClubError::PhaseClosed);
        }
        Ok(())
    }

    // ── Session creation ────────────────────────────────────────────

    /// Create a session and open its join window. The join deadline is a
    /// fixed three days from creation time, independent of the session's
    /// own length.
    pub async fn create_session(
        &self,
        guild_id: &str,
        params: &NewSessionParams<'_>,
    ) -> Result<SessionHandle, ClubError> {
        validation::validate_title(params.title).map_err(ClubError::Validation)?;
        let length = validation::session_length(params.duration_amount, params.duration_unit)
            .map_err(ClubError::Validation)?;
        let start_time = validation::parse_start(params.start_date, params.start_time)
            .map_err(ClubError::Validation)?;
        let end_time = start_time + length;

        if let Some(existing) = self.registry.get_or_load(&self.repo, guild_id).await? {
            if !existing.lock().await.closed {
                return Err(ClubError::SessionAlreadyRunning);
            }
            self.registry.remove(guild_id);
        }

        let now = self.clock.now();
        let join_deadline = now + Duration::days(validation::JOIN_WINDOW_DAYS);

        self.repo
            .create(&CreateSessionParams {
                guild_id,
                title: params.title,
                description: params.description,
                start_time,
                end_time,
                join_deadline,
                voting_enabled: params.voting_enabled,
            })
            .await
            .map_err(|e| {
                // Lost a creation race: another task inserted the row first.
                if let sqlx::Error::Database(db) = &e
                    && db.is_unique_violation()
                {
                    return ClubError::SessionAlreadyRunning;
                }
                ClubError::DurableWrite(e)
            })?;

        self.registry.insert(SessionState {
            guild_id: guild_id.to_string(),
            title: params.title.to_string(),
            description: params.description.to_string(),
            start_time,
            end_time,
            join_deadline: Some(join_deadline),
            poll_deadline: None,
            voting_enabled: params.voting_enabled,
            members: Default::default(),
            declined: Default::default(),
            suggestions: Vec::new(),
            end_vote: None,
            poll: None,
            message_ref: None,
            closed: false,
        });

        info!(%guild_id, title = %params.title, %start_time, %end_time, "reading session created");
        self.emit(ClubEvent::SessionCreated {
            guild_id: guild_id.to_string(),
            title: params.title.to_string(),
            start_time,
            end_time,
            join_deadline,
        });

        Ok(SessionHandle {
            guild_id: guild_id.to_string(),
            title: params.title.to_string(),
            start_time,
            end_time,
            join_deadline,
        })
    }

    // ── Membership ──────────────────────────────────────────────────

    /// Opt a user in. Idempotent: re-joining an existing member succeeds
    /// without another durable write.
    pub async fn join(&self, guild_id: &str, user_id: &str) -> Result<(), ClubError> {
        let handle = self.session(guild_id).await?;
        let mut session = handle.lock().await;
        self.ensure_join_window(&session)?;

        if session.is_member(user_id) {
            return Ok(());
        }

        self.repo.record_membership(guild_id, user_id, true).await?;
        session.add_member(user_id);

        info!(%guild_id, %user_id, "member joined reading session");
        self.emit(ClubEvent::MemberJoined {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    /// Opt a user out, dropping any ballots they held. Idempotent.
    pub async fn leave(&self, guild_id: &str, user_id: &str) -> Result<(), ClubError> {
        let handle = self.session(guild_id).await?;
        let mut session = handle.lock().await;
        self.ensure_join_window(&session)?;

        if session.declined.contains(user_id) {
            return Ok(());
        }

        self.repo.record_membership(guild_id, user_id, false).await?;
        session.remove_member(user_id);

        info!(%guild_id, %user_id, "member left reading session");
        self.emit(ClubEvent::MemberLeft {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    // ── Suggestions ─────────────────────────────────────────────────

    /// Record a book suggestion. Returns the tally for the normalized title
    /// after this call. The same title from another member accumulates; a
    /// repeat from the same member changes nothing.
    pub async fn suggest(
        &self,
        guild_id: &str,
        user_id: &str,
        raw_title: &str,
    ) -> Result<u32, ClubError> {
        validation::validate_title(raw_title).map_err(ClubError::Validation)?;
        let normalized = validation::normalize_title(raw_title);

        let handle = self.session(guild_id).await?;
        let mut session = handle.lock().await;
        self.ensure_join_window(&session)?;
        if !session.is_member(user_id) {
            return Err(ClubError::NotAMember);
        }

        self.repo
            .record_suggestion(guild_id, &normalized, user_id)
            .await?;
        let count = session.record_suggestion(&normalized, user_id);

        info!(%guild_id, %user_id, title = %normalized, count, "suggestion recorded");
        self.emit(ClubEvent::SuggestionAdded {
            guild_id: guild_id.to_string(),
            title: normalized,
            count,
        });
        Ok(count)
    }

    // ── Early-termination vote ──────────────────────────────────────

    /// Open an early-end vote with a fresh ballot set. Rejected while one
    /// is already running.
    pub async fn initiate_end_vote(&self, guild_id: &str) -> Result<(), ClubError> {
        let handle = self.session(guild_id).await?;
        let mut session = handle.lock().await;
        if session.closed {
            return Err(ClubError::NoActiveSession);
        }
        if session.end_vote.is_some() {
            return Err(ClubError::VoteAlreadyRunning);
        }

        session.end_vote = Some(EndVote::new());
        info!(%guild_id, "early-end vote opened");
        self.emit(ClubEvent::EndVoteStarted {
            guild_id: guild_id.to_string(),
        });
        Ok(())
    }

    /// Record a yes-ballot. One ballot per member; quorum is a strict
    /// majority of the member count at the moment of the check. Both counts
    /// are read under the per-guild lock, so one call sees one consistent
    /// snapshot. Quorum closes the session immediately, calendar deadlines
    /// notwithstanding.
    pub async fn cast_end_vote(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<EndVoteStatus, ClubError> {
        let handle = self.session(guild_id).await?;
        let mut session = handle.lock().await;
        if session.closed {
            return Err(ClubError::NoActiveSession);
        }
        if !session.is_member(user_id) {
            return Err(ClubError::NotAMember);
        }

        let member_count = session.members.len();
        let Some(vote) = session.end_vote.as_mut() else {
            return Err(ClubError::NoActiveVote);
        };
        vote.cast(user_id);
        let ballots_cast = vote.ballots_cast();
        let passed = vote.passes(member_count);

        info!(%guild_id, %user_id, ballots_cast, member_count, passed, "end-vote ballot recorded");
        if passed {
            self.close(&mut session, true).await?;
        }

        Ok(EndVoteStatus {
            ballots_cast,
            member_count,
            passed,
        })
    }

    // ── Selection poll ──────────────────────────────────────────────

    /// Cast or change a ballot in the running selection poll. The last
    /// submission per member counts.
    pub async fn cast_selection_vote(
        &self,
        guild_id: &str,
        user_id: &str,
        title: &str,
    ) -> Result<(), ClubError> {
        let handle = self.session(guild_id).await?;
        let mut session = handle.lock().await;
        if session.closed {
            return Err(ClubError::NoActiveSession);
        }
        let now = self.clock.now();
        if session.phase() != Phase::Selecting
            || !matches!(session.poll_deadline, Some(d) if now <= d)
        {
            return Err(ClubError::PhaseClosed);
        }
        if !session.is_member(user_id) {
            return Err(ClubError::NotAMember);
        }

        let normalized = validation::normalize_title(title);
        let Some(poll) = session.poll.as_mut() else {
            return Err(ClubError::NoActiveVote);
        };
        if !poll.cast(user_id, &normalized) {
            return Err(ClubError::Validation(format!(
                "'{normalized}' is not on the ballot"
            )));
        }

        info!(%guild_id, %user_id, title = %normalized, "selection ballot recorded");
        Ok(())
    }

    // ── Chat-layer bookkeeping ──────────────────────────────────────

    /// Remember the chat-layer message that renders this session, so later
    /// announcements can reference it.
    pub async fn set_message_ref(&self, guild_id: &str, message_ref: &str) -> Result<(), ClubError> {
        let handle = self.session(guild_id).await?;
        let mut session = handle.lock().await;
        if session.closed {
            return Err(ClubError::NoActiveSession);
        }
        session.message_ref = Some(message_ref.to_string());
        Ok(())
    }

    // ── Phase transitions ───────────────────────────────────────────

    /// Drive the transition belonging to one deadline field, whether called
    /// from a member action or the sweep. Idempotent: a deadline that was
    /// already cleared (rather than re-computed from the clock) reports
    /// `AlreadyAdvanced`.
    pub async fn advance(
        &self,
        guild_id: &str,
        field: DeadlineField,
    ) -> Result<AdvanceOutcome, ClubError> {
        let Some(handle) = self.registry.get_or_load(&self.repo, guild_id).await? else {
            return Ok(AdvanceOutcome::AlreadyAdvanced);
        };
        let mut session = handle.lock().await;
        if session.closed {
            return Ok(AdvanceOutcome::AlreadyAdvanced);
        }
        let now = self.clock.now();

        match field {
            DeadlineField::Join => {
                let Some(deadline) = session.join_deadline else {
                    return Ok(AdvanceOutcome::AlreadyAdvanced);
                };
                if now < deadline {
                    return Ok(AdvanceOutcome::NotDue);
                }
                if session.voting_enabled && !session.suggestions.is_empty() {
                    self.open_poll(guild_id, &mut session, now).await
                } else {
                    self.start_active(guild_id, &mut session, None).await
                }
            }
            DeadlineField::Poll => {
                let Some(deadline) = session.poll_deadline else {
                    return Ok(AdvanceOutcome::AlreadyAdvanced);
                };
                if now < deadline {
                    return Ok(AdvanceOutcome::NotDue);
                }
                let winner = session.poll.as_ref().and_then(|p| p.winner());
                self.start_active(guild_id, &mut session, winner).await
            }
            DeadlineField::End => {
                if session.join_deadline.is_some() || session.poll_deadline.is_some() {
                    return Ok(AdvanceOutcome::NotDue);
                }
                if now < session.end_time {
                    return Ok(AdvanceOutcome::NotDue);
                }
                self.close(&mut session, false).await?;
                Ok(AdvanceOutcome::Closed)
            }
        }
    }

    /// Joining -> Selecting: fix the poll deadline, build the candidate
    /// list from the suggestions, announce.
    async fn open_poll(
        &self,
        guild_id: &str,
        session: &mut SessionState,
        now: DateTime<Utc>,
    ) -> Result<AdvanceOutcome, ClubError> {
        let poll_deadline = now + Duration::hours(validation::SELECTION_POLL_WINDOW_HOURS);
        self.repo.open_poll(guild_id, poll_deadline).await?;

        session.join_deadline = None;
        session.poll_deadline = Some(poll_deadline);
        let candidates = session.suggestion_titles();
        session.poll = Some(SelectionPoll::new(candidates.clone()));

        info!(%guild_id, candidates = candidates.len(), %poll_deadline, "join window closed, selection poll opened");
        self.emit(ClubEvent::PollOpened {
            guild_id: guild_id.to_string(),
            candidates: candidates.clone(),
            poll_deadline,
        });
        Ok(AdvanceOutcome::PollOpened(candidates))
    }

    /// Joining/Selecting -> Active: clear the deadline and suggestion
    /// state, keep the session row, announce the winner when a poll ran.
    async fn start_active(
        &self,
        guild_id: &str,
        session: &mut SessionState,
        winner: Option<String>,
    ) -> Result<AdvanceOutcome, ClubError> {
        self.repo.begin_active(guild_id).await?;

        session.join_deadline = None;
        session.poll_deadline = None;
        session.poll = None;
        session.suggestions.clear();

        info!(%guild_id, selection = ?winner, "reading session active");
        self.emit(ClubEvent::SessionStarted {
            guild_id: guild_id.to_string(),
            selection: winner.clone(),
        });
        Ok(AdvanceOutcome::Started(winner))
    }

    /// Remove the session everywhere and announce the closure. The durable
    /// delete commits before the in-memory teardown.
    async fn close(&self, session: &mut SessionState, early: bool) -> Result<(), ClubError> {
        self.repo.delete(&session.guild_id).await?;

        session.closed = true;
        session.end_vote = None;
        session.poll = None;
        self.registry.remove(&session.guild_id);

        info!(guild_id = %session.guild_id, early, "reading session closed");
        self.emit(ClubEvent::SessionClosed {
            guild_id: session.guild_id.clone(),
            early,
        });
        Ok(())
    }
}

//! Turns a freely-typed text buffer into a rate-limited, deduplicated stream
//! of analysis requests.
//!
//! The controller is a synchronous state machine. It never touches timers or
//! the network itself: every transition returns the [`TimerCommand`]s the
//! session must apply, and submissions are handed back as [`Submission`]
//! values that only take effect once the session confirms the send with
//! [`SubmissionController::mark_sent`].
//!
//! ```text
//! Idle -> Debouncing -> Sent -> (Completed | TimedOut) -> Idle
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::api::ParagraphFrame;
use crate::core::store::{ConnectionState, Manuscript};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);
pub const DEFAULT_FALLBACK: Duration = Duration::from_secs(10);

/// Identity of one sent submission. Monotonic for the controller's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub(crate) u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionTiming {
    pub debounce: Duration,
    pub fallback: Duration,
}

impl Default for SubmissionTiming {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            fallback: DEFAULT_FALLBACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Idle,
    Debouncing,
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Completed,
    TimedOut,
    /// The reply could not be parsed.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The debounce this call belonged to was superseded or cancelled.
    Superseded,
    Empty,
    InFlight,
    Offline,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    ArmDebounce(Duration),
    CancelDebounce,
    ArmFallback(SubmissionId, Duration),
    CancelFallback(SubmissionId),
}

/// A submission that passed every guard and is ready to transmit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: SubmissionId,
    pub frame: ParagraphFrame,
    fingerprint: String,
}

/// How an inbound extraction result relates to what was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    /// Oldest outstanding submission on this connection, if any.
    pub submission: Option<SubmissionId>,
    /// True when that submission was the one in flight.
    pub completed: bool,
    pub commands: Vec<TimerCommand>,
}

pub struct SubmissionController {
    timing: SubmissionTiming,
    debounce_pending: bool,
    in_flight: Option<SubmissionId>,
    /// Sent on the current connection and not yet answered, oldest first.
    outstanding: VecDeque<SubmissionId>,
    last_sent: Option<String>,
    edited_in_flight: bool,
    next_id: u64,
    last_outcome: Option<(SubmissionId, SubmissionOutcome)>,
}

impl SubmissionController {
    pub fn new(timing: SubmissionTiming) -> Self {
        Self {
            timing,
            debounce_pending: false,
            in_flight: None,
            outstanding: VecDeque::new(),
            last_sent: None,
            edited_in_flight: false,
            next_id: 0,
            last_outcome: None,
        }
    }

    pub fn timing(&self) -> SubmissionTiming {
        self.timing
    }

    pub fn phase(&self) -> SubmissionPhase {
        if self.in_flight.is_some() {
            SubmissionPhase::Sent
        } else if self.debounce_pending {
            SubmissionPhase::Debouncing
        } else {
            SubmissionPhase::Idle
        }
    }

    pub fn in_flight(&self) -> Option<SubmissionId> {
        self.in_flight
    }

    pub fn last_outcome(&self) -> Option<(SubmissionId, SubmissionOutcome)> {
        self.last_outcome
    }

    /// Every edit restarts the debounce window; last edit wins.
    pub fn content_changed(&mut self) -> Vec<TimerCommand> {
        if self.in_flight.is_some() {
            self.edited_in_flight = true;
        }
        self.debounce_pending = true;
        vec![TimerCommand::ArmDebounce(self.timing.debounce)]
    }

    /// The debounce window closed without further edits.
    pub fn debounce_elapsed(
        &mut self,
        manuscript: &Manuscript,
        connection: ConnectionState,
    ) -> Result<Submission, SkipReason> {
        if !self.debounce_pending {
            return Err(SkipReason::Superseded);
        }
        self.debounce_pending = false;
        self.prepare(manuscript, connection, true)
    }

    /// Explicit user request to analyze now. Same guards as the debounced
    /// path except deduplication.
    pub fn analyze_now(
        &mut self,
        manuscript: &Manuscript,
        connection: ConnectionState,
    ) -> Result<Submission, SkipReason> {
        self.prepare(manuscript, connection, false)
    }

    /// Record that `submission` was handed to the connection.
    pub fn mark_sent(&mut self, submission: Submission) -> Vec<TimerCommand> {
        let Submission {
            id, fingerprint, ..
        } = submission;

        let mut commands = Vec::with_capacity(2);
        if std::mem::take(&mut self.debounce_pending) {
            commands.push(TimerCommand::CancelDebounce);
        }
        self.in_flight = Some(id);
        self.outstanding.push_back(id);
        self.last_sent = Some(fingerprint);
        self.edited_in_flight = false;
        commands.push(TimerCommand::ArmFallback(id, self.timing.fallback));
        commands
    }

    /// An extraction result arrived.
    pub fn response_received(&mut self) -> Attribution {
        match self.outstanding.pop_front() {
            Some(id) if self.in_flight == Some(id) => Attribution {
                submission: Some(id),
                completed: true,
                commands: self.finish(id, SubmissionOutcome::Completed),
            },
            other => Attribution {
                submission: other,
                completed: false,
                commands: Vec::new(),
            },
        }
    }

    /// The fallback timer of `id` expired. Returns `None` when `id` is no
    /// longer the submission in flight.
    pub fn fallback_elapsed(&mut self, id: SubmissionId) -> Option<Vec<TimerCommand>> {
        if self.in_flight != Some(id) {
            return None;
        }
        Some(self.finish(id, SubmissionOutcome::TimedOut))
    }

    /// A reply could not be parsed. Whatever was in flight is abandoned.
    pub fn malformed_received(&mut self) -> Vec<TimerCommand> {
        self.outstanding.pop_front();
        match self.in_flight {
            Some(id) => {
                self.outstanding.retain(|pending| *pending != id);
                self.finish(id, SubmissionOutcome::Failed)
            }
            None => Vec::new(),
        }
    }

    /// Replies to anything sent on a dropped connection will never arrive.
    pub fn connection_lost(&mut self) {
        self.outstanding.clear();
    }

    /// Forget everything about the current manuscript. Identities keep
    /// increasing so timers armed before the reset can never match.
    pub fn reset(&mut self) {
        self.debounce_pending = false;
        self.in_flight = None;
        self.outstanding.clear();
        self.last_sent = None;
        self.edited_in_flight = false;
        self.last_outcome = None;
    }

    fn prepare(
        &mut self,
        manuscript: &Manuscript,
        connection: ConnectionState,
        dedup: bool,
    ) -> Result<Submission, SkipReason> {
        let trimmed = manuscript.content.trim();
        if trimmed.is_empty() {
            return Err(SkipReason::Empty);
        }
        if self.in_flight.is_some() {
            return Err(SkipReason::InFlight);
        }
        if !connection.is_connected() {
            return Err(SkipReason::Offline);
        }
        if dedup && self.last_sent.as_deref() == Some(trimmed) {
            return Err(SkipReason::Duplicate);
        }

        self.next_id += 1;
        Ok(Submission {
            id: SubmissionId(self.next_id),
            frame: ParagraphFrame {
                text: manuscript.content.clone(),
                chapter: manuscript.chapter,
                paragraph: manuscript.paragraph,
            },
            fingerprint: trimmed.to_string(),
        })
    }

    fn finish(&mut self, id: SubmissionId, outcome: SubmissionOutcome) -> Vec<TimerCommand> {
        self.in_flight = None;
        self.last_outcome = Some((id, outcome));

        let mut commands = Vec::with_capacity(2);
        if outcome != SubmissionOutcome::TimedOut {
            commands.push(TimerCommand::CancelFallback(id));
        }
        // Edits made while waiting still need an analysis pass.
        if std::mem::take(&mut self.edited_in_flight) {
            self.debounce_pending = true;
            commands.push(TimerCommand::ArmDebounce(self.timing.debounce));
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTED: ConnectionState = ConnectionState::Connected;

    fn manuscript(content: &str) -> Manuscript {
        Manuscript {
            content: content.to_string(),
            chapter: 2,
            paragraph: 5,
            ..Manuscript::new("m-1", "Draft")
        }
    }

    fn controller() -> SubmissionController {
        SubmissionController::new(SubmissionTiming::default())
    }

    fn send(controller: &mut SubmissionController, content: &str) -> SubmissionId {
        controller.content_changed();
        let submission = controller
            .debounce_elapsed(&manuscript(content), CONNECTED)
            .expect("submission");
        let id = submission.id;
        controller.mark_sent(submission);
        id
    }

    #[test]
    fn edit_arms_debounce() {
        let mut controller = controller();
        assert_eq!(controller.phase(), SubmissionPhase::Idle);

        let commands = controller.content_changed();

        assert_eq!(commands, vec![TimerCommand::ArmDebounce(DEFAULT_DEBOUNCE)]);
        assert_eq!(controller.phase(), SubmissionPhase::Debouncing);
    }

    #[test]
    fn debounce_builds_frame_and_send_arms_fallback() {
        let mut controller = controller();
        controller.content_changed();

        let submission = controller
            .debounce_elapsed(&manuscript("  Ann lit a match.  "), CONNECTED)
            .expect("submission");
        assert_eq!(
            submission.frame,
            ParagraphFrame {
                text: "  Ann lit a match.  ".into(),
                chapter: 2,
                paragraph: 5,
            }
        );

        let id = submission.id;
        let commands = controller.mark_sent(submission);
        assert_eq!(
            commands,
            vec![TimerCommand::ArmFallback(id, DEFAULT_FALLBACK)]
        );
        assert_eq!(controller.phase(), SubmissionPhase::Sent);
        assert_eq!(controller.in_flight(), Some(id));
    }

    #[test]
    fn guards_skip_empty_offline_and_in_flight() {
        let mut controller = controller();

        controller.content_changed();
        assert_eq!(
            controller.debounce_elapsed(&manuscript(" \n\t "), CONNECTED),
            Err(SkipReason::Empty)
        );

        controller.content_changed();
        assert_eq!(
            controller.debounce_elapsed(&manuscript("Snow."), ConnectionState::Connecting),
            Err(SkipReason::Offline)
        );

        send(&mut controller, "Snow.");
        controller.content_changed();
        assert_eq!(
            controller.debounce_elapsed(&manuscript("Snow fell."), CONNECTED),
            Err(SkipReason::InFlight)
        );
    }

    #[test]
    fn stale_debounce_is_ignored() {
        let mut controller = controller();
        assert_eq!(
            controller.debounce_elapsed(&manuscript("Snow."), CONNECTED),
            Err(SkipReason::Superseded)
        );
    }

    #[test]
    fn identical_trimmed_text_is_sent_once() {
        let mut controller = controller();
        let id = send(&mut controller, "Ann lit a match.");
        controller.response_received();
        assert_eq!(controller.last_outcome(), Some((id, SubmissionOutcome::Completed)));

        controller.content_changed();
        assert_eq!(
            controller.debounce_elapsed(&manuscript("Ann lit a match.   "), CONNECTED),
            Err(SkipReason::Duplicate)
        );
        assert_eq!(controller.phase(), SubmissionPhase::Idle);
    }

    #[test]
    fn analyze_now_bypasses_dedup_but_not_guards() {
        let mut controller = controller();
        send(&mut controller, "Ann lit a match.");
        assert_eq!(
            controller.analyze_now(&manuscript("Ann lit a match."), CONNECTED),
            Err(SkipReason::InFlight)
        );

        controller.response_received();
        let submission = controller
            .analyze_now(&manuscript("Ann lit a match."), CONNECTED)
            .expect("explicit resend");
        assert_eq!(submission.frame.text, "Ann lit a match.");
    }

    #[test]
    fn analyze_now_cancels_pending_debounce_once_sent() {
        let mut controller = controller();
        controller.content_changed();

        let submission = controller
            .analyze_now(&manuscript("Ann."), CONNECTED)
            .expect("submission");
        let id = submission.id;
        let commands = controller.mark_sent(submission);

        assert_eq!(
            commands,
            vec![
                TimerCommand::CancelDebounce,
                TimerCommand::ArmFallback(id, DEFAULT_FALLBACK)
            ]
        );
    }

    #[test]
    fn response_completes_in_flight_submission() {
        let mut controller = controller();
        let id = send(&mut controller, "Ann.");

        let attribution = controller.response_received();

        assert_eq!(
            attribution,
            Attribution {
                submission: Some(id),
                completed: true,
                commands: vec![TimerCommand::CancelFallback(id)],
            }
        );
        assert_eq!(controller.phase(), SubmissionPhase::Idle);
    }

    #[test]
    fn fallback_times_out_and_late_reply_does_not_complete_newer_submission() {
        let mut controller = controller();
        let first = send(&mut controller, "Ann.");

        let commands = controller.fallback_elapsed(first).expect("in flight");
        assert!(commands.is_empty());
        assert_eq!(controller.last_outcome(), Some((first, SubmissionOutcome::TimedOut)));
        assert_eq!(controller.phase(), SubmissionPhase::Idle);

        let second = send(&mut controller, "Ann and Bob.");

        let late = controller.response_received();
        assert_eq!(late.submission, Some(first));
        assert!(!late.completed);
        assert!(late.commands.is_empty());
        assert_eq!(controller.in_flight(), Some(second));

        let fresh = controller.response_received();
        assert_eq!(fresh.submission, Some(second));
        assert!(fresh.completed);
    }

    #[test]
    fn stale_fallback_does_not_touch_newer_submission() {
        let mut controller = controller();
        let first = send(&mut controller, "Ann.");
        controller.response_received();
        let second = send(&mut controller, "Ann and Bob.");

        assert_eq!(controller.fallback_elapsed(first), None);
        assert_eq!(controller.in_flight(), Some(second));
    }

    #[test]
    fn edits_during_flight_rearm_debounce_on_completion() {
        let mut controller = controller();
        let id = send(&mut controller, "Ann.");
        controller.content_changed();
        controller.debounce_elapsed(&manuscript("Ann and Bob."), CONNECTED).ok();

        let attribution = controller.response_received();

        assert_eq!(
            attribution.commands,
            vec![
                TimerCommand::CancelFallback(id),
                TimerCommand::ArmDebounce(DEFAULT_DEBOUNCE)
            ]
        );
        assert_eq!(controller.phase(), SubmissionPhase::Debouncing);
    }

    #[test]
    fn edits_during_flight_rearm_debounce_on_timeout() {
        let mut controller = controller();
        let id = send(&mut controller, "Ann.");
        controller.content_changed();

        let commands = controller.fallback_elapsed(id).expect("in flight");

        assert_eq!(commands, vec![TimerCommand::ArmDebounce(DEFAULT_DEBOUNCE)]);
    }

    #[test]
    fn malformed_reply_abandons_in_flight_submission() {
        let mut controller = controller();
        let id = send(&mut controller, "Ann.");

        let commands = controller.malformed_received();

        assert_eq!(commands, vec![TimerCommand::CancelFallback(id)]);
        assert_eq!(controller.last_outcome(), Some((id, SubmissionOutcome::Failed)));
        assert_eq!(controller.phase(), SubmissionPhase::Idle);
        assert_eq!(controller.response_received().submission, None);
    }

    #[test]
    fn connection_loss_forgets_outstanding_replies() {
        let mut controller = controller();
        let first = send(&mut controller, "Ann.");
        controller.fallback_elapsed(first);
        controller.connection_lost();

        let attribution = controller.response_received();

        assert_eq!(attribution.submission, None);
        assert!(!attribution.completed);
    }

    #[test]
    fn reset_clears_dedup_memory_but_keeps_ids_increasing() {
        let mut controller = controller();
        let first = send(&mut controller, "Ann.");
        controller.reset();
        assert_eq!(controller.phase(), SubmissionPhase::Idle);

        let second = send(&mut controller, "Ann.");
        assert!(second > first);
    }
}

//! Composer readiness state machine.
//!
//! Decides whether the input surface may accept a send. Pure and
//! synchronous: [`transition`] maps a composer and an action to the next
//! composer with no I/O.

/// Where the composer currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComposerState {
    /// Nothing entered.
    #[default]
    Idle,
    /// Text entered.
    Typing,
    /// Only attachments entered.
    AttachmentsReady,
    /// Dictation in progress.
    Listening,
    /// Request sent, waiting for the reply to start.
    Sending,
    /// Reply arriving.
    Responding,
    /// Last operation failed.
    Error,
}

/// Transition messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerAction {
    /// Input flags changed.
    SetInputs {
        /// Text field is non-empty.
        has_text: bool,
        /// At least one attachment is staged.
        has_attachments: bool,
    },
    /// Dictation started.
    StartListening,
    /// Dictation stopped.
    StopListening,
    /// Send dispatched.
    StartSending,
    /// Server began replying.
    StartResponding,
    /// Something failed.
    SetError(String),
    /// Operation finished; clear everything.
    Reset,
}

/// Composer state plus the input flags it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Composer {
    /// Current state.
    pub state: ComposerState,
    /// Text field is non-empty.
    pub has_text: bool,
    /// At least one attachment is staged.
    pub has_attachments: bool,
    /// Message from the last `SetError`.
    pub error: Option<String>,
}

impl Composer {
    /// Create an idle composer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an action in place.
    pub fn dispatch(&mut self, action: ComposerAction) {
        *self = transition(self, action);
    }

    /// Whether a send may proceed right now.
    #[must_use]
    pub fn can_send(&self) -> bool {
        (self.has_text || self.has_attachments) && !self.is_busy()
    }

    /// Whether an operation is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            ComposerState::Sending | ComposerState::Responding | ComposerState::Listening
        )
    }

    fn resting_state(&self) -> ComposerState {
        if self.has_text {
            ComposerState::Typing
        } else if self.has_attachments {
            ComposerState::AttachmentsReady
        } else {
            ComposerState::Idle
        }
    }
}

/// Pure transition function.
#[must_use]
pub fn transition(current: &Composer, action: ComposerAction) -> Composer {
    let mut next = current.clone();
    match action {
        ComposerAction::SetInputs {
            has_text,
            has_attachments,
        } => {
            next.has_text = has_text;
            next.has_attachments = has_attachments;
            // In-flight operations keep their state; only the flags move.
            if !current.is_busy() {
                next.state = next.resting_state();
                next.error = None;
            }
        }
        ComposerAction::StartListening => {
            next.state = ComposerState::Listening;
            next.error = None;
        }
        ComposerAction::StopListening => {
            next.state = next.resting_state();
        }
        ComposerAction::StartSending => {
            next.state = ComposerState::Sending;
            next.error = None;
        }
        ComposerAction::StartResponding => {
            next.state = ComposerState::Responding;
        }
        ComposerAction::SetError(message) => {
            next.state = ComposerState::Error;
            next.error = Some(message);
        }
        ComposerAction::Reset => {
            next = Composer::new();
        }
    }
    next
}

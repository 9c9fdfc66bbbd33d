use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{JobApplication, JobApplicationState, JobApplicationTransitionLog};
use crate::users::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Process,
    Postpone,
    Accept,
    Refuse,
    RenderObsolete,
    Cancel,
}

impl Transition {
    pub const ALL: [Transition; 6] = [
        Self::Process,
        Self::Postpone,
        Self::Accept,
        Self::Refuse,
        Self::RenderObsolete,
        Self::Cancel,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Postpone => "postpone",
            Self::Accept => "accept",
            Self::Refuse => "refuse",
            Self::RenderObsolete => "render_obsolete",
            Self::Cancel => "cancel",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Process => "Étudier la candidature",
            Self::Postpone => "Reporter la candidature",
            Self::Accept => "Accepter l'embauche",
            Self::Refuse => "Décliner la candidature",
            Self::RenderObsolete => "Rendre obsolete la candidature",
            Self::Cancel => "Annuler l'embauche",
        }
    }

    pub const fn sources(self) -> &'static [JobApplicationState] {
        use JobApplicationState::*;
        match self {
            Self::Process => &[New],
            Self::Postpone => &[Processing],
            Self::Accept | Self::Refuse => &[Processing, Postponed],
            Self::RenderObsolete => &[New, Processing, Postponed],
            Self::Cancel => &[Accepted],
        }
    }

    pub const fn target(self) -> JobApplicationState {
        match self {
            Self::Process => JobApplicationState::Processing,
            Self::Postpone => JobApplicationState::Postponed,
            Self::Accept => JobApplicationState::Accepted,
            Self::Refuse => JobApplicationState::Refused,
            Self::RenderObsolete => JobApplicationState::Obsolete,
            Self::Cancel => JobApplicationState::Cancelled,
        }
    }

    pub fn is_allowed_from(self, state: JobApplicationState) -> bool {
        self.sources().contains(&state)
    }
}

/// Transitions that can be fired from `state`.
pub fn available_transitions(state: JobApplicationState) -> Vec<Transition> {
    Transition::ALL
        .into_iter()
        .filter(|transition| transition.is_allowed_from(state))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("transition `{}` is not allowed from state `{from}`", transition.name())]
    NotAllowed {
        transition: Transition,
        from: JobApplicationState,
    },
    #[error("the hiring can no longer be cancelled (deadline was {deadline})")]
    CancellationWindowClosed { deadline: chrono::NaiveDate },
}

/// Fire `transition` on `application` and return the audit record.
///
/// The application is left untouched when the transition is not allowed.
pub fn apply(
    application: &mut JobApplication,
    transition: Transition,
    user: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<JobApplicationTransitionLog, TransitionError> {
    let from = application.state;
    if !transition.is_allowed_from(from) {
        return Err(TransitionError::NotAllowed { transition, from });
    }

    application.state = transition.target();
    application.updated_at = now;

    Ok(JobApplicationTransitionLog {
        job_application_id: application.id,
        transition: transition.name().to_string(),
        from_state: from,
        to_state: application.state,
        user,
        timestamp: now,
    })
}

//! Trigger events and the trigger evaluator.
//!
//! A run starts when the repository emits a release event whose action is one
//! of the configured actions, or when an operator dispatches the pipeline
//! manually. Any other event starts zero jobs.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// The action attached to a release event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseAction {
    Prereleased,
    Released,
    /// Any other release subtype (created, edited, deleted, ...).
    Other(String),
}

impl ReleaseAction {
    pub fn as_str(&self) -> &str {
        match self {
            ReleaseAction::Prereleased => "prereleased",
            ReleaseAction::Released => "released",
            ReleaseAction::Other(s) => s,
        }
    }
}

impl From<&str> for ReleaseAction {
    fn from(s: &str) -> Self {
        match s {
            "prereleased" => ReleaseAction::Prereleased,
            "released" => ReleaseAction::Released,
            other => ReleaseAction::Other(other.to_string()),
        }
    }
}

/// An event delivered to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerEvent {
    /// A repository release event with its action.
    Release { action: ReleaseAction },
    /// Explicit manual invocation. Accepts no parameters.
    Dispatch,
}

impl TriggerEvent {
    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            TriggerEvent::Release { action } => format!("release:{}", action.as_str()),
            TriggerEvent::Dispatch => "dispatch".to_string(),
        }
    }
}

impl FromStr for TriggerEvent {
    type Err = Error;

    /// Parse an event from its CLI form: `dispatch` or `release:<action>`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "dispatch" {
            return Ok(TriggerEvent::Dispatch);
        }
        if let Some(action) = s.strip_prefix("release:") {
            if action.is_empty() {
                return Err(Error::InvalidInput(
                    "release event requires an action, e.g. release:released".to_string(),
                ));
            }
            return Ok(TriggerEvent::Release {
                action: ReleaseAction::from(action),
            });
        }
        Err(Error::InvalidInput(format!(
            "unknown event '{}'; expected 'dispatch' or 'release:<action>'",
            s
        )))
    }
}

/// What can start a run, as configured in the pipeline file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    /// Release events with one of the listed actions.
    Release { actions: Vec<ReleaseAction> },
    /// Manual dispatch.
    Dispatch,
}

impl Trigger {
    /// Whether this trigger matches the given event.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        match (self, event) {
            (Trigger::Release { actions }, TriggerEvent::Release { action }) => {
                actions.contains(action)
            }
            (Trigger::Dispatch, TriggerEvent::Dispatch) => true,
            _ => false,
        }
    }
}

/// Decide whether an event starts a run against the configured triggers.
pub fn evaluate(event: &TriggerEvent, triggers: &[Trigger]) -> bool {
    triggers.iter().any(|t| t.matches(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release_trigger() -> Trigger {
        Trigger::Release {
            actions: vec![ReleaseAction::Prereleased, ReleaseAction::Released],
        }
    }

    #[test]
    fn test_released_event_starts_run() {
        let triggers = vec![release_trigger(), Trigger::Dispatch];
        let event = TriggerEvent::Release {
            action: ReleaseAction::Released,
        };
        assert!(evaluate(&event, &triggers));
    }

    #[test]
    fn test_prereleased_event_starts_run() {
        let triggers = vec![release_trigger()];
        let event = TriggerEvent::Release {
            action: ReleaseAction::Prereleased,
        };
        assert!(evaluate(&event, &triggers));
    }

    #[test]
    fn test_other_release_action_starts_nothing() {
        let triggers = vec![release_trigger(), Trigger::Dispatch];
        let event = TriggerEvent::Release {
            action: ReleaseAction::Other("created".to_string()),
        };
        assert!(!evaluate(&event, &triggers));
    }

    #[test]
    fn test_dispatch_without_trigger_starts_nothing() {
        let triggers = vec![release_trigger()];
        assert!(!evaluate(&TriggerEvent::Dispatch, &triggers));
    }

    #[test]
    fn test_dispatch_with_trigger_starts_run() {
        let triggers = vec![Trigger::Dispatch];
        assert!(evaluate(&TriggerEvent::Dispatch, &triggers));
    }

    #[test]
    fn test_parse_dispatch_event() {
        let event: TriggerEvent = "dispatch".parse().unwrap();
        assert_eq!(event, TriggerEvent::Dispatch);
    }

    #[test]
    fn test_parse_release_event() {
        let event: TriggerEvent = "release:released".parse().unwrap();
        assert_eq!(
            event,
            TriggerEvent::Release {
                action: ReleaseAction::Released
            }
        );
    }

    #[test]
    fn test_parse_unknown_release_action() {
        let event: TriggerEvent = "release:created".parse().unwrap();
        assert_eq!(
            event,
            TriggerEvent::Release {
                action: ReleaseAction::Other("created".to_string())
            }
        );
    }

    #[test]
    fn test_parse_malformed_event_rejected() {
        assert!("push".parse::<TriggerEvent>().is_err());
        assert!("release:".parse::<TriggerEvent>().is_err());
    }
}

//! Evidence fusion.
//!
//! One evaluation pass takes the previous connectivity and a batch of
//! evidence and applies a fixed precedence, highest first:
//!
//! | signal               | effect                                                          |
//! |----------------------|-----------------------------------------------------------------|
//! | `Active`             | connected; fatal detail cleared; permission warning kept        |
//! | `PermissionWarning`  | never downgrades; if not yet connected, connected with warning  |
//! | `Connected`          | connected if not already                                        |
//! | `FatalError`         | disconnected with the offending line (only if no `Active`)      |
//! | nothing              | unchanged                                                       |
//!
//! A fatal line overrides `PermissionWarning` and `Connected` in the same
//! batch unless one of those comes after it (the connector recovered).
//! Silence never disconnects. Only explicit fatal evidence does.

use serde::Serialize;

use crate::classify::{Evidence, EvidenceSource, Signal};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    pub connected: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Channel that produced the current verdict; `None` until some log-based
    /// evidence has decided anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<EvidenceSource>,
}

impl Connectivity {
    pub fn unknown(detail: impl Into<String>) -> Self {
        Self {
            connected: false,
            detail: detail.into(),
            warning: None,
            source: None,
        }
    }

    pub fn has_verdict(&self) -> bool {
        self.source.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionOutcome {
    pub connectivity: Connectivity,
    /// Signal that decided this pass, `None` when the batch carried nothing.
    pub decided_by: Option<Signal>,
}

impl FusionOutcome {
    pub fn changed_from(&self, prior: &Connectivity) -> bool {
        &self.connectivity != prior
    }
}

fn first(batch: &[Evidence], signal: Signal) -> Option<&Evidence> {
    batch.iter().find(|e| e.signal == signal)
}

fn last(batch: &[Evidence], signal: Signal) -> Option<&Evidence> {
    batch.iter().rev().find(|e| e.signal == signal)
}

/// Last fatal line, unless a later line shows the connector reaching the
/// platform again.
fn standing_fatal(batch: &[Evidence]) -> Option<&Evidence> {
    let at = batch.iter().rposition(|e| e.signal == Signal::FatalError)?;
    let recovered = batch[at + 1..]
        .iter()
        .any(|e| matches!(e.signal, Signal::Connected | Signal::PermissionWarning));
    if recovered {
        None
    } else {
        Some(&batch[at])
    }
}

pub fn fuse(prior: &Connectivity, batch: &[Evidence]) -> FusionOutcome {
    if let Some(e) = first(batch, Signal::Active) {
        return FusionOutcome {
            connectivity: Connectivity {
                connected: true,
                detail: format!("connector active: {}", e.raw_text),
                warning: prior.warning.clone(),
                source: Some(e.source),
            },
            decided_by: Some(Signal::Active),
        };
    }

    if let Some(e) = standing_fatal(batch) {
        return FusionOutcome {
            connectivity: Connectivity {
                connected: false,
                detail: e.raw_text.clone(),
                warning: None,
                source: Some(e.source),
            },
            decided_by: Some(Signal::FatalError),
        };
    }

    if let Some(e) = last(batch, Signal::PermissionWarning) {
        let detail = if prior.connected {
            prior.detail.clone()
        } else {
            // A permission error can only come back once the connector reached the platform.
            format!("connected with permission warning: {}", e.raw_text)
        };
        return FusionOutcome {
            connectivity: Connectivity {
                connected: true,
                detail,
                warning: Some(e.raw_text.clone()),
                source: Some(e.source),
            },
            decided_by: Some(Signal::PermissionWarning),
        };
    }

    if let Some(e) = first(batch, Signal::Connected) {
        let connectivity = if prior.connected {
            prior.clone()
        } else {
            Connectivity {
                connected: true,
                detail: format!("connector connected: {}", e.raw_text),
                warning: prior.warning.clone(),
                source: Some(e.source),
            }
        };
        return FusionOutcome {
            connectivity,
            decided_by: Some(Signal::Connected),
        };
    }

    FusionOutcome {
        connectivity: prior.clone(),
        decided_by: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(signal: Signal, text: &str) -> Evidence {
        Evidence::new(EvidenceSource::StreamTap, signal, text)
    }

    #[test]
    fn test_silence_leaves_state_untouched() {
        let prior = Connectivity {
            connected: true,
            detail: "connector active: x".to_string(),
            warning: None,
            source: Some(EvidenceSource::StreamTap),
        };
        let out = fuse(&prior, &[]);
        assert_eq!(out.connectivity, prior);
        assert_eq!(out.decided_by, None);

        let out = fuse(&prior, &[ev(Signal::Unknown, "noise")]);
        assert_eq!(out.connectivity, prior);
    }

    #[test]
    fn test_never_connects_without_positive_signal() {
        let mut state = Connectivity::unknown("starting");
        let ticks: Vec<Vec<Evidence>> = vec![
            vec![],
            vec![ev(Signal::Unknown, "heartbeat")],
            vec![ev(Signal::FatalError, "[feishu] disconnected")],
            vec![],
            vec![ev(Signal::Unknown, "gc")],
        ];
        for batch in &ticks {
            let was = state.connected;
            state = fuse(&state, batch).connectivity;
            if !was && state.connected {
                assert!(batch.iter().any(|e| e.signal.is_positive()));
            }
        }
        assert!(!state.connected);
    }

    #[test]
    fn test_active_beats_fatal_from_other_subsystem() {
        let prior = Connectivity::unknown("starting");
        let batch = vec![
            ev(Signal::Active, "[feishu] message received"),
            ev(Signal::FatalError, "[telegram] channel stopped"),
        ];
        let out = fuse(&prior, &batch);
        assert!(out.connectivity.connected);
        assert_eq!(out.decided_by, Some(Signal::Active));
    }

    #[test]
    fn test_active_clears_fatal_keeps_warning() {
        let prior = Connectivity {
            connected: false,
            detail: "[feishu] disconnected".to_string(),
            warning: Some("scope missing".to_string()),
            source: Some(EvidenceSource::LogFile),
        };
        let out = fuse(&prior, &[ev(Signal::Active, "dispatched reply")]);
        assert!(out.connectivity.connected);
        assert!(!out.connectivity.detail.contains("disconnected"));
        assert_eq!(out.connectivity.warning.as_deref(), Some("scope missing"));
    }

    #[test]
    fn test_permission_warning_connects_optimistically() {
        let prior = Connectivity::unknown("starting");
        let out = fuse(&prior, &[ev(Signal::PermissionWarning, "access denied")]);
        assert!(out.connectivity.connected);
        assert_eq!(out.connectivity.warning.as_deref(), Some("access denied"));
    }

    #[test]
    fn test_permission_warning_does_not_downgrade() {
        let prior = Connectivity {
            connected: true,
            detail: "connector active: hello".to_string(),
            warning: None,
            source: Some(EvidenceSource::StreamTap),
        };
        let out = fuse(&prior, &[ev(Signal::PermissionWarning, "no permission")]);
        assert!(out.connectivity.connected);
        assert_eq!(out.connectivity.detail, prior.detail);
        assert!(out.connectivity.warning.is_some());
    }

    #[test]
    fn test_connected_is_idempotent() {
        let prior = Connectivity {
            connected: true,
            detail: "connector active: hi".to_string(),
            warning: None,
            source: Some(EvidenceSource::StreamTap),
        };
        let out = fuse(&prior, &[ev(Signal::Connected, "[feishu] ws connected")]);
        assert_eq!(out.connectivity, prior);
        assert!(!out.changed_from(&prior));
    }

    #[test]
    fn test_fatal_disconnects_with_offending_line() {
        let prior = Connectivity {
            connected: true,
            detail: "connector connected".to_string(),
            warning: None,
            source: Some(EvidenceSource::StreamTap),
        };
        let out = fuse(&prior, &[ev(Signal::FatalError, "[feishu] channel stopped")]);
        assert!(!out.connectivity.connected);
        assert_eq!(out.connectivity.detail, "[feishu] channel stopped");
    }

    #[test]
    fn test_fatal_after_connected_in_same_batch_disconnects() {
        let prior = Connectivity::unknown("starting");
        let batch = vec![
            ev(Signal::Connected, "[feishu] ws client started"),
            ev(Signal::FatalError, "[feishu] channel stopped"),
        ];
        let out = fuse(&prior, &batch);
        assert!(!out.connectivity.connected);
        assert_eq!(out.connectivity.detail, "[feishu] channel stopped");
        assert_eq!(out.decided_by, Some(Signal::FatalError));
    }

    #[test]
    fn test_fatal_after_permission_warning_disconnects() {
        let batch = vec![
            ev(Signal::PermissionWarning, "[feishu] no permission for im:message"),
            ev(Signal::FatalError, "[feishu] disconnected"),
        ];
        let out = fuse(&Connectivity::unknown("starting"), &batch);
        assert!(!out.connectivity.connected);
        assert_eq!(out.decided_by, Some(Signal::FatalError));
    }

    #[test]
    fn test_reconnect_after_fatal_is_connected() {
        let batch = vec![
            ev(Signal::Connected, "[feishu] ws client started"),
            ev(Signal::FatalError, "[feishu] channel stopped"),
            ev(Signal::Connected, "[feishu] ws client started"),
        ];
        let out = fuse(&Connectivity::unknown("starting"), &batch);
        assert!(out.connectivity.connected);
        assert_eq!(out.decided_by, Some(Signal::Connected));
    }
}

//! Upload state machine for pwx-xfer.
//!
//! This module provides a pure, side-effect-free state machine for one
//! chunked upload session. The state machine takes events as input and
//! produces a new state plus a list of actions to execute.
//!
//! ```text
//! Init → FirstChunkPending → FileIdAssigned → ChunksInFlight → Complete
//!              │                   │                │
//!              └───────────────────┴────────────────┴──→ Failed
//! ```
//!
//! A single-chunk upload goes straight from `FirstChunkPending` to
//! `Complete`. The actual I/O (sealing, submitting chunks) is performed by
//! xfer-client, not by this module.

use std::collections::BTreeSet;
use xfer_types::{Acknowledgment, ErrorKind, FileId};

/// Upload session state - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    /// Nothing submitted yet.
    Init,
    /// First chunk submitted; waiting for the server to assign a file id.
    FirstChunkPending {
        /// Number of chunks in the upload.
        total_chunks: u32,
    },
    /// File id known; remaining chunks not yet dispatched.
    FileIdAssigned {
        /// Server-assigned identifier.
        file_id: FileId,
        /// Number of chunks in the upload.
        total_chunks: u32,
    },
    /// Interior chunks (and eventually the final chunk) submitted.
    ChunksInFlight {
        /// Server-assigned identifier.
        file_id: FileId,
        /// Number of chunks in the upload.
        total_chunks: u32,
        /// Interior chunk indices acknowledged so far.
        acked: BTreeSet<u32>,
        /// Whether the final chunk has been released for submission.
        final_submitted: bool,
    },
    /// Terminal success.
    Complete {
        /// Server-assigned identifier.
        file_id: FileId,
        /// Retrieval link from the final acknowledgment.
        url: String,
    },
    /// Terminal failure.
    Failed {
        /// Classification of the failure.
        kind: ErrorKind,
        /// Human-readable detail.
        reason: String,
    },
}

impl UploadState {
    /// Create a new state machine in the Init state.
    pub fn new() -> Self {
        Self::Init
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (xfer-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // Terminal states ignore everything, including stale acknowledgments
            (state @ (Self::Complete { .. } | Self::Failed { .. }), _) => (state, vec![]),

            (_, Event::Cancel) => fail(ErrorKind::Cancelled, "upload cancelled by caller"),

            (_, Event::ChunkFailed {
                index,
                kind,
                reason,
            }) => fail(kind, format!("chunk {index}: {reason}")),

            // From Init
            (Self::Init, Event::Start { total_chunks: 0 }) => {
                fail(ErrorKind::Planning, "nothing to upload: source is empty")
            }
            (Self::Init, Event::Start { total_chunks }) => (
                Self::FirstChunkPending { total_chunks },
                vec![Action::Submit {
                    index: 1,
                    file_id: None,
                }],
            ),

            // From FirstChunkPending
            (Self::FirstChunkPending { total_chunks }, Event::Acked { index: 1, ack }) => {
                on_first_ack(total_chunks, ack)
            }

            // From FileIdAssigned
            (
                Self::FileIdAssigned {
                    file_id,
                    total_chunks,
                },
                Event::Dispatched,
            ) => {
                let actions: Vec<Action> = if total_chunks == 2 {
                    vec![Action::Submit {
                        index: 2,
                        file_id: Some(file_id.clone()),
                    }]
                } else {
                    (2..total_chunks)
                        .map(|index| Action::Submit {
                            index,
                            file_id: Some(file_id.clone()),
                        })
                        .collect()
                };
                (
                    Self::ChunksInFlight {
                        file_id,
                        total_chunks,
                        acked: BTreeSet::new(),
                        final_submitted: total_chunks == 2,
                    },
                    actions,
                )
            }

            // From ChunksInFlight
            (
                Self::ChunksInFlight {
                    file_id,
                    total_chunks,
                    acked,
                    final_submitted,
                },
                Event::Acked { index, ack },
            ) => on_in_flight_ack(file_id, total_chunks, acked, final_submitted, index, ack),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// The fieldless phase of this state.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Init => Phase::Init,
            Self::FirstChunkPending { .. } => Phase::FirstChunkPending,
            Self::FileIdAssigned { .. } => Phase::FileIdAssigned,
            Self::ChunksInFlight { .. } => Phase::ChunksInFlight,
            Self::Complete { .. } => Phase::Complete,
            Self::Failed { .. } => Phase::Failed,
        }
    }

    /// Check if the session has ended, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Failed { .. })
    }

    /// The server-assigned file id, once known.
    pub fn file_id(&self) -> Option<&FileId> {
        match self {
            Self::FileIdAssigned { file_id, .. }
            | Self::ChunksInFlight { file_id, .. }
            | Self::Complete { file_id, .. } => Some(file_id),
            _ => None,
        }
    }
}

impl Default for UploadState {
    fn default() -> Self {
        Self::new()
    }
}

/// Fieldless view of [`UploadState`], used to record transition trails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// See [`UploadState::Init`].
    Init,
    /// See [`UploadState::FirstChunkPending`].
    FirstChunkPending,
    /// See [`UploadState::FileIdAssigned`].
    FileIdAssigned,
    /// See [`UploadState::ChunksInFlight`].
    ChunksInFlight,
    /// See [`UploadState::Complete`].
    Complete,
    /// See [`UploadState::Failed`].
    Failed,
}

/// Events that can occur during an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The plan is ready; begin with the first chunk.
    Start {
        /// Number of chunks in the plan.
        total_chunks: u32,
    },
    /// The remaining chunks are about to be handed to the transport.
    Dispatched,
    /// The server acknowledged a chunk.
    Acked {
        /// 1-based chunk index.
        index: u32,
        /// Parsed acknowledgment.
        ack: Acknowledgment,
    },
    /// Sealing or submitting a chunk failed.
    ChunkFailed {
        /// 1-based chunk index.
        index: u32,
        /// Classification of the failure.
        kind: ErrorKind,
        /// Error message describing the failure.
        reason: String,
    },
    /// The caller aborted the upload.
    Cancel,
}

/// Actions to be executed by xfer-client.
///
/// These are instructions, not side effects. The upload driver interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Seal and submit a chunk. `file_id` is `None` only for the first chunk,
    /// which carries the session metadata instead.
    Submit {
        /// 1-based chunk index.
        index: u32,
        /// Identifier to attach to the request.
        file_id: Option<FileId>,
    },
    /// The file id is known; hand the remaining chunks to the transport.
    Dispatch,
    /// The upload is complete.
    Finish {
        /// Server-assigned identifier.
        file_id: FileId,
        /// Retrieval link.
        url: String,
    },
    /// Stop all in-flight work and report the failure.
    Abort {
        /// Classification of the failure.
        kind: ErrorKind,
        /// Human-readable detail.
        reason: String,
    },
}

fn fail(kind: ErrorKind, reason: impl Into<String>) -> (UploadState, Vec<Action>) {
    let reason = reason.into();
    (
        UploadState::Failed {
            kind,
            reason: reason.clone(),
        },
        vec![Action::Abort { kind, reason }],
    )
}

fn protocol_violation(reason: impl Into<String>) -> (UploadState, Vec<Action>) {
    fail(ErrorKind::ProtocolViolation, reason)
}

fn on_first_ack(total_chunks: u32, ack: Acknowledgment) -> (UploadState, Vec<Action>) {
    let Some(file_id) = ack.file_id else {
        return protocol_violation("first acknowledgment carried no fileID");
    };

    if total_chunks == 1 {
        return match ack.url {
            Some(url) => (
                UploadState::Complete {
                    file_id: file_id.clone(),
                    url: url.clone(),
                },
                vec![Action::Finish { file_id, url }],
            ),
            None => protocol_violation("final acknowledgment carried no URL"),
        };
    }

    (
        UploadState::FileIdAssigned {
            file_id,
            total_chunks,
        },
        vec![Action::Dispatch],
    )
}

fn on_in_flight_ack(
    file_id: FileId,
    total_chunks: u32,
    mut acked: BTreeSet<u32>,
    mut final_submitted: bool,
    index: u32,
    ack: Acknowledgment,
) -> (UploadState, Vec<Action>) {
    match &ack.file_id {
        Some(id) if *id == file_id => {}
        Some(id) => {
            return protocol_violation(format!(
                "chunk {index} acknowledged under fileID {id}, expected {file_id}"
            ))
        }
        None => return protocol_violation(format!("chunk {index} acknowledgment carried no fileID")),
    }

    if index == 0 || index > total_chunks {
        return protocol_violation(format!(
            "acknowledgment for chunk {index} of {total_chunks}"
        ));
    }

    if index == total_chunks {
        if !final_submitted {
            return protocol_violation("final chunk acknowledged before interior chunks settled");
        }
        return match ack.url {
            Some(url) => (
                UploadState::Complete {
                    file_id: file_id.clone(),
                    url: url.clone(),
                },
                vec![Action::Finish { file_id, url }],
            ),
            None => protocol_violation("final acknowledgment carried no URL"),
        };
    }

    let mut actions = Vec::new();
    // Index 1 was acknowledged already; a repeat is a harmless resubmission.
    if index > 1 && acked.insert(index) {
        let interior_count = total_chunks.saturating_sub(2) as usize;
        if acked.len() == interior_count && !final_submitted {
            final_submitted = true;
            actions.push(Action::Submit {
                index: total_chunks,
                file_id: Some(file_id.clone()),
            });
        }
    }

    (
        UploadState::ChunksInFlight {
            file_id,
            total_chunks,
            acked,
            final_submitted,
        },
        actions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> FileId {
        FileId::new(s).unwrap()
    }

    fn ack(file_id: &str) -> Acknowledgment {
        Acknowledgment::interim(id(file_id))
    }

    fn acked(index: u32, ack: Acknowledgment) -> Event {
        Event::Acked { index, ack }
    }

    /// Drive a session to ChunksInFlight with the given chunk count.
    fn in_flight(total_chunks: u32) -> UploadState {
        let (state, _) = UploadState::new().on_event(Event::Start { total_chunks });
        let (state, _) = state.on_event(acked(1, ack("abc")));
        let (state, _) = state.on_event(Event::Dispatched);
        assert_eq!(state.phase(), Phase::ChunksInFlight);
        state
    }

    fn submitted(actions: &[Action]) -> Vec<u32> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Submit { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn starts_init() {
        let state = UploadState::new();
        assert_eq!(state.phase(), Phase::Init);
        assert!(state.file_id().is_none());
        assert!(!state.is_terminal());
    }

    #[test]
    fn start_submits_first_chunk_without_file_id() {
        let (state, actions) = UploadState::new().on_event(Event::Start { total_chunks: 3 });

        assert_eq!(state, UploadState::FirstChunkPending { total_chunks: 3 });
        assert_eq!(
            actions,
            vec![Action::Submit {
                index: 1,
                file_id: None
            }]
        );
    }

    #[test]
    fn start_with_zero_chunks_fails_planning() {
        let (state, actions) = UploadState::new().on_event(Event::Start { total_chunks: 0 });

        assert!(matches!(
            state,
            UploadState::Failed {
                kind: ErrorKind::Planning,
                ..
            }
        ));
        assert!(matches!(actions[0], Action::Abort { .. }));
    }

    #[test]
    fn first_ack_assigns_file_id() {
        let state = UploadState::FirstChunkPending { total_chunks: 3 };
        let (state, actions) = state.on_event(acked(1, ack("abc")));

        assert_eq!(state.phase(), Phase::FileIdAssigned);
        assert_eq!(state.file_id(), Some(&id("abc")));
        assert_eq!(actions, vec![Action::Dispatch]);
    }

    #[test]
    fn first_ack_without_file_id_is_protocol_violation() {
        let state = UploadState::FirstChunkPending { total_chunks: 3 };
        let (state, actions) = state.on_event(acked(1, Acknowledgment::default()));

        assert!(matches!(
            state,
            UploadState::Failed {
                kind: ErrorKind::ProtocolViolation,
                ..
            }
        ));
        assert!(submitted(&actions).is_empty());
    }

    #[test]
    fn single_chunk_completes_on_first_ack() {
        let state = UploadState::FirstChunkPending { total_chunks: 1 };
        let (state, actions) =
            state.on_event(acked(1, Acknowledgment::complete(id("abc"), "https://x/abc")));

        assert_eq!(
            state,
            UploadState::Complete {
                file_id: id("abc"),
                url: "https://x/abc".into()
            }
        );
        assert!(matches!(&actions[0], Action::Finish { url, .. } if url == "https://x/abc"));
    }

    #[test]
    fn single_chunk_without_url_is_protocol_violation() {
        let state = UploadState::FirstChunkPending { total_chunks: 1 };
        let (state, _) = state.on_event(acked(1, ack("abc")));

        assert!(matches!(
            state,
            UploadState::Failed {
                kind: ErrorKind::ProtocolViolation,
                ..
            }
        ));
    }

    #[test]
    fn dispatch_submits_all_interior_chunks_but_not_final() {
        let state = UploadState::FileIdAssigned {
            file_id: id("abc"),
            total_chunks: 5,
        };
        let (state, actions) = state.on_event(Event::Dispatched);

        assert_eq!(state.phase(), Phase::ChunksInFlight);
        assert_eq!(submitted(&actions), vec![2, 3, 4]);
        assert!(actions.iter().all(|a| matches!(
            a,
            Action::Submit { file_id: Some(f), .. } if *f == id("abc")
        )));
    }

    #[test]
    fn two_chunk_upload_submits_final_directly() {
        let state = UploadState::FileIdAssigned {
            file_id: id("abc"),
            total_chunks: 2,
        };
        let (state, actions) = state.on_event(Event::Dispatched);

        assert_eq!(submitted(&actions), vec![2]);
        let (state, _) = state.on_event(acked(2, Acknowledgment::complete(id("abc"), "u")));
        assert_eq!(state.phase(), Phase::Complete);
    }

    #[test]
    fn final_chunk_released_after_all_interior_acks() {
        let state = in_flight(4);

        let (state, actions) = state.on_event(acked(3, ack("abc")));
        assert!(submitted(&actions).is_empty());

        let (state, actions) = state.on_event(acked(2, ack("abc")));
        assert_eq!(submitted(&actions), vec![4]);

        let (state, actions) =
            state.on_event(acked(4, Acknowledgment::complete(id("abc"), "https://x/abc")));
        assert_eq!(state.phase(), Phase::Complete);
        assert!(matches!(actions[0], Action::Finish { .. }));
    }

    #[test]
    fn duplicate_interior_ack_is_idempotent() {
        let state = in_flight(4);
        let (state, _) = state.on_event(acked(2, ack("abc")));
        let (state, actions) = state.on_event(acked(2, ack("abc")));
        assert!(actions.is_empty());

        let (state, actions) = state.on_event(acked(3, ack("abc")));
        assert_eq!(submitted(&actions), vec![4]);

        // A late duplicate must not release the final chunk a second time
        let (state, actions) = state.on_event(acked(3, ack("abc")));
        assert!(actions.is_empty());
        assert!(matches!(
            state,
            UploadState::ChunksInFlight {
                final_submitted: true,
                ..
            }
        ));
    }

    #[test]
    fn repeated_first_ack_is_ignored_in_flight() {
        let state = in_flight(3);
        let (state, actions) = state.on_event(acked(1, ack("abc")));
        assert!(actions.is_empty());
        assert_eq!(state.phase(), Phase::ChunksInFlight);
    }

    #[test]
    fn mismatched_file_id_is_protocol_violation() {
        let state = in_flight(3);
        let (state, _) = state.on_event(acked(2, ack("xyz")));
        assert!(matches!(
            state,
            UploadState::Failed {
                kind: ErrorKind::ProtocolViolation,
                ..
            }
        ));
    }

    #[test]
    fn interior_ack_without_file_id_is_protocol_violation() {
        let state = in_flight(3);
        let (state, _) = state.on_event(acked(2, Acknowledgment::default()));
        assert_eq!(state.phase(), Phase::Failed);
    }

    #[test]
    fn final_ack_without_url_is_protocol_violation() {
        let state = in_flight(3);
        let (state, _) = state.on_event(acked(2, ack("abc")));
        let (state, _) = state.on_event(acked(3, ack("abc")));
        assert!(matches!(
            state,
            UploadState::Failed {
                kind: ErrorKind::ProtocolViolation,
                ..
            }
        ));
    }

    #[test]
    fn premature_final_ack_is_protocol_violation() {
        let state = in_flight(4);
        let (state, _) = state.on_event(acked(4, Acknowledgment::complete(id("abc"), "u")));
        assert_eq!(state.phase(), Phase::Failed);
    }

    #[test]
    fn ack_for_unknown_chunk_is_protocol_violation() {
        let state = in_flight(3);
        let (state, _) = state.on_event(acked(9, ack("abc")));
        assert_eq!(state.phase(), Phase::Failed);
    }

    #[test]
    fn chunk_failure_aborts_with_its_kind() {
        let state = in_flight(4);
        let (state, actions) = state.on_event(Event::ChunkFailed {
            index: 3,
            kind: ErrorKind::Network,
            reason: "connection reset".into(),
        });

        assert!(matches!(
            &state,
            UploadState::Failed { kind: ErrorKind::Network, reason } if reason.contains("chunk 3")
        ));
        assert!(matches!(
            actions[0],
            Action::Abort {
                kind: ErrorKind::Network,
                ..
            }
        ));
    }

    #[test]
    fn cancel_from_any_live_state_fails() {
        for state in [
            UploadState::Init,
            UploadState::FirstChunkPending { total_chunks: 2 },
            in_flight(3),
        ] {
            let (state, _) = state.on_event(Event::Cancel);
            assert!(matches!(
                state,
                UploadState::Failed {
                    kind: ErrorKind::Cancelled,
                    ..
                }
            ));
        }
    }

    #[test]
    fn stale_ack_after_cancel_does_not_complete() {
        let state = in_flight(2);
        let (state, _) = state.on_event(Event::Cancel);
        let (state, actions) = state.on_event(acked(2, Acknowledgment::complete(id("abc"), "u")));

        assert_eq!(state.phase(), Phase::Failed);
        assert!(actions.is_empty());
    }

    #[test]
    fn complete_ignores_further_events() {
        let state = UploadState::Complete {
            file_id: id("abc"),
            url: "u".into(),
        };
        let (state, actions) = state.on_event(Event::Cancel);
        assert_eq!(state.phase(), Phase::Complete);
        assert!(actions.is_empty());
    }

    #[test]
    fn invalid_transition_keeps_state() {
        let (state, actions) = UploadState::new().on_event(Event::Dispatched);
        assert_eq!(state, UploadState::Init);
        assert!(actions.is_empty());
    }
}

//! Transfer session: staged progress with forward-only transitions
//!
//! Invariants enforced here, not trusted to callers:
//!   - stages advance only forward in their path's fixed order
//!   - `Failed` is reachable from any non-terminal stage; it and
//!     `Complete` are terminal
//!   - percent is clamped to 0..=100, resets on stage entry, and never
//!     decreases within a stage
//!
//! Events fan out over a broadcast channel so the UI, logging, and tests
//! can subscribe independently. A session is single-use: drive one
//! transfer, then drop it.

use std::sync::Mutex;

use tokio::sync::broadcast;

use cpost_core::types::{ProgressEvent, TransferDirection, TransferStage};

const EVENT_BUFFER: usize = 256;

struct SessionState {
    stage: TransferStage,
    percent: u8,
    failed_at: Option<TransferStage>,
}

pub struct TransferSession {
    direction: TransferDirection,
    state: Mutex<SessionState>,
    tx: broadcast::Sender<ProgressEvent>,
}

impl TransferSession {
    pub fn new(direction: TransferDirection) -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            direction,
            state: Mutex::new(SessionState {
                stage: TransferStage::Idle,
                percent: 0,
                failed_at: None,
            }),
            tx,
        }
    }

    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    /// Subscribe to this session's event stream. Slow subscribers may miss
    /// intermediate percents (broadcast semantics) but never see them out
    /// of order.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn stage(&self) -> TransferStage {
        self.state.lock().unwrap().stage
    }

    pub fn percent(&self) -> u8 {
        self.state.lock().unwrap().percent
    }

    /// The stage the pipeline was in when it failed, if it failed.
    pub fn failed_at(&self) -> Option<TransferStage> {
        self.state.lock().unwrap().failed_at
    }

    /// Enter the next working stage, resetting percent to 0. Backward or
    /// out-of-path transitions are rejected and logged, never applied.
    pub fn begin_stage(&self, stage: TransferStage) {
        let mut st = self.state.lock().unwrap();
        if st.stage.is_terminal() {
            tracing::warn!(from = %st.stage, to = %stage, "ignoring transition out of terminal stage");
            return;
        }
        let (Some(from), Some(to)) = (self.rank(st.stage), self.rank(stage)) else {
            tracing::warn!(from = %st.stage, to = %stage, direction = ?self.direction,
                "ignoring stage outside this direction's path");
            return;
        };
        if to <= from {
            tracing::warn!(from = %st.stage, to = %stage, "ignoring backward stage transition");
            return;
        }
        st.stage = stage;
        st.percent = 0;
        self.emit(&st);
    }

    /// Report progress within the current stage. Regressions are clamped
    /// away; values above 100 are capped.
    pub fn report_percent(&self, percent: u8) {
        let mut st = self.state.lock().unwrap();
        if st.stage.is_terminal() || st.stage == TransferStage::Idle {
            return;
        }
        let clamped = percent.min(100).max(st.percent);
        if clamped == st.percent {
            return;
        }
        st.percent = clamped;
        self.emit(&st);
    }

    /// Convenience for byte-level progress callbacks.
    pub fn report_bytes(&self, done: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            ((done.min(total) * 100) / total) as u8
        };
        self.report_percent(percent);
    }

    /// Terminal success: the current stage finishes at 100 and the session
    /// moves to `Complete`.
    pub fn complete(&self) {
        let mut st = self.state.lock().unwrap();
        if st.stage.is_terminal() {
            return;
        }
        st.percent = 100;
        st.stage = TransferStage::Complete;
        self.emit(&st);
    }

    /// Terminal failure, recording which stage the pipeline was in.
    pub fn fail(&self) {
        let mut st = self.state.lock().unwrap();
        if st.stage.is_terminal() {
            return;
        }
        st.failed_at = Some(st.stage);
        st.stage = TransferStage::Failed;
        self.emit(&st);
    }

    fn emit(&self, st: &SessionState) {
        // send() only errors when there are no subscribers; that's fine.
        let _ = self.tx.send(ProgressEvent {
            direction: self.direction,
            stage: st.stage,
            percent: st.percent,
            failed_at: st.failed_at,
        });
    }

    /// Position of a stage in this direction's forward path.
    fn rank(&self, stage: TransferStage) -> Option<u8> {
        use TransferStage::*;
        match (self.direction, stage) {
            (_, Idle) => Some(0),
            (TransferDirection::Upload, Encrypting) => Some(1),
            (TransferDirection::Upload, Uploading) => Some(2),
            (TransferDirection::Download, Downloading) => Some(1),
            (TransferDirection::Download, Decrypting) => Some(2),
            (_, Complete) => Some(3),
            _ => None,
        }
    }
}

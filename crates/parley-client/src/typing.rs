// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Producer side of typing indicators.
//!
//! The first keystroke sends `is_typing = true`; each keystroke re-arms a
//! quiet timer, and when it fires exactly one `is_typing = false` goes out.
//! During a long burst `true` is repeated every `refresh` so the consumer's
//! expiry window never lapses. Signals are queued to a worker task, so
//! `keystroke()` never waits on the network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parley_config::model::TypingConfig;
use parley_core::{ConversationId, ParleyError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Where typing signals are sent.
#[async_trait]
pub trait TypingSink: Send + Sync + 'static {
    async fn send_typing(
        &self,
        conversation: ConversationId,
        is_typing: bool,
    ) -> Result<(), ParleyError>;
}

#[derive(Default)]
struct NotifierState {
    typing: bool,
    last_start: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every keystroke and stop; a timer only fires for its own generation.
    generation: u64,
}

pub struct TypingNotifier {
    state: Arc<Mutex<NotifierState>>,
    signals: mpsc::UnboundedSender<bool>,
    quiet: Duration,
    refresh: Duration,
}

impl TypingNotifier {
    pub fn new(sink: Arc<dyn TypingSink>, conversation: ConversationId, config: &TypingConfig) -> Self {
        Self::with_timing(
            sink,
            conversation,
            Duration::from_millis(config.quiet_window_ms),
            Duration::from_millis(config.refresh_ms),
        )
    }

    /// Must be called inside a tokio runtime.
    pub fn with_timing(
        sink: Arc<dyn TypingSink>,
        conversation: ConversationId,
        quiet: Duration,
        refresh: Duration,
    ) -> Self {
        let (signals, mut rx) = mpsc::unbounded_channel::<bool>();
        tokio::spawn(async move {
            while let Some(is_typing) = rx.recv().await {
                if let Err(e) = sink.send_typing(conversation, is_typing).await {
                    debug!(conversation_id = conversation.0, is_typing, error = %e, "typing signal not delivered");
                }
            }
        });

        Self {
            state: Arc::new(Mutex::new(NotifierState::default())),
            signals,
            quiet,
            refresh,
        }
    }

    pub fn keystroke(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let now = Instant::now();
        let due = !state.typing
            || state
                .last_start
                .is_none_or(|started| now.duration_since(started) >= self.refresh);
        if due {
            state.typing = true;
            state.last_start = Some(now);
            let _ = self.signals.send(true);
        }

        state.generation += 1;
        let generation = state.generation;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let shared = Arc::clone(&self.state);
        let signals = self.signals.clone();
        let quiet = self.quiet;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let Ok(mut state) = shared.lock() else {
                return;
            };
            if state.generation == generation && state.typing {
                state.typing = false;
                state.last_start = None;
                state.timer = None;
                let _ = signals.send(false);
            }
        }));
    }

    /// Sends the stop signal now if typing, and cancels the pending timer.
    pub fn stop(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.typing {
            state.typing = false;
            state.last_start = None;
            let _ = self.signals.send(false);
        }
    }

    pub fn is_typing(&self) -> bool {
        self.state.lock().map(|s| s.typing).unwrap_or(false)
    }
}

impl Drop for TypingNotifier {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.generation += 1;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
    }
}

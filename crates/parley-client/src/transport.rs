// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event transport abstraction consumed by subscriptions.

use async_trait::async_trait;
use parley_core::{Envelope, ParleyError};
use tokio::sync::mpsc;

/// Buffer per channel subscriber.
pub const SIGNAL_BUFFER: usize = 256;

/// What a transport reports to one channel subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    Event(Envelope),
    /// The connection dropped; events may be missed until `Reconnected`.
    Disconnected,
    /// The connection is back. Subscribers should re-fetch what they might have missed.
    Reconnected,
}

/// A source of realtime events, addressed by channel name.
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Starts delivery for `channel`. Each call returns an independent receiver.
    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::Receiver<TransportSignal>, ParleyError>;

    /// Stops delivery for every receiver of `channel`.
    async fn unsubscribe(&self, channel: &str) -> Result<(), ParleyError>;
}

//! Runtime Driver
//!
//! Runs a [`Narrator`] on a tokio task:
//!
//! ```text
//!   mpsc::Sender<NarratorEvent> ──► NarratorRuntime ──► mpsc::Receiver<NarratorMessage>
//!                                       │
//!                          select! { event, sleep_until(deadline) }
//! ```
//!
//! The narrator itself stays synchronous and is owned by the one task, so
//! there is no locking. The current time comes from tokio's clock, which
//! means paused-time tests drive the whole engine without real waiting.

use std::time::Instant as StdInstant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::conductor::{Narrator, NarratorError};
use crate::events::NarratorEvent;
use crate::messages::NarratorMessage;

/// Channel sizing for [`NarratorRuntime::spawn`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Inbound event channel capacity
    pub event_capacity: usize,
    /// Outbound message channel capacity
    pub message_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            message_capacity: 1024,
        }
    }
}

/// Drives a narrator from a channel of events and its own deadlines
pub struct NarratorRuntime {
    narrator: Narrator,
    events: mpsc::Receiver<NarratorEvent>,
    messages: mpsc::Sender<NarratorMessage>,
}

impl NarratorRuntime {
    /// Wrap a narrator and its channels
    pub fn new(
        narrator: Narrator,
        events: mpsc::Receiver<NarratorEvent>,
        messages: mpsc::Sender<NarratorMessage>,
    ) -> Self {
        Self {
            narrator,
            events,
            messages,
        }
    }

    /// Spawn the runtime on the current tokio runtime
    ///
    /// The task ends when every event sender is dropped, returning the
    /// narrator so its metrics can be read.
    pub fn spawn(
        narrator: Narrator,
        config: RuntimeConfig,
    ) -> (
        mpsc::Sender<NarratorEvent>,
        mpsc::Receiver<NarratorMessage>,
        JoinHandle<Result<Narrator, NarratorError>>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (message_tx, message_rx) = mpsc::channel(config.message_capacity.max(1));
        let runtime = Self::new(narrator, event_rx, message_tx);
        let handle = tokio::spawn(runtime.run());
        (event_tx, message_rx, handle)
    }

    /// Current time on tokio's clock
    fn now() -> StdInstant {
        Instant::now().into_std()
    }

    /// Run until the event channel closes or an invariant breaks
    pub async fn run(mut self) -> Result<Narrator, NarratorError> {
        tracing::info!(
            session_id = %self.narrator.metrics().session_id(),
            "Narrator runtime started"
        );

        loop {
            self.flush().await?;
            let deadline = self.narrator.next_deadline();

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => {
                        let name = event.name();
                        let outcome = self.narrator.handle_event(event, Self::now())?;
                        tracing::debug!(event = name, ?outcome, "Event routed");
                    }
                    None => {
                        tracing::info!("Event channel closed, narrator runtime stopping");
                        break;
                    }
                },
                () = sleep_until_deadline(deadline) => {
                    self.narrator.advance(Self::now())?;
                }
            }
        }

        self.flush().await?;
        tracing::info!(metrics = ?self.narrator.metrics().snapshot(), "Narrator runtime stopped");
        Ok(self.narrator)
    }

    async fn flush(&mut self) -> Result<(), NarratorError> {
        for message in self.narrator.drain_messages() {
            tracing::trace!(kind = message.kind(), "Sending message");
            self.messages
                .send(message)
                .await
                .map_err(|_| NarratorError::OutputClosed)?;
        }
        Ok(())
    }
}

async fn sleep_until_deadline(deadline: Option<StdInstant>) {
    match deadline {
        Some(deadline) => sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

//! Service loop — drains inbound events into the dispatcher until shutdown.
//!
//! Tearing down a connection cancels the token; the `biased` arm guarantees
//! no further events are delivered after that, while fan-outs already in
//! flight are left to finish on their own tasks.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dispatch::Dispatcher;
use crate::event::ChatEvent;

pub async fn run(
    mut events: mpsc::Receiver<ChatEvent>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
) {
    info!("service loop started");
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("service loop shutting down");
                break;
            }

            event = events.recv() => match event {
                Some(event) => {
                    debug!(channel = %event.channel, sender = %event.sender_nick(), "inbound event");
                    dispatcher.dispatch(event);
                }
                None => {
                    info!("event source closed");
                    break;
                }
            },
        }
    }
}

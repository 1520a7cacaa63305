//! IPC boundary between the host and the UI process
//!
//! The core only depends on [`IpcSender`] for outbound events and on
//! [`IpcRouter`] for inbound invokes. [`stdio`] is the default transport.

pub mod channels;
mod message;
mod router;
pub mod stdio;
mod wiring;

use serde_json::Value;

pub use message::{IpcError, IpcMessage};
pub use router::IpcRouter;
pub use wiring::setup_agent_session_ipc;

/// Outbound half of the IPC boundary
///
/// Sends are fire-and-forget: a closed boundary drops the message.
pub trait IpcSender: Send + Sync + std::fmt::Debug {
    fn send(&self, channel: &str, args: Vec<Value>);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::Value;

    use super::IpcSender;

    /// Sender that records every outbound message
    #[derive(Debug, Default)]
    pub struct RecordingSender {
        sent: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl RecordingSender {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn messages(&self) -> Vec<(String, Vec<Value>)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn on_channel(&self, channel: &str) -> Vec<Vec<Value>> {
            self.messages()
                .into_iter()
                .filter(|(c, _)| c == channel)
                .map(|(_, args)| args)
                .collect()
        }

        /// Wait until `count` messages were sent on `channel`
        pub async fn wait_for(&self, channel: &str, count: usize) -> Vec<Vec<Value>> {
            for _ in 0..400 {
                let seen = self.on_channel(channel);
                if seen.len() >= count {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("timed out waiting for {count} message(s) on {channel}");
        }
    }

    impl IpcSender for RecordingSender {
        fn send(&self, channel: &str, args: Vec<Value>) {
            self.sent.lock().unwrap().push((channel.to_string(), args));
        }
    }
}

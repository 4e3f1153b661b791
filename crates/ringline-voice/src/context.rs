use crate::error::SessionError;
use crate::pipeline::CallContext;
use async_trait::async_trait;
use ringline_types::CallAssignment;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Call context for a routed call's media room.
///
/// The hang-up signal is a [`CancellationToken`]; whoever learns that the
/// call ended (the routing system, the transport) cancels the token obtained
/// from [`RoomContext::end_signal`]. A hang-up that arrives before the agent
/// joins does not fail `connect`; the session sees it as soon as it runs.
#[derive(Debug)]
pub struct RoomContext {
    call_id: String,
    room_id: String,
    ended: CancellationToken,
    connected: AtomicBool,
}

impl RoomContext {
    pub fn new(call: &CallAssignment) -> Self {
        Self {
            call_id: call.call_id.clone(),
            room_id: call.room_id.clone(),
            ended: CancellationToken::new(),
            connected: AtomicBool::new(false),
        }
    }

    /// Token that, once cancelled, marks the call as ended.
    pub fn end_signal(&self) -> CancellationToken {
        self.ended.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallContext for RoomContext {
    async fn connect(&self) -> Result<(), SessionError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Context(format!(
                "already connected to room '{}'",
                self.room_id
            )));
        }
        info!(call_id = %self.call_id, room_id = %self.room_id, "joined call room");
        Ok(())
    }

    async fn ended(&self) {
        self.ended.cancelled().await;
    }

    async fn shutdown(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(call_id = %self.call_id, room_id = %self.room_id, "left call room");
        }
        self.ended.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_once_then_shutdown() {
        let ctx = RoomContext::new(&CallAssignment::new("c1", "r1"));
        ctx.connect().await.unwrap();
        assert!(ctx.is_connected());
        assert!(ctx.connect().await.is_err());

        ctx.shutdown().await;
        assert!(!ctx.is_connected());
        // ended() resolves after shutdown
        ctx.ended().await;
    }

    #[tokio::test]
    async fn early_hangup_still_connects_and_reports_ended() {
        let ctx = RoomContext::new(&CallAssignment::new("c1", "r1"));
        ctx.end_signal().cancel();
        ctx.connect().await.unwrap();
        assert!(ctx.is_connected());
        ctx.ended().await;
    }
}

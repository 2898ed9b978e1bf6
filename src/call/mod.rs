// src/call/mod.rs
// Call State Machine: RINGING/ACTIVE/terminal transitions, ring timeouts,
// and WebRTC offer/answer/ICE relay by connection id. Ring timeouts use a
// `tokio::spawn`'d task that a `tokio::sync::watch` channel can cancel, the
// same shape as `api/ws/chat/heartbeat.rs`'s `HeartbeatManager`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::domain::{Call, CallKind, CallStatus, DomainError};
use crate::registry::{conversation_room, user_room, ConnectionRegistry};
use crate::repo::{CallRepository, MemberRepository};
use crate::ws::events::WsServerEvent;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("caller and callee must both be members of the conversation")]
    NotAMember,
    #[error("a call is already in progress in this conversation")]
    AlreadyInProgress,
    #[error("call is not in the expected state for this transition")]
    InvalidTransition,
    #[error("only the callee may accept this call")]
    NotTheCallee,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<CallError> for DomainError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Domain(inner) => inner,
            CallError::NotAMember => DomainError::Authorization(e.to_string()),
            CallError::AlreadyInProgress => DomainError::Conflict(e.to_string()),
            CallError::InvalidTransition | CallError::NotTheCallee => DomainError::Conflict(e.to_string()),
        }
    }
}

pub struct CallCoordinator {
    calls: Arc<dyn CallRepository>,
    members: Arc<dyn MemberRepository>,
    registry: Arc<ConnectionRegistry>,
    ring_timeout: Duration,
    /// One cancel switch per RINGING call; dropped (or sent `true`) once
    /// the call leaves RINGING.
    ring_timers: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl CallCoordinator {
    pub fn new(
        calls: Arc<dyn CallRepository>,
        members: Arc<dyn MemberRepository>,
        registry: Arc<ConnectionRegistry>,
        ring_timeout: Duration,
    ) -> Self {
        Self { calls, members, registry, ring_timeout, ring_timers: Mutex::new(HashMap::new()) }
    }

    pub async fn initiate(&self, conversation_id: &str, caller_id: &str, callee_id: &str, kind: CallKind) -> Result<Call, CallError> {
        if !self.members.is_member(conversation_id, caller_id).await? || !self.members.is_member(conversation_id, callee_id).await? {
            return Err(CallError::NotAMember);
        }

        if self.calls.active_call_in(conversation_id).await?.is_some() {
            return Err(CallError::AlreadyInProgress);
        }

        let call = self.calls.create(conversation_id, caller_id, Some(callee_id), kind).await?;

        self.registry
            .broadcast_to_user(
                callee_id,
                &WsServerEvent::IncomingCall {
                    call_id: call.id.clone(),
                    conversation_id: conversation_id.to_string(),
                    caller_id: caller_id.to_string(),
                    kind,
                },
            )
            .await;
        self.registry
            .broadcast(
                &conversation_room(conversation_id),
                &WsServerEvent::IncomingCall {
                    call_id: call.id.clone(),
                    conversation_id: conversation_id.to_string(),
                    caller_id: caller_id.to_string(),
                    kind,
                },
            )
            .await;

        self.start_ring_timer(call.id.clone());
        Ok(call)
    }

    /// Spawns the auto-reject timer for a RINGING call: rings auto-reject
    /// after 30 s. The task carries its own clones of the repository and
    /// registry so it needs no back-reference to the coordinator itself.
    fn start_ring_timer(&self, call_id: String) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let timeout = self.ring_timeout;
        let calls = self.calls.clone();
        let registry = self.registry.clone();

        if let Ok(mut timers) = self.ring_timers.try_lock() {
            timers.insert(call_id.clone(), stop_tx);
        }

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    match calls.find_by_id(&call_id).await {
                        Ok(Some(call)) if call.status == CallStatus::Ringing => {
                            if let Ok(updated) = calls.set_terminal(&call_id, CallStatus::Rejected, Utc::now()).await {
                                info!(call_id = %call_id, "call rang out, auto-rejected");
                                registry.broadcast(&conversation_room(&updated.conversation_id), &WsServerEvent::CallDeclined { call_id: call_id.clone() }).await;
                            }
                        }
                        _ => {}
                    }
                }
                _ = stop_rx.changed() => {}
            }
        });
    }

    /// Stops the ring-timeout task for a call leaving RINGING, whichever
    /// way it leaves (accept/reject/cancel/implicit end).
    async fn cancel_ring_timer(&self, call_id: &str) {
        if let Some(stop_tx) = self.ring_timers.lock().await.remove(call_id) {
            let _ = stop_tx.send(true);
        }
    }

    pub async fn accept(&self, call_id: &str, user_id: &str) -> Result<Call, CallError> {
        let call = self.calls.find_by_id(call_id).await?.ok_or(CallError::InvalidTransition)?;

        if call.callee_id.as_deref() != Some(user_id) {
            return Err(CallError::NotTheCallee);
        }
        if call.status != CallStatus::Ringing {
            return Err(CallError::InvalidTransition);
        }

        self.cancel_ring_timer(call_id).await;
        let updated = self.calls.set_active(call_id, Utc::now()).await?;

        self.registry.broadcast(&conversation_room(&updated.conversation_id), &WsServerEvent::CallAccepted { call_id: call_id.to_string() }).await;
        Ok(updated)
    }

    pub async fn reject(&self, call_id: &str, user_id: &str) -> Result<Call, CallError> {
        let call = self.calls.find_by_id(call_id).await?.ok_or(CallError::InvalidTransition)?;

        if call.status != CallStatus::Ringing {
            return Err(CallError::InvalidTransition);
        }
        if call.caller_id != user_id && call.callee_id.as_deref() != Some(user_id) {
            return Err(CallError::NotAMember);
        }

        self.cancel_ring_timer(call_id).await;
        let updated = self.calls.set_terminal(call_id, CallStatus::Rejected, Utc::now()).await?;

        self.registry.broadcast(&conversation_room(&updated.conversation_id), &WsServerEvent::CallDeclined { call_id: call_id.to_string() }).await;
        Ok(updated)
    }

    pub async fn cancel(&self, call_id: &str, user_id: &str) -> Result<Call, CallError> {
        let call = self.calls.find_by_id(call_id).await?.ok_or(CallError::InvalidTransition)?;

        if call.status != CallStatus::Ringing {
            return Err(CallError::InvalidTransition);
        }
        if call.caller_id != user_id {
            return Err(CallError::NotAMember);
        }

        self.cancel_ring_timer(call_id).await;
        let updated = self.calls.set_terminal(call_id, CallStatus::Cancelled, Utc::now()).await?;

        self.registry.broadcast(&conversation_room(&updated.conversation_id), &WsServerEvent::CallCancelled { call_id: call_id.to_string() }).await;
        Ok(updated)
    }

    pub async fn end(&self, call_id: &str, user_id: &str) -> Result<Call, CallError> {
        let call = self.calls.find_by_id(call_id).await?.ok_or(CallError::InvalidTransition)?;

        if call.status.is_terminal() {
            return Err(CallError::InvalidTransition);
        }
        if call.caller_id != user_id && call.callee_id.as_deref() != Some(user_id) {
            return Err(CallError::NotAMember);
        }

        self.cancel_ring_timer(call_id).await;
        let updated = self.calls.set_terminal(call_id, CallStatus::Ended, Utc::now()).await?;

        self.registry.broadcast(&conversation_room(&updated.conversation_id), &WsServerEvent::CallEnded { call_id: call_id.to_string() }).await;
        Ok(updated)
    }

    /// Implicit end triggered when a participant's connection set empties:
    /// disconnection of either peer ends a non-terminal call.
    pub async fn end_for_disconnected_user(&self, conversation_id: &str, user_id: &str) {
        let Ok(Some(call)) = self.calls.active_call_in(conversation_id).await else { return };

        if call.caller_id != user_id && call.callee_id.as_deref() != Some(user_id) {
            return;
        }

        match self.end(&call.id, user_id).await {
            Ok(_) => {}
            Err(e) => warn!(call_id = %call.id, error = %e, "failed to implicitly end call on disconnect"),
        }
    }

    pub async fn relay_offer(&self, call_id: &str, from_connection_id: &str, target_connection_id: &str, sdp: serde_json::Value) {
        self.registry
            .send_to(target_connection_id, &WsServerEvent::WebrtcOffer { call_id: call_id.to_string(), from_connection_id: from_connection_id.to_string(), sdp })
            .await;
    }

    pub async fn relay_answer(&self, call_id: &str, from_connection_id: &str, target_connection_id: &str, sdp: serde_json::Value) {
        self.registry
            .send_to(target_connection_id, &WsServerEvent::WebrtcAnswer { call_id: call_id.to_string(), from_connection_id: from_connection_id.to_string(), sdp })
            .await;
    }

    pub async fn relay_ice(&self, call_id: &str, from_connection_id: &str, target_connection_id: &str, candidate: serde_json::Value, is_restart: bool) {
        self.registry
            .send_to(
                target_connection_id,
                &WsServerEvent::WebrtcIce { call_id: call_id.to_string(), from_connection_id: from_connection_id.to_string(), candidate, is_restart },
            )
            .await;

        if is_restart {
            self.registry.send_to(from_connection_id, &WsServerEvent::WebrtcIceAck { call_id: call_id.to_string() }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::domain::{DomainResult, MemberRole};
    use crate::repo::MemberRepository;

    struct FakeMembers {
        members: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl MemberRepository for FakeMembers {
        async fn is_member(&self, conversation_id: &str, user_id: &str) -> DomainResult<bool> {
            Ok(self.members.iter().any(|(c, u)| *c == conversation_id && *u == user_id))
        }
        async fn get(&self, _: &str, _: &str) -> DomainResult<Option<crate::domain::Member>> {
            Ok(None)
        }
        async fn list(&self, _: &str) -> DomainResult<Vec<crate::domain::Member>> {
            Ok(Vec::new())
        }
        async fn list_user_ids(&self, conversation_id: &str) -> DomainResult<Vec<String>> {
            Ok(self.members.iter().filter(|(c, _)| *c == conversation_id).map(|(_, u)| u.to_string()).collect())
        }
        async fn add(&self, _: &str, _: &str, _: MemberRole) -> DomainResult<()> {
            Ok(())
        }
        async fn remove(&self, _: &str, _: &str) -> DomainResult<()> {
            Ok(())
        }
        async fn set_role(&self, _: &str, _: &str, _: MemberRole) -> DomainResult<()> {
            Ok(())
        }
        async fn set_last_read_at(&self, _: &str, _: &str, _: chrono::DateTime<Utc>) -> DomainResult<()> {
            Ok(())
        }
        async fn set_pinned(&self, _: &str, _: &str, _: bool) -> DomainResult<()> {
            Ok(())
        }
    }

    struct FakeCalls {
        calls: StdMutex<HashMap<String, Call>>,
    }

    impl FakeCalls {
        fn new() -> Self {
            Self { calls: StdMutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl CallRepository for FakeCalls {
        async fn active_call_in(&self, conversation_id: &str) -> DomainResult<Option<Call>> {
            Ok(self.calls.lock().unwrap().values().find(|c| c.conversation_id == conversation_id && !c.status.is_terminal()).cloned())
        }
        async fn create(&self, conversation_id: &str, caller_id: &str, callee_id: Option<&str>, kind: CallKind) -> DomainResult<Call> {
            let call = Call {
                id: uuid::Uuid::new_v4().to_string(),
                conversation_id: conversation_id.to_string(),
                caller_id: caller_id.to_string(),
                callee_id: callee_id.map(|s| s.to_string()),
                kind,
                status: CallStatus::Ringing,
                started_at: None,
                ended_at: None,
                duration: None,
            };
            self.calls.lock().unwrap().insert(call.id.clone(), call.clone());
            Ok(call)
        }
        async fn find_by_id(&self, id: &str) -> DomainResult<Option<Call>> {
            Ok(self.calls.lock().unwrap().get(id).cloned())
        }
        async fn set_active(&self, id: &str, started_at: chrono::DateTime<Utc>) -> DomainResult<Call> {
            let mut calls = self.calls.lock().unwrap();
            let call = calls.get_mut(id).expect("call exists");
            call.status = CallStatus::Active;
            call.started_at = Some(started_at);
            Ok(call.clone())
        }
        async fn set_terminal(&self, id: &str, status: CallStatus, ended_at: chrono::DateTime<Utc>) -> DomainResult<Call> {
            let mut calls = self.calls.lock().unwrap();
            let call = calls.get_mut(id).expect("call exists");
            call.status = status;
            call.ended_at = Some(ended_at);
            Ok(call.clone())
        }
    }

    fn coordinator(calls: FakeCalls, members: Vec<(&'static str, &'static str)>) -> CallCoordinator {
        CallCoordinator::new(
            Arc::new(calls),
            Arc::new(FakeMembers { members }),
            Arc::new(ConnectionRegistry::new()),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn initiate_rejects_non_members() {
        let coordinator = coordinator(FakeCalls::new(), vec![("c1", "alice")]);
        let err = coordinator.initiate("c1", "alice", "bob", CallKind::Audio).await.unwrap_err();
        assert!(matches!(err, CallError::NotAMember));
    }

    #[tokio::test]
    async fn initiate_rejects_second_concurrent_call() {
        let coordinator = coordinator(FakeCalls::new(), vec![("c1", "alice"), ("c1", "bob")]);
        coordinator.initiate("c1", "alice", "bob", CallKind::Audio).await.expect("first call rings");

        let err = coordinator.initiate("c1", "alice", "bob", CallKind::Audio).await.unwrap_err();
        assert!(matches!(err, CallError::AlreadyInProgress));
    }

    #[tokio::test]
    async fn only_the_callee_can_accept() {
        let coordinator = coordinator(FakeCalls::new(), vec![("c1", "alice"), ("c1", "bob")]);
        let call = coordinator.initiate("c1", "alice", "bob", CallKind::Audio).await.unwrap();

        let err = coordinator.accept(&call.id, "alice").await.unwrap_err();
        assert!(matches!(err, CallError::NotTheCallee));

        let accepted = coordinator.accept(&call.id, "bob").await.unwrap();
        assert_eq!(accepted.status, CallStatus::Active);
    }

    #[tokio::test]
    async fn cannot_accept_a_call_twice() {
        let coordinator = coordinator(FakeCalls::new(), vec![("c1", "alice"), ("c1", "bob")]);
        let call = coordinator.initiate("c1", "alice", "bob", CallKind::Audio).await.unwrap();

        coordinator.accept(&call.id, "bob").await.unwrap();
        let err = coordinator.accept(&call.id, "bob").await.unwrap_err();
        assert!(matches!(err, CallError::InvalidTransition));
    }

    #[tokio::test]
    async fn end_is_rejected_once_terminal() {
        let coordinator = coordinator(FakeCalls::new(), vec![("c1", "alice"), ("c1", "bob")]);
        let call = coordinator.initiate("c1", "alice", "bob", CallKind::Audio).await.unwrap();

        coordinator.cancel(&call.id, "alice").await.unwrap();
        let err = coordinator.end(&call.id, "alice").await.unwrap_err();
        assert!(matches!(err, CallError::InvalidTransition));
    }

    #[tokio::test]
    async fn only_a_participant_can_cancel() {
        let coordinator = coordinator(FakeCalls::new(), vec![("c1", "alice"), ("c1", "bob"), ("c1", "carol")]);
        let call = coordinator.initiate("c1", "alice", "bob", CallKind::Audio).await.unwrap();

        let err = coordinator.cancel(&call.id, "carol").await.unwrap_err();
        assert!(matches!(err, CallError::NotAMember));
    }
}

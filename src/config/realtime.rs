use serde::{Deserialize, Serialize};

use super::helpers::env_usize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub events_per_minute_per_connection: u32,
    pub handshake_timeout_seconds: u64,
    pub persistence_timeout_seconds: u64,
    pub upstream_call_timeout_seconds: u64,
    pub upstream_idle_timeout_seconds: u64,
    pub call_ring_timeout_seconds: u64,
    pub context_window_messages: i64,
    pub context_window_chars: usize,
}

impl RealtimeConfig {
    pub fn from_env() -> Self {
        Self {
            events_per_minute_per_connection: env_usize("REALTIME_EVENTS_PER_MINUTE", 100) as u32,
            handshake_timeout_seconds: env_usize("HANDSHAKE_TIMEOUT_SECONDS", 5) as u64,
            persistence_timeout_seconds: env_usize("PERSISTENCE_TIMEOUT_SECONDS", 5) as u64,
            upstream_call_timeout_seconds: env_usize("UPSTREAM_CALL_TIMEOUT_SECONDS", 60) as u64,
            upstream_idle_timeout_seconds: env_usize("UPSTREAM_IDLE_TIMEOUT_SECONDS", 20) as u64,
            call_ring_timeout_seconds: env_usize("CALL_RING_TIMEOUT_SECONDS", 30) as u64,
            context_window_messages: env_usize("CONTEXT_WINDOW_MESSAGES", 20) as i64,
            context_window_chars: env_usize("CONTEXT_WINDOW_CHARS", 30_000),
        }
    }
}

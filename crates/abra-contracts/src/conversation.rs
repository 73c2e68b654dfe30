use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use uuid::Uuid;

use crate::error::{AbraError, Result};

/// Decoded form of a bot message id, `"{conversation}_{threading}_{suffix}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeId {
    pub conversation_id: String,
    pub threading_id: String,
    pub suffix: String,
}

impl CompositeId {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split('_').collect();
        match parts.as_slice() {
            [conversation, threading, suffix]
                if !conversation.is_empty() && !threading.is_empty() =>
            {
                Ok(Self {
                    conversation_id: (*conversation).to_string(),
                    threading_id: (*threading).to_string(),
                    suffix: (*suffix).to_string(),
                })
            }
            _ => Err(AbraError::MalformedConversationId {
                raw: raw.to_string(),
                parts: parts.len(),
            }),
        }
    }
}

/// Conversation continuity across exchanges.
///
/// Owned by a single client; callers hold `&mut` for the duration of one
/// exchange, so there is never more than one writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    external_id: Option<String>,
    offline_threading_id: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_external_id(external_id: impl Into<String>) -> Self {
        let external_id = external_id.into();
        Self {
            external_id: Some(external_id).filter(|value| !value.trim().is_empty()),
            offline_threading_id: None,
        }
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn offline_threading_id(&self) -> Option<&str> {
        self.offline_threading_id.as_deref()
    }

    /// Returns the id the next exchange should be sent under, minting a new
    /// one when none exists yet or a fresh conversation was asked for.
    pub fn prepare(&mut self, new_conversation: bool) -> &str {
        if new_conversation || self.external_id.is_none() {
            self.external_id = Some(Uuid::new_v4().to_string());
            self.offline_threading_id = None;
        }
        self.external_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .as_str()
    }

    /// Adopts the identity carried by a terminal reply. Returns whether the
    /// conversation id changed.
    pub fn apply(&mut self, id: &CompositeId) -> bool {
        let changed = self.external_id.as_deref() != Some(id.conversation_id.as_str());
        self.external_id = Some(id.conversation_id.clone());
        self.offline_threading_id = Some(id.threading_id.clone());
        changed
    }
}

/// Client-side threading id: millisecond timestamp in the high bits, 22 random
/// low bits.
pub fn generate_offline_threading_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0);
    let random: u64 = rand::thread_rng().gen();
    offline_threading_id_from_parts(timestamp, random).to_string()
}

fn offline_threading_id_from_parts(timestamp_ms: u64, random: u64) -> u64 {
    const MASK_22_BITS: u64 = (1 << 22) - 1;
    (timestamp_ms << 22) | (random & MASK_22_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_id_splits_into_three_parts() {
        let id = CompositeId::parse("a_b_c").unwrap();
        assert_eq!(id.conversation_id, "a");
        assert_eq!(id.threading_id, "b");
        assert_eq!(id.suffix, "c");
    }

    #[test]
    fn composite_id_rejects_wrong_arity() {
        for raw in ["a_b", "a_b_c_d", "plain", ""] {
            match CompositeId::parse(raw) {
                Err(AbraError::MalformedConversationId { raw: seen, parts }) => {
                    assert_eq!(seen, raw);
                    assert_eq!(parts, raw.split('_').count());
                }
                other => panic!("expected malformed id for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn composite_id_rejects_empty_leading_parts() {
        assert!(CompositeId::parse("_b_c").is_err());
        assert!(CompositeId::parse("a__c").is_err());
    }

    #[test]
    fn prepare_generates_id_once_and_keeps_it() {
        let mut state = ConversationState::new();
        let first = state.prepare(false).to_string();
        assert!(!first.is_empty());
        assert_eq!(state.prepare(false), first);
    }

    #[test]
    fn prepare_new_conversation_replaces_id() {
        let mut state = ConversationState::with_external_id("existing");
        let next = state.prepare(true).to_string();
        assert_ne!(next, "existing");
        assert_eq!(state.offline_threading_id(), None);
    }

    #[test]
    fn blank_initial_id_counts_as_absent() {
        let mut state = ConversationState::with_external_id("  ");
        assert_eq!(state.external_id(), None);
        assert!(!state.prepare(false).trim().is_empty());
    }

    #[test]
    fn apply_overwrites_both_fields() {
        let mut state = ConversationState::with_external_id("old");
        let changed = state.apply(&CompositeId::parse("new_thread_1").unwrap());
        assert!(changed);
        assert_eq!(state.external_id(), Some("new"));
        assert_eq!(state.offline_threading_id(), Some("thread"));

        let unchanged = state.apply(&CompositeId::parse("new_thread2_1").unwrap());
        assert!(!unchanged);
        assert_eq!(state.offline_threading_id(), Some("thread2"));
    }

    #[test]
    fn threading_id_keeps_timestamp_and_masks_random_bits() {
        let id = offline_threading_id_from_parts(1_700_000_000_000, u64::MAX);
        assert_eq!(id >> 22, 1_700_000_000_000);
        assert_eq!(id & ((1 << 22) - 1), (1 << 22) - 1);
    }

    #[test]
    fn generated_threading_id_is_decimal() {
        let id = generate_offline_threading_id();
        assert!(!id.is_empty());
        assert!(id.chars().all(|ch| ch.is_ascii_digit()));
    }
}

//! Protocol-level building blocks for the Abra conversational backend: typed
//! records, reply extraction, conversation identity, credentials, request
//! payloads and the retry state machine. Nothing in this crate performs I/O
//! except the transcript writer.

pub mod chat;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod graphql;
pub mod records;
pub mod reply;
pub mod retry;
pub mod transcript;

pub use conversation::{generate_offline_threading_id, CompositeId, ConversationState};
pub use credentials::{AuthMode, PageTokens, SessionCredentials};
pub use error::{AbraError, Result};
pub use reply::{ExtractedReply, MediaItem, Source};
pub use retry::{RetryController, RetryDecision, RetryPolicy, RetryState};
pub use transcript::{TranscriptEvent, TranscriptWriter};

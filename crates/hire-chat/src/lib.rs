//! Conversation orchestration for two-party hiring chats.
//!
//! [`ChatService`] composes the message and thread stores of `hire-db` into
//! atomic, idempotent actions and reshapes stored messages into what each
//! participant is allowed to see.

pub mod collaborators;
pub mod cursor;
pub mod draft;
pub mod error;
pub mod service;
pub mod visibility;

pub use collaborators::{MediaFetcher, ResumeHandoff, ResumeLink, TenantResolver};
pub use cursor::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use draft::MessageDraft;
pub use error::{ChatError, Result};
pub use service::{ChatService, ConversationFilter};

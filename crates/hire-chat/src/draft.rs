use hire_types::api::SendMessageRequest;
use hire_types::models::MessageKind;

use crate::error::{ChatError, Result};

/// Content of a message about to be sent.
///
/// Exactly one content variant (text, media or file) may be set. The reply
/// target is independent of the variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageDraft {
    kind: MessageKind,
    body: Option<String>,
    media_ids: Vec<String>,
    reply_to: Option<String>,
}

impl MessageDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, body: impl Into<String>) -> Result<Self> {
        self.claim(MessageKind::Text)?;
        let body = body.into();
        if body.trim().is_empty() {
            return Err(ChatError::InvalidArgument("text body is empty".into()));
        }
        self.body = Some(body);
        Ok(self)
    }

    pub fn with_media(mut self, ids: Vec<String>) -> Result<Self> {
        self.claim(MessageKind::Image)?;
        self.media_ids = checked_ids(ids, "media")?;
        Ok(self)
    }

    pub fn with_file(mut self, ids: Vec<String>) -> Result<Self> {
        self.claim(MessageKind::File)?;
        self.media_ids = checked_ids(ids, "file")?;
        Ok(self)
    }

    #[must_use]
    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn media_ids(&self) -> &[String] {
        &self.media_ids
    }

    pub fn reply_to_id(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// Fails unless a content variant has been set.
    pub fn validate(&self) -> Result<()> {
        if self.kind == MessageKind::Empty {
            return Err(ChatError::InvalidArgument(
                "message needs text, media or file content".into(),
            ));
        }
        Ok(())
    }

    fn claim(&mut self, kind: MessageKind) -> Result<()> {
        if self.kind != MessageKind::Empty {
            return Err(ChatError::InvalidArgument(format!(
                "message already carries {:?} content, cannot add {:?}",
                self.kind, kind
            )));
        }
        self.kind = kind;
        Ok(())
    }
}

fn checked_ids(ids: Vec<String>, what: &str) -> Result<Vec<String>> {
    if ids.is_empty() || ids.iter().any(|id| id.trim().is_empty()) {
        return Err(ChatError::InvalidArgument(format!("{} id list is empty", what)));
    }
    Ok(ids)
}

impl TryFrom<SendMessageRequest> for MessageDraft {
    type Error = ChatError;

    fn try_from(req: SendMessageRequest) -> Result<Self> {
        let mut draft = Self::new();
        if let Some(body) = req.body {
            draft = draft.with_text(body)?;
        }
        if let Some(ids) = req.media_ids {
            draft = draft.with_media(ids)?;
        }
        if let Some(ids) = req.file_ids {
            draft = draft.with_file(ids)?;
        }
        if let Some(id) = req.reply_to_message_id {
            draft = draft.reply_to(id);
        }
        draft.validate()?;
        Ok(draft)
    }
}

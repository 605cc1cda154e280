use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use hire_db::Database;
use hire_db::models::{ChatPosition, ChatQuery, ChatRow, MessageRow, NewMessage};
use hire_types::api::{ConversationPage, ConversationView, MessagePage, MessageView};
use hire_types::models::{
    Annotation, ControlFlag, DisplayStatus, MessageKind, MessageStatus, ResumeAttachment,
};
use tracing::{debug, error, info, warn};

use crate::collaborators::{MediaFetcher, ResumeHandoff, TenantResolver};
use crate::cursor::{Cursor, encode_chat_cursor, parse_chat_cursor, split_page};
use crate::draft::MessageDraft;
use crate::error::{ChatError, Result};
use crate::visibility;

/// Filters for [`ChatService::list_conversations`].
#[derive(Debug, Clone)]
pub struct ConversationFilter {
    /// `Todo` or `Done` restricts to that label. `None` lists every label.
    pub annotation: Annotation,
    pub unread_only: bool,
    /// Include conversations in which the caller has never received a message.
    pub include_never_received: bool,
}

impl Default for ConversationFilter {
    fn default() -> Self {
        Self {
            annotation: Annotation::None,
            unread_only: false,
            include_never_received: true,
        }
    }
}

impl ConversationFilter {
    fn to_query(&self) -> Result<ChatQuery> {
        let annotation = match self.annotation {
            Annotation::None => None,
            Annotation::Deleted => {
                return Err(ChatError::InvalidArgument(
                    "deleted conversations cannot be listed".into(),
                ));
            }
            other => Some(other),
        };
        if annotation.is_some() && self.unread_only {
            return Err(ChatError::InvalidArgument(
                "unread_only cannot be combined with an annotation filter".into(),
            ));
        }
        Ok(ChatQuery {
            annotation,
            unread_only: self.unread_only,
            include_never_received: self.include_never_received,
        })
    }
}

/// The conversation orchestrator.
///
/// Every public operation takes the tenant's bundle id and the acting user and
/// runs to completion on the calling thread. The service holds no state of its
/// own between calls; all of it lives in the [`Database`].
#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
    tenants: Arc<dyn TenantResolver>,
    media: Arc<dyn MediaFetcher>,
    resumes: Arc<dyn ResumeHandoff>,
}

impl ChatService {
    /// A service whose collaborators are all backed by `db`.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            tenants: db.clone(),
            media: db.clone(),
            resumes: db.clone(),
            db,
        }
    }

    pub fn with_tenants(mut self, tenants: Arc<dyn TenantResolver>) -> Self {
        self.tenants = tenants;
        self
    }

    pub fn with_media(mut self, media: Arc<dyn MediaFetcher>) -> Self {
        self.media = media;
        self
    }

    pub fn with_resumes(mut self, resumes: Arc<dyn ResumeHandoff>) -> Self {
        self.resumes = resumes;
        self
    }

    // -- Conversations --

    /// Return the conversation between `sender_id` and `receiver_id` (anchored to
    /// `post_id` when given), creating it if needed.
    ///
    /// A résumé requires a post. It is attached, together with a post message
    /// from the sender, only the first time; repeating the call returns the same
    /// id without attaching again.
    pub fn open_or_create(
        &self,
        bundle_id: &str,
        sender_id: &str,
        receiver_id: &str,
        post_id: Option<&str>,
        resume: Option<&serde_json::Value>,
    ) -> Result<String> {
        if sender_id.is_empty() || receiver_id.is_empty() {
            return Err(ChatError::InvalidArgument("participant id is empty".into()));
        }
        if sender_id == receiver_id {
            return Err(ChatError::InvalidArgument(format!(
                "{} cannot open a conversation with themselves",
                sender_id
            )));
        }
        let post_id = post_id.filter(|p| !p.is_empty());
        if resume.is_some() && post_id.is_none() {
            return Err(ChatError::InvalidArgument(
                "a resume hand-off needs a post id".into(),
            ));
        }

        let app_id = self.tenant(bundle_id)?;
        let (chat_id, created) = self
            .db
            .get_or_create_chat(&app_id, sender_id, receiver_id, post_id, Utc::now())
            .inspect_err(|e| {
                error!(app_id = %app_id, sender_id, receiver_id, "open conversation failed: {}", e)
            })?;

        if let (Some(content), Some(post_id)) = (resume, post_id) {
            self.hand_off_resume(&app_id, sender_id, receiver_id, &chat_id, post_id, content)?;
        }

        debug!(chat_id = %chat_id, created, "conversation opened");
        Ok(chat_id)
    }

    /// Attach the résumé and write its post message, skipping whichever step
    /// already landed, so a retry after a partial failure completes the pair.
    fn hand_off_resume(
        &self,
        app_id: &str,
        sender_id: &str,
        receiver_id: &str,
        chat_id: &str,
        post_id: &str,
        content: &serde_json::Value,
    ) -> Result<()> {
        if self.resumes.relation(chat_id)?.is_none() {
            let snapshot_id = self
                .resumes
                .attach(app_id, sender_id, chat_id, post_id, content)
                .inspect_err(|e| error!(chat_id, post_id, "resume attach failed: {}", e))?;
            info!(chat_id, post_id, snapshot_id = %snapshot_id, "resume attached");
        }

        let posted = self
            .db
            .add_reference_message(&NewMessage {
                conversation_id: chat_id,
                sender_id,
                receiver_id,
                kind: MessageKind::Post,
                body: None,
                media_ids: &[],
                reply_to_id: None,
                reference_id: Some(post_id),
                created_at: Utc::now(),
            })
            .inspect_err(|e| error!(chat_id, post_id, "post message failed: {}", e))?;
        if let Some(message_id) = posted {
            info!(chat_id, post_id, message_id = %message_id, "resume handed off");
        }
        Ok(())
    }

    /// The caller's view of one conversation. A résumé that cannot be loaded
    /// fails the call; a last message that cannot be loaded is left out.
    pub fn get(&self, bundle_id: &str, actor_id: &str, chat_id: &str) -> Result<ConversationView> {
        let app_id = self.tenant(bundle_id)?;
        let row = self.db.get_chat(&app_id, chat_id, actor_id)?;
        self.conversation_view(&row, true)
    }

    /// The caller's conversations. Conversations without a post come first,
    /// pinned ones next, then the most recently updated.
    pub fn list_conversations(
        &self,
        bundle_id: &str,
        actor_id: &str,
        cursor: &str,
        limit: u32,
        filter: &ConversationFilter,
    ) -> Result<ConversationPage> {
        check_limit(limit)?;
        let query = filter.to_query()?;
        let after = parse_chat_cursor(cursor)?;
        let app_id = self.tenant(bundle_id)?;

        let rows = self
            .db
            .list_chats(&app_id, actor_id, after.as_ref(), limit.saturating_add(1), &query)
            .inspect_err(|e| error!(app_id = %app_id, actor_id, "list conversations failed: {}", e))?;
        let (rows, next) = split_page(rows, limit as usize, |r| {
            encode_chat_cursor(&ChatPosition::of(r))
        });

        let chats = rows
            .iter()
            .map(|row| self.conversation_view(row, false))
            .collect::<Result<Vec<_>>>()?;
        Ok(ConversationPage { chats, next })
    }

    /// Zero the caller's unread count and stamp their read watermark.
    pub fn mark_read(&self, bundle_id: &str, actor_id: &str, chat_id: &str) -> Result<()> {
        self.own_chat(bundle_id, actor_id, chat_id)?;
        self.db.read_chat(chat_id, actor_id, Utc::now())?;
        debug!(chat_id, actor_id, "conversation read");
        Ok(())
    }

    pub fn annotate(
        &self,
        bundle_id: &str,
        actor_id: &str,
        chat_id: &str,
        annotation: Annotation,
    ) -> Result<()> {
        self.own_chat(bundle_id, actor_id, chat_id)?;
        self.db.annotate_chat(chat_id, actor_id, annotation)?;
        debug!(chat_id, actor_id, ?annotation, "conversation annotated");
        Ok(())
    }

    pub fn pin(&self, bundle_id: &str, actor_id: &str, chat_id: &str, is_pinned: bool) -> Result<()> {
        self.own_chat(bundle_id, actor_id, chat_id)?;
        self.db.pin_chat(chat_id, actor_id, is_pinned)?;
        debug!(chat_id, actor_id, is_pinned, "conversation pinned");
        Ok(())
    }

    // -- Messages --

    /// One page of messages older than `cursor`, newest first, as the caller sees
    /// them. Rows hidden from the caller are dropped from the page, but `next`
    /// is taken from the unfiltered fetch so no row is skipped.
    pub fn list_messages(
        &self,
        bundle_id: &str,
        actor_id: &str,
        chat_id: &str,
        cursor: &str,
        limit: u32,
    ) -> Result<MessagePage> {
        check_limit(limit)?;
        let cursor = Cursor::parse(cursor, Utc::now())?;
        self.own_chat(bundle_id, actor_id, chat_id)?;

        let rows = self
            .db
            .list_messages(
                chat_id,
                cursor.before,
                cursor.before_id.as_deref(),
                limit.saturating_add(1),
            )
            .inspect_err(|e| error!(chat_id, "list messages failed: {}", e))?;
        let (rows, next) = split_page(rows, limit as usize, |r| Cursor::encode(r.created_at, &r.id));

        let messages = self.render(&rows, actor_id)?;
        Ok(MessagePage { messages, next })
    }

    /// Every message newer than `last_message_id`, newest first.
    pub fn fetch_new_messages(
        &self,
        bundle_id: &str,
        actor_id: &str,
        chat_id: &str,
        last_message_id: &str,
    ) -> Result<Vec<MessageView>> {
        self.own_chat(bundle_id, actor_id, chat_id)?;

        let anchor = self.db.get_message(last_message_id)?;
        if anchor.conversation_id != chat_id {
            return Err(ChatError::NotFound(format!(
                "message {} in chat {}",
                last_message_id, chat_id
            )));
        }

        let rows = self
            .db
            .list_messages_after(chat_id, anchor.created_at, &anchor.id)
            .inspect_err(|e| error!(chat_id, last_message_id, "fetch new messages failed: {}", e))?;
        self.render(&rows, actor_id)
    }

    /// Store a message from the caller to the other participant and return it
    /// as the caller sees it.
    pub fn send_message(
        &self,
        bundle_id: &str,
        actor_id: &str,
        chat_id: &str,
        draft: MessageDraft,
    ) -> Result<MessageView> {
        draft.validate()?;
        let chat = self.own_chat(bundle_id, actor_id, chat_id)?;
        self.check_reply_target(chat_id, &draft)?;

        let message_id = self
            .db
            .add_message(&new_message(&chat, actor_id, &draft))
            .inspect_err(|e| error!(chat_id, actor_id, "send failed: {}", e))?;
        info!(chat_id, message_id = %message_id, kind = ?draft.kind(), "message sent");

        let stored = self.db.get_message(&message_id)?;
        self.render(std::slice::from_ref(&stored), actor_id)?
            .pop()
            .ok_or_else(|| ChatError::NotFound(format!("message {}", message_id)))
    }

    /// Store several messages from the caller in one transaction, in order.
    /// Either all of them land or none do. Returns them oldest first.
    pub fn send_messages(
        &self,
        bundle_id: &str,
        actor_id: &str,
        chat_id: &str,
        drafts: &[MessageDraft],
    ) -> Result<Vec<MessageView>> {
        if drafts.is_empty() {
            return Err(ChatError::InvalidArgument("no messages to send".into()));
        }
        for draft in drafts {
            draft.validate()?;
        }
        let chat = self.own_chat(bundle_id, actor_id, chat_id)?;
        for draft in drafts {
            self.check_reply_target(chat_id, draft)?;
        }

        let batch: Vec<NewMessage<'_>> = drafts
            .iter()
            .map(|draft| new_message(&chat, actor_id, draft))
            .collect();
        let ids = self
            .db
            .add_messages(&batch)
            .inspect_err(|e| error!(chat_id, actor_id, count = drafts.len(), "batch send failed: {}", e))?;
        info!(chat_id, count = ids.len(), "messages sent");

        let mut stored = self.db.get_messages_by_ids(&ids)?;
        stored.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.render(&stored, actor_id)
    }

    /// Withdraw the caller's own message for both sides.
    ///
    /// Repeating an unsend, or unsending a message the caller already deleted,
    /// succeeds without change. Any other prior status change by the other side
    /// makes the message no longer unsendable.
    pub fn unsend_message(&self, bundle_id: &str, actor_id: &str, message_id: &str) -> Result<()> {
        let msg = self.participant_message(bundle_id, actor_id, message_id)?;
        if msg.sender_id != actor_id {
            warn!(message_id, actor_id, "unsend by non-sender refused");
            return Err(ChatError::PermissionDenied(format!(
                "{} did not send message {}",
                actor_id, message_id
            )));
        }

        let done = MessageStatus::UNSENT | MessageStatus::DELETED_BY_SENDER;
        if msg.status.intersects(done) {
            debug!(message_id, status = %msg.status, "already unsent");
            return Ok(());
        }
        if !msg.status.is_normal() {
            return Err(ChatError::PermissionDenied(format!(
                "message {} is {}",
                message_id, msg.status
            )));
        }

        if !self
            .db
            .set_message_status_if(message_id, MessageStatus::NORMAL, MessageStatus::UNSENT)?
        {
            // Lost a race; succeed only if the winner left it in the target state.
            let status = self.db.get_message(message_id)?.status;
            if !status.intersects(done) {
                return Err(ChatError::PermissionDenied(format!(
                    "message {} is {}",
                    message_id, status
                )));
            }
        }

        info!(message_id, chat_id = %msg.conversation_id, "message unsent");
        Ok(())
    }

    /// Hide a message from the caller's own view only.
    pub fn delete_message(&self, bundle_id: &str, actor_id: &str, message_id: &str) -> Result<()> {
        let msg = self.participant_message(bundle_id, actor_id, message_id)?;
        let flag = if msg.sender_id == actor_id {
            MessageStatus::DELETED_BY_SENDER
        } else {
            MessageStatus::DELETED_BY_RECEIVER
        };

        let status = self.db.add_message_status(message_id, flag)?;
        info!(message_id, actor_id, status = %status, "message deleted for viewer");
        Ok(())
    }

    // -- Helpers --

    /// A reply must point at an existing message of the same conversation.
    fn check_reply_target(&self, chat_id: &str, draft: &MessageDraft) -> Result<()> {
        let Some(reply_id) = draft.reply_to_id() else {
            return Ok(());
        };
        let target = self.db.get_message(reply_id).map_err(|e| match ChatError::from(e) {
            ChatError::NotFound(what) => ChatError::InvalidArgument(format!("reply target {}", what)),
            other => other,
        })?;
        if target.conversation_id != chat_id {
            return Err(ChatError::InvalidArgument(format!(
                "reply target {} belongs to another chat",
                reply_id
            )));
        }
        Ok(())
    }

    fn tenant(&self, bundle_id: &str) -> Result<String> {
        self.tenants.resolve(bundle_id)
    }

    /// The caller's own thread in the conversation. Fails `NotFound` when the
    /// caller is not a participant of it within the tenant.
    fn own_chat(&self, bundle_id: &str, actor_id: &str, chat_id: &str) -> Result<ChatRow> {
        let app_id = self.tenant(bundle_id)?;
        Ok(self.db.get_chat(&app_id, chat_id, actor_id)?)
    }

    /// Load a message the caller takes part in, or `PermissionDenied`.
    fn participant_message(&self, bundle_id: &str, actor_id: &str, message_id: &str) -> Result<MessageRow> {
        let app_id = self.tenant(bundle_id)?;
        let msg = self.db.get_message(message_id)?;
        match self.db.get_chat(&app_id, &msg.conversation_id, actor_id) {
            Ok(_) => Ok(msg),
            Err(hire_db::StoreError::NotFound(_)) => {
                warn!(message_id, actor_id, "caller is not a participant");
                Err(ChatError::PermissionDenied(format!(
                    "{} is not a participant of chat {}",
                    actor_id, msg.conversation_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Project rows for `viewer_id`, dropping hidden ones, then attach reply
    /// targets one level deep and resolve media.
    fn render(&self, rows: &[MessageRow], viewer_id: &str) -> Result<Vec<MessageView>> {
        let visible: Vec<(&MessageRow, MessageView)> = rows
            .iter()
            .filter_map(|row| visibility::project(row, viewer_id).map(|view| (row, view)))
            .collect();

        let reply_ids: Vec<String> = visible
            .iter()
            .filter(|(_, view)| view.status == DisplayStatus::Normal)
            .filter_map(|(row, _)| row.reply_to_id.clone())
            .collect();
        let replies: HashMap<String, MessageRow> = self
            .db
            .get_messages_by_ids(&reply_ids)?
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();

        let views = visible
            .into_iter()
            .map(|(row, mut view)| {
                if view.status != DisplayStatus::Normal {
                    return view;
                }
                self.inject_media(&mut view, row);
                if let Some(reply_id) = &row.reply_to_id {
                    match replies.get(reply_id) {
                        Some(target) => {
                            let mut reply = visibility::project_reply(target, viewer_id);
                            self.inject_media(&mut reply, target);
                            view.reply_to = Some(Box::new(reply));
                        }
                        None => warn!(message_id = %row.id, reply_id = %reply_id, "reply target missing"),
                    }
                }
                view
            })
            .collect();
        Ok(views)
    }

    /// Best-effort media resolution for a visible media message.
    fn inject_media(&self, view: &mut MessageView, row: &MessageRow) {
        if view.status != DisplayStatus::Normal || !view.kind.has_media() || row.media_ids.is_empty() {
            return;
        }
        match self.media.fetch(&row.media_ids) {
            Ok(medias) => view.medias = medias,
            Err(e) => warn!(message_id = %row.id, "media fetch failed: {}", e),
        }
    }

    fn conversation_view(&self, row: &ChatRow, strict_resume: bool) -> Result<ConversationView> {
        let last_message = row
            .last_message_id
            .as_deref()
            .and_then(|id| self.last_message(row, id));

        let resume_snapshot = match row.post_id {
            Some(_) => match self.resume_attachment(&row.conversation_id) {
                Ok(found) => found,
                Err(e) if strict_resume => {
                    error!(chat_id = %row.conversation_id, "resume lookup failed: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(chat_id = %row.conversation_id, "resume lookup failed, skipping: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(ConversationView {
            chat_id: row.conversation_id.clone(),
            sender_id: row.owner_id.clone(),
            receiver_id: row.counterpart_id.clone(),
            unread_count: row.unread_count,
            last_seen_at: row.last_seen_at,
            status: row.annotation,
            is_pinned: row.is_pinned,
            never_received: row.control_flag.contains(ControlFlag::NEVER_RECEIVED),
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_message,
            post_id: row.post_id.clone(),
            resume_snapshot,
        })
    }

    fn last_message(&self, row: &ChatRow, message_id: &str) -> Option<MessageView> {
        let msg = match self.db.get_message(message_id) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(chat_id = %row.conversation_id, message_id, "last message lookup failed: {}", e);
                return None;
            }
        };
        let mut view = visibility::project_last(&msg, &row.owner_id)?;
        self.inject_media(&mut view, &msg);
        Some(view)
    }

    fn resume_attachment(&self, chat_id: &str) -> Result<Option<ResumeAttachment>> {
        let Some(link) = self.resumes.relation(chat_id)? else {
            return Ok(None);
        };
        let content = self.resumes.fetch_snapshot(&link.snapshot_id)?;
        Ok(Some(ResumeAttachment {
            id: link.snapshot_id,
            content,
            is_read: link.is_read,
            status: link.status,
        }))
    }
}

fn new_message<'a>(chat: &'a ChatRow, actor_id: &'a str, draft: &'a MessageDraft) -> NewMessage<'a> {
    NewMessage {
        conversation_id: &chat.conversation_id,
        sender_id: actor_id,
        receiver_id: &chat.counterpart_id,
        kind: draft.kind(),
        body: draft.body(),
        media_ids: draft.media_ids(),
        reply_to_id: draft.reply_to_id(),
        reference_id: None,
        created_at: Utc::now(),
    }
}

fn check_limit(limit: u32) -> Result<()> {
    if limit == 0 {
        return Err(ChatError::InvalidArgument("page limit must be positive".into()));
    }
    Ok(())
}

#![allow(dead_code)]

use std::sync::Arc;

use hire_chat::{ChatService, MessageDraft};
use hire_db::Database;
use hire_types::api::MessageView;

pub const BUNDLE: &str = "com.example.jobs";
pub const APP: &str = "app-1";

pub const SEEKER: &str = "seeker-a";
pub const RECRUITER: &str = "recruiter-b";

pub fn setup() -> (Arc<Database>, ChatService) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.create_app(APP, "Jobs", BUNDLE).unwrap();
    let service = ChatService::new(db.clone());
    (db, service)
}

pub fn text(body: &str) -> MessageDraft {
    MessageDraft::new().with_text(body).unwrap()
}

pub fn open(service: &ChatService, from: &str, to: &str) -> String {
    service.open_or_create(BUNDLE, from, to, None, None).unwrap()
}

pub fn send(service: &ChatService, from: &str, chat_id: &str, body: &str) -> MessageView {
    service.send_message(BUNDLE, from, chat_id, text(body)).unwrap()
}

/// Every message `viewer` can see, newest first, in one page.
pub fn all_messages(service: &ChatService, viewer: &str, chat_id: &str) -> Vec<MessageView> {
    let page = service
        .list_messages(BUNDLE, viewer, chat_id, "", 1_000)
        .unwrap();
    assert!(page.next.is_empty());
    page.messages
}

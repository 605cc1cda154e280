use std::fmt;
use std::ops::BitOr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A small set of named bit flags persisted as an integer column.
///
/// The generated type only offers union and membership tests, so a set that
/// must only ever grow (message status) cannot shrink by accident.
macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u8);

        impl $name {
            $($(#[$fmeta])* pub const $flag: Self = Self($bit);)+

            /// Every defined flag set at once.
            pub const ALL: Self = Self(0 $(| $bit)+);

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn bits(self) -> u8 {
                self.0
            }

            /// Rebuild from a stored integer. Bits outside the defined flags are rejected.
            pub fn from_bits(bits: i64) -> Option<Self> {
                u8::try_from(bits)
                    .ok()
                    .filter(|b| b & !Self::ALL.0 == 0)
                    .map(Self)
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// True when `self` has at least one flag of `other`.
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            /// True when `self` has every flag of `other`.
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            #[must_use]
            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }
    };
}

flag_set! {
    /// Per-message status. Bits accumulate by OR and are never cleared.
    MessageStatus {
        UNSENT = 1 << 0,
        DELETED_BY_SENDER = 1 << 1,
        DELETED_BY_RECEIVER = 1 << 2,
    }
}

impl MessageStatus {
    pub const NORMAL: Self = Self::empty();
    pub const UNAVAILABLE: Self = Self::ALL;

    pub const fn is_normal(self) -> bool {
        self.is_empty()
    }

    /// Whether the message is hidden from `viewer_id` because one side deleted it
    /// from their own view.
    pub fn is_deleted_for(self, sender_id: &str, viewer_id: &str) -> bool {
        if viewer_id == sender_id {
            self.intersects(Self::DELETED_BY_SENDER)
        } else {
            self.intersects(Self::DELETED_BY_RECEIVER)
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match *self {
            Self::NORMAL => "NORMAL",
            Self::UNSENT => "UNSENT",
            Self::DELETED_BY_SENDER | Self::DELETED_BY_RECEIVER => "DELETED",
            Self::UNAVAILABLE => "UNAVAILABLE",
            _ => "MIXED",
        };
        write!(f, "{}({:#05b})", label, self.0)
    }
}

flag_set! {
    /// Per-thread control state, independent of message status.
    ControlFlag {
        NEVER_RECEIVED = 1 << 0,
        BLOCKED = 1 << 1,
        HIDDEN_BY_ADMIN = 1 << 2,
    }
}

/// Message kind. Determines which payload fields a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Empty,
    Text,
    Image,
    Form,
    Meetup,
    File,
    Post,
}

impl MessageKind {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Empty => 0,
            Self::Text => 1,
            Self::Image => 2,
            Self::Form => 3,
            Self::Meetup => 4,
            Self::File => 5,
            Self::Post => 6,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        Some(match value {
            0 => Self::Empty,
            1 => Self::Text,
            2 => Self::Image,
            3 => Self::Form,
            4 => Self::Meetup,
            5 => Self::File,
            6 => Self::Post,
            _ => return None,
        })
    }

    pub fn has_body(self) -> bool {
        matches!(self, Self::Text)
    }

    pub fn has_media(self) -> bool {
        matches!(self, Self::Image | Self::File)
    }

    pub fn has_reference(self) -> bool {
        matches!(self, Self::Form | Self::Meetup | Self::Post)
    }
}

/// What a viewer is told about a message's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayStatus {
    Normal,
    Unsent,
    Unavailable,
}

/// A participant's own label on a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Annotation {
    #[default]
    None,
    Todo,
    Done,
    Deleted,
}

impl Annotation {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Todo => 1,
            Self::Done => 2,
            Self::Deleted => 3,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        Some(match value {
            0 => Self::None,
            1 => Self::Todo,
            2 => Self::Done,
            3 => Self::Deleted,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResumeStatus {
    #[default]
    Locked,
    Unlocked,
}

impl ResumeStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Locked => 0,
            Self::Unlocked => 1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Locked),
            1 => Some(Self::Unlocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    File,
}

impl MediaKind {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Image),
            2 => Some(Self::Audio),
            3 => Some(Self::Video),
            4 => Some(Self::File),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::Image => 1,
            Self::Audio => 2,
            Self::Video => 3,
            Self::File => 4,
        }
    }
}

/// Media record resolved for display. Owned by the media collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    #[serde(skip_serializing)]
    pub id: String,
    pub url: String,
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
}

/// Résumé snapshot attached to a post-anchored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeAttachment {
    pub id: String,
    pub content: serde_json::Value,
    pub is_read: bool,
    pub status: ResumeStatus,
}

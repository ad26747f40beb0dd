//! Wire protocol and shared domain types for chatterd.
//!
//! Everything that crosses the WebSocket boundary lives here: the JSON frame
//! envelope, the closed [`ClientIntent`] and [`ServerEvent`] unions, and the
//! document shapes the server persists (messages, groups, conversations,
//! friend lists). The server crate depends on this; clients can too.

mod event;
mod frame;
mod intent;
mod types;

pub use event::{AckBody, FriendRequestKind, GroupSummary, ServerEvent, ServerFrame, UserSummary};
pub use frame::{decode_client_frame, encode_server_frame, FrameError, MAX_FRAME_BYTES};
pub use intent::{ClientFrame, ClientIntent, ScopeRef};
pub use types::{
    conversation_key, Conversation, DeletePolicy, FileMeta, FriendLists, FriendRequest, Group,
    Message, MessageKind, MessageStatus, Provenance, Reaction, ReactionOutcome, ReactionPolicy,
    UserProfile, RECALL_PLACEHOLDER,
};

//! Database schemas for Growest Connect
//!
//! Row shapes for every table the service reads or writes. Each schema
//! declares its own indexes, including the unique constraints the request
//! workflow relies on for idempotence.

mod connection_request;
mod conversation;
mod credential;
mod notification;
mod profile;
mod project;
mod subscription;

pub use connection_request::{
    ConnectionRequest, PartyFilter, ProjectInterest, RequestStatus,
    CONNECTION_REQUEST_COLLECTION, PROJECT_INTEREST_COLLECTION,
};
pub use conversation::{Conversation, Message, CONVERSATION_COLLECTION, MESSAGE_COLLECTION};
pub use credential::{normalize_email, Credential, CREDENTIAL_COLLECTION};
pub use notification::{Notification, NotificationKind, NOTIFICATION_COLLECTION};
pub use profile::{Profile, ProfileFilter, ProfilePatch, PROFILE_COLLECTION};
pub use project::{Project, ProjectFilter, ProjectPatch, ProjectStatus, PROJECT_COLLECTION};
pub use subscription::{
    Subscription, SubscriptionStatus, Transaction, TransactionStatus, SUBSCRIPTION_COLLECTION,
    TRANSACTION_COLLECTION,
};

//! Conversations and messages

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::auth::Session;
use crate::db::{
    new_id, Conversation, Message, Notification, NotificationKind, MESSAGE_COLLECTION,
};
use crate::feed::ChangeOp;
use crate::services::notifications::notify_quietly;
use crate::services::{require_profile, required_text, ServiceContext};
use crate::types::{ConnectError, Result};

const MAX_MESSAGE_CHARS: usize = 5000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub content: String,
}

pub async fn list_conversations(ctx: &ServiceContext, session: &Session) -> Result<Vec<Conversation>> {
    let profile = require_profile(session)?;
    ctx.store.list_conversations(&profile.id).await
}

/// Conversation the caller takes part in
async fn participant_conversation(
    ctx: &ServiceContext,
    session: &Session,
    id: &str,
) -> Result<Conversation> {
    let profile = require_profile(session)?;
    ctx.store
        .get_conversation(id)
        .await?
        .filter(|c| c.has_participant(&profile.id))
        .ok_or_else(|| ConnectError::NotFound(format!("conversation {}", id)))
}

pub async fn list_messages(ctx: &ServiceContext, session: &Session, conversation_id: &str) -> Result<Vec<Message>> {
    let conversation = participant_conversation(ctx, session, conversation_id).await?;
    ctx.store.list_messages(&conversation.id).await
}

pub async fn send_message(
    ctx: &ServiceContext,
    session: &Session,
    conversation_id: &str,
    input: NewMessage,
) -> Result<Message> {
    let conversation = participant_conversation(ctx, session, conversation_id).await?;
    let sender = require_profile(session)?;
    let content = required_text("content", &input.content, MAX_MESSAGE_CHARS)?;

    let message = ctx
        .store
        .insert_message(Message {
            id: new_id(),
            conversation_id: conversation.id.clone(),
            sender_id: sender.id.clone(),
            content,
            read: false,
            created_at: Utc::now(),
        })
        .await?;
    ctx.store
        .touch_conversation(&conversation.id, message.created_at)
        .await?;

    debug!(conversation_id = %conversation.id, "Message sent");
    ctx.feed.publish(
        MESSAGE_COLLECTION,
        ChangeOp::Insert,
        &message,
        vec![
            conversation.investor_id.clone(),
            conversation.entrepreneur_id.clone(),
        ],
    );

    if let Some(recipient) = conversation.counterpart_of(&sender.id) {
        let preview: String = message.content.chars().take(120).collect();
        notify_quietly(
            ctx,
            Notification::new(
                recipient,
                NotificationKind::Message,
                format!("Nouveau message de {}", sender.full_name),
                preview,
            )
            .with_link(format!("/messages/{}", conversation.id)),
        )
        .await;
    }

    Ok(message)
}

/// Mark the counterpart's messages as read; returns how many changed
pub async fn mark_read(ctx: &ServiceContext, session: &Session, conversation_id: &str) -> Result<u64> {
    let conversation = participant_conversation(ctx, session, conversation_id).await?;
    let reader = require_profile(session)?;
    ctx.store.mark_messages_read(&conversation.id, &reader.id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::{ConnectionRequest, RequestStatus, Store};
    use crate::kyc::KycStatus;
    use crate::services::testing::{context, user};
    use crate::workflow::ensure_conversation;

    async fn open_conversation(ctx: &ServiceContext) -> Conversation {
        let request = ConnectionRequest {
            id: new_id(),
            investor_id: "inv".into(),
            entrepreneur_id: "ent".into(),
            project_id: "p1".into(),
            status: RequestStatus::Accepted,
            message: None,
            created_at: Utc::now(),
            responded_at: Some(Utc::now()),
        };
        ensure_conversation(ctx, &request).await.unwrap().0
    }

    #[tokio::test]
    async fn test_send_notifies_counterpart_and_touches() {
        let (ctx, store) = context();
        let inv = user(&ctx, "inv", Role::Investor, KycStatus::Approved).await;
        let ent = user(&ctx, "ent", Role::Entrepreneur, KycStatus::Approved).await;
        let conversation = open_conversation(&ctx).await;

        send_message(
            &ctx,
            &inv,
            &conversation.id,
            NewMessage {
                content: "Bonjour !".into(),
            },
        )
        .await
        .unwrap();

        let stored = store.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert!(stored.last_message_at.is_some());

        let notes = store.list_notifications("ent", true).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Message);

        assert_eq!(mark_read(&ctx, &inv, &conversation.id).await.unwrap(), 0);
        assert_eq!(mark_read(&ctx, &ent, &conversation.id).await.unwrap(), 1);
        let messages = list_messages(&ctx, &ent, &conversation.id).await.unwrap();
        assert!(messages[0].read);
    }

    #[tokio::test]
    async fn test_outsider_cannot_read_or_send() {
        let (ctx, _) = context();
        let outsider = user(&ctx, "x", Role::Investor, KycStatus::Approved).await;
        let conversation = open_conversation(&ctx).await;

        assert!(list_messages(&ctx, &outsider, &conversation.id).await.is_err());
        let err = send_message(
            &ctx,
            &outsider,
            &conversation.id,
            NewMessage {
                content: "hi".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (ctx, _) = context();
        let inv = user(&ctx, "inv", Role::Investor, KycStatus::Approved).await;
        let conversation = open_conversation(&ctx).await;
        let err = send_message(
            &ctx,
            &inv,
            &conversation.id,
            NewMessage {
                content: "   ".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.field(), Some("content"));
    }
}

//! Notifications

use tracing::warn;

use crate::auth::Session;
use crate::db::{Notification, NOTIFICATION_COLLECTION};
use crate::feed::ChangeOp;
use crate::services::{require_profile, ServiceContext};
use crate::types::{ConnectError, Result};

/// Store a notification and push it to the recipient's feed
pub async fn notify(ctx: &ServiceContext, notification: Notification) -> Result<Notification> {
    let notification = ctx.store.insert_notification(notification).await?;
    ctx.feed.publish(
        NOTIFICATION_COLLECTION,
        ChangeOp::Insert,
        &notification,
        vec![notification.user_id.clone()],
    );
    Ok(notification)
}

/// Fire-and-forget variant: a failed notification never fails the caller
pub async fn notify_quietly(ctx: &ServiceContext, notification: Notification) {
    let user_id = notification.user_id.clone();
    if let Err(e) = notify(ctx, notification).await {
        warn!(user_id = %user_id, "Failed to create notification: {}", e);
    }
}

pub async fn list(ctx: &ServiceContext, session: &Session, unread_only: bool) -> Result<Vec<Notification>> {
    let profile = require_profile(session)?;
    ctx.store.list_notifications(&profile.id, unread_only).await
}

pub async fn mark_read(ctx: &ServiceContext, session: &Session, id: &str) -> Result<()> {
    let profile = require_profile(session)?;
    if ctx.store.mark_notification_read(id, &profile.id).await? {
        Ok(())
    } else {
        Err(ConnectError::NotFound(format!("notification {}", id)))
    }
}

pub async fn mark_all_read(ctx: &ServiceContext, session: &Session) -> Result<u64> {
    let profile = require_profile(session)?;
    ctx.store.mark_all_notifications_read(&profile.id).await
}

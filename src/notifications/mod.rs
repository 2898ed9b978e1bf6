// src/notifications/mod.rs
// Notification creation and fan-out: persists first, then pushes to the
// recipient's user room if they have a live connection.

use std::sync::Arc;

use crate::domain::{DomainResult, Notification, NotificationKind};
use crate::registry::{user_room, ConnectionRegistry};
use crate::repo::{NewNotification, NotificationRepository};
use crate::ws::events::WsServerEvent;

pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    registry: Arc<ConnectionRegistry>,
}

impl NotificationService {
    pub fn new(notifications: Arc<dyn NotificationRepository>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { notifications, registry }
    }

    pub async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        title: String,
        body: String,
        data: serde_json::Value,
    ) -> DomainResult<Notification> {
        let notification = self
            .notifications
            .create(NewNotification { user_id: user_id.to_string(), kind, title, body, data })
            .await?;

        self.registry.broadcast(&user_room(user_id), &WsServerEvent::NewNotification { notification: notification.clone() }).await;
        Ok(notification)
    }

    pub async fn mark_read(&self, id: &str, user_id: &str) -> DomainResult<()> {
        self.notifications.mark_read(id, user_id).await
    }

    pub async fn mark_all_read(&self, user_id: &str) -> DomainResult<()> {
        self.notifications.mark_all_read(user_id).await
    }

    pub async fn list_unread(&self, user_id: &str) -> DomainResult<Vec<Notification>> {
        self.notifications.list_unread(user_id).await
    }
}

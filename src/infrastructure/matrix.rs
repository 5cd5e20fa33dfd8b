//! # Matrix Service Adapter
//!
//! Implements `ChatProvider` and `ChatTransport` for the Matrix protocol using `matrix_sdk`.
//! One client is built on first connect and reused by every later session; each
//! session registers its own event handlers and sync task and removes them on
//! disconnect.
//!
//! Targets starting with `!` are room IDs. Anything else is treated as a user ID and
//! the message goes to that user's direct room, created on demand.

use crate::domain::config::MatrixConfig;
use crate::domain::traits::{ChatProvider, ChatTransport};
use crate::domain::types::{ChatEvent, ChatMessage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use matrix_sdk::config::SyncSettings;
use matrix_sdk::event_handler::EventHandlerHandle;
use matrix_sdk::room::Room;
use matrix_sdk::ruma::events::room::member::{MembershipState, StrippedRoomMemberEvent};
use matrix_sdk::ruma::events::room::message::{
    MessageType, OriginalSyncRoomMessageEvent, Relation, RoomMessageEventContent,
    SyncRoomMessageEvent,
};
use matrix_sdk::ruma::events::room::redaction::OriginalSyncRoomRedactionEvent;
use matrix_sdk::ruma::{MilliSecondsSinceUnixEpoch, RoomId, UserId};
use matrix_sdk::Client;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

const EVENT_BUFFER: usize = 256;

/// Handlers and sync loop owned by one session.
struct Running {
    sync: JoinHandle<()>,
    handlers: Vec<EventHandlerHandle>,
}

pub struct MatrixService {
    config: MatrixConfig,
    client: Mutex<Option<Client>>,
    running: Mutex<Option<Running>>,
}

impl MatrixService {
    pub fn new(config: MatrixConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
            running: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<Client> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .homeserver_url(&self.config.homeserver)
            .build()
            .await
            .context("Failed to build Matrix client")?;
        *guard = Some(client.clone());
        Ok(client)
    }

    async fn connected_client(&self) -> Result<Client, String> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or_else(|| "Matrix client is not connected".to_string())
    }

    async fn resolve_room(&self, client: &Client, target: &str) -> Result<Room, String> {
        if target.starts_with('!') {
            let room_id = <&RoomId>::try_from(target).map_err(|e| e.to_string())?;
            return client
                .get_room(room_id)
                .ok_or_else(|| format!("Unknown room {target}"));
        }

        let user_id = <&UserId>::try_from(target).map_err(|e| e.to_string())?;
        if let Some(room) = client.get_dm_room(user_id) {
            return Ok(room);
        }
        tracing::info!("Creating direct room with {}", target);
        client.create_dm(user_id).await.map_err(|e| e.to_string())
    }

    async fn login(&self, client: &Client) -> Result<()> {
        if client.matrix_auth().logged_in() {
            return Ok(());
        }
        client
            .matrix_auth()
            .login_username(&self.config.username, &self.config.password)
            .send()
            .await
            .context("Matrix login failed")?;
        tracing::info!("Logged in as {}", self.config.username);

        if let Some(name) = &self.config.display_name
            && let Err(e) = client.account().set_display_name(Some(name.as_str())).await
        {
            tracing::warn!("Failed to set display name: {}", e);
        }
        Ok(())
    }

    fn register_handlers(client: &Client, tx: &mpsc::Sender<ChatEvent>) -> Vec<EventHandlerHandle> {
        let messages = tx.clone();
        let on_message = client.add_event_handler(move |ev: SyncRoomMessageEvent, room: Room| {
            let tx = messages.clone();
            async move {
                let Some(original) = ev.as_original() else {
                    return;
                };
                if original.sender == room.own_user_id() {
                    return;
                }
                let is_direct = room.is_direct().await.unwrap_or(false);
                if let Some(event) = message_event(original, &room, is_direct) {
                    let _ = tx.send(event).await;
                }
            }
        });

        let redactions = tx.clone();
        let on_redaction =
            client.add_event_handler(move |ev: OriginalSyncRoomRedactionEvent, room: Room| {
                let tx = redactions.clone();
                async move {
                    let redacted = ev.redacts.clone().or_else(|| ev.content.redacts.clone());
                    if let Some(event_id) = redacted {
                        let _ = tx
                            .send(ChatEvent::MessageDeleted {
                                room_id: room.room_id().to_string(),
                                event_id: event_id.to_string(),
                            })
                            .await;
                    }
                }
            });

        let on_invite = client.add_event_handler(|ev: StrippedRoomMemberEvent, room: Room| async move {
            if ev.content.membership != MembershipState::Invite {
                return;
            }
            tracing::info!("Joining room {}", room.room_id());
            if let Err(e) = room.join().await {
                tracing::warn!("Failed to join room {}: {}", room.room_id(), e);
            }
        });

        vec![on_message, on_redaction, on_invite]
    }
}

fn timestamp(ts: MilliSecondsSinceUnixEpoch) -> DateTime<Utc> {
    let millis = i64::try_from(u64::from(ts.get())).unwrap_or(i64::MAX);
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn text_body(msgtype: &MessageType) -> Option<String> {
    match msgtype {
        MessageType::Text(text) => Some(text.body.clone()),
        MessageType::Notice(notice) => Some(notice.body.clone()),
        _ => None,
    }
}

/// Maps a room message to a created or edited event. Non-text messages are ignored.
fn message_event(ev: &OriginalSyncRoomMessageEvent, room: &Room, is_direct: bool) -> Option<ChatEvent> {
    let message = |body: String| ChatMessage {
        event_id: ev.event_id.to_string(),
        room_id: room.room_id().to_string(),
        sender: ev.sender.to_string(),
        body,
        timestamp: timestamp(ev.origin_server_ts),
        is_direct,
    };

    match &ev.content.relates_to {
        Some(Relation::Replacement(replacement)) => {
            let body = text_body(&replacement.new_content.msgtype)?;
            Some(ChatEvent::MessageEdited {
                original_event_id: replacement.event_id.to_string(),
                message: message(body),
            })
        }
        _ => text_body(&ev.content.msgtype).map(|body| ChatEvent::MessageCreated(message(body))),
    }
}

#[async_trait]
impl ChatProvider for MatrixService {
    async fn send_message(&self, target: &str, content: &str) -> Result<String, String> {
        tracing::info!("Bot sending message to {}: {}", target, content);
        let client = self.connected_client().await?;
        let room = self.resolve_room(&client, target).await?;
        room.send(RoomMessageEventContent::text_markdown(content))
            .await
            .map(|resp| resp.event_id.to_string())
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ChatTransport for MatrixService {
    async fn connect(&self) -> Result<mpsc::Receiver<ChatEvent>> {
        let client = self.client().await?;
        self.login(&client).await?;

        // Catch up first so history is not replayed to the handlers
        let response = client
            .sync_once(SyncSettings::default())
            .await
            .context("Initial sync failed")?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handlers = Self::register_handlers(&client, &tx);
        let _ = tx.send(ChatEvent::Ready).await;

        let settings = SyncSettings::default().token(response.next_batch);
        let sync_client = client.clone();
        let sync = tokio::spawn(async move {
            let error = match sync_client.sync(settings).await {
                Ok(()) => None,
                Err(e) => Some(e.to_string()),
            };
            let _ = tx.send(ChatEvent::Disconnected { error }).await;
        });

        let previous = self.running.lock().await.replace(Running { sync, handlers });
        if let Some(previous) = previous {
            previous.sync.abort();
            for handle in previous.handlers {
                client.remove_event_handler(handle);
            }
        }
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        running.sync.abort();
        let _ = running.sync.await;

        if let Some(client) = self.client.lock().await.as_ref() {
            for handle in running.handlers {
                client.remove_event_handler(handle);
            }
        }
        Ok(())
    }
}

//! Process-wide directory of live rooms, plus connection admission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use tokio::{sync::mpsc, sync::RwLock, task::JoinHandle};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    client::Client,
    history,
    room::{Member, RoomHandle},
    AdmitError,
};
use crate::config::RealtimeConfig;
use crate::store::MessageStore;

pub struct Hub {
    rooms: RwLock<HashMap<String, RoomHandle>>,
    store: Arc<dyn MessageStore>,
    limits: RealtimeConfig,
}

impl Hub {
    pub fn new(store: Arc<dyn MessageStore>, limits: RealtimeConfig) -> Hub {
        Hub {
            rooms: RwLock::new(HashMap::new()),
            store,
            limits,
        }
    }

    pub fn limits(&self) -> &RealtimeConfig {
        &self.limits
    }

    pub async fn get_or_create_room(&self, room_id: &str) -> RoomHandle {
        if let Some(room) = self.rooms.read().await.get(room_id) {
            return room.clone();
        }

        let mut rooms = self.rooms.write().await;
        // someone may have created it between the two locks
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }
        let room = RoomHandle::spawn(room_id);
        rooms.insert(room_id.to_owned(), room.clone());
        room
    }

    /// Refuses rooms whose thread is missing or closed.
    pub async fn ensure_active(&self, room_id: &str) -> Result<(), AdmitError> {
        if self.store.is_thread_active(room_id).await? {
            Ok(())
        } else {
            Err(AdmitError::RoomNotFound(room_id.to_owned()))
        }
    }

    /// Brings a connection into a room: registers it, starts its history
    /// replay and both of its pumps.
    ///
    /// Delivery is best effort. A message goes live whether or not it was
    /// persisted, each connected member sees it at most once, and history
    /// is not ordered against live traffic that arrives during the replay.
    pub async fn admit(
        &self,
        room_id: &str,
        user_id: String,
        display_name: String,
        socket: WebSocket,
    ) -> Result<(), AdmitError> {
        self.ensure_active(room_id).await?;

        let id = Uuid::now_v7();
        let (mailbox, outbox) = mpsc::channel(self.limits.mailbox_capacity);

        tokio::spawn(history::replay(
            Arc::clone(&self.store),
            mailbox.clone(),
            room_id.to_owned(),
            self.limits.history_limit,
        ));
        let room = self.join(room_id, Member { id, mailbox }).await;
        info!(room = room_id, client = %id, user = %user_id, "client admitted");

        let client = Client {
            id,
            room,
            user_id,
            display_name,
            store: Arc::clone(&self.store),
            limits: self.limits,
        };
        tokio::spawn(client.run(socket, outbox));
        Ok(())
    }

    /// Registers with whatever room currently answers to `room_id`,
    /// stepping past rooms that retired under us.
    pub(crate) async fn join(&self, room_id: &str, member: Member) -> RoomHandle {
        let Member { id, mailbox } = member;
        loop {
            let room = self.get_or_create_room(room_id).await;
            let member = Member { id, mailbox: mailbox.clone() };
            match room.register(member).await {
                Ok(()) => return room,
                Err(_) => {
                    debug!(room = room_id, client = %id, "room retired during admission, retrying");
                    self.forget(&room).await;
                }
            }
        }
    }

    async fn forget(&self, room: &RoomHandle) {
        let mut rooms = self.rooms.write().await;
        if rooms.get(room.room_id()).is_some_and(|current| current.same_room(room)) {
            rooms.remove(room.room_id());
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Members of a live room, or `None` if the room is not in the directory.
    #[doc(hidden)]
    pub async fn member_count(&self, room_id: &str) -> Option<usize> {
        let room = self.rooms.read().await.get(room_id).cloned()?;
        Some(room.members().await.len())
    }

    /// Retires every room that is empty and has been idle for `idle_for`.
    /// Rooms are asked without holding the directory lock; an admission that
    /// meets a retiring room retries on a fresh one.
    pub async fn reap_idle_rooms(&self, idle_for: Duration) -> usize {
        let candidates: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();

        let mut retired = 0;
        for room in candidates {
            if room.try_retire(idle_for).await {
                self.forget(&room).await;
                retired += 1;
            }
        }

        if retired > 0 {
            info!(retired, "reaped idle rooms");
        }
        retired
    }

    pub fn spawn_reaper(self: Arc<Self>, every: Duration, idle_for: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.reap_idle_rooms(idle_for).await;
            }
        })
    }
}

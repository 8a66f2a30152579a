//! The per-room actor: sole owner of a room's membership and the single
//! point every register, unregister and broadcast passes through.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ClientId;

const COMMAND_BUFFER: usize = 256;

/// The room's view of one connection: where to deliver, nothing more.
/// Dropping it closes the connection's mailbox once every other sender is gone.
#[derive(Debug)]
pub struct Member {
    pub id: ClientId,
    pub mailbox: mpsc::Sender<Utf8Bytes>,
}

enum RoomCommand {
    Register {
        member: Member,
        joined: oneshot::Sender<()>,
    },
    Unregister(ClientId),
    Broadcast(Utf8Bytes),
    Members(oneshot::Sender<Vec<ClientId>>),
    Retire {
        idle_for: Duration,
        reply: oneshot::Sender<bool>,
    },
}

/// Cheap, cloneable address of a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: String,
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Starts the room's control loop.
    pub fn spawn(room_id: &str) -> RoomHandle {
        let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
        let actor = RoomActor {
            room_id: room_id.to_owned(),
            members: HashMap::new(),
            inbox,
            last_activity: Instant::now(),
        };
        tokio::spawn(actor.run());

        RoomHandle { room_id: room_id.to_owned(), commands }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Resolves once the member is in the room. Fails if the room retired
    /// before it got to the request.
    pub async fn register(&self, member: Member) -> Result<(), RoomClosed> {
        let (joined, admitted) = oneshot::channel();
        self.commands
            .send(RoomCommand::Register { member, joined })
            .await
            .map_err(|_| RoomClosed)?;
        admitted.await.map_err(|_| RoomClosed)
    }

    pub async fn unregister(&self, id: ClientId) {
        let _ = self.commands.send(RoomCommand::Unregister(id)).await;
    }

    /// Queues a payload for every member. Fails only if the room has retired.
    pub async fn broadcast(&self, payload: Utf8Bytes) -> Result<(), RoomClosed> {
        self.commands
            .send(RoomCommand::Broadcast(payload))
            .await
            .map_err(|_| RoomClosed)
    }

    pub(crate) async fn members(&self) -> Vec<ClientId> {
        let (reply, answer) = oneshot::channel();
        if self.commands.send(RoomCommand::Members(reply)).await.is_err() {
            return Vec::new();
        }
        answer.await.unwrap_or_default()
    }

    /// Asks the room to stop if it is empty and has been quiet for `idle_for`.
    /// A room that is already gone counts as retired.
    pub async fn try_retire(&self, idle_for: Duration) -> bool {
        let (reply, answer) = oneshot::channel();
        if self.commands.send(RoomCommand::Retire { idle_for, reply }).await.is_err() {
            return true;
        }
        answer.await.unwrap_or(true)
    }

    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.commands.same_channel(&other.commands)
    }

    /// A handle whose room accepts commands but never answers them.
    #[cfg(test)]
    pub(crate) fn unresponsive(room_id: &str) -> RoomHandle {
        let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(async move {
            let _inbox = inbox;
            std::future::pending::<()>().await
        });
        RoomHandle { room_id: room_id.to_owned(), commands }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("room has retired")]
pub struct RoomClosed;

struct RoomActor {
    room_id: String,
    members: HashMap<ClientId, Member>,
    inbox: mpsc::Receiver<RoomCommand>,
    last_activity: Instant,
}

impl RoomActor {
    async fn run(mut self) {
        info!(room = %self.room_id, "room started");

        while let Some(command) = self.inbox.recv().await {
            match command {
                RoomCommand::Register { member, joined } => {
                    self.register(member);
                    let _ = joined.send(());
                }
                RoomCommand::Unregister(id) => self.unregister(id),
                RoomCommand::Broadcast(payload) => self.broadcast(payload),
                RoomCommand::Members(reply) => {
                    let _ = reply.send(self.members.keys().copied().collect());
                }
                RoomCommand::Retire { idle_for, reply } => {
                    if !self.members.is_empty() || self.last_activity.elapsed() < idle_for {
                        let _ = reply.send(false);
                        continue;
                    }
                    self.close_inbox();
                    let _ = reply.send(true);
                    break;
                }
            }
        }

        info!(room = %self.room_id, "room retired");
    }

    /// Refuses new commands and turns away registrations already queued,
    /// so their callers can find a fresh room.
    fn close_inbox(&mut self) {
        self.inbox.close();
        while let Ok(command) = self.inbox.try_recv() {
            if let RoomCommand::Register { member, .. } = command {
                debug!(room = %self.room_id, client = %member.id, "turned away by retiring room");
            }
        }
    }

    fn register(&mut self, member: Member) {
        self.last_activity = Instant::now();
        let id = member.id;
        self.members.entry(id).or_insert(member);
        info!(room = %self.room_id, client = %id, total = self.members.len(), "+client");
    }

    fn unregister(&mut self, id: ClientId) {
        self.last_activity = Instant::now();
        if self.members.remove(&id).is_some() {
            info!(room = %self.room_id, client = %id, total = self.members.len(), "-client");
        }
    }

    /// Never waits on a member: a full mailbox gets its owner evicted.
    fn broadcast(&mut self, payload: Utf8Bytes) {
        self.last_activity = Instant::now();
        let room_id = &self.room_id;

        self.members.retain(|id, member| match member.mailbox.try_send(payload.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(room = %room_id, client = %id, "mailbox full, evicting slow client");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(room = %room_id, client = %id, "mailbox closed, dropping client");
                false
            }
        });
    }
}

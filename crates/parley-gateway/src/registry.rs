use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::notice::departure_notice;

/// Identity of one accepted connection. Display names are not unique.
pub type ConnId = Uuid;

/// A message queued for one connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Chat(Arc<str>),
    File(Arc<OutboundFile>),
}

impl Outbound {
    pub fn chat(text: impl Into<String>) -> Self {
        Self::Chat(Arc::from(text.into()))
    }
}

/// A local file to stream to a connection as a `FILE` frame.
#[derive(Debug)]
pub struct OutboundFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

/// A registered, handshaken connection.
#[derive(Debug)]
pub struct Member {
    pub name: String,
    pub addr: SocketAddr,
    pub outbound: mpsc::Sender<Outbound>,
}

impl Member {
    /// False once the connection's writer task has gone away.
    pub fn is_alive(&self) -> bool {
        !self.outbound.is_closed()
    }
}

/// The set of active connections.
///
/// One lock guards every operation, so a broadcast pass never interleaves
/// with a register or unregister. Sends only enqueue on the member's
/// channel; the lock is never held across socket I/O.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    members: Arc<Mutex<HashMap<ConnId, Member>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: ConnId, member: Member) {
        let mut members = self.members.lock().await;
        info!(
            username = %member.name,
            peer_addr = %member.addr,
            total_clients = members.len() + 1,
            "Client registered"
        );
        members.insert(id, member);
    }

    /// Remove a connection and tell everyone left.
    ///
    /// Returns the removed name, or `None` when the connection was already
    /// gone, in which case nobody is notified again.
    pub async fn unregister(&self, id: ConnId) -> Option<String> {
        let mut members = self.members.lock().await;
        let member = members.remove(&id)?;
        info!(
            username = %member.name,
            total_clients = members.len(),
            "Client unregistered"
        );

        let mut evicted = Vec::new();
        let notice = Outbound::chat(departure_notice(&member.name));
        deliver(&mut members, &notice, None, &mut evicted);
        announce_evictions(&mut members, evicted);

        Some(member.name)
    }

    /// Queue `message` for every member except `exclude`.
    ///
    /// Members whose connection has gone away are removed during the pass
    /// and their departure is announced to the rest. Returns how many
    /// members the message was queued for.
    pub async fn broadcast(&self, message: Outbound, exclude: Option<ConnId>) -> usize {
        let mut members = self.members.lock().await;
        let mut evicted = Vec::new();
        let delivered = deliver(&mut members, &message, exclude, &mut evicted);
        announce_evictions(&mut members, evicted);
        delivered
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn contains(&self, id: ConnId) -> bool {
        self.members.lock().await.contains_key(&id)
    }

    /// Display names of all members, sorted.
    pub async fn names(&self) -> Vec<String> {
        let members = self.members.lock().await;
        let mut names: Vec<String> = members.values().map(|m| m.name.clone()).collect();
        names.sort();
        names
    }
}

/// One pass over `members`. Dead members are moved into `evicted`.
fn deliver(
    members: &mut HashMap<ConnId, Member>,
    message: &Outbound,
    exclude: Option<ConnId>,
    evicted: &mut Vec<Member>,
) -> usize {
    let mut delivered = 0;
    let mut dead = Vec::new();

    for (id, member) in members.iter() {
        if exclude == Some(*id) {
            continue;
        }
        if !member.is_alive() {
            dead.push(*id);
            continue;
        }
        match member.outbound.try_send(message.clone()) {
            Ok(()) => delivered += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(username = %member.name, "Outbound queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
        }
    }

    for id in dead {
        if let Some(member) = members.remove(&id) {
            warn!(
                username = %member.name,
                peer_addr = %member.addr,
                "Send failed, removing client"
            );
            evicted.push(member);
        }
    }

    delivered
}

/// Send one departure notice per evicted member. Those notices can evict
/// further members, which are announced in turn.
fn announce_evictions(members: &mut HashMap<ConnId, Member>, mut evicted: Vec<Member>) {
    let mut next = 0;
    while next < evicted.len() {
        let notice = Outbound::chat(departure_notice(&evicted[next].name));
        deliver(members, &notice, None, &mut evicted);
        next += 1;
    }
}

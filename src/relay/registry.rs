//! Channel registry and role assignment.
//!
//! The registry owns the process-wide map from channel name to channel
//! entry and the single mutex guarding both the map and the role slots.
//! Lock scope covers slot/map mutation only; notifications and any
//! other I/O happen outside the lock. Each slot holds at most one
//! occupant, so it is an `Option`, not a collection.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::{Frame, Role};

/// Send capability for a connected peer.
///
/// Cloning does not transfer ownership of the connection; frames are
/// queued to the peer's writer task and the queue push never blocks.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: u64,
    tx: mpsc::UnboundedSender<Frame>,
}

impl PeerHandle {
    pub fn new(id: u64, tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a frame for the peer's writer task.
    pub fn send(&self, frame: Frame) -> Result<()> {
        self.tx.send(frame).map_err(|_| Error::ConnectionClosed)
    }
}

/// A named rendezvous point: at most one sender and one receiver.
#[derive(Debug, Default)]
struct Channel {
    sender: Option<PeerHandle>,
    receiver: Option<PeerHandle>,
}

impl Channel {
    fn is_empty(&self) -> bool {
        self.sender.is_none() && self.receiver.is_none()
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<PeerHandle> {
        match role {
            Role::Sender => &mut self.sender,
            Role::Receiver => &mut self.receiver,
        }
    }
}

/// Outcome of a successful role assignment.
#[derive(Debug)]
pub enum Assignment {
    Sender,
    /// Receiver accepted. Carries the paired sender's handle so the
    /// caller can deliver the ready notification outside the lock.
    Receiver { sender: PeerHandle },
}

/// Process-wide map from channel name to channel entry.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Channel>> {
        // The map holds no invariants that a panicked holder could
        // break mid-update; recover instead of poisoning the relay.
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the channel if absent. Atomic with respect to concurrent
    /// joins on the same name; returns true if a new entry was created.
    pub fn get_or_create(&self, name: &str) -> bool {
        let mut map = self.lock();
        if map.contains_key(name) {
            false
        } else {
            map.insert(name.to_string(), Channel::default());
            true
        }
    }

    /// Attempt to occupy a role slot.
    ///
    /// Sender: accepted iff the sender slot is empty. Receiver: rejected
    /// while no sender is connected or while the receiver slot is
    /// occupied. The channel is created if it vanished between join and
    /// role selection (both slots were empty and it was reaped).
    pub fn try_assign(&self, name: &str, role: Role, peer: PeerHandle) -> Result<Assignment> {
        let mut map = self.lock();
        let channel = map.entry(name.to_string()).or_default();

        match role {
            Role::Sender => {
                if channel.sender.is_some() {
                    return Err(Error::RoleConflict(
                        "Cannot join as sender: sender already connected".into(),
                    ));
                }
                channel.sender = Some(peer);
                Ok(Assignment::Sender)
            }
            Role::Receiver => {
                let Some(sender) = channel.sender.clone() else {
                    return Err(Error::RoleConflict(
                        "Cannot join as receiver: no sender connected".into(),
                    ));
                };
                if channel.receiver.is_some() {
                    return Err(Error::RoleConflict(
                        "Cannot join as receiver: receiver already connected".into(),
                    ));
                }
                channel.receiver = Some(peer);
                Ok(Assignment::Receiver { sender })
            }
        }
    }

    /// Clear a session's slot, then reap the channel if both slots are
    /// empty — a single critical section, so a concurrent join cannot
    /// observe a half-cleared channel. Returns true if the channel was
    /// removed.
    pub fn remove_peer(&self, name: &str, role: Role, peer_id: u64) -> bool {
        let mut map = self.lock();
        let Some(channel) = map.get_mut(name) else {
            return false;
        };
        let slot = channel.slot_mut(role);
        if slot.as_ref().is_some_and(|p| p.id() == peer_id) {
            *slot = None;
        }
        if channel.is_empty() {
            map.remove(name);
            true
        } else {
            false
        }
    }

    /// Delete the entry only if both slots are empty at the time of the
    /// call. The emptiness check and the delete share one lock.
    pub fn remove_if_empty(&self, name: &str) -> bool {
        let mut map = self.lock();
        match map.get(name) {
            Some(channel) if channel.is_empty() => {
                map.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Current receiver handle for a channel, if any.
    pub fn receiver_of(&self, name: &str) -> Option<PeerHandle> {
        self.lock().get(name).and_then(|c| c.receiver.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn handle(id: u64) -> (PeerHandle, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PeerHandle::new(id, tx), rx)
    }

    #[test]
    fn test_sender_slot_exclusive() {
        let registry = ChannelRegistry::new();
        let (first, _rx1) = handle(1);
        let (second, _rx2) = handle(2);

        assert!(matches!(
            registry.try_assign("x", Role::Sender, first),
            Ok(Assignment::Sender)
        ));
        let err = registry
            .try_assign("x", Role::Sender, second)
            .unwrap_err();
        assert!(matches!(err, Error::RoleConflict(_)));
        assert_eq!(
            err.to_string(),
            "Cannot join as sender: sender already connected"
        );
    }

    #[test]
    fn test_receiver_requires_sender() {
        let registry = ChannelRegistry::new();
        let (receiver, _rx) = handle(1);

        let err = registry
            .try_assign("y", Role::Receiver, receiver.clone())
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot join as receiver: no sender connected");

        // The rejection must not have mutated the receiver slot.
        assert!(registry.receiver_of("y").is_none());

        let (sender, _stx) = handle(2);
        registry.try_assign("y", Role::Sender, sender).unwrap();
        let assignment = registry.try_assign("y", Role::Receiver, receiver).unwrap();
        assert!(matches!(assignment, Assignment::Receiver { .. }));
    }

    #[test]
    fn test_receiver_slot_exclusive() {
        let registry = ChannelRegistry::new();
        let (sender, _s) = handle(1);
        let (first, _r1) = handle(2);
        let (second, _r2) = handle(3);

        registry.try_assign("x", Role::Sender, sender).unwrap();
        registry.try_assign("x", Role::Receiver, first).unwrap();
        let err = registry
            .try_assign("x", Role::Receiver, second)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot join as receiver: receiver already connected"
        );
    }

    #[test]
    fn test_assignment_carries_sender_for_ready() {
        let registry = ChannelRegistry::new();
        let (sender, mut sender_rx) = handle(1);
        let (receiver, _r) = handle(2);

        registry.try_assign("x", Role::Sender, sender).unwrap();
        let Assignment::Receiver { sender } =
            registry.try_assign("x", Role::Receiver, receiver).unwrap()
        else {
            panic!("expected receiver assignment");
        };

        sender.send(Frame::text(b"ready".to_vec())).unwrap();
        assert!(sender_rx.try_recv().is_ok());
    }

    #[test]
    fn test_remove_peer_reaps_empty_channel() {
        let registry = ChannelRegistry::new();
        let (sender, _s) = handle(1);
        let (receiver, _r) = handle(2);

        registry.try_assign("x", Role::Sender, sender).unwrap();
        registry.try_assign("x", Role::Receiver, receiver).unwrap();

        assert!(!registry.remove_peer("x", Role::Sender, 1));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove_peer("x", Role::Receiver, 2));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_peer_ignores_stale_id() {
        let registry = ChannelRegistry::new();
        let (sender, _s) = handle(7);
        registry.try_assign("x", Role::Sender, sender).unwrap();

        // A stale cleanup from a different session must not clear the slot.
        assert!(!registry.remove_peer("x", Role::Sender, 99));
        let (second, _s2) = handle(8);
        assert!(registry.try_assign("x", Role::Sender, second).is_err());
    }

    #[test]
    fn test_remove_if_empty_keeps_occupied_channel() {
        let registry = ChannelRegistry::new();
        let (sender, _s) = handle(1);
        registry.try_assign("x", Role::Sender, sender).unwrap();

        assert!(!registry.remove_if_empty("x"));
        assert_eq!(registry.len(), 1);

        registry.remove_peer("x", Role::Sender, 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_no_stale_state_after_reap() {
        let registry = ChannelRegistry::new();
        let (sender, _s) = handle(1);
        registry.try_assign("x", Role::Sender, sender).unwrap();
        registry.remove_peer("x", Role::Sender, 1);

        // A fresh join on the same name sees an empty channel.
        assert!(registry.get_or_create("x"));
        let (receiver, _r) = handle(2);
        let err = registry.try_assign("x", Role::Receiver, receiver).unwrap_err();
        assert_eq!(err.to_string(), "Cannot join as receiver: no sender connected");
    }

    #[test]
    fn test_try_assign_linearizable_under_contention() {
        let registry = Arc::new(ChannelRegistry::new());
        let mut workers = Vec::new();

        for id in 0..32u64 {
            let registry = Arc::clone(&registry);
            workers.push(std::thread::spawn(move || {
                let (peer, rx) = {
                    let (tx, rx) = mpsc::unbounded_channel();
                    (PeerHandle::new(id, tx), rx)
                };
                let accepted = registry.try_assign("contended", Role::Sender, peer).is_ok();
                (accepted, rx)
            }));
        }

        let accepted = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|(ok, _)| *ok)
            .count();
        assert_eq!(accepted, 1);
    }
}

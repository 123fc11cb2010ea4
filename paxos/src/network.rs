//! In-memory point-to-point transport.
//!
//! Every process owns one inbox; every endpoint holds a sender to every other
//! inbox and a weak sender to its own. Once every peer endpoint is gone the
//! inbox closes after draining. Channels preserve order per sender/receiver
//! pair and never drop or duplicate messages. There is no broadcast
//! primitive: [`Target::All`] is delivered as a loop of unicast sends.

use tokio::sync::mpsc;
use tracing::trace;

use crate::core::{Message, Outgoing, ProcessId, Target};

/// A message together with the process that sent it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope<V> {
    pub from: ProcessId,
    pub message: Message<V>,
}

#[derive(Debug)]
enum Link<V> {
    Peer(mpsc::UnboundedSender<Envelope<V>>),
    /// A process's own inbox must not keep itself open
    Loopback(mpsc::WeakUnboundedSender<Envelope<V>>),
}

impl<V> Link<V> {
    fn send(&self, envelope: Envelope<V>) -> bool {
        match self {
            Self::Peer(tx) => tx.send(envelope).is_ok(),
            Self::Loopback(tx) => tx.upgrade().is_some_and(|tx| tx.send(envelope).is_ok()),
        }
    }
}

/// One process's view of the network: its inbox and a link to every process.
#[derive(Debug)]
pub struct Endpoint<V> {
    id: ProcessId,
    links: Vec<Link<V>>,
    inbox: mpsc::UnboundedReceiver<Envelope<V>>,
}

/// Build a fully connected network of `num_processes` endpoints.
///
/// Endpoint `i` belongs to `ProcessId(i)`.
#[must_use]
pub fn mesh<V>(num_processes: usize) -> Vec<Endpoint<V>> {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..num_processes)
        .map(|_| mpsc::unbounded_channel())
        .unzip();

    receivers
        .into_iter()
        .enumerate()
        .map(|(i, inbox)| {
            let links = senders
                .iter()
                .enumerate()
                .map(|(j, tx)| {
                    if i == j {
                        Link::Loopback(tx.downgrade())
                    } else {
                        Link::Peer(tx.clone())
                    }
                })
                .collect();
            Endpoint {
                id: ProcessId(i),
                links,
                inbox,
            }
        })
        .collect()
}

impl<V: Clone> Endpoint<V> {
    #[must_use]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    #[must_use]
    pub fn num_processes(&self) -> usize {
        self.links.len()
    }

    /// Wait for the next message. `None` once every peer endpoint is gone and
    /// the inbox is drained.
    pub async fn recv(&mut self) -> Option<Envelope<V>> {
        self.inbox.recv().await
    }

    /// Take the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Envelope<V>> {
        self.inbox.try_recv().ok()
    }

    /// Unicast `message` to `to`.
    ///
    /// Sending to a process that has already terminated is not an error: it
    /// no longer participates, so the message is dropped.
    pub fn send(&self, to: ProcessId, message: Message<V>) {
        let Some(link) = self.links.get(to.0) else {
            trace!(from = %self.id, %to, "no such process, dropping message");
            return;
        };
        let kind = message.kind();
        let delivered = link.send(Envelope {
            from: self.id,
            message,
        });
        if !delivered {
            trace!(from = %self.id, %to, kind, "peer terminated, dropping message");
        }
    }

    /// Fan `message` out to every process, including this one.
    pub fn broadcast(&self, message: &Message<V>) {
        for to in 0..self.links.len() {
            self.send(ProcessId(to), message.clone());
        }
    }

    /// Send everything a state transition produced.
    pub fn dispatch(&self, outgoing: impl IntoIterator<Item = Outgoing<V>>) {
        for Outgoing { target, message } in outgoing {
            match target {
                Target::Process(to) => self.send(to, message),
                Target::All => self.broadcast(&message),
            }
        }
    }
}

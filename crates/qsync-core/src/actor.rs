//! Replica task
//!
//! Moves a `Replica` into a single tokio task so every change, inbound
//! delivery and timer expiry is processed one at a time by its only owner.
//! Callers talk to it through a `ReplicaHandle`.
//!
//! The delete confirmation timer is a spawned sleep that reports its token
//! back to the task; a confirming request or a newer request aborts it.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::merge::MergeOutcome;
use crate::models::Qso;
use crate::store::{DeleteRequest, Dispatch, Replica};
use crate::tabular::ImportSummary;

/// The replica task is gone
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Replica task has stopped")]
    Stopped,
}

pub type ActorResult<T> = std::result::Result<T, ActorError>;

/// Commands sent to the replica task
#[derive(Debug)]
enum Command {
    Add(Qso, oneshot::Sender<Dispatch>),
    Edit(Qso, oneshot::Sender<Dispatch>),
    RequestDelete(String, oneshot::Sender<DeleteRequest>),
    Import(String, oneshot::Sender<ImportSummary>),
    Poll(oneshot::Sender<MergeOutcome>),
    List(oneshot::Sender<Vec<Qso>>),
    Shutdown,
}

/// Snapshot of the replica published after every command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaStatus {
    pub records: usize,
    pub pending_delete: Option<String>,
}

/// Handle to control the replica task
pub struct ReplicaHandle {
    command_tx: mpsc::Sender<Command>,
    /// Watch record count and pending delete
    pub status_rx: watch::Receiver<ReplicaStatus>,
    task: JoinHandle<Replica>,
}

/// Owner of a replica inside its task
pub struct ReplicaActor {
    replica: Replica,
    confirm_window: Duration,
    commands: mpsc::Receiver<Command>,
    expire_tx: mpsc::UnboundedSender<u64>,
    expiries: mpsc::UnboundedReceiver<u64>,
    timer: Option<JoinHandle<()>>,
    status_tx: watch::Sender<ReplicaStatus>,
}

impl ReplicaActor {
    /// Spawn the replica task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(replica: Replica, confirm_window: Duration) -> ReplicaHandle {
        let (command_tx, commands) = mpsc::channel(16);
        let (expire_tx, expiries) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(status_of(&replica));

        let actor = ReplicaActor {
            replica,
            confirm_window,
            commands,
            expire_tx,
            expiries,
            timer: None,
            status_tx,
        };
        let task = tokio::spawn(actor.run());

        ReplicaHandle {
            command_tx,
            status_rx,
            task,
        }
    }

    async fn run(mut self) -> Replica {
        info!("Replica task started");
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.handle(cmd),
                    }
                }
                Some(token) = self.expiries.recv() => {
                    if self.replica.expire_pending(token) {
                        self.timer = None;
                        self.publish();
                    }
                }
            }
        }

        self.cancel_timer();
        info!("Replica task stopped");
        self.replica
    }

    /// Apply one command; status is published before the caller hears back
    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Add(qso, reply) => {
                let result = self.replica.add(qso);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Edit(qso, reply) => {
                let result = self.replica.edit(qso);
                self.publish();
                let _ = reply.send(result);
            }
            Command::RequestDelete(id, reply) => {
                let result = self.replica.request_delete(&id);
                match result {
                    DeleteRequest::Armed { token } => self.arm_timer(token),
                    DeleteRequest::Confirmed(_) => self.cancel_timer(),
                    DeleteRequest::NotFound => {}
                }
                self.publish();
                let _ = reply.send(result);
            }
            Command::Import(text, reply) => {
                let result = self.replica.import_csv(&text);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Poll(reply) => {
                let result = self.replica.poll();
                self.publish();
                let _ = reply.send(result);
            }
            Command::List(reply) => {
                let _ = reply.send(self.replica.records().to_vec());
            }
            Command::Shutdown => {}
        }
    }

    fn arm_timer(&mut self, token: u64) {
        self.cancel_timer();
        let expire_tx = self.expire_tx.clone();
        let window = self.confirm_window;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = expire_tx.send(token);
        }));
        debug!(token, ?window, "Delete confirmation timer armed");
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn publish(&self) {
        self.status_tx.send_if_modified(|status| {
            let next = status_of(&self.replica);
            if *status == next {
                false
            } else {
                *status = next;
                true
            }
        });
    }
}

fn status_of(replica: &Replica) -> ReplicaStatus {
    ReplicaStatus {
        records: replica.records().len(),
        pending_delete: replica.pending_delete().map(str::to_string),
    }
}

impl ReplicaHandle {
    pub async fn add(&self, qso: Qso) -> ActorResult<Dispatch> {
        self.request(|reply| Command::Add(qso, reply)).await
    }

    pub async fn edit(&self, qso: Qso) -> ActorResult<Dispatch> {
        self.request(|reply| Command::Edit(qso, reply)).await
    }

    /// Arm or confirm a delete; see `Replica::request_delete`
    pub async fn request_delete(&self, id: impl Into<String>) -> ActorResult<DeleteRequest> {
        let id = id.into();
        self.request(|reply| Command::RequestDelete(id, reply)).await
    }

    pub async fn import(&self, text: impl Into<String>) -> ActorResult<ImportSummary> {
        let text = text.into();
        self.request(|reply| Command::Import(text, reply)).await
    }

    pub async fn poll(&self) -> ActorResult<MergeOutcome> {
        self.request(Command::Poll).await
    }

    /// Contacts in display order
    pub async fn list(&self) -> ActorResult<Vec<Qso>> {
        self.request(Command::List).await
    }

    pub fn status(&self) -> ReplicaStatus {
        self.status_rx.borrow().clone()
    }

    /// Stop the task and take the replica back
    pub async fn shutdown(self) -> ActorResult<Replica> {
        let _ = self.command_tx.send(Command::Shutdown).await;
        self.task.await.map_err(|_| ActorError::Stopped)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> ActorResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| ActorError::Stopped)?;
        reply_rx.await.map_err(|_| ActorError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::LocalHub;

    const WINDOW: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_add_and_list() {
        let handle = ReplicaActor::spawn(Replica::new(), WINDOW);

        handle
            .add(Qso::with_id("a", "W1AW", "2024-01-01T00:00"))
            .await
            .unwrap();
        handle
            .add(Qso::with_id("b", "K1ABC", "2024-01-02T00:00"))
            .await
            .unwrap();

        let listed = handle.list().await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(handle.status().records, 2);

        let replica = handle.shutdown().await.unwrap();
        assert_eq!(replica.records().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_confirmed_within_window() {
        let handle = ReplicaActor::spawn(Replica::new(), WINDOW);
        handle
            .add(Qso::with_id("a", "W1AW", "2024-01-01T00:00"))
            .await
            .unwrap();

        let first = handle.request_delete("a").await.unwrap();
        assert!(matches!(first, DeleteRequest::Armed { .. }));
        assert_eq!(handle.status().pending_delete.as_deref(), Some("a"));

        let second = handle.request_delete("a").await.unwrap();
        assert!(matches!(second, DeleteRequest::Confirmed(_)));
        assert!(handle.list().await.unwrap().is_empty());

        // The aborted timer never clears anything later
        tokio::time::sleep(WINDOW * 3).await;
        assert!(handle.status().pending_delete.is_none());
    }

    #[tokio::test]
    async fn test_delete_expires_without_confirmation() {
        let handle = ReplicaActor::spawn(Replica::new(), WINDOW);
        handle
            .add(Qso::with_id("a", "W1AW", "2024-01-01T00:00"))
            .await
            .unwrap();

        handle.request_delete("a").await.unwrap();
        tokio::time::sleep(WINDOW * 4).await;

        assert!(handle.status().pending_delete.is_none());

        // After expiry the next request arms again instead of deleting
        let again = handle.request_delete("a").await.unwrap();
        assert!(matches!(again, DeleteRequest::Armed { .. }));
        assert_eq!(handle.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_import_and_poll_over_hub() {
        let hub = LocalHub::new(128_000);
        let handle = ReplicaActor::spawn(Replica::new().with_transport(hub.endpoint()), WINDOW);

        let summary = handle
            .import("callsign,dt\nW1AW,2024-01-01T00:00\nK1ABC,2024-01-01T00:10\n")
            .await
            .unwrap();
        assert_eq!(summary.imported, 2);
        assert!(handle.list().await.unwrap().is_empty());

        let outcome = handle.poll().await.unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(handle.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_commands_fail_after_shutdown() {
        let handle = ReplicaActor::spawn(Replica::new(), WINDOW);
        let command_tx = handle.command_tx.clone();
        handle.shutdown().await.unwrap();

        let (reply_tx, _reply_rx) = oneshot::channel();
        assert!(command_tx.send(Command::Poll(reply_tx)).await.is_err());
    }
}

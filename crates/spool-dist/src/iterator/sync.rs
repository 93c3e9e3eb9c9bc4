//! Acknowledgement barrier.
//!
//! For each command the synchronizer waits for one acknowledgement per
//! participating leaseholder. Late acknowledgements from prior commands are
//! skipped, duplicates from one node are counted once, and a single
//! negative acknowledgement fails the command immediately. A timeout fails
//! the command without tearing the pipeline down; a straggler may still
//! catch up on the next command.

use std::time::Duration;

use spool_core::{Address, NodeId};
use spool_flow::{Node, Outlet, Sink};
use tracing::warn;

use crate::iterator::protocol::{Command, Response};

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Synchronizer {
    address: Address,
    node_ids: Vec<NodeId>,
    timeout: Duration,
    input: Option<Outlet<Response>>,
}

impl Synchronizer {
    pub fn new(
        address: impl Into<Address>,
        node_ids: Vec<NodeId>,
        timeout: Duration,
    ) -> Synchronizer {
        Synchronizer {
            address: address.into(),
            node_ids,
            timeout,
            input: None,
        }
    }

    pub async fn sync(&mut self, command: Command) -> bool {
        self.sync_with_responses(command).await.1
    }

    /// Waits for one acknowledgement per participating leaseholder,
    /// returning the acknowledgements seen and whether they were
    /// unanimously positive.
    pub async fn sync_with_responses(&mut self, command: Command) -> (Vec<Response>, bool) {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut acknowledged: Vec<NodeId> = Vec::with_capacity(self.node_ids.len());
        let mut responses = Vec::with_capacity(self.node_ids.len());
        let input = match self.input.as_mut() {
            Some(input) => input,
            None => return (responses, false),
        };
        loop {
            let received = tokio::time::timeout_at(deadline, input.recv()).await;
            match received {
                Err(_) => {
                    warn!(?command, acked = acknowledged.len(), expected = self.node_ids.len(),
                        "timed out waiting for acknowledgements");
                    return (responses, false);
                }
                Ok(None) => {
                    warn!(?command, "acknowledgement stream closed before all nodes acked");
                    return (responses, false);
                }
                Ok(Some(response)) => {
                    // A late acknowledgement from a previous command.
                    if response.command != command {
                        continue;
                    }
                    if acknowledged.contains(&response.node_id) {
                        continue;
                    }
                    // One negative acknowledgement fails the whole command.
                    if !response.ack {
                        responses.push(response);
                        return (responses, false);
                    }
                    acknowledged.push(response.node_id);
                    responses.push(response);
                    if acknowledged.len() == self.node_ids.len() {
                        return (responses, true);
                    }
                }
            }
        }
    }
}

impl Node for Synchronizer {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl Sink<Response> for Synchronizer {
    fn in_from(&mut self, outlet: Outlet<Response>) {
        self.input = Some(outlet);
    }
}

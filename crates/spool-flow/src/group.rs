//! Supervised execution.
//!
//! A `TaskGroup` owns a cancellation token and a set of named tasks. Any
//! task that exits with an error cancels the token, which every other node
//! observes at its next suspension point. `wait` drains the set and reports
//! the first error.

use spool_core::Address;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::node::Flow;

pub struct TaskGroup {
    cancel: CancellationToken,
    tasks: JoinSet<(Address, anyhow::Result<()>)>,
}

impl TaskGroup {
    pub fn new(cancel: CancellationToken) -> TaskGroup {
        TaskGroup {
            cancel,
            tasks: JoinSet::new(),
        }
    }

    /// The group's cancellation token. Nodes receive a child of this token,
    /// so cancelling it stops the entire pipeline.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Spawns a node as a supervised task.
    pub fn spawn_flow(&mut self, node: Box<dyn Flow>) {
        let addr = node.address().clone();
        let token = self.cancel.child_token();
        self.tasks.spawn(async move {
            let result = node.flow(token).await;
            (addr, result)
        });
    }

    /// Spawns a bare future as a supervised task.
    pub fn spawn<F>(&mut self, addr: Address, fut: F)
    where
        F: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.tasks.spawn(async move { (addr, fut.await) });
    }

    /// Waits for every task to exit. The first task error cancels the rest
    /// of the group and is returned once the group has fully drained.
    pub async fn wait(&mut self) -> anyhow::Result<()> {
        let mut first: Option<anyhow::Error> = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((addr, Ok(()))) => debug!(node = %addr, "pipeline node exited"),
                Ok((addr, Err(err))) => {
                    error!(node = %addr, %err, "pipeline node failed");
                    if first.is_none() {
                        first = Some(err);
                    }
                    self.cancel.cancel();
                }
                Err(join_err) => {
                    if first.is_none() {
                        first = Some(join_err.into());
                    }
                    self.cancel.cancel();
                }
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test]
    async fn wait_returns_first_error_and_cancels_group() {
        let mut group = TaskGroup::new(CancellationToken::new());
        let token = group.token();
        group.spawn(Address::from("failing"), async { Err(anyhow!("boom")) });
        let observer = group.token();
        group.spawn(Address::from("cooperative"), async move {
            observer.cancelled().await;
            Ok(())
        });
        let err = group.wait().await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn wait_succeeds_when_all_tasks_exit_clean() {
        let mut group = TaskGroup::new(CancellationToken::new());
        group.spawn(Address::from("a"), async { Ok(()) });
        group.spawn(Address::from("b"), async { Ok(()) });
        assert!(group.wait().await.is_ok());
        assert!(!group.token().is_cancelled());
    }
}

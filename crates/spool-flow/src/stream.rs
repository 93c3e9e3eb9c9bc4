//! Typed streams between pipeline nodes.
//!
//! A stream is a bounded FIFO: sends suspend on backpressure, receives
//! suspend until a value arrives or every inlet has been dropped. Closure is
//! therefore an explicit signal (the channel closing) rather than an
//! in-band payload. Inlets clone, which is what makes `unary` stitching (a
//! single merged queue into one sink) a zero-cost pattern.

use tokio::sync::mpsc;

/// The sending side of a stream between pipeline nodes.
pub type Inlet<T> = mpsc::Sender<T>;

/// The receiving side of a stream between pipeline nodes.
pub type Outlet<T> = mpsc::Receiver<T>;

/// Opens a stream of the given buffer capacity.
pub fn stream<T>(capacity: usize) -> (Inlet<T>, Outlet<T>) {
    mpsc::channel(capacity.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_propagates_after_buffered_values() {
        let (tx, mut rx) = stream::<u32>(4);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn sends_block_on_backpressure() {
        let (tx, mut rx) = stream::<u32>(1);
        tx.send(1).await.unwrap();
        // The buffer is full, so a second send must not complete until the
        // consumer drains a value.
        let pending = tx.try_send(2);
        assert!(pending.is_err());
        assert_eq!(rx.recv().await, Some(1));
        tx.send(2).await.unwrap();
        assert_eq!(rx.recv().await, Some(2));
    }
}

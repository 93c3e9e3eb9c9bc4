//! Request emission.
//!
//! The emitter turns handle method calls into request records. It is wired
//! into the pipeline like any other source but is driven inline by the
//! handle rather than spawned: a traversal call emits here, then parks on
//! the synchronizer. With a single downstream (one client, or the
//! broadcaster) it has one output; routed directly against several clients
//! it duplicates each request to all of them.

use spool_core::{Address, TimeRange, TimeSpan, TimeStamp};
use spool_flow::{Inlet, Node, Source};

use crate::error::DistError;
use crate::iterator::protocol::{Command, Request};

pub struct Emitter {
    address: Address,
    outputs: Vec<Inlet<Request>>,
}

impl Emitter {
    pub fn new(address: impl Into<Address>) -> Emitter {
        Emitter {
            address: address.into(),
            outputs: Vec::new(),
        }
    }

    pub async fn next(&self) -> Result<(), DistError> {
        self.emit(Request::new(Command::Next)).await
    }

    pub async fn prev(&self) -> Result<(), DistError> {
        self.emit(Request::new(Command::Prev)).await
    }

    pub async fn first(&self) -> Result<(), DistError> {
        self.emit(Request::new(Command::First)).await
    }

    pub async fn last(&self) -> Result<(), DistError> {
        self.emit(Request::new(Command::Last)).await
    }

    pub async fn next_span(&self, span: TimeSpan) -> Result<(), DistError> {
        self.emit(Request {
            span,
            ..Request::new(Command::NextSpan)
        })
        .await
    }

    pub async fn prev_span(&self, span: TimeSpan) -> Result<(), DistError> {
        self.emit(Request {
            span,
            ..Request::new(Command::PrevSpan)
        })
        .await
    }

    pub async fn next_range(&self, range: TimeRange) -> Result<(), DistError> {
        self.emit(Request {
            range,
            ..Request::new(Command::NextRange)
        })
        .await
    }

    pub async fn seek_first(&self) -> Result<(), DistError> {
        self.emit(Request::new(Command::SeekFirst)).await
    }

    pub async fn seek_last(&self) -> Result<(), DistError> {
        self.emit(Request::new(Command::SeekLast)).await
    }

    pub async fn seek_lt(&self, stamp: TimeStamp) -> Result<(), DistError> {
        self.emit(Request {
            stamp,
            ..Request::new(Command::SeekLT)
        })
        .await
    }

    pub async fn seek_ge(&self, stamp: TimeStamp) -> Result<(), DistError> {
        self.emit(Request {
            stamp,
            ..Request::new(Command::SeekGE)
        })
        .await
    }

    pub async fn exhaust(&self) -> Result<(), DistError> {
        self.emit(Request::new(Command::Exhaust)).await
    }

    pub async fn valid(&self) -> Result<(), DistError> {
        self.emit(Request::new(Command::Valid)).await
    }

    pub async fn error(&self) -> Result<(), DistError> {
        self.emit(Request::new(Command::Error)).await
    }

    pub async fn close(&self) -> Result<(), DistError> {
        self.emit(Request::new(Command::Close)).await
    }

    async fn emit(&self, request: Request) -> Result<(), DistError> {
        if self.outputs.is_empty() {
            return Err(DistError::Internal("emitter is not wired".into()));
        }
        for out in &self.outputs {
            out.send(request.clone())
                .await
                .map_err(|_| DistError::Internal("request pipeline closed".into()))?;
        }
        Ok(())
    }
}

impl Node for Emitter {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl Source<Request> for Emitter {
    fn out_to(&mut self, inlet: Inlet<Request>) {
        self.outputs.push(inlet);
    }
}

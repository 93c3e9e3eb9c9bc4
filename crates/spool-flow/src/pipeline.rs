//! Pipeline assembly.
//!
//! Wiring happens in two steps: routers connect streams between concrete
//! nodes (which still live on the caller's stack), then the wired nodes are
//! registered under their addresses and started as a group. The pipeline
//! keeps a petgraph model of the topology for duplicate-address detection
//! and debug rendering.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use spool_core::Address;
use tracing::debug;

use crate::group::TaskGroup;
use crate::node::{Flow, FlowError, Sink, Source};
use crate::stream::stream;

/// How a multi-router connects its sources to its sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stitch {
    /// One merged queue per sink; every source sends into it. A slow source
    /// shares its queue with its siblings.
    Unary,
    /// One dedicated queue per (source, sink) pair, so no sink can be
    /// starved of one source's output by another source's backlog.
    Weave,
}

#[derive(Default)]
pub struct Pipeline {
    nodes: Vec<Box<dyn Flow>>,
    indices: HashMap<Address, NodeIndex>,
    graph: DiGraph<Address, usize>,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline::default()
    }

    /// Registers a wired node. Registering two nodes under one address is a
    /// programming error and fails the build.
    pub fn set(&mut self, node: Box<dyn Flow>) -> Result<(), FlowError> {
        let addr = node.address().clone();
        if self.nodes.iter().any(|n| n.address() == &addr) {
            return Err(FlowError::DuplicateAddress(addr));
        }
        self.index(&addr);
        self.nodes.push(node);
        Ok(())
    }

    /// Connects a single source to a single sink through one stream.
    pub fn route_unary<T: Send>(
        &mut self,
        source: &mut dyn Source<T>,
        sink: &mut dyn Sink<T>,
        capacity: usize,
    ) {
        let (tx, rx) = stream(capacity);
        self.edge(source.address().clone(), sink.address().clone(), capacity);
        source.out_to(tx);
        sink.in_from(rx);
    }

    /// Connects many sources to many sinks.
    ///
    /// `Stitch::Unary` gives each sink one merged queue that every source
    /// sends into. `Stitch::Weave` gives every (source, sink) pair its own
    /// queue of `capacity`.
    pub fn route_multi<T: Send>(
        &mut self,
        sources: &mut [&mut dyn Source<T>],
        sinks: &mut [&mut dyn Sink<T>],
        stitch: Stitch,
        capacity: usize,
    ) {
        match stitch {
            Stitch::Unary => {
                for sink in sinks.iter_mut() {
                    let (tx, rx) = stream(capacity);
                    for source in sources.iter_mut() {
                        self.edge(source.address().clone(), sink.address().clone(), capacity);
                        source.out_to(tx.clone());
                    }
                    sink.in_from(rx);
                }
            }
            Stitch::Weave => {
                for sink in sinks.iter_mut() {
                    for source in sources.iter_mut() {
                        let (tx, rx) = stream(capacity);
                        self.edge(source.address().clone(), sink.address().clone(), capacity);
                        source.out_to(tx);
                        sink.in_from(rx);
                    }
                }
            }
        }
    }

    /// Starts every registered node under the group's supervision.
    pub fn start(self, group: &mut TaskGroup) {
        for (from, to) in self.edges() {
            debug!(%from, %to, "pipeline edge");
        }
        for node in self.nodes {
            group.spawn_flow(node);
        }
    }

    fn edges(&self) -> Vec<(Address, Address)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].clone(), self.graph[b].clone()))
            .collect()
    }

    fn edge(&mut self, from: Address, to: Address, capacity: usize) {
        let from = self.index(&from);
        let to = self.index(&to);
        self.graph.add_edge(from, to, capacity);
    }

    fn index(&mut self, addr: &Address) -> NodeIndex {
        match self.indices.get(addr) {
            Some(ix) => *ix,
            None => {
                let ix = self.graph.add_node(addr.clone());
                self.indices.insert(addr.clone(), ix);
                ix
            }
        }
    }
}

//! Reusable storage for tokens and syntax-tree nodes.
//!
//! A compilation acquires a token buffer and one boxed slot per syntax node,
//! and hands them back once the tree has been converted. Pools are shared by
//! concurrent compilations, so the free lists sit behind a mutex and every
//! slot is cleared before it goes back on the list.

use std::sync::{
    LazyLock,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use tracing::trace;

use crate::ast::{Node, Token};

pub const DEFAULT_CAPACITY: usize = 4096;

/// Free list of boxed syntax-tree slots.
///
/// `acquire` and `release` must pair up: every node the parser acquires is
/// either part of the tree it returns or released on the error path, and a
/// tree is released once, after conversion. `outstanding` tracks the
/// difference, which makes leaks observable in tests.
pub struct NodePool {
    free: Mutex<Vec<Box<Node>>>,
    capacity: usize,
    outstanding: AtomicUsize,
}

impl NodePool {
    pub fn new(capacity: usize) -> Self {
        NodePool {
            free: Mutex::new(Vec::new()),
            capacity,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Place `node` into a recycled slot, or a new one when the list is empty.
    pub fn acquire(&self, node: Node) -> Box<Node> {
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        match self.free.lock().pop() {
            Some(mut slot) => {
                *slot = node;
                slot
            }
            None => Box::new(node),
        }
    }

    /// Return a subtree to the pool, children before their parent.
    pub fn release(&self, mut node: Box<Node>) {
        match std::mem::replace(&mut *node, Node::VACANT) {
            Node::Binary { left, right, .. } | Node::Comparison { left, right, .. } => {
                self.release(left);
                self.release(right);
            }
            Node::Unary { operand, .. } | Node::Group(operand) => self.release(operand),
            Node::FunctionCall { args, .. } => self.release_all(args),
            Node::Collection { items, .. } => self.release_all(items),
            Node::Lambda { predicate, .. } => {
                if let Some(predicate) = predicate {
                    self.release(predicate);
                }
            }
            Node::Identifier { .. } | Node::Literal { .. } => {}
        }

        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(node);
        }
    }

    pub fn release_all(&self, nodes: Vec<Box<Node>>) {
        for node in nodes {
            self.release(node);
        }
    }

    /// Slots currently waiting on the free list
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Nodes acquired and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }
}

/// Free list of token buffers.
pub struct TokenPool {
    free: Mutex<Vec<Vec<Token>>>,
    capacity: usize,
}

impl TokenPool {
    pub fn new(capacity: usize) -> Self {
        TokenPool {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// An empty buffer, recycled when one is available.
    pub fn acquire(&self) -> Vec<Token> {
        self.free.lock().pop().unwrap_or_default()
    }

    pub fn release(&self, mut tokens: Vec<Token>) {
        tokens.clear();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(tokens);
        } else {
            trace!("token pool full, dropping buffer");
        }
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

/// The node and token pools used by one compiler.
pub struct Pools {
    pub nodes: NodePool,
    pub tokens: TokenPool,
}

impl Pools {
    pub fn new(capacity: usize) -> Self {
        Pools {
            nodes: NodePool::new(capacity),
            tokens: TokenPool::new(capacity / 16 + 1),
        }
    }

    /// Process-wide pools, for callers that do not own a compiler.
    pub fn global() -> &'static Pools {
        static GLOBAL: LazyLock<Pools> = LazyLock::new(|| Pools::new(DEFAULT_CAPACITY));
        &GLOBAL
    }
}

impl Default for Pools {
    fn default() -> Self {
        Pools::new(DEFAULT_CAPACITY)
    }
}

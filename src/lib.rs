#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;

pub mod sources;

pub mod kind;

pub mod scope;

pub mod ast;

pub mod parser;
pub use parser::{parse, parse_str, ParseOptions};

pub mod builtin;

mod checker;
pub use checker::{check, check_references, semantic_pass};

mod linter;
pub use linter::{lint, LintOptions};

pub mod diagnostics;

pub mod codegen;

pub mod resolver;
pub use resolver::{resolve_graph, Visit};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Semaphore;

/// Ambient state threaded through parse and resolve pipelines: the
/// source-buffer registry, the remote-solve limiter, and cooperative
/// cancellation. There is no process-wide state; clone the context into
/// every task that needs it.
#[derive(Clone, Debug)]
pub struct Context {
    sources: sources::SourceRegistry,
    semaphore: Arc<Semaphore>,
    cancelled: Arc<AtomicBool>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl Context {
    /// Creates a context allowing at most `permits` concurrent remote
    /// solves.
    pub fn new(permits: usize) -> Self {
        Self {
            sources: sources::SourceRegistry::new(),
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The source-buffer registry diagnostics render from.
    pub fn sources(&self) -> &sources::SourceRegistry {
        &self.sources
    }

    /// The weighted semaphore throttling concurrent remote solves. A task
    /// acquires one unit before calling into the build engine and releases
    /// it on completion.
    pub fn semaphore(&self) -> &Arc<Semaphore> {
        &self.semaphore
    }

    /// Requests cooperative cancellation: every task checks the flag at its
    /// suspension points and tears down.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn check_cancelled(&self) -> error::Result<()> {
        if self.is_cancelled() {
            Err(error::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_cancellation() {
        let ctx = Context::default();
        assert!(!ctx.is_cancelled());
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.check_cancelled().is_err());
    }

    #[test]
    fn context_semaphore_limits() {
        let ctx = Context::new(2);
        let first = ctx.semaphore().clone().try_acquire_owned().unwrap();
        let _second = ctx.semaphore().clone().try_acquire_owned().unwrap();
        assert!(ctx.semaphore().clone().try_acquire_owned().is_err());
        drop(first);
        assert!(ctx.semaphore().clone().try_acquire_owned().is_ok());
    }
}

//! Lifecycle hooks
//!
//! Handlers are registered per operation and phase and run strictly in
//! registration order. Every handler has the same shape: it receives the
//! instance and resolves to the (possibly modified) instance. The first
//! failing handler stops the chain and the operation.

use futures_util::future::{self, BoxFuture};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::document::Instance;
use super::error::Result;

/// Operations that run hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Save,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Save => f.write_str("save"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

/// Uniform async handler
pub type HookFn = Arc<dyn Fn(Instance) -> BoxFuture<'static, Result<Instance>> + Send + Sync>;

/// Pre and post handlers of one model
#[derive(Clone, Default)]
pub struct Hooks {
    pre: HashMap<Operation, Vec<HookFn>>,
    post: HashMap<Operation, Vec<HookFn>>,
}

fn boxed<F, Fut>(handler: F) -> HookFn
where
    F: Fn(Instance) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Instance>> + Send + 'static,
{
    Arc::new(move |inst: Instance| -> BoxFuture<'static, Result<Instance>> {
        Box::pin(handler(inst))
    })
}

fn blocking<F>(handler: F) -> HookFn
where
    F: Fn(&mut Instance) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(move |mut inst: Instance| -> BoxFuture<'static, Result<Instance>> {
        let result = handler(&mut inst).map(|_| inst);
        Box::pin(future::ready(result))
    })
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async handler that runs before `op`
    pub fn pre<F, Fut>(&mut self, op: Operation, handler: F)
    where
        F: Fn(Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Instance>> + Send + 'static,
    {
        self.pre.entry(op).or_default().push(boxed(handler));
    }

    /// Register an async handler that runs after `op` succeeded
    pub fn post<F, Fut>(&mut self, op: Operation, handler: F)
    where
        F: Fn(Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Instance>> + Send + 'static,
    {
        self.post.entry(op).or_default().push(boxed(handler));
    }

    /// Register a synchronous pre handler
    pub fn pre_sync<F>(&mut self, op: Operation, handler: F)
    where
        F: Fn(&mut Instance) -> Result<()> + Send + Sync + 'static,
    {
        self.pre.entry(op).or_default().push(blocking(handler));
    }

    /// Register a synchronous post handler
    pub fn post_sync<F>(&mut self, op: Operation, handler: F)
    where
        F: Fn(&mut Instance) -> Result<()> + Send + Sync + 'static,
    {
        self.post.entry(op).or_default().push(blocking(handler));
    }

    pub(crate) async fn run_pre(&self, op: Operation, inst: Instance) -> Result<Instance> {
        run_chain(self.pre.get(&op), "pre", op, inst).await
    }

    pub(crate) async fn run_post(&self, op: Operation, inst: Instance) -> Result<Instance> {
        run_chain(self.post.get(&op), "post", op, inst).await
    }

    pub fn len(&self) -> usize {
        self.pre.values().chain(self.post.values()).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn run_chain(
    handlers: Option<&Vec<HookFn>>,
    phase: &str,
    op: Operation,
    mut inst: Instance,
) -> Result<Instance> {
    let Some(handlers) = handlers else {
        return Ok(inst);
    };

    let table = inst.table().to_string();
    for (i, handler) in handlers.iter().enumerate() {
        inst = handler(inst).await.map_err(|e| {
            debug!(%table, phase, %op, hook = i, error = %e, "hook aborted operation");
            e
        })?;
    }
    Ok(inst)
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = |m: &HashMap<Operation, Vec<HookFn>>| {
            m.iter().map(|(op, v)| (*op, v.len())).collect::<HashMap<_, _>>()
        };
        f.debug_struct("Hooks")
            .field("pre", &counts(&self.pre))
            .field("post", &counts(&self.post))
            .finish()
    }
}

//! Supervised holder of a recreatable value
//!
//! A [`Recoverable`] owns a value whose creation may fail and must be retried,
//! typically a connected socket or a session over one. Re-creation is
//! single-flight: when several tasks hit a broken value at once, exactly one
//! runs the creator while the rest wait for the published successor.
//!
//! The resource never classifies errors itself. A configured handler inspects
//! each failure together with the current value and decides whether to ignore
//! it, recreate the value, or refuse and surface the error.

use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{Result, WireError};

/// Decision returned by a recovery handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The error is harmless; keep the current value
    Ignore,
    /// Dispose the current value and create a fresh one
    Recreate,
    /// Refuse to recover; the error surfaces to the caller
    Escalate,
}

const IDLE: u8 = 0;
const CREATING: u8 = 1;

type Creator<R> = dyn Fn() -> BoxFuture<'static, Result<R>> + Send + Sync;
type Handler<R> = dyn Fn(Option<&R>, &WireError) -> Recovery + Send + Sync;

/// A value with supervised, single-flight re-creation.
///
/// State machine over `{Idle, Creating}`: `create` CASes Idle to Creating,
/// the winner runs the creator and publishes, losers suspend until the
/// publish notification and re-read. At most one creator task runs at any
/// instant.
pub struct Recoverable<R> {
    value: RwLock<Option<Arc<R>>>,
    st: AtomicU8,
    generation: AtomicU64,
    publish: Notify,
    creator: Box<Creator<R>>,
    handler: Box<Handler<R>>,
}

impl<R> fmt::Debug for Recoverable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recoverable")
            .field("present", &self.value.read().is_some())
            .field("creating", &(self.st.load(Ordering::Acquire) == CREATING))
            .field("generation", &self.generation.load(Ordering::Acquire))
            .finish()
    }
}

impl<R: Send + Sync + 'static> Recoverable<R> {
    /// Build a resource from an async creator and a recovery handler.
    ///
    /// The handler receives the current value (if any) and the failure; its
    /// decision is authoritative.
    pub fn new<C, Fut, H>(creator: C, handler: H) -> Arc<Self>
    where
        C: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        H: Fn(Option<&R>, &WireError) -> Recovery + Send + Sync + 'static,
    {
        Arc::new(Self {
            value: RwLock::new(None),
            st: AtomicU8::new(IDLE),
            generation: AtomicU64::new(0),
            publish: Notify::new(),
            creator: Box::new(move || Box::pin(creator())),
            handler: Box::new(handler),
        })
    }

    /// The currently published value, if any
    pub fn current(&self) -> Option<Arc<R>> {
        self.value.read().clone()
    }

    /// Create and publish a fresh value.
    ///
    /// Exactly one caller runs the creator; overlapping calls return only
    /// after a successor value is published. A creation failure surfaces to
    /// the caller that ran the creator; waiters whose creator failed retry
    /// the creation themselves.
    pub async fn create(&self) -> Result<Arc<R>> {
        loop {
            if self
                .st
                .compare_exchange(IDLE, CREATING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let created = (self.creator)().await;
                let result = match created {
                    Ok(value) => {
                        let value = Arc::new(value);
                        *self.value.write() = Some(value.clone());
                        self.generation.fetch_add(1, Ordering::AcqRel);
                        Ok(value)
                    }
                    Err(e) => Err(e),
                };
                self.st.store(IDLE, Ordering::Release);
                self.publish.notify_waiters();
                return result;
            }

            // Lost the race: suspend until the winner publishes, then re-read.
            let seen = self.generation.load(Ordering::Acquire);
            let mut notified = pin!(self.publish.notified());
            notified.as_mut().enable();
            if self.generation.load(Ordering::Acquire) == seen {
                if self.st.load(Ordering::Acquire) == IDLE {
                    // Winner already finished and failed; take over.
                    continue;
                }
                notified.await;
            }
            if self.generation.load(Ordering::Acquire) != seen {
                if let Some(value) = self.current() {
                    return Ok(value);
                }
            }
            // Winner failed without publishing; loop and try ourselves.
        }
    }

    /// The current value, creating one first if none is published yet
    pub async fn get_or_create(&self) -> Result<Arc<R>> {
        if let Some(value) = self.current() {
            return Ok(value);
        }
        self.create().await
    }

    /// Feed a failure to the recovery handler and apply its decision.
    ///
    /// `Ignore` keeps the value, `Recreate` replaces it through [`create`],
    /// `Escalate` re-raises. A transport error the handler refuses to recover
    /// surfaces as [`WireError::Escalated`]; other kinds keep their identity.
    ///
    /// [`create`]: Recoverable::create
    pub async fn recover(&self, err: WireError) -> Result<()> {
        let decision = {
            let guard = self.value.read();
            (self.handler)(guard.as_deref(), &err)
        };
        match decision {
            Recovery::Ignore => Ok(()),
            Recovery::Recreate => {
                debug!(error = %err, "recreating resource");
                self.create().await.map(|_| ())
            }
            Recovery::Escalate => Err(match err {
                e @ (WireError::Io(_) | WireError::SessionClosed) => {
                    WireError::Escalated(e.to_string())
                }
                e => e,
            }),
        }
    }

    /// Run an operation against the current value, recovering and retrying on
    /// failure.
    ///
    /// Each retry re-reads the published value, so the operation never holds
    /// a stale binding after recovery. Retries are unbounded; termination
    /// relies on the handler eventually escalating (or creation failing).
    pub async fn run<A, B, F, Fut>(&self, arg: A, op: F) -> Result<B>
    where
        A: Clone,
        F: Fn(Arc<R>, A) -> Fut,
        Fut: Future<Output = Result<B>>,
    {
        loop {
            let value = self.get_or_create().await?;
            match op(value, arg.clone()).await {
                Ok(out) => return Ok(out),
                Err(e) => self.recover(e).await?,
            }
        }
    }

    /// Wrap an operation into a self-recovering function of one argument
    pub fn inject<A, B, F, Fut>(
        self: &Arc<Self>,
        op: F,
    ) -> impl Fn(A) -> BoxFuture<'static, Result<B>>
    where
        A: Clone + Send + 'static,
        B: Send + 'static,
        F: Fn(Arc<R>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<B>> + Send + 'static,
    {
        let resource = Arc::clone(self);
        let op = Arc::new(op);
        move |arg: A| -> BoxFuture<'static, Result<B>> {
            let resource = Arc::clone(&resource);
            let op = Arc::clone(&op);
            Box::pin(async move { resource.run(arg, |value, arg| op(value, arg)).await })
        }
    }

    /// Remove and return the published value, leaving the resource empty
    pub fn take(&self) -> Option<Arc<R>> {
        self.value.write().take()
    }
}

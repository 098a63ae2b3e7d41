//! The awaitable side of a transition request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::error::{TransitionError, TransitionResult};
use super::events::PlaceRef;

enum Inner {
    Ready(Option<TransitionResult<PlaceRef>>),
    Spawned(JoinHandle<TransitionResult<PlaceRef>>),
    Deferred(BoxFuture<'static, TransitionResult<PlaceRef>>),
}

/// Resolves to the new active place, or to why the transition did not commit.
///
/// Dropping the handle does not cancel a transition that is already running.
pub struct TransitionHandle {
    id: Option<Uuid>,
    inner: Inner,
}

impl TransitionHandle {
    pub(crate) fn ready(result: TransitionResult<PlaceRef>) -> Self {
        Self {
            id: None,
            inner: Inner::Ready(Some(result)),
        }
    }

    /// Run `work` on the ambient runtime, or lazily when there is none.
    pub(crate) fn start(
        id: Option<Uuid>,
        work: impl Future<Output = TransitionResult<PlaceRef>> + Send + 'static,
    ) -> Self {
        let inner = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Inner::Spawned(runtime.spawn(work)),
            Err(_) => Inner::Deferred(work.boxed()),
        };
        Self { id, inner }
    }

    /// Id of the transition, once it got far enough to be assigned one.
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }
}

impl Future for TransitionHandle {
    type Output = TransitionResult<PlaceRef>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            Inner::Ready(slot) => Poll::Ready(slot.take().unwrap_or(Err(TransitionError::Aborted))),
            Inner::Spawned(join) => match Pin::new(join).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(TransitionError::Aborted)),
                Poll::Pending => Poll::Pending,
            },
            Inner::Deferred(work) => work.poll_unpin(cx),
        }
    }
}

impl std::fmt::Debug for TransitionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.inner {
            Inner::Ready(_) => "ready",
            Inner::Spawned(_) => "spawned",
            Inner::Deferred(_) => "deferred",
        };
        f.debug_struct("TransitionHandle")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

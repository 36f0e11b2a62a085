//! Request-level cancellation for an expired drain.
//!
//! Aborting the accept loop does not reach the connection tasks tonic spawned,
//! so every request future is raced against a [`CancellationToken`]. Once the
//! token fires, in-flight handlers are dropped and their streams are reset,
//! which lets the already-draining connections close.

use core::task::{Context, Poll};
use std::io;
use tokio_util::sync::CancellationToken;
use tonic::codegen::BoxFuture;
use tower::{BoxError, Layer, Service};

#[derive(Clone, Debug)]
pub(super) struct ForceStopLayer {
    token: CancellationToken,
}

impl ForceStopLayer {
    pub(super) const fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl<S> Layer<S> for ForceStopLayer {
    type Service = ForceStop<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ForceStop {
            inner,
            token: self.token.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub(super) struct ForceStop<S> {
    inner: S,
    token: CancellationToken,
}

impl<S, Req> Service<Req> for ForceStop<S>
where
    S: Service<Req>,
    S::Response: Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let token = self.token.clone();
        let fut = self.inner.call(req);
        Box::pin(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(force_stopped()),
                res = fut => res.map_err(Into::into),
            }
        })
    }
}

fn force_stopped() -> BoxError {
    io::Error::new(io::ErrorKind::ConnectionAborted, "server force-stopped").into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use core::future::{Ready, ready};
    use core::time::Duration;
    use tower::ServiceExt;

    #[derive(Clone)]
    struct Echo;

    impl Service<u32> for Echo {
        type Response = u32;
        type Error = Infallible;
        type Future = Ready<Result<u32, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: u32) -> Self::Future {
            ready(Ok(req))
        }
    }

    #[tokio::test]
    async fn passes_requests_through_until_cancelled() {
        let token = CancellationToken::new();
        let svc = ForceStopLayer::new(token.clone()).layer(Echo);
        assert_eq!(svc.clone().oneshot(7).await.unwrap(), 7);

        token.cancel();
        let err = svc.oneshot(7).await.unwrap_err();
        assert_eq!(err.to_string(), "server force-stopped");
    }

    #[tokio::test]
    async fn cancelling_drops_a_pending_request() {
        let token = CancellationToken::new();
        let slow = tower::service_fn(|millis: u64| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok::<_, Infallible>(millis)
        });
        let call = tokio::spawn(ForceStopLayer::new(token.clone()).layer(slow).oneshot(30_000));

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let res = tokio::time::timeout(Duration::from_secs(2), call)
            .await
            .expect("cancelled request should resolve")
            .unwrap();
        assert!(res.is_err());
    }
}

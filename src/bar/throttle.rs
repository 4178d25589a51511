use pin_project_lite::pin_project;
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::{self, Sleep};
use tokio_stream::Stream;

pin_project! {
    /// Lets the first item through immediately, then at most one item per
    /// `duration`. Items arriving while throttled are coalesced into the
    /// latest one.
    pub struct Throttle<S: Stream> {
        #[pin]
        inner: S,
        duration: Duration,
        sleep: Option<Pin<Box<Sleep>>>,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(inner: S, duration: Duration) -> Self {
        Self {
            inner,
            duration,
            sleep: None,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> Stream for Throttle<S>
where
    S: Stream,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if let Some(sleep) = this.sleep.as_mut() {
            if sleep.as_mut().poll(cx).is_pending() {
                return Poll::Pending;
            }
            *this.sleep = None;

            // drain what queued up while throttled
            let mut latest = None;
            let mut ended = false;
            loop {
                match this.inner.as_mut().poll_next(cx) {
                    Poll::Ready(Some(item)) => latest = Some(item),
                    Poll::Ready(None) => {
                        ended = true;
                        break;
                    }
                    Poll::Pending => break,
                }
            }

            if let Some(item) = latest {
                *this.sleep = Some(Box::pin(time::sleep(*this.duration)));
                return Poll::Ready(Some(item));
            }
            return if ended {
                Poll::Ready(None)
            } else {
                Poll::Pending
            };
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(item)) => {
                *this.sleep = Some(Box::pin(time::sleep(*this.duration)));
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub trait ThrottleExt: Stream + Sized {
    fn throttle(self, duration: Duration) -> Throttle<Self> {
        Throttle::new(self, duration)
    }
}

impl<T: Stream> ThrottleExt for T {}

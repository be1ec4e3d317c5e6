//! Async helpers shared by the engine and the runtime adapters

use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::*;

pin_project! {
    /// Cancellable accepts a param `future` for the actual work and aborts
    /// the wait when `cancel_future` resolves first.
    ///
    /// The `cancel_future` can be a timer or a notification channel recv().
    pub struct Cancellable<F, C> {
        #[pin]
        future: F,
        #[pin]
        cancel_future: C,
    }
}

impl<F: Future + Send, C: Future + Send> Cancellable<F, C> {
    pub fn new(future: F, cancel_future: C) -> Self {
        Self { future, cancel_future }
    }
}

impl<F: Future + Send, C: Future + Send> Future for Cancellable<F, C> {
    type Output = Result<F::Output, ()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(output) = this.future.poll(cx) {
            return Poll::Ready(Ok(output));
        }
        if this.cancel_future.poll(cx).is_ready() {
            return Poll::Ready(Err(()));
        }
        Poll::Pending
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by [`Transport::send`].
pub type TransportFuture =
    Pin<Box<dyn Future<Output = Result<reqwest::Response, reqwest::Error>> + Send + 'static>>;

/// Sends one wire request and yields the raw response.
///
/// The retry machinery treats the transport as opaque: connection pooling,
/// TLS and per-connection timeouts are the implementor's concern. The
/// returned future must own everything it needs since each attempt runs on
/// its own task.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: reqwest::Request) -> TransportFuture;
}

impl Transport for reqwest::Client {
    fn send(&self, request: reqwest::Request) -> TransportFuture {
        let client = self.clone();
        Box::pin(async move { client.execute(request).await })
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: reqwest::Request) -> TransportFuture {
        (**self).send(request)
    }
}

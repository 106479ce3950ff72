//! Tower middleware capturing inbound requests.
//!
//! ```ignore
//! use tower::ServiceBuilder;
//! use traffic_core::CaptureLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CaptureLayer::new(monitor.interceptor()))
//!     .service(app);
//! ```

use crate::aggregate::RequestScope;
use crate::classify::{CallOutcome, RequestArgs, ResponseMeta, TransportError};
use crate::interceptor::CaptureInterceptor;
use http::{Request, Response};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

/// When the host started handling the request. Set it as a request
/// extension for the most precise inbound latency.
#[derive(Debug, Clone, Copy)]
pub struct RequestStart(pub Instant);

#[derive(Clone)]
pub struct CaptureLayer {
    interceptor: Arc<CaptureInterceptor>,
}

impl CaptureLayer {
    pub fn new(interceptor: Arc<CaptureInterceptor>) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for CaptureLayer {
    type Service = CaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CaptureService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CaptureService<S> {
    inner: S,
    interceptor: Arc<CaptureInterceptor>,
}

/// Absolute URL of an inbound request, rebuilt from the Host header when
/// the request target is origin-form.
fn request_url<B>(req: &Request<B>) -> String {
    let uri = req.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return uri.to_string();
    }

    let host = req
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok());
    let Some(host) = host else {
        return uri.to_string();
    };

    let scheme = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    format!("{}://{}{}", scheme, host, path)
}

fn request_args<B>(req: &Request<B>, seen_at: Instant) -> RequestArgs {
    let mut args = RequestArgs::new(req.method().as_str());
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            args = args.header(name.as_str(), value);
        }
    }
    if let Some(len) = req
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
    {
        args = args.body_len(len);
    }
    if let Some(addr) = req.extensions().get::<SocketAddr>() {
        args = args.remote_addr(addr.ip());
    }
    let started = req
        .extensions()
        .get::<RequestStart>()
        .map(|start| start.0)
        .unwrap_or(seen_at);
    args.started(started)
}

/// Record the call without holding up the response. Dropping `scope`
/// afterwards flushes everything captured during the request.
fn dispatch(
    interceptor: Arc<CaptureInterceptor>,
    scope: RequestScope,
    outcome: CallOutcome,
    args: RequestArgs,
    url: String,
) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                // Live publishing may wait on the cross-process lock.
                let captured = tokio::task::spawn_blocking(move || {
                    interceptor.inbound_complete(&outcome, &args, &url);
                })
                .await;
                if let Err(e) = captured {
                    tracing::warn!(error = %e, "Inbound capture task failed");
                }
                drop(scope);
            });
        }
        Err(_) => {
            interceptor.inbound_complete(&outcome, &args, &url);
            drop(scope);
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CaptureService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    ResBody: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let args = request_args(&req, Instant::now());
        let url = request_url(&req);
        let interceptor = self.interceptor.clone();
        let scope = interceptor.request_scope();
        let future = self.inner.call(req);

        Box::pin(async move {
            let result = future.await;
            let outcome = match &result {
                Ok(response) => CallOutcome::Response(ResponseMeta::from_response(response)),
                Err(_) => CallOutcome::Error(TransportError::new("inner service failed")),
            };
            dispatch(interceptor, scope, outcome, args, url);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuilds_absolute_url_from_host() {
        let req = Request::builder()
            .uri("/shop/cart?item=3")
            .header("host", "site.test:8080")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap();
        assert_eq!(request_url(&req), "https://site.test:8080/shop/cart?item=3");

        let req = Request::builder().uri("/no-host").body(()).unwrap();
        assert_eq!(request_url(&req), "/no-host");
    }

    #[test]
    fn args_carry_socket_address_and_start() {
        let start = Instant::now();
        let mut req = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-length", "12")
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert("203.0.113.5:50000".parse::<SocketAddr>().unwrap());
        req.extensions_mut().insert(RequestStart(start));

        let args = request_args(&req, Instant::now());
        assert_eq!(args.method, "POST");
        assert_eq!(args.body_len, Some(12));
        assert_eq!(args.remote_addr, Some("203.0.113.5".parse().unwrap()));
        assert_eq!(args.started, Some(start));
    }
}

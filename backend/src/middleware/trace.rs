//! Request correlation.
//!
//! [`Trace`] gives every request a [`TraceId`]: the caller's own when the
//! `trace-id` header holds a UUID, a fresh one otherwise. The handler runs
//! with the identifier in task-local scope and inside a `request` span, and
//! the response carries it back in the same header. Error bodies read it
//! from scope, so a client can quote one value for both.

use std::rc::Rc;

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::header::{HeaderName, HeaderValue};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{Instrument, info_span, warn};

use crate::domain::{TRACE_ID_HEADER, TraceId};

/// Middleware factory for [`TraceMiddleware`].
///
/// ```
/// use actix_web::App;
/// use tandem::Trace;
///
/// let app = App::new().wrap(Trace);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Trace;

impl<S, B> Transform<S, ServiceRequest> for Trace
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TraceMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TraceMiddleware {
            inner: Rc::new(service),
        }))
    }
}

pub struct TraceMiddleware<S> {
    inner: Rc<S>,
}

/// The caller's trace id, when the header parses as one.
fn propagated(req: &ServiceRequest) -> Option<TraceId> {
    let raw = req.headers().get(TRACE_ID_HEADER)?.to_str().ok()?;
    raw.trim().parse().ok()
}

fn stamp<B>(res: &mut ServiceResponse<B>, trace_id: TraceId) {
    match HeaderValue::try_from(trace_id.to_string()) {
        Ok(value) => {
            res.headers_mut()
                .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
        }
        Err(error) => warn!(%error, %trace_id, "trace id is not a valid header value"),
    }
}

impl<S, B> Service<ServiceRequest> for TraceMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(inner);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let trace_id = propagated(&req).unwrap_or_else(TraceId::generate);
        let span = info_span!("request", %trace_id, method = %req.method(), path = %req.path());
        let inner = Rc::clone(&self.inner);
        let handled = async move {
            let mut res = inner.call(req).await?;
            stamp(&mut res, trace_id);
            Ok(res)
        };
        Box::pin(TraceId::scope(trace_id, handled.instrument(span)))
    }
}

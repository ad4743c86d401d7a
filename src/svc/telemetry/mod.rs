//! # Telemetry module
//!
//! This module expose telemetry measurements mainly metrics and probes through
//! structures, enums and helpers

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use hyper::{
    header::{self, HeaderValue},
    Body, Method, Request, Response, StatusCode,
};
#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{opts, register_counter_vec, CounterVec};
use tracing::info;

#[cfg(feature = "metrics")]
pub mod metrics;

// -----------------------------------------------------------------------------
// Telemetry

#[cfg(feature = "metrics")]
static SERVER_REQUEST_SUCCESS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "kubernetes_operator_server_request_success",
            "number of successful request handled by the server",
        ),
        &["method", "path", "status"]
    )
    .expect("metrics 'kubernetes_operator_server_request_success' to not be already registered")
});

#[cfg(feature = "metrics")]
static SERVER_REQUEST_FAILURE: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "kubernetes_operator_server_request_failure",
            "number of failed request handled by the server",
        ),
        &["method", "path", "status"]
    )
    .expect("metrics 'kubernetes_operator_server_request_failure' to not be already registered")
});

#[cfg(feature = "metrics")]
static SERVER_REQUEST_DURATION: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "kubernetes_operator_server_request_duration",
            "duration of request handled by the server",
        ),
        &["method", "path", "status", "unit"]
    )
    .expect("metrics 'kubernetes_operator_server_request_duration' to not be already registered")
});

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(feature = "metrics")]
    #[error("{0}")]
    Metrics(metrics::Error),
    #[error("failed to serialize payload, {0}")]
    Serialize(serde_json::Error),
}

// -----------------------------------------------------------------------------
// Helper methods

/// route the request, `readiness` is the flag raised once the watch cache of
/// the operator synced
pub async fn router(
    req: Request<Body>,
    readiness: Arc<AtomicBool>,
) -> Result<Response<Body>, Error> {
    let begin = Instant::now();

    // -------------------------------------------------------------------------
    // Basic routing
    let result = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => healthz(&req).await,
        (&Method::GET, "/readyz") => readyz(&req, &readiness).await,
        #[cfg(feature = "metrics")]
        (&Method::GET, "/metrics") => metrics::handler(&req).await.map_err(Error::Metrics),
        _ => not_found(&req).await,
    };

    let duration = Instant::now().duration_since(begin).as_micros();

    // -------------------------------------------------------------------------
    // recover error
    let host = match req.uri().host() {
        Some(host) => host.to_string(),
        None => req
            .headers()
            .get("host")
            .map(|header| String::from_utf8_lossy(header.as_bytes()).to_string())
            .unwrap_or_else(|| String::from("<none>")),
    };

    let (res, succeed) = match result {
        Ok(res) => (res, true),
        Err(err) => {
            let mut map = BTreeMap::new();

            map.insert("error".to_string(), err.to_string());

            let mut res = Response::default();

            res.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );

            *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            *res.body_mut() =
                Body::from(serde_json::to_string_pretty(&map).map_err(Error::Serialize)?);

            (res, false)
        }
    };

    info!(
        method = req.method().as_str(),
        host = host,
        path = req.uri().path(),
        status = res.status().as_u16(),
        duration = duration,
        "Receive request"
    );

    #[cfg(feature = "metrics")]
    {
        let status = res.status().as_u16().to_string();
        let labels = [req.method().as_str(), req.uri().path(), status.as_str()];

        if succeed {
            SERVER_REQUEST_SUCCESS.with_label_values(&labels).inc();
        } else {
            SERVER_REQUEST_FAILURE.with_label_values(&labels).inc();
        }

        SERVER_REQUEST_DURATION
            .with_label_values(&[labels[0], labels[1], labels[2], "us"])
            .inc_by(duration as f64);
    }

    #[cfg(not(feature = "metrics"))]
    let _ = succeed;

    Ok(res)
}

pub async fn healthz(_req: &Request<Body>) -> Result<Response<Body>, Error> {
    let mut res = Response::default();

    *res.status_mut() = StatusCode::NO_CONTENT;

    Ok(res)
}

/// answer with no content once the watch cache synced, service unavailable
/// before
pub async fn readyz(
    _req: &Request<Body>,
    readiness: &AtomicBool,
) -> Result<Response<Body>, Error> {
    let mut res = Response::default();

    *res.status_mut() = if readiness.load(Ordering::SeqCst) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok(res)
}

pub async fn not_found(_req: &Request<Body>) -> Result<Response<Body>, Error> {
    let mut res = Response::default();

    *res.status_mut() = StatusCode::NOT_FOUND;

    Ok(res)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use hyper::{Body, Method, Request, StatusCode};

    use super::router;

    fn get(path: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .expect("request to be valid")
    }

    #[tokio::test]
    async fn healthz_has_no_content() {
        let res = router(get("/healthz"), Arc::new(AtomicBool::new(false)))
            .await
            .expect("request to be routed");

        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn readyz_follows_cache_sync() {
        let readiness = Arc::new(AtomicBool::new(false));

        let res = router(get("/readyz"), readiness.to_owned())
            .await
            .expect("request to be routed");
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        readiness.store(true, Ordering::SeqCst);
        let res = router(get("/readyz"), readiness)
            .await
            .expect("request to be routed");
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let res = router(get("/unknown"), Arc::new(AtomicBool::new(true)))
            .await
            .expect("request to be routed");

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[cfg(feature = "metrics")]
    #[tokio::test]
    async fn metrics_are_exposed() {
        let res = router(get("/metrics"), Arc::new(AtomicBool::new(true)))
            .await
            .expect("request to be routed");

        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(hyper::header::CONTENT_TYPE));
    }
}

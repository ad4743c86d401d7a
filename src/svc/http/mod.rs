//! # HTTP module
//!
//! This module provides the http server exposing the probes and metrics of
//! the operator, requests are routed by [`telemetry::router`]

use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{atomic::AtomicBool, Arc},
};

use hyper::{
    service::{make_service_fn, service_fn},
    Server,
};
use tracing::info;

use crate::svc::telemetry;

// -----------------------------------------------------------------------------
// Error

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to bind on socket '{0}', {1}")]
    Bind(SocketAddr, hyper::Error),
    #[error("failed to listen on socket '{0}', {1}")]
    Serve(SocketAddr, hyper::Error),
}

// -----------------------------------------------------------------------------
// helpers

/// listen on the given address until an error occurs, `readiness` is given to
/// the readiness probe
pub async fn serve(addr: SocketAddr, readiness: Arc<AtomicBool>) -> Result<(), Error> {
    let builder = Server::try_bind(&addr).map_err(|err| Error::Bind(addr, err))?;

    let make_svc = make_service_fn(move |_conn| {
        let readiness = readiness.to_owned();

        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                telemetry::router(req, readiness.to_owned())
            }))
        }
    });

    info!(addr = addr.to_string(), "Begin to listen on address");
    builder
        .serve(make_svc)
        .await
        .map_err(|err| Error::Serve(addr, err))
}

//! HTTP ingress adapter.
//!
//! Converts each incoming request (path segments, method, query parameters,
//! body) into an orchestrator call and writes its reply back. One connection
//! task per client, one request task per request.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::context::SharedContext;
use crate::handlers::{impi, impu, Reply, RequestType};

/// Accept loop. Runs until the shutdown flag flips.
pub async fn serve(
    ctx: SharedContext,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("HTTP ingress listening on {addr}");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        log::warn!("accept failed: {err}");
                        continue;
                    }
                };
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let ctx = ctx.clone();
                        async move { Ok::<_, Infallible>(handle(ctx, req).await) }
                    });
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        log::debug!("connection from {peer} ended: {err}");
                    }
                });
            }
        }
    }

    log::info!("HTTP ingress stopped");
    Ok(())
}

async fn handle(ctx: SharedContext, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let params = parse_query(req.uri().query());

    let body = match req.into_body().collect().await {
        Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
        Err(err) => {
            log::debug!("failed to read request body: {err}");
            return to_response(Reply::empty(400));
        }
    };

    let reply = route(&ctx, &method, &path, &params, &body).await;
    log::debug!("{method} {path} -> {}", reply.status);
    to_response(reply)
}

/// Dispatch one request to its flow
pub async fn route(
    ctx: &SharedContext,
    method: &Method,
    path: &str,
    params: &HashMap<String, String>,
    body: &str,
) -> Reply {
    // A non-empty query parameter, or None
    let param = |name: &str| params.get(name).filter(|v| !v.is_empty()).cloned();
    let param_or_empty = |name: &str| param(name).unwrap_or_default();

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["ping"] => {
            if method == Method::GET {
                Reply::text("OK")
            } else {
                Reply::empty(405)
            }
        }

        ["impi", private_id, endpoint] => {
            if method != Method::GET {
                return Reply::empty(405);
            }
            match *endpoint {
                "digest" => {
                    impi::credentials(
                        ctx,
                        private_id,
                        impi::CredentialEndpoint::Digest,
                        param("public_id"),
                        String::new(),
                    )
                    .await
                }
                "av" => {
                    impi::credentials(
                        ctx,
                        private_id,
                        impi::CredentialEndpoint::Av,
                        param("impu"),
                        param_or_empty("autn"),
                    )
                    .await
                }
                "aka" => {
                    impi::credentials(
                        ctx,
                        private_id,
                        impi::CredentialEndpoint::Aka,
                        param("impu"),
                        param_or_empty("autn"),
                    )
                    .await
                }
                "registration-status" => {
                    impi::registration_status(
                        ctx,
                        private_id,
                        &param_or_empty("impu"),
                        &param_or_empty("visited-network"),
                        &param_or_empty("auth-type"),
                    )
                    .await
                }
                _ => Reply::empty(404),
            }
        }

        ["impu", public_id] => {
            if method == Method::GET {
                impu::subscription_profile(ctx, public_id, &param_or_empty("private_id")).await
            } else {
                Reply::empty(405)
            }
        }

        ["impu", public_id, "reg-data"] => {
            let private_id = param_or_empty("private_id");
            if method == Method::GET {
                impu::reg_data(ctx, public_id, &private_id, None).await
            } else if method == Method::PUT {
                match RequestType::from_body(body) {
                    Some(request) => {
                        impu::reg_data(ctx, public_id, &private_id, Some(request)).await
                    }
                    None => {
                        log::info!("invalid reg-data request body {body:?}");
                        Reply::empty(400)
                    }
                }
            } else {
                Reply::empty(405)
            }
        }

        ["impu", public_id, "location"] => {
            if method == Method::GET {
                impu::location(
                    ctx,
                    public_id,
                    param("originating").as_deref() == Some("true"),
                    &param_or_empty("auth-type"),
                )
                .await
            } else {
                Reply::empty(405)
            }
        }

        _ => Reply::empty(404),
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = query {
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some((name, value)) => params.insert(name.to_string(), value.to_string()),
                None => params.insert(pair.to_string(), String::new()),
            };
        }
    }
    params
}

fn to_response(reply: Reply) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    if !reply.body.is_empty() {
        builder = builder.header("content-type", reply.content_type);
    }
    builder
        .body(Full::new(Bytes::from(reply.body)))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::new()))
                .expect("static response builds")
        })
}

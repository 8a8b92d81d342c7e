// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent callback HTTP API.
//!
//! Agents inside booted VMs dial back here with their per-instance
//! bearer token to fetch a registration token (`/register`), report
//! their forge-assigned ID (`/update`), and long-poll for a
//! termination directive (`/wait`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use corral_forge::TokenCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::instance::{InstanceMsg, RunnerInstance};

/// How long `/wait` holds a poll open before returning 408.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bearer token to live instance. Read on every request; written only
/// at supervisor boundaries.
pub type InstanceMap = Arc<RwLock<HashMap<String, Arc<RunnerInstance>>>>;

/// Errors from running the callback server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind callback listener: {0}")]
    Bind(std::io::Error),

    #[error("callback server failed: {0}")]
    Serve(std::io::Error),
}

/// Shared state behind the callback routes.
pub struct ServerCtx {
    pub instances: InstanceMap,
    pub tokens: TokenCache,
    /// Forge URL shipped to agents in the register response.
    pub github_url: String,
    pub wait_timeout: Duration,
}

/// Local HTTP service for agent callbacks.
pub struct CallbackServer {
    ctx: Arc<ServerCtx>,
}

impl CallbackServer {
    pub fn new(instances: InstanceMap, tokens: TokenCache, github_url: String) -> Self {
        Self {
            ctx: Arc::new(ServerCtx {
                instances,
                tokens,
                github_url,
                wait_timeout: crate::env::wait_timeout(),
            }),
        }
    }

    /// Bind on a kernel-assigned port.
    pub async fn bind() -> Result<(TcpListener, u16), ServerError> {
        let listener = TcpListener::bind("0.0.0.0:0")
            .await
            .map_err(ServerError::Bind)?;
        let port = listener
            .local_addr()
            .map_err(ServerError::Bind)?
            .port();
        Ok((listener, port))
    }

    /// Serve until cancelled, then shut down gracefully.
    pub async fn run(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "callback server started");
        }

        axum::serve(listener, router(self.ctx))
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(ServerError::Serve)
    }
}

pub(crate) fn router(ctx: Arc<ServerCtx>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/update", post(update))
        .route("/wait", get(wait))
        .with_state(ctx)
}

#[derive(Debug, Deserialize)]
struct RegisterForm {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "hostName")]
    host_name: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    name: String,
    #[serde(rename = "gitHubURL")]
    git_hub_url: String,
    token: String,
    group: String,
    /// Comma-joined label set for the slot.
    labels: String,
}

async fn register(
    State(ctx): State<Arc<ServerCtx>>,
    headers: HeaderMap,
    Form(form): Form<RegisterForm>,
) -> Result<Response, Response> {
    let instance = authenticate(&ctx, &headers)?;

    debug!(
        instance_id = instance.instance_id,
        name = %form.name,
        host_name = %form.host_name,
        "agent registering"
    );
    instance
        .post(InstanceMsg::Register {
            name: form.name.clone(),
            host_name: form.host_name,
        })
        .await;

    let token = ctx.tokens.get().await.map_err(|e| {
        error!(error = %e, "cannot get registration token");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })?;

    Ok(Json(RegisterResponse {
        name: form.name,
        git_hub_url: ctx.github_url.clone(),
        token: token.value,
        group: instance.slot.runner_group.clone().unwrap_or_default(),
        labels: instance.slot.labels.join(","),
    })
    .into_response())
}

#[derive(Debug, Deserialize)]
struct UpdateForm {
    #[serde(default, rename = "runnerID")]
    runner_id: String,
}

async fn update(
    State(ctx): State<Arc<ServerCtx>>,
    headers: HeaderMap,
    Form(form): Form<UpdateForm>,
) -> Result<Response, Response> {
    let instance = authenticate(&ctx, &headers)?;

    // Empty string means "no change".
    let runner_id = if form.runner_id.is_empty() {
        None
    } else {
        let id = form
            .runner_id
            .parse::<i64>()
            .map_err(|e| request_error(&e.to_string()))?;
        Some(id)
    };

    instance.post(InstanceMsg::Update { runner_id }).await;

    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn wait(
    State(ctx): State<Arc<ServerCtx>>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    let instance = authenticate(&ctx, &headers)?;

    tokio::select! {
        _ = instance.terminated() => Ok(StatusCode::NO_CONTENT.into_response()),
        _ = tokio::time::sleep(ctx.wait_timeout) => {
            Ok(StatusCode::REQUEST_TIMEOUT.into_response())
        }
    }
}

/// Resolve the bearer token to a live instance.
fn authenticate(ctx: &ServerCtx, headers: &HeaderMap) -> Result<Arc<RunnerInstance>, Response> {
    let authz = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| request_error("invalid authz header"))?;

    let token = match authz.split_once(' ') {
        Some(("Bearer", token)) => token,
        _ => return Err(request_error("invalid authz header")),
    };

    ctx.instances
        .read()
        .get(token)
        .cloned()
        .ok_or_else(|| request_error("invalid token"))
}

fn request_error(msg: &str) -> Response {
    debug!(msg, "rejecting callback request");
    (StatusCode::BAD_REQUEST, msg.to_string()).into_response()
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

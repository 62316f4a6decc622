use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use portal_executor::{CommandIntent, ExecError};

use crate::AppState;
use crate::api::rest::dto::ExecSummaryDto;
use crate::api::rest::envelope::ReqCtx;
use crate::api::rest::middleware::CurrentIdentity;
use crate::domain::DomainError;
use crate::domain::servers::ServerService;

async fn run_intent(
    ctx: &ReqCtx,
    state: &AppState,
    identity: &portal_security::Identity,
    intent: CommandIntent,
) -> Response {
    let req = ServerService::plain_request(identity, intent, Vec::new(), &ctx.meta());
    let result = state
        .executor
        .execute(&state.shutdown, req)
        .await
        .map(ExecSummaryDto::from)
        .map_err(DomainError::from);
    ctx.respond(result)
}

pub async fn run(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    run_intent(&ctx, &state, &identity, CommandIntent::GatewayRun).await
}

pub async fn stop(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    run_intent(&ctx, &state, &identity, CommandIntent::GatewayStop).await
}

pub async fn status(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    run_intent(&ctx, &state, &identity, CommandIntent::GatewayStatus).await
}

/// Stream gateway logs line by line over SSE. The stream ends when the
/// underlying command completes; a terminal `result` event reports how.
pub async fn logs(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let req = ServerService::plain_request(
        &identity,
        CommandIntent::GatewayLogs,
        Vec::new(),
        &ctx.meta(),
    );

    // Reject inadmissible requests with a proper envelope before streaming
    // starts; past this point errors arrive as stream events.
    if let Some(finding) = state.executor.validate(&req).into_iter().next() {
        return ctx.fail(DomainError::from(ExecError::Validation(finding)).into());
    }

    let (tx, rx) = mpsc::channel::<String>(64);
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();

    let exec_state = state.clone();
    tokio::spawn(async move {
        let result = exec_state
            .executor
            .execute_stream(&exec_state.shutdown, req, tx)
            .await;
        let _ = done_tx.send(result);
    });

    let lines = ReceiverStream::new(rx).map(|line| Event::default().event("line").data(line));
    let terminal = futures::stream::once(async move {
        match done_rx.await {
            Ok(Ok(result)) => {
                let summary = ExecSummaryDto::from(result);
                Event::default()
                    .event("result")
                    .data(serde_json::to_string(&summary).unwrap_or_default())
            }
            Ok(Err(e)) => Event::default().event("error").data(e.to_string()),
            Err(_) => Event::default().event("error").data("stream aborted"),
        }
    });

    let stream: std::pin::Pin<
        Box<dyn Stream<Item = Result<Event, Infallible>> + Send>,
    > = Box::pin(lines.chain(terminal).map(Ok));

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

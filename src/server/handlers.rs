// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Route handlers.

use crate::{
    publish::PublishRequest,
    remote::{github::RepoHost, RemoteError},
    server::AppState,
};

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{fs, io, io::Write as _, path::PathBuf};
use tokio::task;
use tracing::{debug, error};

pub async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

/// Accept a multipart site upload and run the publish pipeline.
///
/// Expected parts: `file` (the zip archive), `project_name`, and an optional
/// `submitter`. Unknown parts are drained and ignored.
pub async fn deploy(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut archive: Option<PathBuf> = None;
    let mut display_name: Option<String> = None;
    let mut submitter: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                discard_upload(&archive);
                return failure(StatusCode::BAD_REQUEST, err);
            }
        };

        match field.name() {
            Some("file") => {
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        discard_upload(&archive);
                        return failure(StatusCode::BAD_REQUEST, err);
                    }
                };
                match spool_upload(&state, bytes).await {
                    Ok(path) => archive = Some(path),
                    Err(err) => {
                        error!("cannot spool upload: {err}");
                        return failure(StatusCode::INTERNAL_SERVER_ERROR, err);
                    }
                }
            }
            Some("project_name") => match field.text().await {
                Ok(text) => display_name = Some(text),
                Err(err) => {
                    discard_upload(&archive);
                    return failure(StatusCode::BAD_REQUEST, err);
                }
            },
            Some("submitter") => match field.text().await {
                Ok(text) => submitter = Some(text),
                Err(err) => {
                    discard_upload(&archive);
                    return failure(StatusCode::BAD_REQUEST, err);
                }
            },
            _ => continue,
        }
    }

    let (Some(archive), Some(display_name)) = (archive.clone(), display_name) else {
        discard_upload(&archive);
        return failure(
            StatusCode::BAD_REQUEST,
            "request needs a zip upload in \"file\" and a \"project_name\"",
        );
    };

    let request = PublishRequest {
        archive,
        display_name,
        submitter,
    };

    match state.publisher.publish(request).await {
        Ok(publication) => Json(json!({
            "success": true,
            "url": publication.url,
            "repo": publication.repo,
        }))
        .into_response(),
        Err(err) if err.is_validation_failure() => failure(StatusCode::BAD_REQUEST, err),
        Err(err) => {
            error!("deploy failed: {err:?}");
            failure(StatusCode::INTERNAL_SERVER_ERROR, err)
        }
    }
}

pub async fn list_files(State(state): State<AppState>, Path(repo): Path<String>) -> Response {
    match state.host.list_files(&repo).await {
        Ok(files) => Json(json!({ "success": true, "files": files })).into_response(),
        Err(err) => remote_failure(err),
    }
}

pub async fn read_file(
    State(state): State<AppState>,
    Path((repo, path)): Path<(String, String)>,
) -> Response {
    match state.host.read_file(&repo, &path).await {
        Ok(file) => Json(json!({
            "success": true,
            "path": file.path,
            "sha": file.sha,
            "content": file.content,
        }))
        .into_response(),
        Err(err) => remote_failure(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct WriteFileBody {
    pub content: String,

    /// Revision token from the last read; required by the host when
    /// updating an existing file.
    pub sha: Option<String>,

    pub message: Option<String>,
}

pub async fn write_file(
    State(state): State<AppState>,
    Path((repo, path)): Path<(String, String)>,
    Json(body): Json<WriteFileBody>,
) -> Response {
    let message = body
        .message
        .unwrap_or_else(|| format!("Edit {path} via quayside"));

    match state
        .host
        .write_file(&repo, &path, &body.content, body.sha.as_deref(), &message)
        .await
    {
        Ok(sha) => Json(json!({ "success": true, "sha": sha })).into_response(),
        Err(err) => remote_failure(err),
    }
}

pub async fn complete(State(state): State<AppState>, Json(payload): Json<Value>) -> Response {
    let Some(client) = state.inference.clone() else {
        return failure(
            StatusCode::SERVICE_UNAVAILABLE,
            "no inference endpoint configured",
        );
    };

    match client.complete(payload).await {
        Ok(completion) => Json(completion).into_response(),
        Err(err) => remote_failure(err),
    }
}

/// Spool an uploaded archive into the upload directory and persist it.
async fn spool_upload(state: &AppState, bytes: Bytes) -> Result<PathBuf, io::Error> {
    let dir = state.upload_dir.clone();
    task::spawn_blocking(move || {
        mkdirp::mkdirp(&dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".zip")
            .tempfile_in(&dir)?;
        file.write_all(&bytes)?;
        let (_, path) = file.keep().map_err(|err| err.error)?;
        Ok(path)
    })
    .await
    .map_err(io::Error::other)?
}

/// Drop a spooled upload that will never reach the pipeline.
fn discard_upload(archive: &Option<PathBuf>) {
    if let Some(path) = archive {
        if let Err(err) = fs::remove_file(path) {
            debug!("leaving upload {:?} behind: {err}", path.display());
        }
    }
}

fn failure(status: StatusCode, error: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": error.to_string() })),
    )
        .into_response()
}

/// Map a proxied remote failure onto the response, carrying the upstream
/// status through when there is one.
fn remote_failure(err: RemoteError) -> Response {
    let status = match &err {
        RemoteError::Status { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        _ => StatusCode::BAD_GATEWAY,
    };

    failure(status, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn healthz_answers() {
        let response = healthz().await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn remote_failure_carries_upstream_status_through() {
        let response = remote_failure(RemoteError::Status {
            kind: "file read",
            status: 404,
            body: "missing".into(),
        });

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn remote_failure_defaults_to_bad_gateway() {
        let response = remote_failure(RemoteError::Decode {
            kind: "file read",
            reason: "not json".into(),
        });

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn failure_body_has_the_documented_shape() {
        let response = failure(StatusCode::BAD_REQUEST, "nope");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

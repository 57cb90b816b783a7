// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Repository host client.
//!
//! Covers the slice of the GitHub REST surface quayside needs: idempotent
//! repository creation, an existence probe for post-create confirmation
//! polling, and the contents API backing the remote file-edit endpoints.
//!
//! Reads and writes of individual files carry a revision token (the blob
//! `sha`). Writers must present the token they last read, which is how the
//! host rejects lost-update conflicts; quayside passes it through untouched.

use crate::{
    config::GithubConfig,
    remote::{build_client, read_json, Created, RemoteError},
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, instrument};

/// Layer of indirection for repository host access.
pub trait RepoHost {
    /// Clone URL the synchronizer should push to for a repository.
    fn remote_url(&self, repo: &str) -> String;

    /// Create a repository by name; "already exists" is success.
    fn create_repository(&self, name: &str) -> impl Future<Output = Result<Created>> + Send;

    /// Probe whether a repository is visible yet.
    fn repository_exists(&self, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// List entries at the top level of a repository.
    fn list_files(&self, repo: &str) -> impl Future<Output = Result<Vec<RepoEntry>>> + Send;

    /// Read one file's content and revision token.
    fn read_file(&self, repo: &str, path: &str) -> impl Future<Output = Result<RepoFile>> + Send;

    /// Write one file, presenting the prior revision token when updating.
    /// Returns the new revision token.
    fn write_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        prior_sha: Option<&str>,
        message: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// A directory entry in a published repository.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepoEntry {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// A file read from a published repository.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepoFile {
    pub path: String,
    pub sha: String,
    pub content: String,
}

/// Repository host access over the GitHub REST API.
#[derive(Clone, Debug)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    user: String,
    token: String,
}

impl GithubClient {
    /// Construct new client from configuration.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Transport`] if the HTTP client cannot be
    ///   built.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        Ok(Self {
            http: build_client()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            token: config.token.clone(),
        })
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("authorization", format!("token {}", self.token))
            .header("accept", "application/vnd.github+json")
    }
}

#[derive(Serialize)]
struct CreateRepoBody<'a> {
    name: &'a str,
    private: bool,
    auto_init: bool,
}

#[derive(Deserialize)]
struct ContentsFile {
    path: String,
    sha: String,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Serialize)]
struct WriteFileBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct WriteFileResponse {
    content: WrittenContent,
}

#[derive(Deserialize)]
struct WrittenContent {
    sha: String,
}

impl RepoHost for GithubClient {
    fn remote_url(&self, repo: &str) -> String {
        format!("https://github.com/{}/{repo}.git", self.user)
    }

    #[instrument(skip(self), level = "debug")]
    async fn create_repository(&self, name: &str) -> Result<Created> {
        let response = self
            .auth(self.http.post(format!("{}/user/repos", self.api_url)))
            .json(&CreateRepoBody {
                name,
                private: false,
                auto_init: true,
            })
            .send()
            .await?;

        let status = response.status();
        // INVARIANT: 422 from this endpoint means the name is taken.
        if status.as_u16() == 422 {
            debug!("repository {name} already exists");
            return Ok(Created::AlreadyExists);
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                kind: "repository create",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(Created::Fresh)
    }

    async fn repository_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .auth(
                self.http
                    .get(format!("{}/repos/{}/{name}", self.api_url, self.user)),
            )
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                kind: "repository probe",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(true)
    }

    async fn list_files(&self, repo: &str) -> Result<Vec<RepoEntry>> {
        let response = self
            .auth(self.http.get(format!(
                "{}/repos/{}/{repo}/contents/",
                self.api_url, self.user
            )))
            .send()
            .await?;

        read_json("file list", response).await
    }

    async fn read_file(&self, repo: &str, path: &str) -> Result<RepoFile> {
        let response = self
            .auth(self.http.get(format!(
                "{}/repos/{}/{repo}/contents/{path}",
                self.api_url, self.user
            )))
            .send()
            .await?;

        let file: ContentsFile = read_json("file read", response).await?;
        let content = decode_content(file.content, file.encoding.as_deref())?;

        Ok(RepoFile {
            path: file.path,
            sha: file.sha,
            content,
        })
    }

    #[instrument(skip(self, content, message), level = "debug")]
    async fn write_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        prior_sha: Option<&str>,
        message: &str,
    ) -> Result<String> {
        let response = self
            .auth(self.http.put(format!(
                "{}/repos/{}/{repo}/contents/{path}",
                self.api_url, self.user
            )))
            .json(&WriteFileBody {
                message,
                content: BASE64.encode(content.as_bytes()),
                sha: prior_sha,
            })
            .send()
            .await?;

        let written: WriteFileResponse = read_json("file write", response).await?;

        Ok(written.content.sha)
    }
}

fn decode_content(content: Option<String>, encoding: Option<&str>) -> Result<String> {
    let Some(content) = content else {
        return Err(RemoteError::Decode {
            kind: "file read",
            reason: "response carried no content".into(),
        });
    };

    match encoding {
        Some("base64") => {
            // The host wraps base64 bodies with literal newlines.
            let packed: String = content.chars().filter(|ch| !ch.is_whitespace()).collect();
            let bytes = BASE64.decode(packed).map_err(|err| RemoteError::Decode {
                kind: "file read",
                reason: err.to_string(),
            })?;
            String::from_utf8(bytes).map_err(|err| RemoteError::Decode {
                kind: "file read",
                reason: err.to_string(),
            })
        }
        _ => Ok(content),
    }
}

/// Friendly result alias :3
type Result<T, E = RemoteError> = std::result::Result<T, E>;

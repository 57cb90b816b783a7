// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Static-site host client.
//!
//! Covers the Cloudflare Pages surface quayside needs: binding a deployment
//! project to a published repository, triggering a build of the production
//! branch, and reading back a deployment's status so the pipeline can log
//! whether the build it asked for actually started.

use crate::{
    config::PagesConfig,
    remote::{build_client, read_json, Created, RemoteError},
};

use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use tracing::{debug, instrument};

/// Layer of indirection for static-site host access.
pub trait SiteHost {
    /// Public URL the site serves from once built.
    fn site_url(&self, project: &str) -> String;

    /// Bind a deployment project to a repository; "already exists" is
    /// success.
    fn ensure_project(&self, project: &str, repo: &str)
        -> impl Future<Output = Result<Created>> + Send;

    /// Trigger a build of the project's production branch. Returns the
    /// deployment id.
    fn trigger_build(&self, project: &str) -> impl Future<Output = Result<String>> + Send;

    /// Read the status of a deployment.
    fn build_status(
        &self,
        project: &str,
        deployment: &str,
    ) -> impl Future<Output = Result<BuildStatus>> + Send;
}

/// Coarse deployment status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildStatus {
    /// Queued or mid-build.
    InProgress,

    /// Built and serving.
    Ready,

    /// The host gave up on it.
    Failed(String),
}

/// Static-site host access over the Cloudflare Pages API.
#[derive(Clone, Debug)]
pub struct PagesClient {
    http: reqwest::Client,
    api_url: String,
    account_id: String,
    token: String,
    github_user: String,
    branch: String,
}

impl PagesClient {
    /// Construct new client from configuration.
    ///
    /// `github_user` and `branch` describe the repositories that projects
    /// bind to.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Transport`] if the HTTP client cannot be
    ///   built.
    pub fn new(
        config: &PagesConfig,
        github_user: impl Into<String>,
        branch: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: build_client()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            token: config.token.clone(),
            github_user: github_user.into(),
            branch: branch.into(),
        })
    }

    fn projects_url(&self) -> String {
        format!("{}/accounts/{}/pages/projects", self.api_url, self.account_id)
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.token)
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Deserialize)]
struct Deployment {
    id: String,
    #[serde(default)]
    latest_stage: Option<DeploymentStage>,
}

#[derive(Deserialize)]
struct DeploymentStage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
}

impl SiteHost for PagesClient {
    fn site_url(&self, project: &str) -> String {
        format!("https://{project}.pages.dev")
    }

    #[instrument(skip(self), level = "debug")]
    async fn ensure_project(&self, project: &str, repo: &str) -> Result<Created> {
        let body = json!({
            "name": project,
            "source": {
                "type": "github",
                "config": {
                    "owner": self.github_user,
                    "repo_name": repo,
                    "production_branch": self.branch,
                    "pr_comments_enabled": false,
                    "deployments_enabled": true,
                },
            },
            "build_config": {
                "build_command": "",
                "destination_dir": "",
            },
        });

        let response = self
            .auth(self.http.post(self.projects_url()))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(Created::Fresh);
        }

        let text = response.text().await.unwrap_or_default();
        // The host reports a duplicate project inside the error body rather
        // than with a distinctive status code.
        if text.to_ascii_lowercase().contains("already exists") {
            debug!("project {project} already exists");
            return Ok(Created::AlreadyExists);
        }

        Err(RemoteError::Status {
            kind: "project create",
            status: status.as_u16(),
            body: text,
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn trigger_build(&self, project: &str) -> Result<String> {
        let response = self
            .auth(
                self.http
                    .post(format!("{}/{project}/deployments", self.projects_url())),
            )
            .json(&json!({ "branch": self.branch }))
            .send()
            .await?;

        let envelope: Envelope<Deployment> = read_json("build trigger", response).await?;
        let deployment = envelope.result.ok_or(RemoteError::Decode {
            kind: "build trigger",
            reason: "response carried no deployment".into(),
        })?;

        Ok(deployment.id)
    }

    async fn build_status(&self, project: &str, deployment: &str) -> Result<BuildStatus> {
        let response = self
            .auth(self.http.get(format!(
                "{}/{project}/deployments/{deployment}",
                self.projects_url()
            )))
            .send()
            .await?;

        let envelope: Envelope<Deployment> = read_json("build status", response).await?;
        let stage = envelope.result.and_then(|deployment| deployment.latest_stage);

        Ok(match stage {
            Some(stage) if stage.status == "success" && stage.name == "deploy" => {
                BuildStatus::Ready
            }
            Some(stage) if stage.status == "failure" || stage.status == "canceled" => {
                BuildStatus::Failed(format!("stage {} reported {}", stage.name, stage.status))
            }
            _ => BuildStatus::InProgress,
        })
    }
}

/// Friendly result alias :3
type Result<T, E = RemoteError> = std::result::Result<T, E>;

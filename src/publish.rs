// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Publish pipeline.
//!
//! One deploy request runs one pipeline: extract the uploaded archive,
//! normalize the tree, make sure the repository exists on the host, sync the
//! tree into it, bind the deployment project, and ask for a build. Stages
//! run strictly in sequence and each one reports a typed result; the policy
//! for what aborts the request and what is merely logged lives here, in one
//! place, not inside the clients.
//!
//! # Stage policy
//!
//! | Stage                     | On failure            |
//! |---------------------------|-----------------------|
//! | archive extraction        | abort                 |
//! | tree normalization        | abort, no remote calls have happened |
//! | repository creation       | abort, except "already exists" |
//! | repository visibility     | abort after bounded poll |
//! | commit and force-push     | abort                 |
//! | project bind              | log and continue      |
//! | build trigger             | log and continue      |
//! | build status watch        | log only              |
//!
//! # Concurrency
//!
//! Requests that derive the same repository name serialize on a per-name
//! lock; everything else runs concurrently. Each request extracts into its
//! own temporary working directory, which is removed on success and failure
//! alike, as is the uploaded archive.

use crate::{
    archive::{extract_archive, ArchiveError},
    config::Config,
    normalize::{NormalizeError, TreeNormalizer},
    remote::{
        github::{GithubClient, RepoHost},
        pages::{BuildStatus, PagesClient, SiteHost},
        poll_until, Created, RemoteError,
    },
    repo::{Git2Sync, Identity, RepoError, TreeSync},
};

use std::{
    collections::HashMap,
    fs, io,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task;
use tracing::{debug, info, instrument, warn};

const REPO_POLL_ATTEMPTS: u32 = 5;
const REPO_POLL_DELAY: Duration = Duration::from_millis(500);
const BUILD_POLL_ATTEMPTS: u32 = 5;
const BUILD_POLL_DELAY: Duration = Duration::from_secs(1);

/// One deploy request.
#[derive(Clone, Debug)]
pub struct PublishRequest {
    /// Uploaded archive on disk. Removed when the request finishes, whether
    /// it succeeded or not.
    pub archive: PathBuf,

    /// Project display name as the uploader typed it.
    pub display_name: String,

    /// Optional submitter identity, used as the commit author name.
    pub submitter: Option<String>,
}

/// Where a published site ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publication {
    /// Public URL the site will serve from.
    pub url: String,

    /// Repository the site was pushed to.
    pub repo: String,
}

/// Publishing policy shared by every request.
#[derive(Clone, Debug)]
pub struct PublishPolicy {
    /// Document that must exist at the site root.
    pub entry_document: String,

    /// Prefix for derived repository names.
    pub repo_prefix: String,

    /// Default commit author.
    pub author: Identity,

    /// Directory that per-request working trees are created under.
    pub extract_root: PathBuf,
}

impl PublishPolicy {
    /// Build policy from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            entry_document: config.site.entry_document.clone(),
            repo_prefix: config.site.repo_prefix.clone(),
            author: Identity::new(
                config.site.author_name.clone(),
                config.site.author_email.clone(),
            ),
            extract_root: config.workspace.extract_dir.clone(),
        }
    }
}

/// The deploy pipeline.
///
/// Generic over its collaborators so tests can substitute fakes; production
/// code uses the defaults.
pub struct Publisher<V = Git2Sync, R = GithubClient, S = PagesClient> {
    vcs: V,
    host: R,
    site: S,
    normalizer: TreeNormalizer,
    policy: PublishPolicy,
    locks: RepoLocks,
}

impl Publisher {
    /// Construct the production pipeline from configuration.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Transport`] if an HTTP client cannot be
    ///   built.
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        let vcs = Git2Sync::new(
            config.site.branch.clone(),
            config.github.user.clone(),
            config.github.token.clone(),
        );
        let host = GithubClient::new(&config.github)?;
        let site = PagesClient::new(
            &config.pages,
            config.github.user.clone(),
            config.site.branch.clone(),
        )?;

        Ok(Self::new(vcs, host, site, PublishPolicy::from_config(config)))
    }
}

impl<V, R, S> Publisher<V, R, S>
where
    V: TreeSync + Clone + Send + 'static,
    R: RepoHost,
    S: SiteHost,
{
    /// Construct new pipeline.
    pub fn new(vcs: V, host: R, site: S, policy: PublishPolicy) -> Self {
        Self {
            vcs,
            host,
            site,
            normalizer: TreeNormalizer::new(policy.entry_document.clone()),
            policy,
            locks: RepoLocks::default(),
        }
    }

    /// Run the pipeline for one request.
    ///
    /// # Errors
    ///
    /// - Return [`PublishError::EmptyProjectName`] if the display name
    ///   reduces to nothing usable.
    /// - Return stage errors per the module-level policy table.
    #[instrument(skip(self, request), fields(project = %request.display_name), level = "debug")]
    pub async fn publish(&self, request: PublishRequest) -> Result<Publication> {
        let repo = derive_repo_name(&self.policy.repo_prefix, &request.display_name).ok_or(
            PublishError::EmptyProjectName {
                display_name: request.display_name.clone(),
            },
        )?;

        info!("publishing {:?} as {repo}", request.display_name);
        let _guard = self.locks.hold(&repo).await;
        let result = self.run(&request, &repo).await;

        // INVARIANT: The uploaded archive never outlives its request.
        if let Err(err) = fs::remove_file(&request.archive) {
            debug!("leaving upload {:?} behind: {err}", request.archive.display());
        }

        result
    }

    async fn run(&self, request: &PublishRequest, repo: &str) -> Result<Publication> {
        mkdirp::mkdirp(&self.policy.extract_root).map_err(|err| PublishError::Workspace {
            source: err,
            path: self.policy.extract_root.clone(),
        })?;
        let workdir = tempfile::Builder::new()
            .prefix(&format!("{repo}-"))
            .tempdir_in(&self.policy.extract_root)
            .map_err(|err| PublishError::Workspace {
                source: err,
                path: self.policy.extract_root.clone(),
            })?;

        // Extraction and normalization touch no remote; their failures are
        // pure input validation.
        let archive = request.archive.clone();
        let tree = workdir.path().to_path_buf();
        task::spawn_blocking(move || extract_archive(&archive, &tree)).await??;

        let normalizer = self.normalizer.clone();
        let tree = workdir.path().to_path_buf();
        task::spawn_blocking(move || normalizer.normalize(&tree)).await??;

        match self.host.create_repository(repo).await? {
            Created::Fresh => info!("created repository {repo}"),
            Created::AlreadyExists => debug!("reusing repository {repo}"),
        }

        // The push fails opaquely if the fresh repository is not visible
        // yet, so confirm before syncing instead of sleeping blind.
        poll_until(
            "repository visibility",
            REPO_POLL_ATTEMPTS,
            REPO_POLL_DELAY,
            || async { Ok(self.host.repository_exists(repo).await?.then_some(())) },
        )
        .await?;

        let vcs = self.vcs.clone();
        let identity = self.commit_identity(request);
        let remote_url = self.host.remote_url(repo);
        let message = format!("Publish {}", request.display_name);
        let tree = workdir.path().to_path_buf();
        task::spawn_blocking(move || vcs.sync(&tree, &remote_url, &identity, &message)).await??;

        match self.site.ensure_project(repo, repo).await {
            Ok(Created::Fresh) => info!("created site project {repo}"),
            Ok(Created::AlreadyExists) => debug!("reusing site project {repo}"),
            Err(err) => warn!("binding site project {repo} failed: {err}"),
        }

        match self.site.trigger_build(repo).await {
            Ok(deployment) => self.watch_build(repo, &deployment).await,
            Err(err) => warn!("triggering build for {repo} failed: {err}"),
        }

        Ok(Publication {
            url: self.site.site_url(repo),
            repo: repo.to_string(),
        })
    }

    fn commit_identity(&self, request: &PublishRequest) -> Identity {
        match request.submitter.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                Identity::new(name, self.policy.author.email.clone())
            }
            _ => self.policy.author.clone(),
        }
    }

    /// Watch a triggered build until it settles or the poll budget runs out.
    /// Purely informational; the publication already succeeded.
    async fn watch_build(&self, repo: &str, deployment: &str) {
        let outcome = poll_until("site build", BUILD_POLL_ATTEMPTS, BUILD_POLL_DELAY, || async {
            Ok(match self.site.build_status(repo, deployment).await? {
                BuildStatus::InProgress => None,
                terminal => Some(terminal),
            })
        })
        .await;

        match outcome {
            Ok(BuildStatus::Ready) => info!("site build for {repo} is live"),
            Ok(BuildStatus::Failed(reason)) => warn!("site build for {repo} failed: {reason}"),
            Ok(BuildStatus::InProgress) => {}
            Err(err) => debug!("stopped watching site build for {repo}: {err}"),
        }
    }
}

/// Derive a repository name from a display name.
///
/// Lowercases, maps every run of non-alphanumeric characters to one dash,
/// trims dangling dashes, and applies the configured prefix. Returns `None`
/// when nothing usable remains.
pub fn derive_repo_name(prefix: &str, display_name: &str) -> Option<String> {
    let mut slug = String::with_capacity(display_name.len());
    for ch in display_name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        return None;
    }

    Some(format!("{prefix}-{slug}"))
}

/// Per-repository-name locks.
///
/// Two concurrent deploys of the same project race on the same remote
/// repository and build target; holding the name's lock for the whole
/// pipeline serializes them. Names never leave the map; the set of distinct
/// project names a single process sees is small.
#[derive(Clone, Debug, Default)]
pub struct RepoLocks {
    entries: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl RepoLocks {
    /// Hold the lock for `key` until the returned guard drops.
    pub async fn hold(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.entry(key.to_string()).or_default().clone()
        };

        entry.lock_owned().await
    }
}

/// All possible error types for the publish pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The display name reduces to nothing usable.
    #[error("project name {display_name:?} contains no usable characters")]
    EmptyProjectName { display_name: String },

    /// Archive extraction fails.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Tree normalization fails.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Repository synchronization fails.
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// A load-bearing remote call fails.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The per-request working directory cannot be prepared.
    #[error("cannot prepare working directory under {path:?}")]
    Workspace { source: io::Error, path: PathBuf },

    /// A blocking stage task died.
    #[error("pipeline stage task failed")]
    Task(#[from] task::JoinError),
}

impl PublishError {
    /// True when the failure is the uploader's fault rather than ours or a
    /// remote's: these map to a 400, everything else to a 500.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::EmptyProjectName { .. }
                | Self::Normalize(NormalizeError::MissingEntryDocument { .. })
                | Self::Archive(ArchiveError::Corrupt(_))
        )
    }
}

/// Friendly result alias :3
type Result<T, E = PublishError> = std::result::Result<T, E>;

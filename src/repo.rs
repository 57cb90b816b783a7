// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Repository synchronization.
//!
//! Turns a normalized site tree into a Git repository and force-pushes it to
//! a remote. The only contract callers rely on is that after a successful
//! sync, the remote branch's tree equals the local working tree. History is
//! disposable: every publish of the same project overwrites whatever the
//! remote held before, which is why the push refspec is always forced.
//!
//! Authentication is token-based and non-interactive. The service publishes
//! on behalf of a configured account, never a terminal user.

use git2::{
    Cred, IndexAddOption, PushOptions, RemoteCallbacks, Repository, RepositoryInitOptions,
    Signature,
};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Commit author identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    /// Construct new commit identity.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Layer of indirection for repository synchronization.
pub trait TreeSync {
    /// Publish the tree at `workdir` to `remote_url` as the configured
    /// branch, committed under `identity` with `message`.
    fn sync(&self, workdir: &Path, remote_url: &str, identity: &Identity, message: &str)
        -> Result<()>;
}

/// Repository synchronization through libgit2.
#[derive(Clone, Debug)]
pub struct Git2Sync {
    branch: String,
    username: String,
    token: String,
}

impl Git2Sync {
    /// Construct new libgit2 synchronizer.
    ///
    /// `username` and `token` authenticate pushes over HTTPS. Both are
    /// ignored for local-path remotes, which the tests rely on.
    pub fn new(
        branch: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            branch: branch.into(),
            username: username.into(),
            token: token.into(),
        }
    }

    fn commit_all(&self, repository: &Repository, identity: &Identity, message: &str) -> Result<()> {
        let mut index = repository.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.write()?;

        // INVARIANT: Always use new tree produced by index after staging.
        let tree_oid = index.write_tree()?;
        let tree = repository.find_tree(tree_oid)?;

        // INVARIANT: Always determine latest parent commits to append to.
        let signature = Signature::now(&identity.name, &identity.email)?;
        let mut parents = Vec::new();
        if let Some(oid) = repository.head().ok().and_then(|head| head.target()) {
            parents.push(repository.find_commit(oid)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        repository.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        Ok(())
    }

    fn ensure_remote(&self, repository: &Repository, remote_url: &str) -> Result<()> {
        match repository.find_remote("origin") {
            Ok(remote) if remote.url() == Some(remote_url) => {}
            Ok(_) => {
                repository.remote_set_url("origin", remote_url)?;
            }
            Err(_) => {
                repository.remote("origin", remote_url)?;
            }
        }

        Ok(())
    }

    fn push_forced(&self, repository: &Repository) -> Result<()> {
        let mut callbacks = RemoteCallbacks::new();
        let (username, token) = (self.username.clone(), self.token.clone());
        callbacks.credentials(move |_url, _username_from_url, _allowed| {
            Cred::userpass_plaintext(&username, &token)
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        let refspec = format!("+refs/heads/{0}:refs/heads/{0}", self.branch);
        let mut remote = repository.find_remote("origin")?;
        remote.push(&[refspec.as_str()], Some(&mut options))?;

        Ok(())
    }
}

impl TreeSync for Git2Sync {
    /// Initialize, commit, and force-push the working tree.
    ///
    /// Initializing an already-initialized directory reopens it, so re-syncs
    /// of the same working directory behave like incremental commits.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Git2`] if any libgit2 operation fails. A push
    ///   failure is load-bearing; callers abort the surrounding request.
    #[instrument(skip(self, workdir, identity, message), level = "debug")]
    fn sync(
        &self,
        workdir: &Path,
        remote_url: &str,
        identity: &Identity,
        message: &str,
    ) -> Result<()> {
        info!("publishing {:?} to {remote_url}", workdir.display());

        let mut options = RepositoryInitOptions::new();
        options.initial_head(&self.branch);
        let repository = Repository::init_opts(workdir, &options)?;

        self.commit_all(&repository, identity, message)?;
        self.ensure_remote(&repository, remote_url)?;
        self.push_forced(&repository)?;
        debug!("pushed {} to {remote_url}", self.branch);

        Ok(())
    }
}

/// All possible error types for repository synchronization.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
type Result<T, E = RepoError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn bare_remote(scratch: &Path) -> (Repository, String) {
        let path = scratch.join("remote.git");
        let mut options = RepositoryInitOptions::new();
        options.initial_head("main");
        options.bare(true);
        let repository = Repository::init_opts(&path, &options).unwrap();
        let url = path.to_string_lossy().into_owned();
        (repository, url)
    }

    fn identity() -> Identity {
        Identity::new("John Doe", "john@doe.com")
    }

    #[test]
    fn sync_creates_branch_with_working_tree_contents() {
        let scratch = TempDir::new().unwrap();
        let workdir = scratch.path().join("site");
        fs::create_dir_all(workdir.join("assets")).unwrap();
        fs::write(workdir.join("index.html"), "<html></html>").unwrap();
        fs::write(workdir.join("assets/app.js"), "console.log(1)").unwrap();
        let (remote, url) = bare_remote(scratch.path());

        Git2Sync::new("main", "user", "token")
            .sync(&workdir, &url, &identity(), "publish site")
            .unwrap();

        let head = remote.find_branch("main", git2::BranchType::Local).unwrap();
        let commit = head.get().peel_to_commit().unwrap();
        assert_eq!(commit.message(), Some("publish site"));
        assert_eq!(commit.author().name(), Some("John Doe"));
        let tree = commit.tree().unwrap();
        assert!(tree.get_path(Path::new("index.html")).is_ok());
        assert!(tree.get_path(Path::new("assets/app.js")).is_ok());
    }

    #[test]
    fn resync_overwrites_remote_branch() {
        let scratch = TempDir::new().unwrap();
        let workdir = scratch.path().join("site");
        fs::create_dir_all(&workdir).unwrap();
        fs::write(workdir.join("index.html"), "first").unwrap();
        let (remote, url) = bare_remote(scratch.path());
        let sync = Git2Sync::new("main", "user", "token");

        sync.sync(&workdir, &url, &identity(), "first publish").unwrap();
        fs::write(workdir.join("index.html"), "second").unwrap();
        fs::write(workdir.join("extra.css"), "body {}").unwrap();
        sync.sync(&workdir, &url, &identity(), "second publish").unwrap();

        let head = remote.find_branch("main", git2::BranchType::Local).unwrap();
        let commit = head.get().peel_to_commit().unwrap();
        assert_eq!(commit.message(), Some("second publish"));
        let tree = commit.tree().unwrap();
        let entry = tree.get_path(Path::new("index.html")).unwrap();
        let blob = remote.find_blob(entry.id()).unwrap();
        assert_eq!(blob.content(), &b"second"[..]);
        assert!(tree.get_path(Path::new("extra.css")).is_ok());
    }

    #[test]
    fn sync_reuses_existing_remote_with_new_url() {
        let scratch = TempDir::new().unwrap();
        let workdir = scratch.path().join("site");
        fs::create_dir_all(&workdir).unwrap();
        fs::write(workdir.join("index.html"), "hi").unwrap();
        let (_, first_url) = bare_remote(scratch.path());
        let sync = Git2Sync::new("main", "user", "token");
        sync.sync(&workdir, &first_url, &identity(), "publish").unwrap();

        let other = scratch.path().join("other.git");
        let mut options = RepositoryInitOptions::new();
        options.initial_head("main");
        options.bare(true);
        let second = Repository::init_opts(&other, &options).unwrap();
        let second_url = other.to_string_lossy().into_owned();

        fs::write(workdir.join("index.html"), "again").unwrap();
        sync.sync(&workdir, &second_url, &identity(), "publish again").unwrap();

        assert!(second.find_branch("main", git2::BranchType::Local).is_ok());
    }
}

// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Remote service clients.
//!
//! REST clients for the three external services quayside talks to: the
//! repository host that stores published sites, the static-site host that
//! builds and serves them, and an optional text-completion endpoint that the
//! server proxies verbatim.
//!
//! Every client reports failures as a [`RemoteError`] and leaves policy to
//! the caller: the publish pipeline decides per stage whether an error is
//! tolerated, retried, or aborts the request. Nothing in this module
//! swallows a failure on its own.

pub mod github;
pub mod inference;
pub mod pages;

use serde::de::DeserializeOwned;
use std::{future::Future, time::Duration};
use tracing::debug;

/// Outcome of an idempotent create call against a remote service.
///
/// Both hosts treat "already exists" as success; the distinction only
/// matters for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Created {
    /// The resource was created by this call.
    Fresh,

    /// The resource existed before this call.
    AlreadyExists,
}

/// Poll a probe with bounded doubling backoff until it yields a value.
///
/// Replaces fixed post-hoc sleeps for eventual consistency: the probe runs
/// up to `attempts` times, sleeping `initial_delay` after the first miss and
/// doubling after each subsequent one.
///
/// # Errors
///
/// - Return [`RemoteError::PollExhausted`] if every attempt yields `None`.
/// - Propagate the first probe error as-is.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    attempts: u32,
    initial_delay: Duration,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let mut delay = initial_delay;
    for attempt in 1..=attempts {
        if let Some(value) = probe().await? {
            return Ok(value);
        }

        if attempt < attempts {
            debug!("{what} not ready after attempt {attempt}, sleeping {delay:?}");
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    Err(RemoteError::PollExhausted { what: what.into() })
}

pub(crate) fn build_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("quayside/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Read a response body as JSON, mapping failure statuses to
/// [`RemoteError::Status`].
pub(crate) async fn read_json<T: DeserializeOwned>(
    kind: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(RemoteError::Status {
            kind,
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|err| RemoteError::Decode {
        kind,
        reason: err.to_string(),
    })
}

/// All possible error types for remote service calls.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The service answered with a failure status.
    #[error("{kind} request failed with status {status}: {body}")]
    Status {
        kind: &'static str,
        status: u16,
        body: String,
    },

    /// The request never completed.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The service answered with a body we cannot interpret.
    #[error("unexpected {kind} response: {reason}")]
    Decode { kind: &'static str, reason: String },

    /// A bounded poll ran out of attempts.
    #[error("gave up waiting for {what}")]
    PollExhausted { what: String },
}

/// Friendly result alias :3
type Result<T, E = RemoteError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn poll_until_returns_first_hit() {
        let calls = Arc::new(AtomicU32::new(0));
        let probe_calls = calls.clone();

        let value = poll_until("thing", 5, Duration::from_millis(1), move || {
            let calls = probe_calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((n == 3).then_some("ready"))
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poll_until_gives_up_after_attempts() {
        let result: Result<()> = poll_until("thing", 3, Duration::from_millis(1), || async {
            Ok(None)
        })
        .await;

        assert!(matches!(result, Err(RemoteError::PollExhausted { .. })));
    }

    #[tokio::test]
    async fn poll_until_propagates_probe_errors() {
        let result: Result<()> = poll_until("thing", 3, Duration::from_millis(1), || async {
            Err(RemoteError::Decode {
                kind: "probe",
                reason: "boom".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(RemoteError::Decode { .. })));
    }
}

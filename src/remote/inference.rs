// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Text-completion passthrough.
//!
//! Forwards a completion request to a configured third-party inference
//! endpoint and hands the response body back verbatim. Quayside adds bearer
//! authentication and, when the configuration names one, a default model for
//! requests that omit it. It interprets neither the request nor the
//! response.

use crate::{
    config::InferenceConfig,
    remote::{build_client, read_json, RemoteError},
};

use serde_json::Value;
use tracing::instrument;

/// Completion endpoint access.
#[derive(Clone, Debug)]
pub struct InferenceClient {
    http: reqwest::Client,
    url: String,
    token: String,
    model: Option<String>,
}

impl InferenceClient {
    /// Construct new client from configuration.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Transport`] if the HTTP client cannot be
    ///   built.
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        Ok(Self {
            http: build_client()?,
            url: config.url.clone(),
            token: config.token.clone(),
            model: config.model.clone(),
        })
    }

    /// Forward a completion payload and return the response verbatim.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Status`] if the endpoint answers with a
    ///   failure status; the raw body rides along for the caller to report.
    #[instrument(skip(self, payload), level = "debug")]
    pub async fn complete(&self, mut payload: Value) -> Result<Value> {
        inject_default_model(&mut payload, self.model.as_deref());

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;

        read_json("completion", response).await
    }
}

fn inject_default_model(payload: &mut Value, model: Option<&str>) {
    if let (Some(model), Some(object)) = (model, payload.as_object_mut()) {
        object
            .entry("model")
            .or_insert_with(|| Value::String(model.to_string()));
    }
}

/// Friendly result alias :3
type Result<T, E = RemoteError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn default_model_fills_requests_that_omit_one() {
        let mut payload = json!({ "prompt": "hello" });

        inject_default_model(&mut payload, Some("default-model"));

        assert_eq!(payload["model"], "default-model");
    }

    #[test]
    fn explicit_model_is_left_alone() {
        let mut payload = json!({ "prompt": "hello", "model": "chosen" });

        inject_default_model(&mut payload, Some("default-model"));

        assert_eq!(payload["model"], "chosen");
    }

    #[test]
    fn missing_configuration_changes_nothing() {
        let mut payload = json!({ "prompt": "hello" });

        inject_default_model(&mut payload, None);

        assert_eq!(payload.get("model"), None);
    }
}

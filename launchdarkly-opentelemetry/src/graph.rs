// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::thread;

use serde::{Deserialize, Serialize};

use ld_observe::{ld_debug, ld_error};
use ld_observe_sampling::SamplingConfig;

use crate::providers;

/// Query fetching the per-project sampling configuration. The shape mirrors
/// the backend's `MatchConfig` schema, which deserializes directly into
/// [`SamplingConfig`].
const GET_SAMPLING_CONFIG_QUERY: &str = r#"fragment MatchParts on MatchConfig {
  regexValue
  matchValue
}

query GetSamplingConfig($organization_verbose_id: String!) {
  sampling(organization_verbose_id: $organization_verbose_id) {
    spans {
      name {
        ...MatchParts
      }
      attributes {
        key {
          ...MatchParts
        }
        attribute {
          ...MatchParts
        }
      }
      events {
        name {
          ...MatchParts
        }
        attributes {
          key {
            ...MatchParts
          }
          attribute {
            ...MatchParts
          }
        }
      }
      samplingRatio
    }
    logs {
      message {
        ...MatchParts
      }
      severityText {
        ...MatchParts
      }
      attributes {
        key {
          ...MatchParts
        }
        attribute {
          ...MatchParts
        }
      }
      samplingRatio
    }
  }
}"#;

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Variables<'a>,
}

#[derive(Serialize)]
struct Variables<'a> {
    organization_verbose_id: &'a str,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<SamplingData>,
}

#[derive(Deserialize)]
struct SamplingData {
    #[serde(default)]
    sampling: Option<SamplingConfig>,
}

async fn fetch_sampling_config(
    backend_url: &str,
    project_key: &str,
) -> Result<Option<SamplingConfig>, reqwest::Error> {
    let request = GraphqlRequest {
        query: GET_SAMPLING_CONFIG_QUERY,
        variables: Variables {
            organization_verbose_id: project_key,
        },
    };

    let response = reqwest::Client::new()
        .post(backend_url)
        .json(&request)
        .send()
        .await?
        .error_for_status()?;

    let payload: GraphqlResponse = response.json().await?;
    Ok(payload.data.and_then(|data| data.sampling))
}

/// Fetches the sampling configuration once, on a background thread, and
/// installs it on the export sampler. Failure leaves the sampler at whatever
/// configuration it already had.
pub(crate) fn spawn_sampling_config_fetch(backend_url: String, project_key: String) {
    let spawned = thread::Builder::new()
        .name("ld-observe-sampling-config".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    ld_error!("failed to create sampling config fetch runtime: {err}");
                    return;
                }
            };

            match runtime.block_on(fetch_sampling_config(&backend_url, &project_key)) {
                Ok(Some(config)) => {
                    ld_debug!(
                        "got sampling config: {} span rules, {} log rules",
                        config.spans.len(),
                        config.logs.len()
                    );
                    providers::set_sampling_config(config);
                }
                Ok(None) => {
                    ld_debug!("sampling config response contained no configuration");
                }
                Err(err) => {
                    ld_error!("failed to get sampling config: {err}");
                }
            }
        });

    if let Err(err) = spawned {
        ld_error!("failed to spawn sampling config fetch thread: {err}");
    }
}

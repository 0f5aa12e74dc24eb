//! Vercel deployment client
//!
//! Thin reqwest wrapper over the two calls previewbot needs: create a
//! deployment from an inline file manifest, and assign an alias to it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::RemoteError;
use crate::remote_traits::{
    ensure_https, RemoteResult, VercelApi, VercelDeployRequest, VercelDeployment,
};

const DEFAULT_API_BASE: &str = "https://api.vercel.com";

/// Vercel client for deployment operations
pub struct VercelClient {
    api_base: String,
    token: String,
    http: reqwest::Client,
}

impl VercelClient {
    /// Create a new Vercel client
    pub fn new(token: &str) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("previewbot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.to_string(),
            http,
        })
    }

    /// Point the client at a different API base (tests, proxies)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn with_team(
        &self,
        request: reqwest::RequestBuilder,
        team_id: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match team_id {
            Some(team) if !team.is_empty() => request.query(&[("teamId", team)]),
            _ => request,
        }
    }

    /// Send a request, returning the body text of a 2xx response.
    async fn send(&self, request: reqwest::RequestBuilder) -> RemoteResult<String> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Parse a 2xx deployment response; a missing or empty `url` is an error.
fn parse_deployment(body: &str) -> RemoteResult<VercelDeployment> {
    #[derive(Deserialize)]
    struct Created {
        id: String,
        url: Option<String>,
    }

    let created: Created = serde_json::from_str(body)?;
    match created.url {
        Some(url) if !url.trim().is_empty() => Ok(VercelDeployment {
            id: created.id,
            url: ensure_https(url.trim()),
        }),
        _ => Err(RemoteError::MissingDeploymentUrl),
    }
}

#[async_trait]
impl VercelApi for VercelClient {
    async fn create_deployment(
        &self,
        team_id: Option<&str>,
        request: &VercelDeployRequest,
    ) -> RemoteResult<VercelDeployment> {
        debug!(
            project = %request.project,
            deploy_target = %request.target,
            files = request.files.len(),
            "Creating Vercel deployment"
        );
        let url = format!("{}/v13/deployments", self.api_base);
        let body = self
            .send(self.with_team(self.http.post(url).json(request), team_id))
            .await?;
        parse_deployment(&body)
    }

    async fn assign_alias(
        &self,
        team_id: Option<&str>,
        deployment_id: &str,
        alias: &str,
    ) -> RemoteResult<String> {
        #[derive(Deserialize)]
        struct Assigned {
            alias: Option<String>,
        }

        let url = format!("{}/v2/deployments/{}/aliases", self.api_base, deployment_id);
        let body = self
            .send(self.with_team(
                self.http.post(url).json(&json!({ "alias": alias })),
                team_id,
            ))
            .await?;
        let assigned: Assigned = serde_json::from_str(&body)?;
        Ok(assigned.alias.unwrap_or_else(|| alias.to_string()))
    }
}

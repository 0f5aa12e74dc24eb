//! GitHub-backed `CommentStore`, `DeploymentLedger` and `ChangeSource`
//!
//! Pull request comments go through GraphQL (paginated discovery, minimize);
//! commit comments, deployments and file listings go through REST.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::RemoteError;
use crate::remote_traits::{
    ChangeSource, CommentId, CommentPage, CommentStore, CommentTarget, DeploymentLedger,
    DeploymentRecordId, DeploymentState, DeploymentStatusEntry, DeploymentStatusUpdate,
    DeploymentSummary, NewDeployment, RemoteComment, RemoteResult, CHANGED_FILES_PAGE_SIZE,
    COMMENT_PAGE_SIZE,
};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// GitHub connection settings
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// REST base URL (GraphQL lives at `{api_base}/graphql`)
    pub api_base: String,
    /// `owner/repo`
    pub repository: String,
    /// Bearer token
    pub token: String,
}

impl GitHubConfig {
    pub fn new(repository: &str, token: &str) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            repository: repository.to_string(),
            token: token.to_string(),
        }
    }

    /// Override the API base (GitHub Enterprise)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }
}

/// GitHub REST + GraphQL client.
pub struct GitHubClient {
    config: GitHubConfig,
    http: reqwest::Client,
}

impl GitHubClient {
    /// Create a new client.
    pub fn new(config: GitHubConfig) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("previewbot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, http })
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}{}",
            self.config.api_base, self.config.repository, path
        )
    }

    fn owner_and_name(&self) -> (&str, &str) {
        self.config
            .repository
            .split_once('/')
            .unwrap_or((self.config.repository.as_str(), ""))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = request
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> RemoteResult<T> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> RemoteResult<T> {
        #[derive(Deserialize)]
        struct Envelope<T> {
            data: Option<T>,
            #[serde(default)]
            errors: Vec<GraphQlError>,
        }

        #[derive(Deserialize)]
        struct GraphQlError {
            message: String,
        }

        let url = format!("{}/graphql", self.config.api_base);
        let envelope: Envelope<T> = self
            .send_json(
                self.http
                    .post(url)
                    .json(&json!({ "query": query, "variables": variables })),
            )
            .await?;

        if !envelope.errors.is_empty() {
            let messages: Vec<String> = envelope.errors.into_iter().map(|e| e.message).collect();
            return Err(RemoteError::GraphQl(messages.join("; ")));
        }
        envelope
            .data
            .ok_or_else(|| RemoteError::Decode("GraphQL response carried no data".to_string()))
    }

    async fn pull_request_node_id(&self, number: u64) -> RemoteResult<String> {
        #[derive(Deserialize)]
        struct Data {
            repository: Option<Repo>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Repo {
            pull_request: Option<NodeId>,
        }
        #[derive(Deserialize)]
        struct NodeId {
            id: String,
        }

        let (owner, name) = self.owner_and_name();
        let data: Data = self
            .graphql(
                "query($owner: String!, $repo: String!, $number: Int!) {
                    repository(owner: $owner, name: $repo) { pullRequest(number: $number) { id } }
                }",
                json!({ "owner": owner, "repo": name, "number": number }),
            )
            .await?;

        data.repository
            .and_then(|r| r.pull_request)
            .map(|pr| pr.id)
            .ok_or_else(|| RemoteError::NotFound(format!("pull request #{}", number)))
    }

    async fn list_pull_request_comments(
        &self,
        number: u64,
        cursor: Option<&str>,
    ) -> RemoteResult<CommentPage> {
        #[derive(Deserialize)]
        struct Data {
            repository: Option<Repo>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Repo {
            pull_request: Option<PullRequest>,
        }
        #[derive(Deserialize)]
        struct PullRequest {
            comments: Connection,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Connection {
            nodes: Vec<Node>,
            page_info: PageInfo,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Node {
            id: String,
            database_id: Option<u64>,
            author: Option<Author>,
            is_minimized: bool,
            body: String,
        }
        #[derive(Deserialize)]
        struct Author {
            login: String,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PageInfo {
            has_next_page: bool,
            end_cursor: Option<String>,
        }

        let (owner, name) = self.owner_and_name();
        let data: Data = self
            .graphql(
                "query($owner: String!, $repo: String!, $number: Int!, $first: Int!, $after: String) {
                    repository(owner: $owner, name: $repo) {
                        pullRequest(number: $number) {
                            comments(first: $first, after: $after) {
                                nodes { id databaseId author { login } isMinimized body }
                                pageInfo { hasNextPage endCursor }
                            }
                        }
                    }
                }",
                json!({
                    "owner": owner,
                    "repo": name,
                    "number": number,
                    "first": COMMENT_PAGE_SIZE,
                    "after": cursor,
                }),
            )
            .await?;

        let connection = data
            .repository
            .and_then(|r| r.pull_request)
            .map(|pr| pr.comments)
            .ok_or_else(|| RemoteError::NotFound(format!("pull request #{}", number)))?;

        let comments = connection
            .nodes
            .into_iter()
            .map(|n| RemoteComment {
                id: CommentId::new(n.id, n.database_id),
                author_login: n.author.map(|a| a.login).unwrap_or_default(),
                is_minimized: n.is_minimized,
                body: n.body,
            })
            .collect();

        let next_cursor = if connection.page_info.has_next_page {
            connection.page_info.end_cursor
        } else {
            None
        };

        Ok(CommentPage {
            comments,
            next_cursor,
        })
    }

    async fn list_commit_comments(
        &self,
        sha: &str,
        cursor: Option<&str>,
    ) -> RemoteResult<CommentPage> {
        #[derive(Deserialize)]
        struct RestComment {
            id: u64,
            node_id: String,
            user: Option<Author>,
            body: String,
        }
        #[derive(Deserialize)]
        struct Author {
            login: String,
        }

        let page: u32 = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| RemoteError::Decode(format!("invalid page cursor '{}'", c)))?,
            None => 1,
        };

        let url = self.repo_url(&format!("/commits/{}/comments", sha));
        let rest: Vec<RestComment> = self
            .send_json(self.http.get(url).query(&[
                ("per_page", COMMENT_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]))
            .await?;

        let next_cursor = if rest.len() as u32 >= COMMENT_PAGE_SIZE {
            Some((page + 1).to_string())
        } else {
            None
        };

        let comments = rest
            .into_iter()
            .map(|c| RemoteComment {
                id: CommentId::new(c.node_id, Some(c.id)),
                author_login: c.user.map(|u| u.login).unwrap_or_default(),
                is_minimized: false,
                body: c.body,
            })
            .collect();

        Ok(CommentPage {
            comments,
            next_cursor,
        })
    }

    fn rest_comment_id(id: &CommentId) -> RemoteResult<u64> {
        id.database_id
            .ok_or_else(|| RemoteError::NotFound(format!("REST id for comment {}", id.node_id)))
    }
}

#[async_trait]
impl CommentStore for GitHubClient {
    async fn viewer_login(&self) -> RemoteResult<String> {
        #[derive(Deserialize)]
        struct Data {
            viewer: Viewer,
        }
        #[derive(Deserialize)]
        struct Viewer {
            login: String,
        }

        let data: Data = self.graphql("query { viewer { login } }", json!({})).await?;
        Ok(data.viewer.login)
    }

    async fn list_comments(
        &self,
        target: &CommentTarget,
        cursor: Option<&str>,
    ) -> RemoteResult<CommentPage> {
        debug!(comment_target = %target, cursor = ?cursor, "Listing comments");
        match target {
            CommentTarget::PullRequest { number } => {
                self.list_pull_request_comments(*number, cursor).await
            }
            CommentTarget::Commit { sha } => self.list_commit_comments(sha, cursor).await,
        }
    }

    async fn create_comment(&self, target: &CommentTarget, body: &str) -> RemoteResult<CommentId> {
        match target {
            CommentTarget::PullRequest { number } => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Data {
                    add_comment: AddComment,
                }
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct AddComment {
                    comment_edge: Edge,
                }
                #[derive(Deserialize)]
                struct Edge {
                    node: Node,
                }
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Node {
                    id: String,
                    database_id: Option<u64>,
                }

                let subject_id = self.pull_request_node_id(*number).await?;
                let data: Data = self
                    .graphql(
                        "mutation($subjectId: ID!, $body: String!) {
                            addComment(input: { subjectId: $subjectId, body: $body }) {
                                commentEdge { node { id databaseId } }
                            }
                        }",
                        json!({ "subjectId": subject_id, "body": body }),
                    )
                    .await?;
                let node = data.add_comment.comment_edge.node;
                Ok(CommentId::new(node.id, node.database_id))
            }
            CommentTarget::Commit { sha } => {
                #[derive(Deserialize)]
                struct Created {
                    id: u64,
                    node_id: String,
                }

                let url = self.repo_url(&format!("/commits/{}/comments", sha));
                let created: Created = self
                    .send_json(self.http.post(url).json(&json!({ "body": body })))
                    .await?;
                Ok(CommentId::new(created.node_id, Some(created.id)))
            }
        }
    }

    async fn update_comment(
        &self,
        target: &CommentTarget,
        id: &CommentId,
        body: &str,
    ) -> RemoteResult<()> {
        match target {
            CommentTarget::PullRequest { .. } => {
                let _: Value = self
                    .graphql(
                        "mutation($id: ID!, $body: String!) {
                            updateIssueComment(input: { id: $id, body: $body }) { issueComment { id } }
                        }",
                        json!({ "id": id.node_id, "body": body }),
                    )
                    .await?;
                Ok(())
            }
            CommentTarget::Commit { .. } => {
                let url = self.repo_url(&format!("/comments/{}", Self::rest_comment_id(id)?));
                self.send(self.http.patch(url).json(&json!({ "body": body })))
                    .await?;
                Ok(())
            }
        }
    }

    async fn delete_comment(&self, target: &CommentTarget, id: &CommentId) -> RemoteResult<()> {
        match target {
            CommentTarget::PullRequest { .. } => {
                let _: Value = self
                    .graphql(
                        "mutation($id: ID!) { deleteIssueComment(input: { id: $id }) { clientMutationId } }",
                        json!({ "id": id.node_id }),
                    )
                    .await?;
                Ok(())
            }
            CommentTarget::Commit { .. } => {
                let url = self.repo_url(&format!("/comments/{}", Self::rest_comment_id(id)?));
                self.send(self.http.delete(url)).await?;
                Ok(())
            }
        }
    }

    async fn minimize_comment(&self, _target: &CommentTarget, id: &CommentId) -> RemoteResult<()> {
        let _: Value = self
            .graphql(
                "mutation($id: ID!) {
                    minimizeComment(input: { subjectId: $id, classifier: OUTDATED }) {
                        minimizedComment { isMinimized }
                    }
                }",
                json!({ "id": id.node_id }),
            )
            .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct RestDeployment {
    id: u64,
    environment: String,
    #[serde(rename = "ref")]
    git_ref: String,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RestDeploymentStatus {
    state: String,
    environment_url: Option<String>,
    created_at: DateTime<Utc>,
}

fn parse_state(raw: &str) -> Option<DeploymentState> {
    match raw {
        "pending" | "queued" => Some(DeploymentState::Pending),
        "in_progress" => Some(DeploymentState::InProgress),
        "success" => Some(DeploymentState::Success),
        "failure" | "error" => Some(DeploymentState::Failure),
        _ => None,
    }
}

#[async_trait]
impl DeploymentLedger for GitHubClient {
    async fn create_deployment(
        &self,
        request: &NewDeployment,
    ) -> RemoteResult<DeploymentRecordId> {
        let url = self.repo_url("/deployments");
        let created: RestDeployment = self
            .send_json(self.http.post(url).json(&json!({
                "ref": request.git_ref,
                "environment": request.environment,
                "transient_environment": request.transient,
                "production_environment": request.production,
                "description": request.description,
                "auto_merge": false,
                "required_contexts": [],
            })))
            .await?;
        Ok(DeploymentRecordId(created.id))
    }

    async fn create_status(
        &self,
        id: DeploymentRecordId,
        update: &DeploymentStatusUpdate,
    ) -> RemoteResult<()> {
        let url = self.repo_url(&format!("/deployments/{}/statuses", id));
        let mut body = json!({
            "state": update.state.as_str(),
            "description": update.description,
        });
        if let Some(env_url) = &update.environment_url {
            body["environment_url"] = json!(env_url);
        }
        if let Some(log_url) = &update.log_url {
            body["log_url"] = json!(log_url);
        }
        self.send(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    async fn list_deployments(&self, environment: &str) -> RemoteResult<Vec<DeploymentSummary>> {
        let url = self.repo_url("/deployments");
        let rest: Vec<RestDeployment> = self
            .send_json(
                self.http
                    .get(url)
                    .query(&[("environment", environment), ("per_page", "30")]),
            )
            .await?;
        Ok(rest
            .into_iter()
            .map(|d| DeploymentSummary {
                id: DeploymentRecordId(d.id),
                environment: d.environment,
                git_ref: d.git_ref,
                created_at: d.created_at,
            })
            .collect())
    }

    async fn list_statuses(
        &self,
        id: DeploymentRecordId,
    ) -> RemoteResult<Vec<DeploymentStatusEntry>> {
        let url = self.repo_url(&format!("/deployments/{}/statuses", id));
        let rest: Vec<RestDeploymentStatus> = self
            .send_json(self.http.get(url).query(&[("per_page", "30")]))
            .await?;
        Ok(rest
            .into_iter()
            .filter_map(|s| {
                parse_state(&s.state).map(|state| DeploymentStatusEntry {
                    state,
                    environment_url: s.environment_url,
                    created_at: s.created_at,
                })
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct RestFile {
    filename: String,
}

#[async_trait]
impl ChangeSource for GitHubClient {
    async fn pull_request_files(&self, number: u64, page: u32) -> RemoteResult<Vec<String>> {
        let url = self.repo_url(&format!("/pulls/{}/files", number));
        let files: Vec<RestFile> = self
            .send_json(self.http.get(url).query(&[
                ("per_page", CHANGED_FILES_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]))
            .await?;
        Ok(files.into_iter().map(|f| f.filename).collect())
    }

    async fn compare_files(&self, base: &str, head: &str) -> RemoteResult<Vec<String>> {
        #[derive(Deserialize)]
        struct Comparison {
            #[serde(default)]
            files: Vec<RestFile>,
        }

        let url = self.repo_url(&format!("/compare/{}...{}", base, head));
        let comparison: Comparison = self.send_json(self.http.get(url)).await?;
        Ok(comparison.files.into_iter().map(|f| f.filename).collect())
    }

    async fn commit_parent(&self, sha: &str) -> RemoteResult<Option<String>> {
        #[derive(Deserialize)]
        struct Commit {
            parents: Vec<Parent>,
        }
        #[derive(Deserialize)]
        struct Parent {
            sha: String,
        }

        let url = self.repo_url(&format!("/commits/{}", sha));
        let commit: Commit = self.send_json(self.http.get(url)).await?;
        Ok(commit.parents.into_iter().next().map(|p| p.sha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_api_base_trims_trailing_slash() {
        let config = GitHubConfig::new("acme/site", "t").with_api_base("https://ghe.example.com/api/v3/");
        assert_eq!(config.api_base, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn test_repo_url() {
        let client = GitHubClient::new(GitHubConfig::new("acme/site", "t")).unwrap();
        assert_eq!(
            client.repo_url("/deployments"),
            "https://api.github.com/repos/acme/site/deployments"
        );
        assert_eq!(client.owner_and_name(), ("acme", "site"));
    }

    #[test]
    fn test_parse_state_maps_remote_states() {
        assert_eq!(parse_state("success"), Some(DeploymentState::Success));
        assert_eq!(parse_state("error"), Some(DeploymentState::Failure));
        assert_eq!(parse_state("queued"), Some(DeploymentState::Pending));
        assert_eq!(parse_state("inactive"), None);
    }
}

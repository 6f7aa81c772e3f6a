//! HTTP implementation of [`Gateway`] against the Space REST API.

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{
    AutomationJob, CreateRepositoryOptions, Gateway, GatewayResult, ProjectFields,
    ProtectedBranchSettings, ProtectedBranchSpec, RemoteProject, RemoteRepository, RoleAction,
    RoleAssignment,
};
use crate::config::ProviderConfig;
use crate::error::GatewayError;
use crate::model::{derive_project_key, SubjectKind};

const SETTINGS_SELECTOR: &str = "protectedBranches(pattern,allowCreate,allowPush,allowDelete,allowForcePush,qualityGate(approvals(approvedBy,minApprovals),automationJobs))";
const REPOS_SELECTOR: &str = "repos(id,name,description,defaultBranch)";

/// Space API client.
#[derive(Debug, Clone)]
pub struct SpaceClient {
    client: Client,
    host: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ProjectRepos {
    #[serde(default)]
    repos: Vec<RemoteRepository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsEnvelope {
    #[serde(default)]
    protected_branches: Option<Vec<ProtectedBranchSpec>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<String>,
    add_roles: Vec<&'a str>,
    remove_roles: Vec<&'a str>,
}

impl<'a> RoleUpdate<'a> {
    fn from_assignment(assignment: &'a RoleAssignment) -> Self {
        let role = vec![assignment.role.as_str()];
        let (add_roles, remove_roles) = match assignment.action {
            RoleAction::Add => (role, Vec::new()),
            RoleAction::Remove => (Vec::new(), role),
        };
        let (team, profile) = match assignment.subject {
            SubjectKind::Team => (Some(format!("name:{}", assignment.subject_id)), None),
            SubjectKind::User => (None, Some(format!("username:{}", assignment.subject_id))),
        };
        Self {
            team,
            profile,
            add_roles,
            remove_roles,
        }
    }
}

impl SpaceClient {
    /// Build a client from resolved provider configuration.
    pub fn new(config: &ProviderConfig) -> GatewayResult<Self> {
        let mut headers = header::HeaderMap::new();

        let token = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| GatewayError::InvalidConfig("token contains invalid characters".into()))?;
        headers.insert(header::AUTHORIZATION, token);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        if !config.host.starts_with("http://") && !config.host.starts_with("https://") {
            return Err(GatewayError::InvalidConfig(format!(
                "host must be an http(s) URL, got '{}'",
                config.host
            )));
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/http{}", self.host, endpoint)
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> GatewayResult<T> {
        let response = self.check_status(response, endpoint).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(format!("{}: {}", endpoint, e)))
    }

    async fn check_status(&self, response: Response, endpoint: &str) -> GatewayResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Unauthorized(format!(
                "token rejected by {}",
                endpoint
            )));
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(endpoint.to_string()));
        }

        // Space errors look like {"error": "...", "error_description": "..."}.
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error_description")
                    .or_else(|| v.get("error"))
                    .and_then(|m| m.as_str().map(str::to_string))
            })
            .unwrap_or(body);

        Err(GatewayError::status(status.as_u16(), endpoint, message))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, fields: Option<&str>) -> GatewayResult<T> {
        debug!(method = "GET", endpoint, "space request");
        let mut request = self.client.get(self.api_url(endpoint));
        if let Some(fields) = fields {
            request = request.query(&[("$fields", fields)]);
        }
        let response = request.send().await?;
        self.handle_response(response, endpoint).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> GatewayResult<T> {
        debug!(method = "POST", endpoint, "space request");
        let response = self
            .client
            .post(self.api_url(endpoint))
            .json(body)
            .send()
            .await?;
        self.handle_response(response, endpoint).await
    }

    async fn post_empty<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> GatewayResult<()> {
        debug!(method = "POST", endpoint, "space request");
        let response = self
            .client
            .post(self.api_url(endpoint))
            .json(body)
            .send()
            .await?;
        self.check_status(response, endpoint).await.map(|_| ())
    }

    async fn delete(&self, endpoint: &str) -> GatewayResult<()> {
        debug!(method = "DELETE", endpoint, "space request");
        let response = self.client.delete(self.api_url(endpoint)).send().await?;
        self.check_status(response, endpoint).await.map(|_| ())
    }
}

fn project_endpoint(id: &str) -> String {
    format!("/projects/id:{}", id)
}

fn repository_endpoint(project_id: &str, name: &str) -> String {
    format!("/projects/id:{}/repositories/{}", project_id, name)
}

#[async_trait]
impl Gateway for SpaceClient {
    async fn list_projects(&self) -> GatewayResult<Vec<RemoteProject>> {
        let fields = format!("data({})", ProjectFields::Basic.selector());
        let page: Page<RemoteProject> = self.get("/projects", Some(fields.as_str())).await?;
        Ok(page.data)
    }

    async fn create_project(&self, name: &str) -> GatewayResult<RemoteProject> {
        let body = json!({
            "name": name,
            "key": {"key": derive_project_key(name)},
        });
        self.post("/projects", &body).await
    }

    async fn get_project(&self, id: &str, fields: ProjectFields) -> GatewayResult<RemoteProject> {
        self.get(&project_endpoint(id), Some(fields.selector())).await
    }

    async fn update_project(&self, id: &str, name: &str) -> GatewayResult<RemoteProject> {
        let endpoint = project_endpoint(id);
        debug!(method = "PATCH", endpoint = %endpoint, "space request");
        let response = self
            .client
            .patch(self.api_url(&endpoint))
            .json(&json!({ "name": name }))
            .send()
            .await?;
        self.handle_response(response, &endpoint).await
    }

    async fn delete_project(&self, id: &str) -> GatewayResult<()> {
        self.delete(&project_endpoint(id)).await
    }

    async fn set_project_role(
        &self,
        project_id: &str,
        assignment: &RoleAssignment,
    ) -> GatewayResult<()> {
        let path = match assignment.subject {
            SubjectKind::Team => "people/teams/update",
            SubjectKind::User => "people/profiles/update",
        };
        let endpoint = format!("{}/{}", project_endpoint(project_id), path);
        self.post_empty(&endpoint, &RoleUpdate::from_assignment(assignment))
            .await
    }

    async fn create_repository(
        &self,
        project_id: &str,
        name: &str,
        options: &CreateRepositoryOptions,
    ) -> GatewayResult<RemoteRepository> {
        self.post(&repository_endpoint(project_id, name), options).await
    }

    async fn get_repository(&self, project_id: &str, name: &str) -> GatewayResult<RemoteRepository> {
        let project: ProjectRepos = self
            .get(&project_endpoint(project_id), Some(REPOS_SELECTOR))
            .await?;
        project
            .repos
            .into_iter()
            .find(|repo| repo.name == name)
            .ok_or_else(|| GatewayError::NotFound(repository_endpoint(project_id, name)))
    }

    async fn update_repository_description(
        &self,
        project_id: &str,
        name: &str,
        description: &str,
    ) -> GatewayResult<()> {
        let endpoint = format!("{}/description", repository_endpoint(project_id, name));
        self.post_empty(&endpoint, &json!({ "description": description }))
            .await
    }

    async fn update_repository_default_branch(
        &self,
        project_id: &str,
        name: &str,
        branch: &str,
    ) -> GatewayResult<()> {
        let endpoint = format!("{}/default-branch", repository_endpoint(project_id, name));
        self.post_empty(&endpoint, &json!({ "branch": branch })).await
    }

    async fn delete_repository(&self, project_id: &str, name: &str) -> GatewayResult<()> {
        self.delete(&repository_endpoint(project_id, name)).await
    }

    async fn get_protected_branch_settings(
        &self,
        project_id: &str,
        name: &str,
    ) -> GatewayResult<Vec<ProtectedBranchSpec>> {
        let endpoint = format!("{}/settings", repository_endpoint(project_id, name));
        let envelope: SettingsEnvelope = self.get(&endpoint, Some(SETTINGS_SELECTOR)).await?;
        Ok(envelope.protected_branches.unwrap_or_default())
    }

    async fn put_protected_branch_settings(
        &self,
        project_id: &str,
        name: &str,
        settings: &ProtectedBranchSettings,
    ) -> GatewayResult<()> {
        let endpoint = format!("{}/settings", repository_endpoint(project_id, name));
        self.post_empty(&endpoint, &json!({ "settings": settings }))
            .await
    }

    async fn resolve_automation_job_id(
        &self,
        project_id: &str,
        repository: &str,
        branch: &str,
        job_name: &str,
    ) -> GatewayResult<String> {
        let endpoint = format!("{}/automation/jobs", project_endpoint(project_id));
        debug!(method = "GET", endpoint = %endpoint, repository, branch, job_name, "space request");
        let response = self
            .client
            .get(self.api_url(&endpoint))
            .query(&[
                ("repoFilter", repository),
                ("branchFilter", branch),
                ("$fields", "data(id,name)"),
            ])
            .send()
            .await?;
        let page: Page<AutomationJob> = self.handle_response(response, &endpoint).await?;
        page.data
            .into_iter()
            .find(|job| job.name == job_name)
            .map(|job| job.id)
            .ok_or_else(|| {
                GatewayError::NotFound(format!(
                    "automation job '{}' in {}/{}@{}",
                    job_name, project_id, repository, branch
                ))
            })
    }

    async fn get_automation_job_name(
        &self,
        project_id: &str,
        job_id: &str,
    ) -> GatewayResult<String> {
        let endpoint = format!("{}/automation/jobs/id:{}", project_endpoint(project_id), job_id);
        let job: AutomationJob = self.get(&endpoint, Some("id,name")).await?;
        Ok(job.name)
    }
}

//! Workspace API client for KCP-style `/clusters/{path}` endpoints.
//!
//! Every call is scoped to one account path. Resource mappings are found
//! through the API discovery documents of the target workspace.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use rolegate_domain::error::{WorkspaceError, WorkspaceResult};
use rolegate_domain::model::{AccountInfo, ResourceMapping};
use rolegate_domain::naming::{ACCOUNT_GROUP, ACCOUNT_VERSION};
use rolegate_domain::traits::WorkspaceClient;

const ACCOUNT_INFO_RESOURCE: &str = "accountinfos";
/// Every workspace holds exactly one account info, named `account`.
const ACCOUNT_INFO_NAME: &str = "account";

/// Rewrites the path of `base` to address the workspace at `account_path`.
pub fn scoped_workspace_url(base: &str, account_path: &str) -> WorkspaceResult<Url> {
    let mut url = Url::parse(base).map_err(|e| WorkspaceError::InvalidResponse {
        message: format!("invalid workspace API url '{base}': {e}"),
    })?;
    url.set_path(&format!("/clusters/{account_path}"));
    Ok(url)
}

/// [`WorkspaceClient`] talking to a KCP-style API server.
#[derive(Debug, Clone)]
pub struct KcpWorkspaceClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiGroup {
    preferred_version: GroupVersion,
}

#[derive(Debug, Deserialize)]
struct GroupVersion {
    version: String,
}

#[derive(Debug, Deserialize)]
struct ApiResourceList {
    #[serde(default)]
    resources: Vec<ApiResource>,
}

#[derive(Debug, Deserialize)]
struct ApiResource {
    name: String,
    kind: String,
    #[serde(default)]
    namespaced: bool,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfoObject {
    spec: AccountInfoSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfoSpec {
    account: AccountLocation,
    organization: NamedRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountLocation {
    name: String,
    #[serde(default)]
    origin_cluster_id: String,
    #[serde(default)]
    generated_cluster_id: String,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

fn transport(err: reqwest::Error) -> WorkspaceError {
    WorkspaceError::Transport {
        message: err.to_string(),
    }
}

/// Path prefix of a group/version.
fn group_version_path(group: &str, version: &str) -> String {
    if group.is_empty() {
        format!("/api/{version}")
    } else {
        format!("/apis/{group}/{version}")
    }
}

fn collection_path(mapping: &ResourceMapping, namespace: Option<&str>) -> String {
    let prefix = group_version_path(&mapping.group, &mapping.version);
    match namespace.filter(|ns| mapping.namespaced && !ns.is_empty()) {
        Some(ns) => format!("{prefix}/namespaces/{ns}/{}", mapping.resource),
        None => format!("{prefix}/{}", mapping.resource),
    }
}

impl KcpWorkspaceClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> WorkspaceResult<Self> {
        let base_url = base_url.into();
        // Fail early on a malformed base.
        scoped_workspace_url(&base_url, "root")?;
        let client = Client::builder().timeout(timeout).build().map_err(transport)?;
        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, account_path: &str, path: &str) -> WorkspaceResult<Url> {
        let mut url = scoped_workspace_url(&self.base_url, account_path)?;
        let full = format!("{}{}", url.path(), path);
        url.set_path(&full);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> WorkspaceResult<T> {
        let response = self.authorized(request).send().await.map_err(transport)?;
        match response.status() {
            status if status.is_success() => {
                response
                    .json::<T>()
                    .await
                    .map_err(|e| WorkspaceError::InvalidResponse {
                        message: e.to_string(),
                    })
            }
            StatusCode::NOT_FOUND => Err(WorkspaceError::NotFound {
                what: what.to_string(),
            }),
            StatusCode::CONFLICT => Err(WorkspaceError::AlreadyExists {
                what: what.to_string(),
            }),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(WorkspaceError::Transport {
                    message: format!("{what}: status {status}: {body}"),
                })
            }
        }
    }

    async fn preferred_version(&self, account_path: &str, group: &str) -> WorkspaceResult<String> {
        if group.is_empty() {
            return Ok("v1".to_string());
        }
        let url = self.url(account_path, &format!("/apis/{group}"))?;
        let api_group: ApiGroup = self
            .send(self.client.get(url), &format!("api group {group}"))
            .await?;
        Ok(api_group.preferred_version.version)
    }
}

#[async_trait]
impl WorkspaceClient for KcpWorkspaceClient {
    #[instrument(skip(self))]
    async fn account_info(&self, account_path: &str) -> WorkspaceResult<AccountInfo> {
        let path = format!(
            "{}/{ACCOUNT_INFO_RESOURCE}/{ACCOUNT_INFO_NAME}",
            group_version_path(ACCOUNT_GROUP, ACCOUNT_VERSION)
        );
        let url = self.url(account_path, &path)?;
        let object: AccountInfoObject = self
            .send(self.client.get(url), &format!("accountinfo in {account_path}"))
            .await?;

        Ok(AccountInfo {
            account_name: object.spec.account.name,
            organization_name: object.spec.organization.name,
            origin_cluster_id: object.spec.account.origin_cluster_id,
            generated_cluster_id: object.spec.account.generated_cluster_id,
        })
    }

    #[instrument(skip(self))]
    async fn resolve_mapping(
        &self,
        account_path: &str,
        group: &str,
        kind: &str,
    ) -> WorkspaceResult<ResourceMapping> {
        let not_found = || WorkspaceError::MappingNotFound {
            group: group.to_string(),
            kind: kind.to_string(),
        };

        let version = match self.preferred_version(account_path, group).await {
            Err(e) if e.is_not_found() => return Err(not_found()),
            other => other?,
        };

        let url = self.url(account_path, &group_version_path(group, &version))?;
        let list: ApiResourceList = match self
            .send(self.client.get(url), &format!("resources of {group}/{version}"))
            .await
        {
            Err(e) if e.is_not_found() => return Err(not_found()),
            other => other?,
        };

        let resource = list
            .resources
            .into_iter()
            .find(|r| r.kind == kind && !r.name.contains('/'))
            .ok_or_else(not_found)?;

        debug!(resource = %resource.name, %version, "resolved REST mapping");
        Ok(ResourceMapping {
            group: group.to_string(),
            version,
            resource: resource.name,
            kind: resource.kind,
            namespaced: resource.namespaced,
        })
    }

    #[instrument(skip(self, mapping), fields(resource = %mapping.resource))]
    async fn get(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> WorkspaceResult<Value> {
        let path = format!("{}/{name}", collection_path(mapping, namespace));
        let url = self.url(account_path, &path)?;
        self.send(
            self.client.get(url),
            &format!("{} {name} in {account_path}", mapping.resource),
        )
        .await
    }

    #[instrument(skip(self, mapping), fields(resource = %mapping.resource))]
    async fn list(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> WorkspaceResult<Vec<Value>> {
        let url = self.url(account_path, &collection_path(mapping, namespace))?;
        let mut request = self.client.get(url);
        if !label_selector.is_empty() {
            request = request.query(&[("labelSelector", label_selector)]);
        }
        let list: ObjectList = self
            .send(request, &format!("{} in {account_path}", mapping.resource))
            .await?;
        Ok(list.items)
    }

    #[instrument(skip(self, mapping, object), fields(resource = %mapping.resource))]
    async fn create(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        object: Value,
    ) -> WorkspaceResult<Value> {
        let url = self.url(account_path, &collection_path(mapping, namespace))?;
        self.send(
            self.client.post(url).json(&object),
            &format!("{} in {account_path}", mapping.resource),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(group: &str, namespaced: bool) -> ResourceMapping {
        ResourceMapping {
            group: group.to_string(),
            version: if group.is_empty() { "v1" } else { "v1alpha1" }.to_string(),
            resource: "things".to_string(),
            kind: "Thing".to_string(),
            namespaced,
        }
    }

    #[test]
    fn test_scoped_workspace_url_replaces_path() {
        let url = scoped_workspace_url("https://kcp.example.com/services/x", "root:orgs:acme").unwrap();
        assert_eq!(url.as_str(), "https://kcp.example.com/clusters/root:orgs:acme");
    }

    #[test]
    fn test_scoped_workspace_url_rejects_garbage() {
        assert!(scoped_workspace_url("not a url", "root").is_err());
    }

    #[test]
    fn test_collection_paths() {
        assert_eq!(
            collection_path(&mapping("", true), Some("default")),
            "/api/v1/namespaces/default/things"
        );
        assert_eq!(
            collection_path(&mapping("example.io", false), Some("default")),
            "/apis/example.io/v1alpha1/things"
        );
        assert_eq!(
            collection_path(&mapping("example.io", true), None),
            "/apis/example.io/v1alpha1/things"
        );
    }

    #[test]
    fn test_request_url_is_scoped() {
        let client =
            KcpWorkspaceClient::new("https://kcp.example.com", None, Duration::from_secs(5)).unwrap();
        let url = client.url("root:orgs:acme", "/api/v1/namespaces").unwrap();
        assert_eq!(
            url.as_str(),
            "https://kcp.example.com/clusters/root:orgs:acme/api/v1/namespaces"
        );
    }

    #[test]
    fn test_account_info_decoding() {
        let object: AccountInfoObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "core.platform-mesh.io/v1alpha1",
            "kind": "AccountInfo",
            "metadata": {"name": "account"},
            "spec": {
                "account": {
                    "name": "team-a",
                    "originClusterId": "c1",
                    "generatedClusterId": "c2"
                },
                "organization": {"name": "acme"}
            }
        }))
        .unwrap();
        assert_eq!(object.spec.account.origin_cluster_id, "c1");
        assert_eq!(object.spec.organization.name, "acme");
    }
}

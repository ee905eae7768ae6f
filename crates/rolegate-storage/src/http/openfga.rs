//! OpenFGA-compatible policy engine over its REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use rolegate_domain::error::{EngineError, EngineResult};
use rolegate_domain::model::{FgaUser, TupleKey};
use rolegate_domain::traits::{
    AuthorizationModelSummary, CheckRequest, ListUsersRequest, PolicyEngine, ReadPage,
    ReadRequest, StoreSummary, WriteRequest,
};

const STORES_PAGE_SIZE: u32 = 100;

/// [`PolicyEngine`] talking to an OpenFGA server over HTTP.
#[derive(Debug, Clone)]
pub struct OpenFgaHttpEngine {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

// Wire types. Field names follow the engine's JSON API.

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListStoresResponse {
    #[serde(default)]
    stores: Vec<StoreBody>,
    #[serde(default)]
    continuation_token: String,
}

#[derive(Debug, Deserialize)]
struct StoreBody {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReadModelsResponse {
    #[serde(default)]
    authorization_models: Vec<ModelBody>,
}

#[derive(Debug, Deserialize)]
struct ModelBody {
    id: String,
}

#[derive(Debug, Serialize)]
struct TupleKeys<'a> {
    tuple_keys: &'a [TupleKey],
}

#[derive(Debug, Serialize)]
struct CheckBody<'a> {
    tuple_key: &'a TupleKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    contextual_tuples: Option<TupleKeys<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    allowed: bool,
}

#[derive(Debug, Serialize)]
struct WriteBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    writes: Option<TupleKeys<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletes: Option<TupleKeys<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Debug, Default, Serialize)]
struct ReadTupleKey<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    relation: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    object: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ReadBody<'a> {
    tuple_key: ReadTupleKey<'a>,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    tuples: Vec<TupleBody>,
    #[serde(default)]
    continuation_token: String,
}

#[derive(Debug, Deserialize)]
struct TupleBody {
    key: TupleKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectBody {
    #[serde(rename = "type")]
    object_type: String,
    id: String,
}

#[derive(Debug, Serialize)]
struct UserTypeFilter<'a> {
    #[serde(rename = "type")]
    user_type: &'a str,
}

#[derive(Debug, Serialize)]
struct ListUsersBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
    object: ObjectBody,
    relation: &'a str,
    user_filters: Vec<UserTypeFilter<'a>>,
}

#[derive(Debug, Deserialize)]
struct ListUsersResponse {
    #[serde(default)]
    users: Vec<UserBody>,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    object: Option<ObjectBody>,
    userset: Option<UsersetBody>,
    wildcard: Option<WildcardBody>,
}

#[derive(Debug, Deserialize)]
struct UsersetBody {
    #[serde(rename = "type")]
    object_type: String,
    id: String,
    relation: String,
}

#[derive(Debug, Deserialize)]
struct WildcardBody {
    #[serde(rename = "type")]
    object_type: String,
}

impl UserBody {
    fn into_fga_user(self) -> Option<FgaUser> {
        if let Some(object) = self.object {
            return Some(FgaUser::object(object.object_type, object.id));
        }
        if let Some(set) = self.userset {
            return Some(FgaUser::UserRef(format!(
                "{}:{}#{}",
                set.object_type, set.id, set.relation
            )));
        }
        self.wildcard
            .map(|w| FgaUser::UserRef(format!("{}:*", w.object_type)))
    }
}

fn transport(err: reqwest::Error) -> EngineError {
    EngineError::Transport {
        message: err.to_string(),
    }
}

fn non_empty(token: String) -> Option<String> {
    (!token.is_empty()).then_some(token)
}

impl OpenFgaHttpEngine {
    /// Creates a client for the engine at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> EngineResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(transport)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> EngineResult<T> {
        let response = self.authorized(request).send().await.map_err(transport)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.map_err(transport)?;
            return Err(api_error(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| EngineError::InvalidResponse {
                message: e.to_string(),
            })
    }
}

fn api_error(status: StatusCode, body: &str) -> EngineError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => EngineError::Api {
            status: status.as_u16(),
            code: parsed.code,
            message: parsed.message,
        },
        Err(_) => EngineError::Api {
            status: status.as_u16(),
            code: String::new(),
            message: body.to_string(),
        },
    }
}

#[async_trait]
impl PolicyEngine for OpenFgaHttpEngine {
    #[instrument(skip(self))]
    async fn list_stores(&self) -> EngineResult<Vec<StoreSummary>> {
        let mut stores = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.url("/stores"))
                .query(&[("page_size", STORES_PAGE_SIZE.to_string())]);
            if let Some(t) = &token {
                request = request.query(&[("continuation_token", t)]);
            }

            let page: ListStoresResponse = self.send(request).await?;
            stores.extend(page.stores.into_iter().map(|s| StoreSummary {
                id: s.id,
                name: s.name,
            }));

            token = non_empty(page.continuation_token);
            if token.is_none() {
                break;
            }
        }

        debug!(count = stores.len(), "listed stores");
        Ok(stores)
    }

    #[instrument(skip(self))]
    async fn read_authorization_models(
        &self,
        store_id: &str,
    ) -> EngineResult<Vec<AuthorizationModelSummary>> {
        let request = self
            .client
            .get(self.url(&format!("/stores/{store_id}/authorization-models")));
        let response: ReadModelsResponse = self.send(request).await?;
        Ok(response
            .authorization_models
            .into_iter()
            .map(|m| AuthorizationModelSummary { id: m.id })
            .collect())
    }

    #[instrument(skip(self, request), fields(store_id = %request.store_id))]
    async fn check(&self, request: CheckRequest) -> EngineResult<bool> {
        let body = CheckBody {
            tuple_key: &request.tuple_key,
            contextual_tuples: (!request.contextual_tuples.is_empty()).then(|| TupleKeys {
                tuple_keys: &request.contextual_tuples,
            }),
            authorization_model_id: request.authorization_model_id.as_deref(),
        };
        let http = self
            .client
            .post(self.url(&format!("/stores/{}/check", request.store_id)))
            .json(&body);
        let response: CheckResponse = self.send(http).await?;
        Ok(response.allowed)
    }

    #[instrument(skip(self, request), fields(store_id = %request.store_id))]
    async fn write(&self, request: WriteRequest) -> EngineResult<()> {
        let body = WriteBody {
            writes: (!request.writes.is_empty()).then(|| TupleKeys {
                tuple_keys: &request.writes,
            }),
            deletes: (!request.deletes.is_empty()).then(|| TupleKeys {
                tuple_keys: &request.deletes,
            }),
            authorization_model_id: request.authorization_model_id.as_deref(),
        };
        let http = self
            .client
            .post(self.url(&format!("/stores/{}/write", request.store_id)))
            .json(&body);
        let _: serde_json::Value = self.send(http).await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(store_id = %request.store_id))]
    async fn read(&self, request: ReadRequest) -> EngineResult<ReadPage> {
        let body = ReadBody {
            tuple_key: ReadTupleKey {
                user: request.filter.user.as_deref(),
                relation: request.filter.relation.as_deref(),
                object: request.filter.object.as_deref(),
            },
            page_size: request.page_size,
            continuation_token: request
                .continuation_token
                .as_deref()
                .filter(|t| !t.is_empty()),
        };
        let http = self
            .client
            .post(self.url(&format!("/stores/{}/read", request.store_id)))
            .json(&body);
        let response: ReadResponse = self.send(http).await?;

        Ok(ReadPage {
            tuples: response.tuples.into_iter().map(|t| t.key).collect(),
            continuation_token: non_empty(response.continuation_token),
        })
    }

    #[instrument(skip(self, request), fields(store_id = %request.store_id, object = %request.object))]
    async fn list_users(&self, request: ListUsersRequest) -> EngineResult<Vec<FgaUser>> {
        let (object_type, id) =
            request
                .object
                .split_once(':')
                .ok_or_else(|| EngineError::InvalidResponse {
                    message: format!("object '{}' is not of the form type:id", request.object),
                })?;

        let body = ListUsersBody {
            authorization_model_id: request.authorization_model_id.as_deref(),
            object: ObjectBody {
                object_type: object_type.to_string(),
                id: id.to_string(),
            },
            relation: &request.relation,
            user_filters: vec![UserTypeFilter {
                user_type: &request.user_type,
            }],
        };
        let http = self
            .client
            .post(self.url(&format!("/stores/{}/list-users", request.store_id)))
            .json(&body);
        let response: ListUsersResponse = self.send(http).await?;

        Ok(response
            .users
            .into_iter()
            .filter_map(UserBody::into_fga_user)
            .collect())
    }
}

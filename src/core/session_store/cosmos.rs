//! Cosmos DB (SQL API) transcript store over the REST gateway.
//!
//! Requests carry a master-key token: base64 HMAC-SHA256 over
//! `verb\nresourceType\nresourceLink\ndate\n\n` (verb, type and date
//! lowercased), URL-encoded as `type=master&ver=1.0&sig=...`.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::{CallSession, SessionStore, SessionStoreError, SessionStoreResult};
use crate::utils::req_manager::ReqManager;

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2018-12-31";
const PARTITION_KEY_PATH: &str = "/callerId";
const DEFAULT_THROUGHPUT: &str = "400";

#[derive(Debug, Clone)]
pub struct CosmosConfig {
    pub account_url: String,
    pub master_key: String,
    pub database: String,
    pub container: String,
}

/// Query result page
#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(rename = "Documents", default)]
    documents: Vec<StoredSession>,
}

#[derive(Debug, Deserialize)]
struct StoredSession {
    #[serde(flatten)]
    session: CallSession,
    #[serde(rename = "_etag")]
    etag: Option<String>,
}

pub struct CosmosSessionStore {
    account_url: Url,
    master_key: Vec<u8>,
    database: String,
    container: String,
    req_manager: Arc<ReqManager>,
}

impl std::fmt::Debug for CosmosSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosSessionStore")
            .field("account_url", &self.account_url.as_str())
            .field("database", &self.database)
            .field("container", &self.container)
            .finish()
    }
}

/// Authorization header value for one Cosmos request.
pub(crate) fn master_key_token(
    key: &[u8],
    verb: &Method,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> String {
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.as_str().to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );
    let signature = match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(payload.as_bytes());
            BASE64.encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    };
    let token = format!("type=master&ver=1.0&sig={signature}");
    url::form_urlencoded::byte_serialize(token.as_bytes()).collect()
}

fn rfc1123(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

impl CosmosSessionStore {
    pub fn new(config: CosmosConfig, req_manager: Arc<ReqManager>) -> SessionStoreResult<Self> {
        let account_url = Url::parse(&config.account_url)
            .map_err(|e| SessionStoreError::InvalidConfig(format!("bad COSMOS_DB_URL: {e}")))?;
        let master_key = BASE64
            .decode(config.master_key.as_bytes())
            .map_err(|e| SessionStoreError::InvalidConfig(format!("bad COSMOS_DB_KEY: {e}")))?;

        Ok(Self {
            account_url,
            master_key,
            database: config.database,
            container: config.container,
            req_manager,
        })
    }

    /// Build the store and create the database and container when missing.
    pub async fn connect(
        config: CosmosConfig,
        req_manager: Arc<ReqManager>,
    ) -> SessionStoreResult<Self> {
        let store = Self::new(config, req_manager)?;
        store.ensure_container().await?;
        info!(
            database = %store.database,
            container = %store.container,
            "Cosmos DB session store ready"
        );
        Ok(store)
    }

    fn collection_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.database, self.container)
    }

    fn document_link(&self, id: &str) -> String {
        format!("{}/docs/{id}", self.collection_link())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        resource_type: &str,
        resource_link: &str,
        headers: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> SessionStoreResult<reqwest::Response> {
        let url = self
            .account_url
            .join(path)
            .map_err(|e| SessionStoreError::InvalidConfig(format!("cannot build URL: {e}")))?;
        let date = rfc1123(Utc::now());
        let token = master_key_token(
            &self.master_key,
            &method,
            resource_type,
            resource_link,
            &date,
        );

        let guard = self
            .req_manager
            .acquire()
            .await
            .map_err(|e| SessionStoreError::Pool(e.to_string()))?;

        let mut request = guard
            .client()
            .request(method, url)
            .header(AUTHORIZATION, token)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        if let Some(body) = body {
            let is_query = headers
                .iter()
                .any(|(name, _)| *name == "x-ms-documentdb-isquery");
            let content_type = if is_query {
                "application/query+json"
            } else {
                "application/json"
            };
            request = request
                .header(CONTENT_TYPE, content_type)
                .body(serde_json::to_vec(&body)?);
        }

        let result = request.send().await;
        guard.record(&result);
        Ok(result?)
    }

    async fn api_error(response: reqwest::Response) -> SessionStoreError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        SessionStoreError::Api { status, message }
    }

    async fn ensure_container(&self) -> SessionStoreResult<()> {
        let response = self
            .send(
                Method::POST,
                "dbs",
                "dbs",
                "",
                &[],
                Some(json!({ "id": self.database })),
            )
            .await?;
        match response.status() {
            StatusCode::CREATED => info!(database = %self.database, "Created Cosmos database"),
            StatusCode::CONFLICT => debug!(database = %self.database, "Cosmos database exists"),
            _ => return Err(Self::api_error(response).await),
        }

        let db_link = format!("dbs/{}", self.database);
        let response = self
            .send(
                Method::POST,
                &format!("{db_link}/colls"),
                "colls",
                &db_link,
                &[("x-ms-offer-throughput", DEFAULT_THROUGHPUT.to_string())],
                Some(json!({
                    "id": self.container,
                    "partitionKey": { "paths": [PARTITION_KEY_PATH], "kind": "Hash" }
                })),
            )
            .await?;
        match response.status() {
            StatusCode::CREATED => info!(container = %self.container, "Created Cosmos container"),
            StatusCode::CONFLICT => debug!(container = %self.container, "Cosmos container exists"),
            _ => return Err(Self::api_error(response).await),
        }
        Ok(())
    }

    /// Cross-partition lookup by document id.
    async fn find(&self, id: &str) -> SessionStoreResult<StoredSession> {
        let link = self.collection_link();
        let response = self
            .send(
                Method::POST,
                &format!("{link}/docs"),
                "docs",
                &link,
                &[
                    ("x-ms-documentdb-isquery", "True".to_string()),
                    (
                        "x-ms-documentdb-query-enablecrosspartition",
                        "True".to_string(),
                    ),
                ],
                Some(json!({
                    "query": "SELECT * FROM c WHERE c.id = @id",
                    "parameters": [{ "name": "@id", "value": id }]
                })),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let page: QueryPage = response.json().await?;
        page.documents
            .into_iter()
            .next()
            .ok_or_else(|| SessionStoreError::SessionNotFound(id.to_string()))
    }

    /// Read-modify-replace guarded by the document ETag, retried once on 412.
    async fn update<F>(&self, id: &str, mutate: F) -> SessionStoreResult<()>
    where
        F: Fn(&mut CallSession) + Send + Sync,
    {
        for attempt in 0..2 {
            let StoredSession { mut session, etag } = self.find(id).await?;
            mutate(&mut session);

            let mut headers = vec![(
                "x-ms-documentdb-partitionkey",
                serde_json::to_string(&[&session.caller_id])?,
            )];
            if let Some(etag) = etag {
                headers.push(("If-Match", etag));
            }

            let link = self.document_link(id);
            let response = self
                .send(
                    Method::PUT,
                    &link,
                    "docs",
                    &link,
                    &headers,
                    Some(serde_json::to_value(&session)?),
                )
                .await?;

            match response.status() {
                status if status.is_success() => return Ok(()),
                StatusCode::PRECONDITION_FAILED => {
                    warn!(session_id = %id, attempt, "ETag mismatch replacing session, retrying");
                }
                StatusCode::NOT_FOUND => {
                    return Err(SessionStoreError::SessionNotFound(id.to_string()));
                }
                _ => return Err(Self::api_error(response).await),
            }
        }
        Err(SessionStoreError::Conflict(id.to_string()))
    }
}

#[async_trait]
impl SessionStore for CosmosSessionStore {
    async fn create_session(
        &self,
        call_connection_id: &str,
        caller_id: &str,
    ) -> SessionStoreResult<CallSession> {
        let session = CallSession::new(call_connection_id, caller_id);
        let link = self.collection_link();
        let response = self
            .send(
                Method::POST,
                &format!("{link}/docs"),
                "docs",
                &link,
                &[(
                    "x-ms-documentdb-partitionkey",
                    serde_json::to_string(&[caller_id])?,
                )],
                Some(serde_json::to_value(&session)?),
            )
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!(session_id = %call_connection_id, "Created call session");
                Ok(session)
            }
            StatusCode::CONFLICT => {
                debug!(session_id = %call_connection_id, "Call session already exists");
                Ok(self.find(call_connection_id).await?.session)
            }
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn append_message(
        &self,
        call_connection_id: &str,
        sender: &str,
        message: &str,
    ) -> SessionStoreResult<()> {
        self.update(call_connection_id, |session| session.push(sender, message))
            .await
    }

    async fn close_session(&self, call_connection_id: &str) -> SessionStoreResult<()> {
        let ended = Utc::now();
        self.update(call_connection_id, |session| {
            session.call_end_time = Some(ended)
        })
        .await
    }

    async fn get_session(&self, call_connection_id: &str) -> SessionStoreResult<CallSession> {
        Ok(self.find(call_connection_id).await?.session)
    }

    fn store_type(&self) -> &'static str {
        "cosmos"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY_B64: &str = "c2VjcmV0LWtleQ==";

    fn store_for(server: &MockServer) -> CosmosSessionStore {
        CosmosSessionStore::new(
            CosmosConfig {
                account_url: format!("{}/", server.uri()),
                master_key: KEY_B64.to_string(),
                database: "callautomation".to_string(),
                container: "sessions".to_string(),
            },
            Arc::new(ReqManager::new(4).unwrap()),
        )
        .unwrap()
    }

    fn stored(conversation: serde_json::Value) -> serde_json::Value {
        json!({
            "Documents": [{
                "id": "conn-1",
                "callerId": "4:+1555",
                "callStartTime": "2024-10-01T12:00:00Z",
                "callEndTime": null,
                "conversation": conversation,
                "userDetails": {},
                "_etag": "\"etag-1\""
            }],
            "_count": 1
        })
    }

    #[test]
    fn test_master_key_token() {
        let date = "Tue, 01 Oct 2024 12:00:00 GMT";
        let token = master_key_token(b"secret-key", &Method::GET, "docs", "dbs/d/colls/c", date);

        let mut mac = HmacSha256::new_from_slice(b"secret-key").unwrap();
        mac.update(b"get\ndocs\ndbs/d/colls/c\ntue, 01 oct 2024 12:00:00 gmt\n\n");
        let sig = BASE64.encode(mac.finalize().into_bytes());
        let expected: String = url::form_urlencoded::byte_serialize(
            format!("type=master&ver=1.0&sig={sig}").as_bytes(),
        )
        .collect();

        assert_eq!(token, expected);
        assert!(token.starts_with("type%3Dmaster%26ver%3D1.0%26sig%3D"));
    }

    #[test]
    fn test_rejects_bad_key() {
        let result = CosmosSessionStore::new(
            CosmosConfig {
                account_url: "https://acct.documents.azure.com:443/".into(),
                master_key: "not base64!".into(),
                database: "d".into(),
                container: "c".into(),
            },
            Arc::new(ReqManager::new(1).unwrap()),
        );
        assert!(matches!(result, Err(SessionStoreError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_connect_tolerates_existing_resources() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dbs"))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/dbs/callautomation/colls"))
            .and(body_partial_json(json!({
                "id": "sessions",
                "partitionKey": {"paths": ["/callerId"]}
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        store.ensure_container().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_session_posts_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dbs/callautomation/colls/sessions/docs"))
            .and(header("x-ms-documentdb-partitionkey", "[\"4:+1555\"]"))
            .and(header("x-ms-version", API_VERSION))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({"id": "conn-1", "callerId": "4:+1555"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let session = store.create_session("conn-1", "4:+1555").await.unwrap();
        assert_eq!(session.id, "conn-1");
        assert!(session.conversation.is_empty());
    }

    #[tokio::test]
    async fn test_append_retries_once_on_etag_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dbs/callautomation/colls/sessions/docs"))
            .and(header("x-ms-documentdb-isquery", "True"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored(json!([]))))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/dbs/callautomation/colls/sessions/docs/conn-1"))
            .respond_with(ResponseTemplate::new(412))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/dbs/callautomation/colls/sessions/docs/conn-1"))
            .and(header("If-Match", "\"etag-1\""))
            .and(body_partial_json(json!({
                "conversation": [{"sender": "user", "message": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        store.append_message("conn-1", "user", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_append_to_missing_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dbs/callautomation/colls/sessions/docs"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"Documents": [], "_count": 0})),
            )
            .mount(&server)
            .await;

        let store = store_for(&server);
        let err = store
            .append_message("conn-9", "user", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionStoreError::SessionNotFound(id) if id == "conn-9"));
    }

    #[tokio::test]
    async fn test_close_session_sets_end_time() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dbs/callautomation/colls/sessions/docs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored(json!([
                {"timestamp": "2024-10-01T12:00:05Z", "sender": "user", "message": "hi"}
            ]))))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/dbs/callautomation/colls/sessions/docs/conn-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        store.close_session("conn-1").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let put = requests
            .iter()
            .find(|r| r.method.as_str() == "PUT")
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&put.body).unwrap();
        assert!(body["callEndTime"].is_string());
        assert_eq!(body["conversation"][0]["message"], "hi");
    }
}

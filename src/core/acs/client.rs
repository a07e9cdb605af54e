use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::auth::{AcsCredentials, CONTENT_HASH_HEADER, DATE_HEADER};
use super::models::{
    AcsErrorBody, AnswerCallRequest, CallConnectionProperties, CreateCallRequest, PlayRequest,
    RecognizeRequest,
};
use super::{AcsError, AcsResult, CallAutomation};
use crate::utils::req_manager::ReqManager;

/// Call Automation REST API version
pub const ACS_API_VERSION: &str = "2024-09-15";

/// REST client for ACS Call Automation, signed with the resource access key.
pub struct AcsCallAutomationClient {
    credentials: AcsCredentials,
    req_manager: Arc<ReqManager>,
}

impl AcsCallAutomationClient {
    pub fn new(credentials: AcsCredentials, req_manager: Arc<ReqManager>) -> Self {
        Self {
            credentials,
            req_manager,
        }
    }

    /// Build a client from an `endpoint=...;accesskey=...` connection string.
    pub fn from_connection_string(
        connection_string: &str,
        req_manager: Arc<ReqManager>,
    ) -> AcsResult<Self> {
        let credentials = AcsCredentials::from_connection_string(connection_string)?;
        Ok(Self::new(credentials, req_manager))
    }

    fn url(&self, path: &str) -> AcsResult<Url> {
        let mut url = self
            .credentials
            .endpoint
            .join(path)
            .map_err(|e| AcsError::InvalidConnectionString(format!("cannot build URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("api-version", ACS_API_VERSION);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
    ) -> AcsResult<reqwest::Response> {
        let url = self.url(path)?;
        let (date, content_hash, authorization) =
            self.credentials
                .sign(method.as_str(), &url, &body, Utc::now());

        debug!(method = %method, path = %path, "Sending ACS request");

        let guard = self
            .req_manager
            .acquire()
            .await
            .map_err(|e| AcsError::Pool(e.to_string()))?;

        let mut request = guard
            .client()
            .request(method, url)
            .header(DATE_HEADER, date)
            .header(CONTENT_HASH_HEADER, content_hash)
            .header(AUTHORIZATION, authorization)
            .header("x-ms-client-request-id", Uuid::new_v4().to_string());
        if !body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let result = request.send().await;
        guard.record(&result);
        let response = result?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<AcsErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or_default();

        Err(AcsError::Api {
            status,
            code: detail.code,
            message: if detail.message.is_empty() {
                text
            } else {
                detail.message
            },
        })
    }

    async fn send_json<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> AcsResult<reqwest::Response> {
        let body = serde_json::to_vec(body)?;
        self.send(method, path, body).await
    }
}

#[async_trait]
impl CallAutomation for AcsCallAutomationClient {
    async fn answer_call(&self, request: AnswerCallRequest) -> AcsResult<CallConnectionProperties> {
        let response = self
            .send_json(Method::POST, "calling/callConnections:answer", &request)
            .await?;
        let properties: CallConnectionProperties = response.json().await?;
        info!(
            call_connection_id = %properties.call_connection_id,
            "Answered incoming call"
        );
        Ok(properties)
    }

    async fn create_call(&self, request: CreateCallRequest) -> AcsResult<CallConnectionProperties> {
        let response = self
            .send_json(Method::POST, "calling/callConnections", &request)
            .await?;
        let properties: CallConnectionProperties = response.json().await?;
        info!(
            call_connection_id = %properties.call_connection_id,
            "Created outbound call"
        );
        Ok(properties)
    }

    async fn get_call_properties(
        &self,
        call_connection_id: &str,
    ) -> AcsResult<CallConnectionProperties> {
        let path = format!("calling/callConnections/{call_connection_id}");
        let response = self.send(Method::GET, &path, Vec::new()).await?;
        Ok(response.json().await?)
    }

    async fn play_to_all(&self, call_connection_id: &str, request: PlayRequest) -> AcsResult<()> {
        let path = format!("calling/callConnections/{call_connection_id}:play");
        self.send_json(Method::POST, &path, &request).await?;
        Ok(())
    }

    async fn start_recognize(
        &self,
        call_connection_id: &str,
        request: RecognizeRequest,
    ) -> AcsResult<()> {
        let path = format!("calling/callConnections/{call_connection_id}:recognize");
        self.send_json(Method::POST, &path, &request).await?;
        Ok(())
    }

    async fn hang_up(&self, call_connection_id: &str, for_everyone: bool) -> AcsResult<()> {
        if for_everyone {
            let path = format!("calling/callConnections/{call_connection_id}:terminate");
            self.send(Method::POST, &path, Vec::new()).await?;
        } else {
            let path = format!("calling/callConnections/{call_connection_id}");
            self.send(Method::DELETE, &path, Vec::new()).await?;
        }
        info!(call_connection_id = %call_connection_id, for_everyone, "Hung up call");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::acs::models::{CommunicationIdentifier, PlaySource};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> AcsCallAutomationClient {
        let connection_string = format!("endpoint={}/;accesskey=c2VjcmV0LWtleQ==", server.uri());
        AcsCallAutomationClient::from_connection_string(
            &connection_string,
            Arc::new(ReqManager::new(4).unwrap()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_answer_call_signs_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calling/callConnections:answer"))
            .and(query_param("api-version", ACS_API_VERSION))
            .and(header_exists("x-ms-date"))
            .and(header_exists("x-ms-content-sha256"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({
                "incomingCallContext": "ctx-token",
                "callbackUri": "https://agent.example.com/api/callbacks/g1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "callConnectionId": "conn-1",
                "serverCallId": "srv-1",
                "callConnectionState": "connecting"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let props = client
            .answer_call(AnswerCallRequest {
                incoming_call_context: "ctx-token".into(),
                callback_uri: "https://agent.example.com/api/callbacks/g1".into(),
                operation_context: None,
                call_intelligence_options: None,
                media_streaming_options: None,
            })
            .await
            .unwrap();

        assert_eq!(props.call_connection_id, "conn-1");
        assert_eq!(props.server_call_id.as_deref(), Some("srv-1"));
    }

    #[tokio::test]
    async fn test_play_to_all_posts_text_source() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calling/callConnections/conn-1:play"))
            .and(body_partial_json(json!({
                "playSources": [{"kind": "text", "text": {"text": "Hi", "voiceName": "en-US-NancyNeural"}}],
                "operationContext": "goodbye"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client
            .play_to_all(
                "conn-1",
                PlayRequest {
                    play_sources: vec![PlaySource::text("Hi", "en-US-NancyNeural")],
                    play_to: vec![],
                    operation_context: Some("goodbye".into()),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hang_up_variants() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calling/callConnections/conn-1:terminate"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/calling/callConnections/conn-2"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.hang_up("conn-1", true).await.unwrap();
        client.hang_up("conn-2", false).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calling/callConnections"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": "8523", "message": "Invalid request"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .create_call(CreateCallRequest {
                targets: vec![CommunicationIdentifier::phone_number("+14255550123")],
                source_caller_id_number: None,
                callback_uri: "https://agent.example.com/api/callbacks/g".into(),
                operation_context: None,
                call_intelligence_options: None,
                media_streaming_options: None,
            })
            .await
            .unwrap_err();

        match err {
            AcsError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "8523");
                assert_eq!(message, "Invalid request");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

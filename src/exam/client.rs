use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::types::{ParticipantRecord, RoomSnapshot};
use super::ExamService;
use crate::config::ExamServiceConfig;
use crate::error::{Result, SyncError};

/// REST client for the exam platform
pub struct HttpExamService {
    config: ExamServiceConfig,
    client: reqwest::Client,
}

impl HttpExamService {
    pub fn new(config: &ExamServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn session_url(&self, session_id: &str, suffix: &str) -> String {
        format!(
            "{}/sessions/{}{}",
            self.config.base_url,
            urlencoding::encode(session_id),
            suffix
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, session_id: &str) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::SessionNotFound(session_id.to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String, session_id: &str) -> Result<T> {
        let response = self.send(self.client.get(&url), session_id).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::DecodeFailed(format!("{}: {}", url, e)))
    }

    async fn post(&self, url: String, session_id: &str) -> Result<()> {
        self.send(self.client.post(&url), session_id).await?;
        Ok(())
    }
}

#[async_trait]
impl ExamService for HttpExamService {
    async fn session_info(&self, session_id: &str) -> Result<RoomSnapshot> {
        self.get_json(self.session_url(session_id, ""), session_id).await
    }

    async fn roster(&self, session_id: &str) -> Result<Vec<ParticipantRecord>> {
        self.get_json(self.session_url(session_id, "/participants"), session_id)
            .await
    }

    async fn rotate_code(&self, session_id: &str) -> Result<()> {
        tracing::debug!(session_id = %session_id, "Requesting access code rotation");
        self.post(self.session_url(session_id, "/access-code"), session_id)
            .await
    }

    async fn check_in(&self, session_id: &str, participant_id: &str) -> Result<()> {
        let url = self.session_url(
            session_id,
            &format!("/participants/{}/check-in", urlencoding::encode(participant_id)),
        );
        match self.post(url, session_id).await {
            // A 404 here names the participant, the session itself was reachable
            Err(SyncError::SessionNotFound(_)) => {
                Err(SyncError::ParticipantNotFound(participant_id.to_string()))
            }
            other => other,
        }
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        tracing::info!(session_id = %session_id, "Closing exam session");
        self.post(self.session_url(session_id, "/close"), session_id)
            .await
    }
}

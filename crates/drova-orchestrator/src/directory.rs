//! HTTP client for the marketplace session directory

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use drova_core::config::DirectoryConfig;
use drova_core::error::DirectoryError;
use drova_core::traits::SessionDirectory;
use drova_core::types::{AuthToken, ProductInfo, ServerIdentity, SessionRecord, SessionsResponse};

const AUTH_HEADER: &str = "X-Auth-Token";

/// [`SessionDirectory`] backed by the marketplace's REST services
#[derive(Clone)]
pub struct HttpSessionDirectory {
    http: Client,
    base_url: String,
}

impl HttpSessionDirectory {
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn sessions_url(&self) -> String {
        format!("{}/session-manager/sessions", self.base_url)
    }

    fn product_url(&self, product_id: Uuid) -> String {
        format!("{}/server-manager/product/get/{}", self.base_url, product_id)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, &str)],
        token: &AuthToken,
    ) -> Result<T, DirectoryError> {
        tracing::trace!("GET {}", url);
        let res = self
            .http
            .get(&url)
            .query(query)
            .header(AUTH_HEADER, token.expose())
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        match res.status() {
            status if status.is_success() => res
                .json::<T>()
                .await
                .map_err(|e| DirectoryError::Decode(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(DirectoryError::Unauthorized),
            StatusCode::NOT_FOUND => Err(DirectoryError::NotFound(url)),
            status => Err(DirectoryError::Status(status.as_u16())),
        }
    }

    async fn first_session(
        &self,
        query: &[(&str, &str)],
        token: &AuthToken,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        let response: SessionsResponse = self.get_json(self.sessions_url(), query, token).await?;
        // Newest first
        Ok(response.sessions.into_iter().next())
    }
}

#[async_trait]
impl SessionDirectory for HttpSessionDirectory {
    async fn latest_session(
        &self,
        server: &ServerIdentity,
        token: &AuthToken,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        self.first_session(&[("server_id", server.as_str())], token)
            .await
    }

    async fn new_session(
        &self,
        server: &ServerIdentity,
        token: &AuthToken,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        self.first_session(
            &[
                ("server_id", server.as_str()),
                ("state", "NEW"),
                ("state", "HANDSHAKE"),
            ],
            token,
        )
        .await
    }

    async fn product_info(
        &self,
        product_id: Uuid,
        token: &AuthToken,
    ) -> Result<ProductInfo, DirectoryError> {
        self.get_json(self.product_url(product_id), &[], token).await
    }
}

use std::sync::RwLock;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;

use super::BackendError;

const API_KEY_HEADER: &str = "x-api-key";

pub struct BackendClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    session: RwLock<Option<String>>,
}

impl BackendClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            session: RwLock::new(None),
        }
    }

    pub(super) fn set_session(&self, token: String) {
        if let Ok(mut session) = self.session.write() {
            *session = Some(token);
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        };

        let token = self
            .session
            .read()
            .ok()
            .and_then(|session| session.clone());

        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        let response = self.authorize(builder).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(BackendError::ApiError { status, message });
        }

        Ok(response)
    }

    pub(super) async fn get(&self, path: &str) -> Result<Response, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.client.get(&url)).await
    }

    /// Like [`Self::get`], but maps a 404 to `None`.
    pub(super) async fn get_optional(&self, path: &str) -> Result<Option<Response>, BackendError> {
        match self.get(path).await {
            Ok(response) => Ok(Some(response)),
            Err(BackendError::ApiError {
                status: StatusCode::NOT_FOUND,
                ..
            }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub(super) async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.client.post(&url).json(body)).await
    }
}

//! REST transport for [`BurgerApi`].
//!
//! Every response is a `{ success, message?, ...payload }` envelope. A request
//! rejected with an expired access token triggers one token refresh and one
//! retry. Concurrent refreshes are serialised; only a refresh the server
//! rejects drops the stored credentials.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{IngredientId, OrderNumber, User},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{
        AuthResponse, CreateOrderRequest, CreateOrderResponse, Empty, Envelope, FeedResponse,
        Ingredient, IngredientsResponse, LoginRequest, Order, OrdersResponse,
        PasswordResetConfirm, PasswordResetRequest, ProfileUpdate, RegisterRequest, TokenPair,
        TokenRequest, UserResponse,
    },
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::{credentials::Credentials, ApiResult, BurgerApi};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpBurgerApi {
    http: Client,
    base_url: Url,
    credentials: Arc<Credentials>,
    refresh_lock: Mutex<()>,
}

impl HttpBurgerApi {
    pub fn new(base_url: &str, credentials: Arc<Credentials>) -> Result<Self> {
        Self::with_timeout(base_url, credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        credentials: Arc<Credentials>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid api url: {base_url}"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url,
            credentials,
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url.join(path).map_err(|err| {
            ApiException::new(ErrorCode::Internal, format!("bad endpoint {path}: {err}"))
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request
            .send()
            .await
            .map_err(|err| ApiException::transport(err.to_string()))?;
        decode(response).await
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut request = self.http.request(method, self.endpoint(path)?);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await
    }

    /// Sends with the stored access token, refreshing it once if the server
    /// reports it expired. A missing access token is refreshed up front.
    async fn call_authorized<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let access_token = match self.credentials.access_token().await.map_err(internal)? {
            Some(token) => token,
            None => {
                debug!(path, "http: no access token, refreshing");
                self.refresh_tokens(None).await?
            }
        };

        match self
            .authorized_once(method.clone(), path, body, &access_token)
            .await
        {
            Err(err) if err.is_expired_token() => {
                debug!(path, "http: access token expired, refreshing");
                let fresh = self.refresh_tokens(Some(&access_token)).await?;
                self.authorized_once(method, path, body, &fresh).await
            }
            other => other,
        }
    }

    async fn authorized_once<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        access_token: &str,
    ) -> ApiResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .request(method, self.endpoint(path)?)
            .header(reqwest::header::AUTHORIZATION, authorization(access_token));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await
    }

    /// Exchanges the refresh token for a new pair and returns the new access
    /// token. `stale` is the access token the caller saw; if another task has
    /// already replaced it, that token is returned without a second exchange.
    ///
    /// Credentials are dropped only when the server rejects the refresh token.
    async fn refresh_tokens(&self, stale: Option<&str>) -> ApiResult<String> {
        let _refreshing = self.refresh_lock.lock().await;

        if let Some(current) = self.credentials.access_token().await.map_err(internal)? {
            if stale != Some(current.as_str()) {
                debug!("http: access token already refreshed");
                return Ok(current);
            }
        }

        let refresh_token = match self.credentials.refresh_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                self.drop_credentials().await;
                return Err(ApiException::unauthorized("no refresh token stored"));
            }
            Err(err) => return Err(internal(err)),
        };

        let refreshed: ApiResult<TokenPair> = self
            .call(
                Method::POST,
                "auth/token",
                Some(&TokenRequest {
                    token: refresh_token,
                }),
            )
            .await;
        match refreshed {
            Ok(pair) => {
                self.credentials
                    .store(&pair.access_token, &pair.refresh_token)
                    .await
                    .map_err(internal)?;
                info!("http: access token refreshed");
                Ok(pair.access_token)
            }
            Err(err) if err.code.is_auth() => {
                warn!("http: refresh token rejected: {}", err.message);
                self.drop_credentials().await;
                Err(err)
            }
            Err(err) => {
                warn!("http: token refresh failed, keeping credentials: {}", err.message);
                Err(err)
            }
        }
    }

    async fn drop_credentials(&self) {
        if let Err(err) = self.credentials.clear().await {
            warn!("http: failed to clear credentials: {err:#}");
        }
    }
}

fn internal(err: anyhow::Error) -> ApiException {
    ApiException::new(ErrorCode::Internal, format!("{err:#}"))
}

fn authorization(token: &str) -> String {
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| ApiException::transport(err.to_string()))?;
    let envelope: Envelope<T> = match serde_json::from_slice(&bytes) {
        Ok(envelope) => envelope,
        Err(err) if status.is_success() => {
            return Err(ApiException::new(
                ErrorCode::Internal,
                format!("malformed response: {err}"),
            ));
        }
        Err(_) => {
            return Err(ApiException::new(
                ErrorCode::from_status(status.as_u16()),
                format!("request failed with status {status}"),
            ));
        }
    };

    if !status.is_success() || !envelope.success {
        let code = if status.is_success() {
            ErrorCode::Validation
        } else {
            ErrorCode::from_status(status.as_u16())
        };
        let message = envelope
            .message
            .unwrap_or_else(|| format!("request failed with status {status}"));
        return Err(ApiError::new(code, message).into());
    }

    envelope
        .payload
        .ok_or_else(|| ApiException::new(ErrorCode::Internal, "response payload missing"))
}

#[async_trait]
impl BurgerApi for HttpBurgerApi {
    async fn fetch_ingredients(&self) -> ApiResult<Vec<Ingredient>> {
        let response: IngredientsResponse =
            self.call::<(), _>(Method::GET, "ingredients", None).await?;
        Ok(response.data)
    }

    async fn fetch_feed(&self) -> ApiResult<FeedResponse> {
        self.call::<(), _>(Method::GET, "orders/all", None).await
    }

    async fn fetch_user_orders(&self) -> ApiResult<Vec<Order>> {
        let response: OrdersResponse = self
            .call_authorized::<(), _>(Method::GET, "orders", None)
            .await?;
        Ok(response.orders)
    }

    async fn fetch_order_by_number(&self, number: OrderNumber) -> ApiResult<Vec<Order>> {
        let response: OrdersResponse = self
            .call::<(), _>(Method::GET, &format!("orders/{number}"), None)
            .await?;
        Ok(response.orders)
    }

    async fn create_order(&self, ingredients: &[IngredientId]) -> ApiResult<Order> {
        let request = CreateOrderRequest {
            ingredients: ingredients.to_vec(),
        };
        let response: CreateOrderResponse = self
            .call_authorized(Method::POST, "orders", Some(&request))
            .await?;
        Ok(response.order.into())
    }

    async fn fetch_user(&self) -> ApiResult<User> {
        let response: UserResponse = self
            .call_authorized::<(), _>(Method::GET, "auth/user", None)
            .await?;
        Ok(response.user)
    }

    async fn login(&self, request: &LoginRequest) -> ApiResult<AuthResponse> {
        self.call(Method::POST, "auth/login", Some(request)).await
    }

    async fn register(&self, request: &RegisterRequest) -> ApiResult<AuthResponse> {
        self.call(Method::POST, "auth/register", Some(request)).await
    }

    async fn update_user(&self, update: &ProfileUpdate) -> ApiResult<User> {
        let response: UserResponse = self
            .call_authorized(Method::PATCH, "auth/user", Some(update))
            .await?;
        Ok(response.user)
    }

    async fn logout(&self, refresh_token: &str) -> ApiResult<()> {
        let request = TokenRequest {
            token: refresh_token.to_string(),
        };
        let _: Empty = self.call(Method::POST, "auth/logout", Some(&request)).await?;
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> ApiResult<()> {
        let request = PasswordResetRequest {
            email: email.to_string(),
        };
        let _: Empty = self.call(Method::POST, "password-reset", Some(&request)).await?;
        Ok(())
    }

    async fn reset_password(&self, password: &str, code: &str) -> ApiResult<()> {
        let request = PasswordResetConfirm {
            password: password.to_string(),
            token: code.to_string(),
        };
        let _: Empty = self
            .call(Method::POST, "password-reset/reset", Some(&request))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;

//! Identity, authentication status and credential lifecycle.
//!
//! `is_auth_checked` only ever moves from false to true, on completion of the
//! first `resolve_session`. `is_authenticated` follows login, register,
//! logout and session resolution. Route guards read both.

use std::sync::Arc;

use shared::{
    domain::User,
    error::ApiException,
    protocol::{AuthResponse, LoginRequest, ProfileUpdate, RegisterRequest},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use crate::{
    credentials::Credentials, emit_phase, ApiResult, BurgerApi, Operation, Phase, RequestState,
    StoreEvent,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("this operation requires a signed-in user")]
    NotAuthenticated,
    #[error("session request failed: {0}")]
    Request(#[from] ApiException),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub is_auth_checked: bool,
    pub is_authenticated: bool,
    /// A password reset code has been requested and not yet used.
    pub reset_requested: bool,
    pub resolve: RequestState,
    pub login: RequestState,
    pub register: RequestState,
    pub update: RequestState,
    pub logout: RequestState,
    pub password_reset: RequestState,
    pub reset: RequestState,
}

pub struct SessionStore {
    api: Arc<dyn BurgerApi>,
    credentials: Arc<Credentials>,
    state: Mutex<SessionSnapshot>,
    events: broadcast::Sender<StoreEvent>,
}

#[derive(Clone, Copy)]
enum Enrollment {
    Login,
    Register,
}

impl Enrollment {
    fn operation(self) -> Operation {
        match self {
            Self::Login => Operation::Login,
            Self::Register => Operation::Register,
        }
    }

    fn request(self, state: &mut SessionSnapshot) -> &mut RequestState {
        match self {
            Self::Login => &mut state.login,
            Self::Register => &mut state.register,
        }
    }
}

impl SessionStore {
    pub fn new(
        api: Arc<dyn BurgerApi>,
        credentials: Arc<Credentials>,
        events: broadcast::Sender<StoreEvent>,
    ) -> Self {
        Self {
            api,
            credentials,
            state: Mutex::new(SessionSnapshot::default()),
            events,
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.clone()
    }

    /// Startup session check. Whatever the outcome, the session is marked as
    /// checked afterwards. Returns whether a user is signed in.
    pub async fn resolve_session(&self) -> bool {
        self.state.lock().await.resolve.begin();
        emit_phase(&self.events, Operation::ResolveSession, Phase::Requested);

        let reset_requested = self.credentials.reset_requested().await.unwrap_or_else(|err| {
            warn!("session: failed to read reset marker: {err}");
            false
        });

        let result = match self.credentials.has_any().await {
            Ok(true) => self.api.fetch_user().await,
            Ok(false) => Err(ApiException::unauthorized("no stored session")),
            Err(err) => {
                error!("session: failed to read stored credentials: {err}");
                Err(ApiException::unauthorized("stored credentials unreadable"))
            }
        };

        if let Err(err) = &result {
            if err.code.is_auth() {
                self.clear_credentials().await;
            }
        }

        let mut state = self.state.lock().await;
        state.is_auth_checked = true;
        state.reset_requested = reset_requested;
        match result {
            Ok(user) => {
                info!("session: resolved");
                state.user = Some(user);
                state.is_authenticated = true;
                state.resolve.succeed();
                drop(state);
                emit_phase(&self.events, Operation::ResolveSession, Phase::Succeeded);
                true
            }
            Err(err) => {
                info!("session: anonymous ({})", err.message);
                state.user = None;
                state.is_authenticated = false;
                state.resolve.fail(err.message.clone());
                drop(state);
                emit_phase(
                    &self.events,
                    Operation::ResolveSession,
                    Phase::Failed(err.message),
                );
                false
            }
        }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<User, SessionError> {
        let result = {
            self.begin(Enrollment::Login).await;
            self.api.login(&request).await
        };
        self.finish_enrollment(Enrollment::Login, result).await
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User, SessionError> {
        let result = {
            self.begin(Enrollment::Register).await;
            self.api.register(&request).await
        };
        self.finish_enrollment(Enrollment::Register, result).await
    }

    async fn begin(&self, enrollment: Enrollment) {
        enrollment.request(&mut *self.state.lock().await).begin();
        emit_phase(&self.events, enrollment.operation(), Phase::Requested);
    }

    async fn finish_enrollment(
        &self,
        enrollment: Enrollment,
        result: ApiResult<AuthResponse>,
    ) -> Result<User, SessionError> {
        let operation = enrollment.operation();
        match result {
            Ok(auth) => {
                if let Err(err) = self
                    .credentials
                    .store(&auth.access_token, &auth.refresh_token)
                    .await
                {
                    error!("session: failed to persist credentials: {err:#}");
                }
                let mut state = self.state.lock().await;
                enrollment.request(&mut state).succeed();
                state.user = Some(auth.user.clone());
                state.is_authenticated = true;
                drop(state);
                info!(operation = operation.as_str(), "session: signed in");
                emit_phase(&self.events, operation, Phase::Succeeded);
                Ok(auth.user)
            }
            Err(err) => {
                enrollment
                    .request(&mut *self.state.lock().await)
                    .fail(err.message.clone());
                emit_phase(&self.events, operation, Phase::Failed(err.message.clone()));
                Err(err.into())
            }
        }
    }

    /// Replaces the stored user with the server's view after a partial update.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, SessionError> {
        {
            let mut state = self.state.lock().await;
            if !state.is_authenticated {
                return Err(SessionError::NotAuthenticated);
            }
            state.update.begin();
        }
        emit_phase(&self.events, Operation::UpdateProfile, Phase::Requested);

        let result = self.api.update_user(&update).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(user) => {
                state.update.succeed();
                state.user = Some(user.clone());
                drop(state);
                emit_phase(&self.events, Operation::UpdateProfile, Phase::Succeeded);
                Ok(user)
            }
            Err(err) => {
                state.update.fail(err.message.clone());
                drop(state);
                emit_phase(
                    &self.events,
                    Operation::UpdateProfile,
                    Phase::Failed(err.message.clone()),
                );
                Err(err.into())
            }
        }
    }

    /// Ends the session. Local state and both credentials are cleared even
    /// when the server call fails; the returned error only reports that call.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.state.lock().await.logout.begin();
        emit_phase(&self.events, Operation::Logout, Phase::Requested);

        let remote = match self.credentials.refresh_token().await {
            Ok(Some(token)) => self.api.logout(&token).await,
            Ok(None) => Ok(()),
            Err(err) => {
                warn!("session: failed to read refresh token for logout: {err}");
                Ok(())
            }
        };

        self.clear_credentials().await;

        let mut state = self.state.lock().await;
        state.user = None;
        state.is_authenticated = false;
        match remote {
            Ok(()) => {
                state.logout.succeed();
                drop(state);
                info!("session: signed out");
                emit_phase(&self.events, Operation::Logout, Phase::Succeeded);
                Ok(())
            }
            Err(err) => {
                state.logout.fail(err.message.clone());
                drop(state);
                warn!("session: remote logout failed, local session cleared anyway");
                emit_phase(
                    &self.events,
                    Operation::Logout,
                    Phase::Failed(err.message.clone()),
                );
                Err(err.into())
            }
        }
    }

    pub async fn clear_errors(&self) {
        let mut state = self.state.lock().await;
        state.login.error = None;
        state.register.error = None;
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), SessionError> {
        self.state.lock().await.password_reset.begin();
        emit_phase(&self.events, Operation::RequestPasswordReset, Phase::Requested);

        let result = self.api.request_password_reset(email).await;
        if result.is_ok() {
            if let Err(err) = self.credentials.mark_reset_requested().await {
                error!("session: failed to persist reset marker: {err:#}");
            }
        }

        let mut state = self.state.lock().await;
        match result {
            Ok(()) => {
                state.password_reset.succeed();
                state.reset_requested = true;
                drop(state);
                emit_phase(&self.events, Operation::RequestPasswordReset, Phase::Succeeded);
                Ok(())
            }
            Err(err) => {
                state.password_reset.fail(err.message.clone());
                drop(state);
                emit_phase(
                    &self.events,
                    Operation::RequestPasswordReset,
                    Phase::Failed(err.message.clone()),
                );
                Err(err.into())
            }
        }
    }

    pub async fn reset_password(&self, password: &str, code: &str) -> Result<(), SessionError> {
        self.state.lock().await.reset.begin();
        emit_phase(&self.events, Operation::ResetPassword, Phase::Requested);

        let result = self.api.reset_password(password, code).await;
        if result.is_ok() {
            if let Err(err) = self.credentials.clear_reset_marker().await {
                error!("session: failed to remove reset marker: {err:#}");
            }
        }

        let mut state = self.state.lock().await;
        match result {
            Ok(()) => {
                state.reset.succeed();
                state.reset_requested = false;
                drop(state);
                emit_phase(&self.events, Operation::ResetPassword, Phase::Succeeded);
                Ok(())
            }
            Err(err) => {
                state.reset.fail(err.message.clone());
                drop(state);
                emit_phase(
                    &self.events,
                    Operation::ResetPassword,
                    Phase::Failed(err.message.clone()),
                );
                Err(err.into())
            }
        }
    }

    async fn clear_credentials(&self) {
        if let Err(err) = self.credentials.clear().await {
            error!("session: failed to clear credentials: {err:#}");
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;

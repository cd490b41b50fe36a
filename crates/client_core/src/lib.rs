use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{IngredientId, OrderNumber, User},
    error::ApiException,
    protocol::{
        AuthResponse, FeedResponse, Ingredient, LoginRequest, Order, ProfileUpdate,
        RegisterRequest,
    },
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub mod catalog;
pub mod construction;
pub mod credentials;
pub mod feed;
pub mod http;
pub mod orders;
pub mod routing;
pub mod session;

pub use catalog::{CatalogSnapshot, CatalogStore, OrderBreakdown, OrderLine};
pub use construction::{Construction, ConstructionIngredient, ConstructionStore, InstanceId};
pub use credentials::Credentials;
pub use feed::{FeedSnapshot, FeedStore, OrderLookup, UserOrdersSnapshot};
pub use http::HttpBurgerApi;
pub use orders::{OrderError, OrderSnapshot, OrderStore};
pub use session::{SessionError, SessionSnapshot, SessionStore};

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub type ApiResult<T> = std::result::Result<T, ApiException>;

/// Remote operations the stores depend on. Implementations own transport,
/// authorization headers and token refresh.
#[async_trait]
pub trait BurgerApi: Send + Sync {
    async fn fetch_ingredients(&self) -> ApiResult<Vec<Ingredient>>;
    async fn fetch_feed(&self) -> ApiResult<FeedResponse>;
    async fn fetch_user_orders(&self) -> ApiResult<Vec<Order>>;
    async fn fetch_order_by_number(&self, number: OrderNumber) -> ApiResult<Vec<Order>>;
    async fn create_order(&self, ingredients: &[IngredientId]) -> ApiResult<Order>;
    async fn fetch_user(&self) -> ApiResult<User>;
    async fn login(&self, request: &LoginRequest) -> ApiResult<AuthResponse>;
    async fn register(&self, request: &RegisterRequest) -> ApiResult<AuthResponse>;
    async fn update_user(&self, update: &ProfileUpdate) -> ApiResult<User>;
    async fn logout(&self, refresh_token: &str) -> ApiResult<()>;
    async fn request_password_reset(&self, email: &str) -> ApiResult<()>;
    async fn reset_password(&self, password: &str, code: &str) -> ApiResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LoadCatalog,
    LoadFeed,
    LoadUserOrders,
    LookupOrder,
    SubmitOrder,
    FetchOrder,
    ResolveSession,
    Login,
    Register,
    UpdateProfile,
    Logout,
    RequestPasswordReset,
    ResetPassword,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadCatalog => "load_catalog",
            Self::LoadFeed => "load_feed",
            Self::LoadUserOrders => "load_user_orders",
            Self::LookupOrder => "lookup_order",
            Self::SubmitOrder => "submit_order",
            Self::FetchOrder => "fetch_order",
            Self::ResolveSession => "resolve_session",
            Self::Login => "login",
            Self::Register => "register",
            Self::UpdateProfile => "update_profile",
            Self::Logout => "logout",
            Self::RequestPasswordReset => "request_password_reset",
            Self::ResetPassword => "reset_password",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Requested,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Phase { operation: Operation, phase: Phase },
    ConstructionChanged,
    OrderModalChanged(Option<OrderNumber>),
}

/// Pending flag and last error of one async operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestState {
    pub pending: bool,
    pub error: Option<String>,
}

impl RequestState {
    pub(crate) fn begin(&mut self) {
        self.pending = true;
        self.error = None;
    }

    pub(crate) fn succeed(&mut self) {
        self.pending = false;
        self.error = None;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.pending = false;
        self.error = Some(message.into());
    }
}

/// Result of resolving an entity that may not be available yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Loading,
    Found(T),
    NotFound,
    Failed(String),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

pub(crate) fn emit_phase(
    events: &broadcast::Sender<StoreEvent>,
    operation: Operation,
    phase: Phase,
) {
    match &phase {
        Phase::Requested => debug!(operation = operation.as_str(), "store: requested"),
        Phase::Succeeded => debug!(operation = operation.as_str(), "store: succeeded"),
        Phase::Failed(message) => {
            warn!(operation = operation.as_str(), "store: failed: {message}")
        }
    }
    let _ = events.send(StoreEvent::Phase { operation, phase });
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("a bun is required before placing an order")]
    MissingBun,
    #[error("sign in to place an order")]
    LoginRequired,
    #[error(transparent)]
    Order(#[from] OrderError),
}

/// One instance of every store, sharing a single event channel.
pub struct ClientStores {
    pub catalog: Arc<CatalogStore>,
    pub construction: Arc<ConstructionStore>,
    pub orders: Arc<OrderStore>,
    pub feed: Arc<FeedStore>,
    pub session: Arc<SessionStore>,
    events: broadcast::Sender<StoreEvent>,
}

impl ClientStores {
    pub fn new(api: Arc<dyn BurgerApi>, credentials: Arc<Credentials>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            catalog: Arc::new(CatalogStore::new(Arc::clone(&api), events.clone())),
            construction: Arc::new(ConstructionStore::new(events.clone())),
            orders: Arc::new(OrderStore::new(Arc::clone(&api), events.clone())),
            feed: Arc::new(FeedStore::new(Arc::clone(&api), events.clone())),
            session: Arc::new(SessionStore::new(api, credentials, events.clone())),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Application start: resolves the session and loads the catalog
    /// concurrently. Failures are recorded on the owning stores.
    pub async fn bootstrap(&self) {
        let (_, catalog) = futures::join!(self.session.resolve_session(), self.catalog.load());
        if let Err(err) = catalog {
            warn!("bootstrap: catalog load failed: {err}");
        }
        let session = self.session.snapshot().await;
        info!(
            authenticated = session.is_authenticated,
            "bootstrap: session resolved"
        );
    }

    /// Submits the current construction. On success the construction is
    /// cleared and the created order becomes the order modal.
    pub async fn checkout(&self) -> Result<Order, CheckoutError> {
        if !self.session.snapshot().await.is_authenticated {
            return Err(CheckoutError::LoginRequired);
        }
        let construction = self.construction.snapshot().await;
        let ingredient_ids = construction.order_ids().ok_or(CheckoutError::MissingBun)?;

        let order = self.orders.submit(ingredient_ids).await?;
        self.construction.clear().await;
        info!(number = order.number.0, "checkout: order placed");
        Ok(order)
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

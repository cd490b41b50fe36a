use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{IngredientCategory, IngredientId, OrderId, OrderNumber, OrderStatus, User},
    error::ApiException,
    protocol::{
        AuthResponse, FeedResponse, Ingredient, LoginRequest, Order, ProfileUpdate,
        RegisterRequest,
    },
};
use tokio::sync::{broadcast, Mutex, Notify};

use crate::{ApiResult, BurgerApi, StoreEvent};

/// Scripted `BurgerApi`. Each endpoint returns a clone of its configured
/// result; calls are recorded by name and can be held open with a gate.
pub(crate) struct FakeApi {
    pub ingredients: Mutex<ApiResult<Vec<Ingredient>>>,
    pub feed: Mutex<ApiResult<FeedResponse>>,
    pub user_orders: Mutex<ApiResult<Vec<Order>>>,
    pub orders_by_number: Mutex<ApiResult<Vec<Order>>>,
    pub created: Mutex<ApiResult<Order>>,
    pub user: Mutex<ApiResult<User>>,
    pub auth: Mutex<ApiResult<AuthResponse>>,
    pub updated: Mutex<ApiResult<User>>,
    pub logout: Mutex<ApiResult<()>>,
    pub password: Mutex<ApiResult<()>>,
    calls: Mutex<Vec<&'static str>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            ingredients: Mutex::new(Ok(vec![bun(), meat(), sauce()])),
            feed: Mutex::new(Ok(FeedResponse {
                orders: Vec::new(),
                total: 0,
                total_today: 0,
            })),
            user_orders: Mutex::new(Ok(Vec::new())),
            orders_by_number: Mutex::new(Ok(Vec::new())),
            created: Mutex::new(Ok(order(1, OrderStatus::Created))),
            user: Mutex::new(Ok(user())),
            auth: Mutex::new(Ok(auth_response())),
            updated: Mutex::new(Ok(user())),
            logout: Mutex::new(Ok(())),
            password: Mutex::new(Ok(())),
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Holds `call` open until the returned gate is notified.
    pub async fn gate(&self, call: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().await.insert(call, Arc::clone(&gate));
        gate
    }

    pub async fn calls(&self, call: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|recorded| **recorded == call)
            .count()
    }

    async fn enter(&self, call: &'static str) {
        self.calls.lock().await.push(call);
        let gate = self.gates.lock().await.get(call).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl BurgerApi for FakeApi {
    async fn fetch_ingredients(&self) -> ApiResult<Vec<Ingredient>> {
        self.enter("fetch_ingredients").await;
        self.ingredients.lock().await.clone()
    }

    async fn fetch_feed(&self) -> ApiResult<FeedResponse> {
        self.enter("fetch_feed").await;
        self.feed.lock().await.clone()
    }

    async fn fetch_user_orders(&self) -> ApiResult<Vec<Order>> {
        self.enter("fetch_user_orders").await;
        self.user_orders.lock().await.clone()
    }

    async fn fetch_order_by_number(&self, number: OrderNumber) -> ApiResult<Vec<Order>> {
        self.enter("fetch_order_by_number").await;
        self.orders_by_number.lock().await.clone().map(|orders| {
            orders
                .into_iter()
                .filter(|order| order.number == number)
                .collect()
        })
    }

    async fn create_order(&self, _ingredients: &[IngredientId]) -> ApiResult<Order> {
        self.enter("create_order").await;
        self.created.lock().await.clone()
    }

    async fn fetch_user(&self) -> ApiResult<User> {
        self.enter("fetch_user").await;
        self.user.lock().await.clone()
    }

    async fn login(&self, _request: &LoginRequest) -> ApiResult<AuthResponse> {
        self.enter("login").await;
        self.auth.lock().await.clone()
    }

    async fn register(&self, _request: &RegisterRequest) -> ApiResult<AuthResponse> {
        self.enter("register").await;
        self.auth.lock().await.clone()
    }

    async fn update_user(&self, _update: &ProfileUpdate) -> ApiResult<User> {
        self.enter("update_user").await;
        self.updated.lock().await.clone()
    }

    async fn logout(&self, _refresh_token: &str) -> ApiResult<()> {
        self.enter("logout").await;
        self.logout.lock().await.clone()
    }

    async fn request_password_reset(&self, _email: &str) -> ApiResult<()> {
        self.enter("request_password_reset").await;
        self.password.lock().await.clone()
    }

    async fn reset_password(&self, _password: &str, _code: &str) -> ApiResult<()> {
        self.enter("reset_password").await;
        self.password.lock().await.clone()
    }
}

pub(crate) fn events() -> broadcast::Sender<StoreEvent> {
    broadcast::channel(64).0
}

pub(crate) fn failure(message: &str) -> ApiException {
    ApiException::new(shared::error::ErrorCode::Internal, message)
}

fn ingredient(id: &str, name: &str, category: IngredientCategory, price: u64) -> Ingredient {
    Ingredient {
        id: IngredientId::new(id),
        name: name.to_string(),
        category,
        proteins: 10,
        fat: 5,
        carbohydrates: 20,
        calories: 150,
        price,
        image: String::new(),
        image_large: String::new(),
        image_mobile: String::new(),
    }
}

pub(crate) fn bun() -> Ingredient {
    ingredient("bun-1", "Fluorescent bun", IngredientCategory::Bun, 988)
}

pub(crate) fn other_bun() -> Ingredient {
    ingredient("bun-2", "Craterbun", IngredientCategory::Bun, 1255)
}

pub(crate) fn meat() -> Ingredient {
    ingredient("main-1", "Meteorite steak", IngredientCategory::Main, 3000)
}

pub(crate) fn sauce() -> Ingredient {
    ingredient("sauce-1", "Spicy-X sauce", IngredientCategory::Sauce, 90)
}

pub(crate) fn order(number: u64, status: OrderStatus) -> Order {
    Order {
        id: OrderId::new(format!("order-{number}")),
        number: OrderNumber(number),
        name: format!("Burger {number}"),
        status,
        ingredients: vec![bun().id, meat().id, bun().id],
        created_at: Utc
            .with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
            .single()
            .expect("valid timestamp"),
        updated_at: None,
    }
}

pub(crate) fn user() -> User {
    User {
        name: "Ada".to_string(),
        email: "ada@example.test".to_string(),
    }
}

pub(crate) fn auth_response() -> AuthResponse {
    AuthResponse {
        user: user(),
        access_token: "Bearer access-1".to_string(),
        refresh_token: "refresh-1".to_string(),
    }
}

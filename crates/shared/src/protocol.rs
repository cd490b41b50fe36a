use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{IngredientCategory, IngredientId, OrderId, OrderNumber, OrderStatus, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    #[serde(rename = "_id")]
    pub id: IngredientId,
    pub name: String,
    #[serde(rename = "type")]
    pub category: IngredientCategory,
    #[serde(default)]
    pub proteins: u32,
    #[serde(default)]
    pub fat: u32,
    #[serde(default)]
    pub carbohydrates: u32,
    #[serde(default)]
    pub calories: u32,
    pub price: u64,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_large: String,
    #[serde(default)]
    pub image_mobile: String,
}

/// A placed order. The bun id appears twice in `ingredients`, first and last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: OrderId,
    pub number: OrderNumber,
    #[serde(default)]
    pub name: String,
    pub status: OrderStatus,
    pub ingredients: Vec<IngredientId>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientsResponse {
    pub data: Vec<Ingredient>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub orders: Vec<Order>,
    pub total: u64,
    pub total_today: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub ingredients: Vec<IngredientId>,
}

/// Order creation echoes ingredients either as bare ids or as full objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IngredientRef {
    Id(IngredientId),
    Object {
        #[serde(rename = "_id")]
        id: IngredientId,
    },
}

impl IngredientRef {
    pub fn into_id(self) -> IngredientId {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrderPayload {
    #[serde(rename = "_id")]
    pub id: OrderId,
    pub number: OrderNumber,
    #[serde(default)]
    pub name: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub ingredients: Vec<IngredientRef>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<CreatedOrderPayload> for Order {
    fn from(value: CreatedOrderPayload) -> Self {
        Self {
            id: value.id,
            number: value.number,
            name: value.name,
            status: value.status,
            ingredients: value
                .ingredients
                .into_iter()
                .map(IngredientRef::into_id)
                .collect(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    #[serde(default)]
    pub name: String,
    pub order: CreatedOrderPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Partial profile update; absent fields are left unchanged by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.password.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Body for logout and token refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetConfirm {
    pub password: String,
    pub token: String,
}

/// Envelope every endpoint wraps its payload in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub payload: Option<T>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

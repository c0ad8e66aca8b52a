//! HTTP JSON API over the storefront session.

use std::sync::Arc;

use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::aggregates::{CartError, CartItem, CategoryFilter, Order, OrderError, OrderStatus, Product, ProductDraft, SalesSummary, User};
use crate::domain::settings::StoreSettings;
use crate::services::assistant::ChatMessage;
use crate::services::checkout::{CheckoutDetails, CheckoutError};
use crate::services::identity::{AuthError, OtpOutcome, OtpPurpose, SignUpRequest};
use crate::services::notifier::SystemLogEntry;
use crate::services::storage::StorageError;
use crate::services::{CartView, Storefront};
use crate::StorefrontError;

pub type AppState = Arc<Storefront>;
type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "nayavish-storefront"})) }))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/recommended", get(recommended_products))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/cart", get(get_cart).post(add_to_cart))
        .route("/api/v1/cart/:product_id", put(adjust_cart).delete(remove_from_cart))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders/mine", get(my_orders))
        .route("/api/v1/auth/me", get(me))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/signup", post(sign_up))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/otp", post(request_otp))
        .route("/api/v1/auth/otp/voice", post(request_voice_otp))
        .route("/api/v1/auth/otp/verify", post(verify_otp))
        .route("/api/v1/settings", get(get_settings))
        .route("/api/v1/assistant", post(ask_assistant))
        .route("/api/v1/admin/login", post(admin_login))
        .route("/api/v1/admin/logout", post(admin_logout))
        .route("/api/v1/admin/products", get(admin_products).post(create_product))
        .route("/api/v1/admin/products/:id", put(update_product).delete(delete_product))
        .route("/api/v1/admin/products/:id/stock", put(set_stock))
        .route("/api/v1/admin/products/:id/toggle", post(toggle_product))
        .route("/api/v1/admin/orders", get(list_orders))
        .route("/api/v1/admin/orders/:id/status", put(update_order_status))
        .route("/api/v1/admin/orders/:id/reject", post(reject_order))
        .route("/api/v1/admin/settings", put(update_settings))
        .route("/api/v1/admin/users", get(list_users).put(replace_users))
        .route("/api/v1/admin/dashboard", get(dashboard))
        .route("/api/v1/admin/logs", get(logs))
        .route("/api/v1/admin/backup", get(export_backup))
        .route("/api/v1/admin/restore", post(restore_backup))
        .route("/api/v1/admin/reset", post(reset))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn status_of(e: &StorefrontError) -> StatusCode {
    use StorefrontError as E;
    match e {
        E::ProductNotFound | E::Cart(CartError::ItemNotFound) | E::Auth(AuthError::NotFound) => StatusCode::NOT_FOUND,
        E::AdminRequired | E::NotSignedIn | E::Auth(AuthError::InvalidCredentials | AuthError::InvalidOtp) => StatusCode::UNAUTHORIZED,
        E::Cart(_) | E::Order(OrderError::InvalidTransition { .. }) | E::Auth(AuthError::AlreadyRegistered) | E::Checkout(CheckoutError::InProgress) => StatusCode::CONFLICT,
        E::Auth(AuthError::ResendTooSoon | AuthError::SendInProgress) => StatusCode::TOO_MANY_REQUESTS,
        E::Product(_) | E::Order(_) | E::Settings(_) | E::Checkout(_) | E::Auth(AuthError::Validation(_) | AuthError::NoPendingOtp) => StatusCode::BAD_REQUEST,
        E::Storage(StorageError::InvalidBackup(_) | StorageError::Serialization(_)) => StatusCode::BAD_REQUEST,
        E::Notify(_) => StatusCode::BAD_GATEWAY,
        E::Auth(AuthError::Credential(_)) | E::Storage(_) | E::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(e: StorefrontError) -> (StatusCode, String) { (status_of(&e), e.to_string()) }

/// Account fields safe to return to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile { pub id: String, pub name: String, pub email: String, pub phone: String, pub address: String, pub avatar: String, pub joined_at: DateTime<Utc> }

impl From<User> for UserProfile {
    fn from(u: User) -> Self { Self { id: u.id, name: u.name, email: u.email, phone: u.phone, address: u.address, avatar: u.avatar, joined_at: u.joined_at } }
}

#[derive(Debug, Deserialize)] pub struct ListParams { pub category: Option<String>, pub search: Option<String> }
#[derive(Debug, Deserialize)] #[serde(rename_all = "camelCase")] pub struct AddToCartRequest { pub product_id: String }
#[derive(Debug, Deserialize)] pub struct AdjustCartRequest { pub delta: i64 }
#[derive(Debug, Deserialize)] pub struct LoginRequest { pub email: String, pub password: String }
#[derive(Debug, Deserialize)] pub struct OtpRequest { pub phone: String, #[serde(default = "login_purpose")] pub purpose: OtpPurpose }
#[derive(Debug, Deserialize)] pub struct VerifyOtpRequest { pub code: String }
#[derive(Debug, Deserialize)] pub struct AssistantRequest { pub query: String, #[serde(default)] pub history: Vec<ChatMessage> }
#[derive(Debug, Deserialize)] pub struct StockRequest { pub stock: Value }
#[derive(Debug, Deserialize)] pub struct StatusRequest { pub status: String }

fn login_purpose() -> OtpPurpose { OtpPurpose::Login }

async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> ApiResult<Json<Vec<Product>>> {
    let filter: CategoryFilter = p.category.as_deref().unwrap_or_default().parse().map_err(|e: crate::domain::aggregates::ProductError| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(s.products(filter, p.search.as_deref().unwrap_or_default())))
}

async fn recommended_products(State(s): State<AppState>) -> Json<Vec<Product>> { Json(s.recommendations()) }

async fn get_product(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Product>> {
    s.product(&id).map(Json).ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))
}

async fn get_cart(State(s): State<AppState>) -> Json<CartView> { Json(s.cart()) }

async fn add_to_cart(State(s): State<AppState>, Json(r): Json<AddToCartRequest>) -> ApiResult<Json<CartItem>> {
    s.add_to_cart(&r.product_id).await.map(Json).map_err(reject)
}

async fn adjust_cart(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<AdjustCartRequest>) -> ApiResult<Json<Value>> {
    let quantity = s.adjust_cart(&id, r.delta).await.map_err(reject)?;
    Ok(Json(json!({ "productId": id, "quantity": quantity })))
}

async fn remove_from_cart(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    s.remove_from_cart(&id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutDetails>) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = s.checkout(&r).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn my_orders(State(s): State<AppState>) -> ApiResult<Json<Vec<Order>>> { s.my_orders().map(Json).map_err(reject) }

async fn me(State(s): State<AppState>) -> ApiResult<Json<UserProfile>> {
    s.current_user().map(|u| Json(u.into())).ok_or_else(|| reject(StorefrontError::NotSignedIn))
}

async fn login(State(s): State<AppState>, Json(r): Json<LoginRequest>) -> ApiResult<Json<UserProfile>> {
    s.login(&r.email, &r.password).await.map(|u| Json(u.into())).map_err(reject)
}

async fn sign_up(State(s): State<AppState>, Json(r): Json<SignUpRequest>) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let user = s.sign_up(&r).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn logout(State(s): State<AppState>) -> ApiResult<StatusCode> {
    s.logout().await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn request_otp(State(s): State<AppState>, Json(r): Json<OtpRequest>) -> ApiResult<StatusCode> {
    s.request_otp(&r.phone, r.purpose).await.map_err(reject)?;
    Ok(StatusCode::ACCEPTED)
}

async fn request_voice_otp(State(s): State<AppState>) -> ApiResult<StatusCode> {
    s.request_voice_otp().await.map_err(reject)?;
    Ok(StatusCode::ACCEPTED)
}

async fn verify_otp(State(s): State<AppState>, Json(r): Json<VerifyOtpRequest>) -> ApiResult<Json<Value>> {
    let body = match s.verify_otp(&r.code).await.map_err(reject)? {
        OtpOutcome::LoggedIn(resolution) => {
            let created = resolution.is_new();
            json!({ "loggedIn": true, "created": created, "user": UserProfile::from(resolution.into_user()) })
        }
        OtpOutcome::RecoveryVerified { phone } => json!({ "loggedIn": false, "recoveryVerified": phone }),
    };
    Ok(Json(body))
}

async fn get_settings(State(s): State<AppState>) -> Json<StoreSettings> { Json(s.settings()) }

async fn ask_assistant(State(s): State<AppState>, Json(r): Json<AssistantRequest>) -> Json<Value> {
    Json(json!({ "reply": s.ask_assistant(&r.query, &r.history).await }))
}

async fn admin_login(State(s): State<AppState>, Json(r): Json<LoginRequest>) -> ApiResult<StatusCode> {
    s.admin_login(&r.email, &r.password).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_logout(State(s): State<AppState>) -> ApiResult<StatusCode> {
    s.admin_logout().await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_products(State(s): State<AppState>) -> ApiResult<Json<Vec<Product>>> { s.admin_products().map(Json).map_err(reject) }

async fn create_product(State(s): State<AppState>, Json(r): Json<ProductDraft>) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = s.add_product(&r).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<ProductDraft>) -> ApiResult<Json<Product>> {
    s.update_product(&id, &r).await.map_err(reject)?.map(Json).ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))
}

async fn delete_product(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    s.delete_product(&id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_stock(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<StockRequest>) -> ApiResult<Json<Value>> {
    let raw = match &r.stock { Value::String(raw) => raw.clone(), other => other.to_string() };
    let stock = s.set_stock(&id, &raw).await.map_err(reject)?.ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))?;
    Ok(Json(json!({ "id": id, "stock": stock })))
}

async fn toggle_product(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let active = s.toggle_active(&id).await.map_err(reject)?.ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))?;
    Ok(Json(json!({ "id": id, "isActive": active })))
}

async fn list_orders(State(s): State<AppState>) -> ApiResult<Json<Vec<Order>>> { s.orders().map(Json).map_err(reject) }

async fn update_order_status(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<StatusRequest>) -> ApiResult<Json<Order>> {
    let status: OrderStatus = r.status.parse().map_err(|e: OrderError| (StatusCode::BAD_REQUEST, e.to_string()))?;
    s.update_order_status(&id, status).await.map_err(reject)?.map(Json).ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))
}

async fn reject_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Order>> {
    s.reject_order(&id).await.map_err(reject)?.map(Json).ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))
}

async fn update_settings(State(s): State<AppState>, Json(r): Json<Value>) -> ApiResult<Json<StoreSettings>> {
    s.update_settings(r).await.map(Json).map_err(reject)
}

async fn list_users(State(s): State<AppState>) -> ApiResult<Json<Vec<UserProfile>>> {
    let users = s.users().map_err(reject)?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

async fn replace_users(State(s): State<AppState>, Json(r): Json<Vec<User>>) -> ApiResult<StatusCode> {
    s.replace_users(r).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn dashboard(State(s): State<AppState>) -> ApiResult<Json<SalesSummary>> { s.dashboard().map(Json).map_err(reject) }

async fn logs(State(s): State<AppState>) -> ApiResult<Json<Vec<SystemLogEntry>>> { s.logs().await.map(Json).map_err(reject) }

async fn export_backup(State(s): State<AppState>) -> ApiResult<([(axum::http::HeaderName, &'static str); 1], String)> {
    let body = s.export_backup().await.map_err(reject)?;
    Ok(([(axum::http::header::CONTENT_TYPE, "application/json")], body))
}

async fn restore_backup(State(s): State<AppState>, body: String) -> ApiResult<StatusCode> {
    s.restore_backup(&body).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reset(State(s): State<AppState>) -> ApiResult<StatusCode> {
    s.reset().await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

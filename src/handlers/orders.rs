use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::{OrderStatus, PaymentMethod};
use crate::errors::ServiceError;
use crate::services::order_queries::{
    AdminOrderFilter, CompanyOrdersFilter, MyOrdersFilter, OrderPage, PageRequest, SortKey,
};
use crate::services::orders::{
    OnlineOrderInput, OrderDetails, OrderItemInput, OrderResponse,
};
use crate::{ApiResponse, AppState};

// ==================== Request payloads ====================

/// Gateway payment-confirmation callback, as delivered by the gateway.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OnlineOrderRequest {
    pub transaction: TransactionOutcome,
    pub intention: PaymentIntention,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransactionOutcome {
    pub success: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentIntention {
    /// Payment intent id assigned by the gateway
    pub id: String,
    pub client_secret: Option<String>,
    pub intention_detail: IntentionDetail,
    pub extras: IntentionExtras,
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethodRef>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntentionDetail {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntentionExtras {
    pub creation_extras: CreationExtras,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreationExtras {
    /// Target order owner; defaults to the authenticated user when absent
    pub user_id: Option<Uuid>,
    pub address_id: Uuid,
    #[serde(default)]
    pub cart_items: Vec<CartItemSnapshot>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartItemSnapshot {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentMethodRef {
    pub integration_id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CashOnDeliveryRequest {
    pub cart_id: Uuid,
    pub address_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkProcessingRequest {
    pub payment_intent_id: String,
}

// ==================== Query parameters ====================

#[derive(Debug, Deserialize, IntoParams)]
pub struct AdminListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    pub limit: Option<u64>,
    /// Substring match on the owning user's name or email
    pub name: Option<String>,
    /// Comma-separated list of statuses
    pub status: Option<String>,
    /// Company id; restricts to orders containing that company's products
    pub company: Option<Uuid>,
    pub paid: Option<bool>,
    pub payment_method: Option<PaymentMethod>,
    /// Only orders created at or after this timestamp
    pub period: Option<DateTime<Utc>>,
    /// Sort key, e.g. `total` or `-created_at`
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MyOrdersParams {
    #[serde(default = "default_page")]
    pub page: u64,
    pub limit: Option<u64>,
    pub status: Option<String>,
    pub paid: Option<bool>,
    pub payment_method: Option<PaymentMethod>,
    pub period: Option<DateTime<Utc>>,
    /// Look up another user's orders (elevated role required)
    pub user: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CompanyOrdersParams {
    #[serde(default = "default_page")]
    pub page: u64,
    pub limit: Option<u64>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub paid: Option<bool>,
    pub payment_method: Option<PaymentMethod>,
    pub period: Option<DateTime<Utc>>,
}

fn default_page() -> u64 {
    1
}

fn parse_status(raw: Option<&str>) -> Result<Option<OrderStatus>, ServiceError> {
    raw.map(|value| {
        OrderStatus::from_str(value.trim())
            .map_err(|_| ServiceError::ValidationError(format!("unknown order status: {}", value)))
    })
    .transpose()
}

fn parse_status_set(raw: Option<&str>) -> Result<Vec<OrderStatus>, ServiceError> {
    match raw {
        None => Ok(Vec::new()),
        Some(list) => list
            .split(',')
            .map(|part| {
                OrderStatus::from_str(part.trim()).map_err(|_| {
                    ServiceError::ValidationError(format!("unknown order status: {}", part))
                })
            })
            .collect(),
    }
}

// ==================== Handlers ====================

/// Create an order from a gateway payment confirmation
#[utoipa::path(
    post,
    path = "/api/v1/orders/online",
    summary = "Create online order",
    description = "Create a paid order from a successful gateway payment confirmation. Repeated confirmations for the same payment intent return the existing order.",
    request_body = OnlineOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Failed transaction or invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_online_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<OnlineOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let extras = request.intention.extras.creation_extras;

    let input = OnlineOrderInput {
        succeeded: request.transaction.success,
        payment_intent_id: request.intention.id,
        client_secret: request.intention.client_secret,
        user_id: extras.user_id.unwrap_or(auth_user.user_id),
        shipping_address_id: extras.address_id,
        amount: request.intention.intention_detail.amount,
        integration_ids: request
            .intention
            .payment_methods
            .iter()
            .map(|method| method.integration_id)
            .collect(),
        items: extras
            .cart_items
            .into_iter()
            .map(|item| OrderItemInput {
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect(),
    };

    let order = state.services.order.create_online_order(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// Create a cash-on-delivery order from a pending cart
#[utoipa::path(
    post,
    path = "/api/v1/orders/cod",
    summary = "Create cash-on-delivery order",
    description = "Convert the given cart into an unpaid cash-on-delivery order. The cart is consumed.",
    request_body = CashOnDeliveryRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_cash_on_delivery_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CashOnDeliveryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let order = state
        .services
        .order
        .create_cash_on_delivery_order(request.cart_id, request.address_id, auth_user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// List all orders (admin)
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Paginated listing over every order with optional facets; admin only.",
    params(AdminListParams),
    responses(
        (status = 200, description = "Orders retrieved", body = OrderPage),
        (status = 400, description = "Invalid filter parameter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<AdminListParams>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderPage>>, ServiceError> {
    if !auth_user.is_admin() {
        return Err(ServiceError::Forbidden(
            "listing all orders requires an elevated role".to_string(),
        ));
    }

    let filter = AdminOrderFilter {
        name: params.name,
        statuses: parse_status_set(params.status.as_deref())?,
        company_id: params.company,
        paid: params.paid,
        payment_method: params.payment_method,
        period: params.period,
        sort: params
            .sort
            .as_deref()
            .map(SortKey::from_str)
            .transpose()?,
    };
    let page = PageRequest {
        page: params.page,
        limit: params.limit,
    };

    let result = state
        .services
        .order_queries
        .list_all_orders(filter, page)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// List the requesting user's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders/mine",
    summary = "List current user's orders",
    params(MyOrdersParams),
    responses(
        (status = 200, description = "Orders retrieved", body = OrderPage),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Cross-user lookup denied", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    Query(params): Query<MyOrdersParams>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderPage>>, ServiceError> {
    let filter = MyOrdersFilter {
        status: parse_status(params.status.as_deref())?,
        paid: params.paid,
        payment_method: params.payment_method,
        period: params.period,
        user: params.user,
    };
    let page = PageRequest {
        page: params.page,
        limit: params.limit,
    };

    let result = state
        .services
        .order_queries
        .list_user_orders(&auth_user, filter, page)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// List orders containing the vendor company's products
#[utoipa::path(
    get,
    path = "/api/v1/orders/company",
    summary = "List company orders",
    params(CompanyOrdersParams),
    responses(
        (status = 200, description = "Orders retrieved", body = OrderPage),
        (status = 400, description = "Account has no company", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_company_orders(
    State(state): State<AppState>,
    Query(params): Query<CompanyOrdersParams>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderPage>>, ServiceError> {
    let filter = CompanyOrdersFilter {
        name: params.name,
        status: parse_status(params.status.as_deref())?,
        paid: params.paid,
        payment_method: params.payment_method,
        period: params.period,
    };
    let page = PageRequest {
        page: params.page,
        limit: params.limit,
    };

    let result = state
        .services
        .order_queries
        .list_company_orders(&auth_user, filter, page)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Get a single order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    description = "Fetch one order with line items and shipping address expanded. The caller must own the order or hold an elevated role.",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved", body = OrderDetails),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderDetails>>, ServiceError> {
    let order = state.services.order.get_order(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Record the payment intent and advance the order to processing
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/processing",
    summary = "Mark order as processing",
    request_body = MarkProcessingRequest,
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order updated", body = OrderResponse),
        (status = 400, description = "Illegal status transition", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn mark_processing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<MarkProcessingRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .order
        .mark_processing(id, request.payment_intent_id, &auth_user)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

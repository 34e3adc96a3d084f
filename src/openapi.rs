use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Orderdesk API",
        version = "1.0.0",
        description = r#"
# Orderdesk Order Management API

Creates storefront orders from online gateway confirmations and
cash-on-delivery checkouts, applies order lifecycle transitions, and serves
filtered, paginated order listings for admins, customers, and vendor
companies.

## Authentication

All endpoints require a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

## Pagination

List endpoints accept `page` and `limit` query parameters and return a page
envelope with `total_count`, `current_page`, `last_page`, and `orders`.
"#,
        contact(name = "Orderdesk", email = "support@orderdesk.dev")
    ),
    paths(
        crate::handlers::orders::create_online_order,
        crate::handlers::orders::create_cash_on_delivery_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::list_company_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::mark_processing,
    ),
    components(
        schemas(
            crate::handlers::orders::OnlineOrderRequest,
            crate::handlers::orders::TransactionOutcome,
            crate::handlers::orders::PaymentIntention,
            crate::handlers::orders::IntentionDetail,
            crate::handlers::orders::IntentionExtras,
            crate::handlers::orders::CreationExtras,
            crate::handlers::orders::CartItemSnapshot,
            crate::handlers::orders::PaymentMethodRef,
            crate::handlers::orders::CashOnDeliveryRequest,
            crate::handlers::orders::MarkProcessingRequest,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderDetails,
            crate::services::orders::OrderItemDetail,
            crate::services::orders::AddressSummary,
            crate::services::orders::UserSummary,
            crate::services::order_queries::OrderPage,
            crate::entities::OrderStatus,
            crate::entities::PaymentMethod,
            crate::entities::UserRole,
            crate::errors::ErrorResponse,
        )
    ),
    tags(
        (name = "orders", description = "Order lifecycle and listing endpoints")
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}

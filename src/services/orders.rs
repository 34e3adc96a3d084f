use crate::{
    auth::{check_permissions, AuthUser},
    db::DbPool,
    entities::{
        address, cart_item, order, order_item, product_variant, Address, Cart, CartItem, Order,
        OrderItem, OrderStatus, PaymentMethod, ProductVariant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    payments::PaymentMethodMap,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Normalized online payment confirmation, produced by the HTTP layer from
/// the gateway callback payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OnlineOrderInput {
    /// Whether the gateway reports the transaction as settled
    pub succeeded: bool,
    #[validate(length(min = 1, message = "payment intent id is required"))]
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    /// Owner of the resulting order
    pub user_id: Uuid,
    pub shipping_address_id: Uuid,
    /// Amount charged by the gateway; becomes the order subtotal
    pub amount: Decimal,
    /// Gateway integration ids that settled the intent, most specific first
    pub integration_ids: Vec<i64>,
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    pub items: Vec<OrderItemInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Order header as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub shipping_address_id: Uuid,
    pub paid: bool,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            subtotal: model.subtotal,
            shipping_fee: model.shipping_fee,
            total: model.total,
            shipping_address_id: model.shipping_address_id,
            paid: model.paid,
            payment_method: model.payment_method,
            payment_intent_id: model.payment_intent_id,
            client_secret: model.client_secret,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Line item with the variant snapshot expanded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemDetail {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressSummary {
    pub id: Uuid,
    pub street: String,
    pub city: String,
    pub phone: String,
}

impl From<address::Model> for AddressSummary {
    fn from(model: address::Model) -> Self {
        Self {
            id: model.id,
            street: model.street,
            city: model.city,
            phone: model.phone,
        }
    }
}

/// Owning-user projection embedded in listings. Admin listings carry only
/// the name/email fields; the company listing fills the whole record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<crate::entities::UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
}

/// Order with its relation expansions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: OrderResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub items: Vec<OrderItemDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<AddressSummary>,
}

/// Order lifecycle engine: creates orders from both payment flows and
/// applies status transitions.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    payment_methods: Arc<PaymentMethodMap>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        payment_methods: Arc<PaymentMethodMap>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            payment_methods,
            event_sender,
        }
    }

    /// Creates an order from a successful gateway payment confirmation.
    ///
    /// The operation is idempotent per payment intent: a confirmation that
    /// was already converted returns the existing order instead of inserting
    /// a duplicate. A failed transaction never persists anything.
    #[instrument(skip(self, input), fields(payment_intent_id = %input.payment_intent_id, user_id = %input.user_id))]
    pub async fn create_online_order(
        &self,
        input: OnlineOrderInput,
    ) -> Result<OrderResponse, ServiceError> {
        if !input.succeeded {
            return Err(ServiceError::InvalidOperation(
                "order cannot be created from a failed transaction".to_string(),
            ));
        }
        input.validate()?;
        for item in &input.items {
            item.validate()?;
        }

        if let Some(existing) = Order::find()
            .filter(order::Column::PaymentIntentId.eq(input.payment_intent_id.as_str()))
            .one(&*self.db)
            .await?
        {
            info!(order_id = %existing.id, "payment intent already converted, returning existing order");
            return Ok(existing.into());
        }

        let shipping_fee = Decimal::ZERO;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(input.user_id),
            subtotal: Set(input.amount),
            shipping_fee: Set(shipping_fee),
            total: Set(input.amount + shipping_fee),
            shipping_address_id: Set(input.shipping_address_id),
            paid: Set(true),
            payment_method: Set(self.payment_methods.resolve(&input.integration_ids)),
            payment_intent_id: Set(Some(input.payment_intent_id.clone())),
            client_secret: Set(input.client_secret.clone()),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
            updated_at: Set(None),
        };
        let order = order.insert(&txn).await?;

        for item in &input.items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                variant_id: Set(item.variant_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        info!(order_id = %order_id, "online order created");
        self.notify(Event::OrderCreated(order_id)).await;

        Ok(order.into())
    }

    /// Creates an unpaid cash-on-delivery order from a pending cart.
    ///
    /// The cart's contents become the order's line items and the cart is
    /// deleted; both happen in one transaction so a failure leaves neither a
    /// half-created order nor a consumed-but-present cart.
    #[instrument(skip(self), fields(cart_id = %cart_id, user_id = %actor))]
    pub async fn create_cash_on_delivery_order(
        &self,
        cart_id: Uuid,
        shipping_address_id: Uuid,
        actor: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find_by_id(cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No cart with id {}", cart_id)))?;

        let cart_items = cart.find_related(CartItem).all(&txn).await?;
        if cart_items.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "cart has no items to order".to_string(),
            ));
        }

        let shipping_fee = Decimal::ZERO;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(actor),
            subtotal: Set(cart.total_price),
            shipping_fee: Set(shipping_fee),
            total: Set(cart.total_price + shipping_fee),
            shipping_address_id: Set(shipping_address_id),
            paid: Set(false),
            payment_method: Set(PaymentMethod::CashOnDelivery),
            payment_intent_id: Set(None),
            client_secret: Set(None),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
            updated_at: Set(None),
        };
        let order = order.insert(&txn).await?;

        for item in &cart_items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                variant_id: Set(item.variant_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
            }
            .insert(&txn)
            .await?;
        }

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;
        Cart::delete_by_id(cart_id).exec(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, cart_id = %cart_id, "cash-on-delivery order created");
        self.notify(Event::OrderCreated(order_id)).await;
        self.notify(Event::CartConverted { cart_id, order_id }).await;

        Ok(order.into())
    }

    /// Records the payment intent on an order and advances it to
    /// `processing`.
    ///
    /// Only the order's owner or an elevated actor may transition it, and
    /// only from a state the transition table allows.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn mark_processing(
        &self,
        order_id: Uuid,
        payment_intent_id: String,
        actor: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No order with id {}", order_id)))?;

        check_permissions(actor, order.user_id)?;

        let old_status = order.status;
        if !old_status.can_transition_to(OrderStatus::Processing) {
            return Err(ServiceError::InvalidOperation(format!(
                "cannot move a {} order to processing",
                old_status
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.payment_intent_id = Set(Some(payment_intent_id));
        active.status = Set(OrderStatus::Processing);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        info!(order_id = %order_id, %old_status, "order moved to processing");
        self.notify(Event::OrderStatusChanged {
            order_id,
            old_status,
            new_status: OrderStatus::Processing,
        })
        .await;

        Ok(updated.into())
    }

    /// Fetches a single order with its line items (variant expanded) and
    /// shipping address. The actor must own the order or hold an elevated
    /// role.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        actor: &AuthUser,
    ) -> Result<OrderDetails, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No order with id {}", order_id)))?;

        check_permissions(actor, order.user_id)?;

        let items = order.find_related(OrderItem).all(&*self.db).await?;

        let variant_ids: Vec<Uuid> = items.iter().map(|item| item.variant_id).collect();
        let variants: HashMap<Uuid, String> = ProductVariant::find()
            .filter(product_variant::Column::Id.is_in(variant_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|variant| (variant.id, variant.name))
            .collect();

        let shipping_address = Address::find_by_id(order.shipping_address_id)
            .one(&*self.db)
            .await?
            .map(AddressSummary::from);

        let item_details = items
            .into_iter()
            .map(|item| OrderItemDetail {
                variant_name: variants.get(&item.variant_id).cloned(),
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        Ok(OrderDetails {
            order: order.into(),
            user: None,
            items: item_details,
            shipping_address,
        })
    }

    async fn notify(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send order event");
            }
        }
    }
}

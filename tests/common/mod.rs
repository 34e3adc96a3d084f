#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use orderdesk_api::{
    auth::AuthUser,
    entities::{
        address, cart, cart_item, order, order_item, product, product_variant, user, OrderStatus,
        PaymentMethod, UserRole,
    },
    events,
    migrator::Migrator,
    payments::PaymentMethodMap,
    services::{order_queries::OrderQueryService, orders::OrderService},
};

/// Gateway integration ids wired into the test payment-method map.
pub const CARD_INTEGRATION_ID: i64 = 4_570_630;
pub const WALLET_INTEGRATION_ID: i64 = 4_570_631;

/// Test harness backed by a fresh in-memory SQLite database per test.
pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub orders: OrderService,
    pub queries: OrderQueryService,
}

impl TestContext {
    pub async fn new() -> Self {
        // A single connection keeps every query on the same in-memory db.
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let db = Database::connect(options)
            .await
            .expect("failed to open in-memory database");
        Migrator::up(&db, None)
            .await
            .expect("failed to run migrations");
        let db = Arc::new(db);

        let payment_methods = Arc::new(PaymentMethodMap::with_mappings([
            (CARD_INTEGRATION_ID, PaymentMethod::Card),
            (WALLET_INTEGRATION_ID, PaymentMethod::MobileWallet),
        ]));

        let (event_sender, event_rx) = events::channel(64);
        tokio::spawn(events::process_events(event_rx));

        let orders = OrderService::new(db.clone(), payment_methods, Some(Arc::new(event_sender)));
        let queries = OrderQueryService::new(db.clone());

        Self {
            db,
            orders,
            queries,
        }
    }

    pub fn actor(user_id: Uuid, role: UserRole) -> AuthUser {
        AuthUser {
            user_id,
            role,
            company_id: None,
        }
    }

    pub fn company_actor(user_id: Uuid, company_id: Uuid) -> AuthUser {
        AuthUser {
            user_id,
            role: UserRole::Vendor,
            company_id: Some(company_id),
        }
    }

    pub async fn seed_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        role: UserRole,
        company_id: Option<Uuid>,
    ) -> user::Model {
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            first_name: Set(first_name.to_string()),
            last_name: Set(last_name.to_string()),
            email: Set(email.to_string()),
            role: Set(role),
            company_id: Set(company_id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed user")
    }

    pub async fn seed_product(&self, company_id: Uuid, name: &str) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            name: Set(name.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed product")
    }

    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        name: &str,
        price: Decimal,
    ) -> product_variant::Model {
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            name: Set(name.to_string()),
            price: Set(price),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed product variant")
    }

    pub async fn seed_address(&self, user_id: Uuid) -> address::Model {
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            street: Set("14 Tahrir Square".to_string()),
            city: Set("Cairo".to_string()),
            phone: Set("+20100000000".to_string()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed address")
    }

    /// Seed a cart whose total is the sum of its line totals.
    pub async fn seed_cart(
        &self,
        user_id: Uuid,
        entries: &[(Uuid, Uuid, i32, Decimal)],
    ) -> cart::Model {
        let total_price: Decimal = entries
            .iter()
            .map(|(_, _, quantity, unit_price)| *unit_price * Decimal::from(*quantity))
            .sum();

        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            total_price: Set(total_price),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed cart");

        for (product_id, variant_id, quantity, unit_price) in entries {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(*product_id),
                variant_id: Set(*variant_id),
                quantity: Set(*quantity),
                unit_price: Set(*unit_price),
            }
            .insert(&*self.db)
            .await
            .expect("failed to seed cart item");
        }

        cart
    }

    /// Directly persist an order with one line item, bypassing the lifecycle
    /// engine. Used to arrange listing and transition scenarios.
    #[allow(clippy::too_many_arguments)]
    pub async fn seed_order(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        product_id: Uuid,
        variant_id: Uuid,
        total: Decimal,
        paid: bool,
        payment_method: PaymentMethod,
        status: OrderStatus,
        created_at: DateTime<Utc>,
    ) -> order::Model {
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            subtotal: Set(total),
            shipping_fee: Set(Decimal::ZERO),
            total: Set(total),
            shipping_address_id: Set(address_id),
            paid: Set(paid),
            payment_method: Set(payment_method),
            payment_intent_id: Set(None),
            client_secret: Set(None),
            status: Set(status),
            created_at: Set(created_at),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed order");

        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product_id),
            variant_id: Set(variant_id),
            quantity: Set(1),
            unit_price: Set(total),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed order item");

        order
    }

    pub async fn order_count(&self) -> u64 {
        use sea_orm::{EntityTrait, PaginatorTrait};
        order::Entity::find()
            .count(&*self.db)
            .await
            .expect("failed to count orders")
    }

    pub async fn cart_count(&self) -> u64 {
        use sea_orm::{EntityTrait, PaginatorTrait};
        cart::Entity::find()
            .count(&*self.db)
            .await
            .expect("failed to count carts")
    }
}

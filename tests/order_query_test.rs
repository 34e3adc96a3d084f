//! Tests for the order listing query builder: facet filters, pagination
//! envelopes, and the three audience variants.

mod common;

use std::collections::HashSet;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestContext;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use orderdesk_api::entities::{order_item, OrderStatus, PaymentMethod, UserRole};
use orderdesk_api::errors::ServiceError;
use orderdesk_api::services::order_queries::{
    AdminOrderFilter, CompanyOrdersFilter, MyOrdersFilter, PageRequest, SortKey,
};

fn page(page: u64, limit: u64) -> PageRequest {
    PageRequest {
        page,
        limit: Some(limit),
    }
}

fn default_page() -> PageRequest {
    PageRequest {
        page: 1,
        limit: None,
    }
}

// ==================== Company variant ====================

#[tokio::test]
async fn company_listing_paginates_with_correct_envelope() {
    let ctx = TestContext::new().await;
    let company_id = Uuid::new_v4();
    let other_company = Uuid::new_v4();

    let product = ctx.seed_product(company_id, "Desk Lamp").await;
    let variant = ctx.seed_variant(product.id, "Desk Lamp / Black", dec!(35.00)).await;
    let foreign_product = ctx.seed_product(other_company, "Mug").await;
    let foreign_variant = ctx.seed_variant(foreign_product.id, "Mug / Red", dec!(9.00)).await;

    let customer = ctx
        .seed_user("Rania", "Saad", "rania@example.com", UserRole::Customer, None)
        .await;
    let address = ctx.seed_address(customer.id).await;

    let mut company_order_ids = HashSet::new();
    for _ in 0..15 {
        let order = ctx
            .seed_order(
                customer.id,
                address.id,
                product.id,
                variant.id,
                dec!(35.00),
                true,
                PaymentMethod::Card,
                OrderStatus::Pending,
                Utc::now(),
            )
            .await;
        company_order_ids.insert(order.id);
    }
    // Orders for another company must not appear
    for _ in 0..3 {
        ctx.seed_order(
            customer.id,
            address.id,
            foreign_product.id,
            foreign_variant.id,
            dec!(9.00),
            false,
            PaymentMethod::CashOnDelivery,
            OrderStatus::Pending,
            Utc::now(),
        )
        .await;
    }

    // An order with two line items of the same company counts once
    let first_id = *company_order_ids.iter().next().unwrap();
    order_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(first_id),
        product_id: Set(product.id),
        variant_id: Set(variant.id),
        quantity: Set(3),
        unit_price: Set(dec!(35.00)),
    }
    .insert(&*ctx.db)
    .await
    .expect("failed to add second line item");

    let vendor = ctx
        .seed_user(
            "Vera",
            "Vendor",
            "vera@lampco.example.com",
            UserRole::Vendor,
            Some(company_id),
        )
        .await;
    let actor = TestContext::company_actor(vendor.id, company_id);

    let first_page = ctx
        .queries
        .list_company_orders(&actor, CompanyOrdersFilter::default(), page(1, 10))
        .await
        .expect("first page should load");
    assert_eq!(first_page.total_count, 15);
    assert_eq!(first_page.current_page, 1);
    assert_eq!(first_page.last_page, 2);
    assert_eq!(first_page.orders.len(), 10);

    let second_page = ctx
        .queries
        .list_company_orders(&actor, CompanyOrdersFilter::default(), page(2, 10))
        .await
        .expect("second page should load");
    // The envelope reflects the full population even past page one
    assert_eq!(second_page.total_count, 15);
    assert_eq!(second_page.current_page, 2);
    assert_eq!(second_page.last_page, 2);
    assert_eq!(second_page.orders.len(), 5);

    let returned: HashSet<Uuid> = first_page
        .orders
        .iter()
        .chain(second_page.orders.iter())
        .map(|details| details.order.id)
        .collect();
    assert_eq!(returned, company_order_ids);

    // Company expansion embeds the full owning-user record
    let embedded_user = first_page.orders[0]
        .user
        .as_ref()
        .expect("user should be embedded");
    assert_eq!(embedded_user.id, customer.id);
    assert!(embedded_user.role.is_some());
}

#[tokio::test]
async fn company_listing_requires_a_company() {
    let ctx = TestContext::new().await;
    let actor = TestContext::actor(Uuid::new_v4(), UserRole::Vendor);

    let err = ctx
        .queries
        .list_company_orders(&actor, CompanyOrdersFilter::default(), default_page())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

// ==================== Current-user variant ====================

#[tokio::test]
async fn current_user_listing_is_scoped_to_the_actor() {
    let ctx = TestContext::new().await;
    let alice = ctx
        .seed_user("Alice", "Adams", "alice@example.com", UserRole::Customer, None)
        .await;
    let bob = ctx
        .seed_user("Bob", "Brown", "bob@example.com", UserRole::Customer, None)
        .await;
    let alice_address = ctx.seed_address(alice.id).await;
    let bob_address = ctx.seed_address(bob.id).await;

    for _ in 0..2 {
        ctx.seed_order(
            alice.id,
            alice_address.id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(10.00),
            false,
            PaymentMethod::CashOnDelivery,
            OrderStatus::Pending,
            Utc::now(),
        )
        .await;
    }
    ctx.seed_order(
        bob.id,
        bob_address.id,
        Uuid::new_v4(),
        Uuid::new_v4(),
        dec!(20.00),
        false,
        PaymentMethod::CashOnDelivery,
        OrderStatus::Pending,
        Utc::now(),
    )
    .await;

    let actor = TestContext::actor(alice.id, UserRole::Customer);
    let result = ctx
        .queries
        .list_user_orders(&actor, MyOrdersFilter::default(), default_page())
        .await
        .expect("listing should succeed");

    assert_eq!(result.total_count, 2);
    assert!(result
        .orders
        .iter()
        .all(|details| details.order.user_id == alice.id));
    // Current-user expansion embeds items and the shipping address
    assert!(result.orders.iter().all(|details| !details.items.is_empty()));
    assert!(result
        .orders
        .iter()
        .all(|details| details.shipping_address.is_some()));
}

#[tokio::test]
async fn current_user_facets_combine_with_and_semantics() {
    let ctx = TestContext::new().await;
    let user = ctx
        .seed_user("Mona", "Zaki", "mona@example.com", UserRole::Customer, None)
        .await;
    let address = ctx.seed_address(user.id).await;

    let matching = ctx
        .seed_order(
            user.id,
            address.id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(50.00),
            true,
            PaymentMethod::Card,
            OrderStatus::Processing,
            Utc::now(),
        )
        .await;
    // processing but unpaid
    ctx.seed_order(
        user.id,
        address.id,
        Uuid::new_v4(),
        Uuid::new_v4(),
        dec!(50.00),
        false,
        PaymentMethod::CashOnDelivery,
        OrderStatus::Processing,
        Utc::now(),
    )
    .await;
    // paid but still pending
    ctx.seed_order(
        user.id,
        address.id,
        Uuid::new_v4(),
        Uuid::new_v4(),
        dec!(50.00),
        true,
        PaymentMethod::Card,
        OrderStatus::Pending,
        Utc::now(),
    )
    .await;

    let actor = TestContext::actor(user.id, UserRole::Customer);
    let filter = MyOrdersFilter {
        status: Some(OrderStatus::Processing),
        paid: Some(true),
        ..Default::default()
    };
    let result = ctx
        .queries
        .list_user_orders(&actor, filter, default_page())
        .await
        .expect("listing should succeed");

    assert_eq!(result.total_count, 1);
    assert_eq!(result.orders[0].order.id, matching.id);
    assert_eq!(result.orders[0].order.status, OrderStatus::Processing);
    assert!(result.orders[0].order.paid);
}

#[tokio::test]
async fn cross_user_lookup_requires_an_elevated_role() {
    let ctx = TestContext::new().await;
    let alice = ctx
        .seed_user("Alice", "Adams", "alice2@example.com", UserRole::Customer, None)
        .await;
    let address = ctx.seed_address(alice.id).await;
    ctx.seed_order(
        alice.id,
        address.id,
        Uuid::new_v4(),
        Uuid::new_v4(),
        dec!(15.00),
        false,
        PaymentMethod::CashOnDelivery,
        OrderStatus::Pending,
        Utc::now(),
    )
    .await;

    let stranger = TestContext::actor(Uuid::new_v4(), UserRole::Customer);
    let filter = MyOrdersFilter {
        user: Some(alice.id),
        ..Default::default()
    };
    let err = ctx
        .queries
        .list_user_orders(&stranger, filter.clone(), default_page())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    // An admin may look across users
    let admin = TestContext::actor(Uuid::new_v4(), UserRole::Admin);
    let result = ctx
        .queries
        .list_user_orders(&admin, filter, default_page())
        .await
        .expect("admin lookup should succeed");
    assert_eq!(result.total_count, 1);
    assert_eq!(result.orders[0].order.user_id, alice.id);
}

// ==================== Admin variant ====================

#[tokio::test]
async fn admin_name_facet_matches_case_insensitively() {
    let ctx = TestContext::new().await;
    let alice = ctx
        .seed_user("Alice", "Adams", "alice@shop.example.com", UserRole::Customer, None)
        .await;
    let bob = ctx
        .seed_user("Bob", "Brown", "bob@mail.example.com", UserRole::Customer, None)
        .await;
    let alice_address = ctx.seed_address(alice.id).await;
    let bob_address = ctx.seed_address(bob.id).await;

    ctx.seed_order(
        alice.id,
        alice_address.id,
        Uuid::new_v4(),
        Uuid::new_v4(),
        dec!(10.00),
        true,
        PaymentMethod::Card,
        OrderStatus::Pending,
        Utc::now(),
    )
    .await;
    ctx.seed_order(
        bob.id,
        bob_address.id,
        Uuid::new_v4(),
        Uuid::new_v4(),
        dec!(12.00),
        true,
        PaymentMethod::Card,
        OrderStatus::Pending,
        Utc::now(),
    )
    .await;

    let filter = AdminOrderFilter {
        name: Some("ALI".to_string()),
        ..Default::default()
    };
    let result = ctx
        .queries
        .list_all_orders(filter, default_page())
        .await
        .expect("admin listing should succeed");

    assert_eq!(result.total_count, 1);
    assert_eq!(result.orders[0].order.user_id, alice.id);
    // Admin expansion embeds the name/email summary only
    let summary = result.orders[0].user.as_ref().expect("user summary");
    assert_eq!(summary.email, "alice@shop.example.com");
    assert!(summary.role.is_none());

    // The email field is searched too
    let by_email = ctx
        .queries
        .list_all_orders(
            AdminOrderFilter {
                name: Some("mail.example".to_string()),
                ..Default::default()
            },
            default_page(),
        )
        .await
        .expect("admin listing should succeed");
    assert_eq!(by_email.total_count, 1);
    assert_eq!(by_email.orders[0].order.user_id, bob.id);
}

#[tokio::test]
async fn admin_status_set_period_and_method_facets() {
    let ctx = TestContext::new().await;
    let user = ctx
        .seed_user("Nadia", "Ezz", "nadia@example.com", UserRole::Customer, None)
        .await;
    let address = ctx.seed_address(user.id).await;
    let now = Utc::now();

    let old_pending = ctx
        .seed_order(
            user.id,
            address.id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(10.00),
            false,
            PaymentMethod::CashOnDelivery,
            OrderStatus::Pending,
            now - Duration::days(30),
        )
        .await;
    let recent_shipped = ctx
        .seed_order(
            user.id,
            address.id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(20.00),
            true,
            PaymentMethod::Card,
            OrderStatus::Shipped,
            now - Duration::hours(1),
        )
        .await;
    // delivered, excluded by the status set below
    ctx.seed_order(
        user.id,
        address.id,
        Uuid::new_v4(),
        Uuid::new_v4(),
        dec!(30.00),
        true,
        PaymentMethod::MobileWallet,
        OrderStatus::Delivered,
        now - Duration::hours(2),
    )
    .await;

    let filter = AdminOrderFilter {
        statuses: vec![OrderStatus::Pending, OrderStatus::Shipped],
        ..Default::default()
    };
    let by_status = ctx
        .queries
        .list_all_orders(filter, default_page())
        .await
        .expect("status facet should work");
    let ids: HashSet<Uuid> = by_status.orders.iter().map(|o| o.order.id).collect();
    assert_eq!(ids, HashSet::from([old_pending.id, recent_shipped.id]));

    let by_period = ctx
        .queries
        .list_all_orders(
            AdminOrderFilter {
                period: Some(now - Duration::days(1)),
                ..Default::default()
            },
            default_page(),
        )
        .await
        .expect("period facet should work");
    assert_eq!(by_period.total_count, 2);
    assert!(by_period
        .orders
        .iter()
        .all(|o| o.order.created_at >= now - Duration::days(1)));

    let by_method = ctx
        .queries
        .list_all_orders(
            AdminOrderFilter {
                payment_method: Some(PaymentMethod::Card),
                ..Default::default()
            },
            default_page(),
        )
        .await
        .expect("method facet should work");
    assert_eq!(by_method.total_count, 1);
    assert_eq!(by_method.orders[0].order.id, recent_shipped.id);
}

#[tokio::test]
async fn admin_sort_key_orders_results() {
    let ctx = TestContext::new().await;
    let user = ctx
        .seed_user("Farah", "Nour", "farah@example.com", UserRole::Customer, None)
        .await;
    let address = ctx.seed_address(user.id).await;
    let now = Utc::now();

    for (total, offset_mins) in [(dec!(30.00), 3), (dec!(10.00), 2), (dec!(20.00), 1)] {
        ctx.seed_order(
            user.id,
            address.id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            total,
            true,
            PaymentMethod::Card,
            OrderStatus::Pending,
            now - Duration::minutes(offset_mins),
        )
        .await;
    }

    let ascending = ctx
        .queries
        .list_all_orders(
            AdminOrderFilter {
                sort: Some("total".parse::<SortKey>().unwrap()),
                ..Default::default()
            },
            default_page(),
        )
        .await
        .expect("sorted listing should succeed");
    let totals: Vec<_> = ascending.orders.iter().map(|o| o.order.total).collect();
    assert_eq!(totals, vec![dec!(10.00), dec!(20.00), dec!(30.00)]);

    // Default ordering is newest first
    let newest_first = ctx
        .queries
        .list_all_orders(AdminOrderFilter::default(), default_page())
        .await
        .expect("default listing should succeed");
    let created: Vec<_> = newest_first
        .orders
        .iter()
        .map(|o| o.order.created_at)
        .collect();
    let mut sorted = created.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(created, sorted);
}

#[tokio::test]
async fn no_page_exceeds_the_requested_limit() {
    let ctx = TestContext::new().await;
    let user = ctx
        .seed_user("Hadi", "Omar", "hadi@example.com", UserRole::Customer, None)
        .await;
    let address = ctx.seed_address(user.id).await;

    for _ in 0..5 {
        ctx.seed_order(
            user.id,
            address.id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(5.00),
            false,
            PaymentMethod::CashOnDelivery,
            OrderStatus::Pending,
            Utc::now(),
        )
        .await;
    }

    let actor = TestContext::actor(user.id, UserRole::Customer);
    let mut seen = HashSet::new();
    for page_no in 1..=3 {
        let result = ctx
            .queries
            .list_user_orders(&actor, MyOrdersFilter::default(), page(page_no, 2))
            .await
            .expect("page should load");
        assert!(result.orders.len() <= 2);
        assert_eq!(result.total_count, 5);
        assert_eq!(result.last_page, 3);
        seen.extend(result.orders.iter().map(|o| o.order.id));
    }
    assert_eq!(seen.len(), 5);

    // Past the last page the window is simply empty
    let beyond = ctx
        .queries
        .list_user_orders(&actor, MyOrdersFilter::default(), page(4, 2))
        .await
        .expect("page should load");
    assert!(beyond.orders.is_empty());
    assert_eq!(beyond.total_count, 5);
}

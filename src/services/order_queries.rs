use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::{
        address, order, order_item, product, product_variant, user, Address, Order, OrderItem,
        OrderStatus, PaymentMethod, Product, ProductVariant, User,
    },
    errors::ServiceError,
    services::orders::{AddressSummary, OrderDetails, OrderItemDetail, UserSummary},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, Func},
    ColumnTrait, Condition, EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait, Select,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Default page size for the admin listing.
pub const ADMIN_PAGE_SIZE: u64 = 10;
/// Default page size for the current-user and company listings.
pub const USER_PAGE_SIZE: u64 = 12;
const MAX_PAGE_SIZE: u64 = 100;

/// Requested pagination window. `limit` falls back to the audience default.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRequest {
    pub page: u64,
    pub limit: Option<u64>,
}

impl PageRequest {
    fn normalize(self, default_limit: u64) -> (u64, u64) {
        let page = self.page.max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

/// Caller-supplied sort key for the admin listing, e.g. `total` or
/// `-created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    Total,
    Status,
}

impl Default for SortKey {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl FromStr for SortKey {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (descending, key) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let field = SortField::from_str(key)
            .map_err(|_| ServiceError::ValidationError(format!("unknown sort key: {}", raw)))?;
        Ok(Self { field, descending })
    }
}

/// Filter facets for the global admin listing.
#[derive(Debug, Clone, Default)]
pub struct AdminOrderFilter {
    /// Substring match against owning user's name or email
    pub name: Option<String>,
    /// Any of the given statuses
    pub statuses: Vec<OrderStatus>,
    /// Orders containing a product of this company
    pub company_id: Option<Uuid>,
    pub paid: Option<bool>,
    pub payment_method: Option<PaymentMethod>,
    /// Orders created at or after this timestamp
    pub period: Option<DateTime<Utc>>,
    pub sort: Option<SortKey>,
}

/// Filter facets for the current-user listing.
#[derive(Debug, Clone, Default)]
pub struct MyOrdersFilter {
    pub status: Option<OrderStatus>,
    pub paid: Option<bool>,
    pub payment_method: Option<PaymentMethod>,
    pub period: Option<DateTime<Utc>>,
    /// Cross-user override; requires an elevated role when it differs from
    /// the requesting identity
    pub user: Option<Uuid>,
}

/// Filter facets for the company-scoped listing.
#[derive(Debug, Clone, Default)]
pub struct CompanyOrdersFilter {
    pub name: Option<String>,
    pub status: Option<OrderStatus>,
    pub paid: Option<bool>,
    pub payment_method: Option<PaymentMethod>,
    pub period: Option<DateTime<Utc>>,
}

/// Page envelope returned by every listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderPage {
    pub total_count: u64,
    pub current_page: u64,
    pub last_page: u64,
    pub orders: Vec<OrderDetails>,
}

fn last_page(total_count: u64, limit: u64) -> u64 {
    if total_count == 0 {
        0
    } else {
        (total_count + limit - 1) / limit
    }
}

/// Composes filter predicates and pagination windows over the order store
/// for the three listing audiences.
#[derive(Clone)]
pub struct OrderQueryService {
    db: Arc<DbPool>,
}

impl OrderQueryService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Global admin listing: every facet available, caller-supplied sort,
    /// owning user's name/email embedded.
    #[instrument(skip(self, filter))]
    pub async fn list_all_orders(
        &self,
        filter: AdminOrderFilter,
        page: PageRequest,
    ) -> Result<OrderPage, ServiceError> {
        let (page_no, limit) = page.normalize(ADMIN_PAGE_SIZE);

        let mut query = Order::find();

        if let Some(name) = &filter.name {
            let user_ids = self.user_ids_matching(name).await?;
            query = query.filter(order::Column::UserId.is_in(user_ids));
        }
        if !filter.statuses.is_empty() {
            query = query.filter(order::Column::Status.is_in(filter.statuses.clone()));
        }
        if let Some(company_id) = filter.company_id {
            let product_ids = self.company_product_ids(company_id).await?;
            query = constrain_to_products(query, product_ids);
        }
        query = apply_common_facets(query, filter.paid, filter.payment_method, filter.period);

        let sort = filter.sort.unwrap_or_default();
        query = match (sort.field, sort.descending) {
            (SortField::CreatedAt, true) => query.order_by_desc(order::Column::CreatedAt),
            (SortField::CreatedAt, false) => query.order_by_asc(order::Column::CreatedAt),
            (SortField::Total, true) => query.order_by_desc(order::Column::Total),
            (SortField::Total, false) => query.order_by_asc(order::Column::Total),
            (SortField::Status, true) => query.order_by_desc(order::Column::Status),
            (SortField::Status, false) => query.order_by_asc(order::Column::Status),
        };

        let (orders, total_count) = self.fetch_page(query, page_no, limit).await?;

        let users = self.user_summaries(&orders, false).await?;
        let orders = orders
            .into_iter()
            .map(|model| OrderDetails {
                user: users.get(&model.user_id).cloned(),
                items: Vec::new(),
                shipping_address: None,
                order: model.into(),
            })
            .collect();

        Ok(OrderPage {
            total_count,
            current_page: page_no,
            last_page: last_page(total_count, limit),
            orders,
        })
    }

    /// Orders belonging to the requesting identity (or, for elevated actors,
    /// an explicitly named user). Embeds line items and shipping addresses.
    #[instrument(skip(self, actor, filter), fields(user_id = %actor.user_id))]
    pub async fn list_user_orders(
        &self,
        actor: &AuthUser,
        filter: MyOrdersFilter,
        page: PageRequest,
    ) -> Result<OrderPage, ServiceError> {
        let (page_no, limit) = page.normalize(USER_PAGE_SIZE);

        let mut target_user = actor.user_id;
        if let Some(requested) = filter.user {
            if requested != actor.user_id && !actor.role.is_elevated() {
                return Err(ServiceError::Forbidden(
                    "cross-user order lookup requires an elevated role".to_string(),
                ));
            }
            target_user = requested;
        }

        let mut query = Order::find().filter(order::Column::UserId.eq(target_user));
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        query = apply_common_facets(query, filter.paid, filter.payment_method, filter.period);

        let (orders, total_count) = self.fetch_page(query, page_no, limit).await?;

        let mut items = self.item_expansions(&orders).await?;
        let addresses = self.address_expansions(&orders).await?;
        let orders = orders
            .into_iter()
            .map(|model| OrderDetails {
                user: None,
                items: items.remove(&model.id).unwrap_or_default(),
                shipping_address: addresses.get(&model.shipping_address_id).cloned(),
                order: model.into(),
            })
            .collect();

        Ok(OrderPage {
            total_count,
            current_page: page_no,
            last_page: last_page(total_count, limit),
            orders,
        })
    }

    /// Orders containing at least one product belonging to the actor's
    /// company. Embeds the full owning-user record.
    #[instrument(skip(self, actor, filter), fields(user_id = %actor.user_id))]
    pub async fn list_company_orders(
        &self,
        actor: &AuthUser,
        filter: CompanyOrdersFilter,
        page: PageRequest,
    ) -> Result<OrderPage, ServiceError> {
        let (page_no, limit) = page.normalize(USER_PAGE_SIZE);

        let company_id = actor.company_id.ok_or_else(|| {
            ServiceError::InvalidOperation(
                "requesting account is not attached to a company".to_string(),
            )
        })?;

        let product_ids = self.company_product_ids(company_id).await?;
        let mut query = constrain_to_products(Order::find(), product_ids);

        if let Some(name) = &filter.name {
            let user_ids = self.user_ids_matching(name).await?;
            query = query.filter(order::Column::UserId.is_in(user_ids));
        }
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        query = apply_common_facets(query, filter.paid, filter.payment_method, filter.period);

        let (orders, total_count) = self.fetch_page(query, page_no, limit).await?;

        let users = self.user_summaries(&orders, true).await?;
        let orders = orders
            .into_iter()
            .map(|model| OrderDetails {
                user: users.get(&model.user_id).cloned(),
                items: Vec::new(),
                shipping_address: None,
                order: model.into(),
            })
            .collect();

        Ok(OrderPage {
            total_count,
            current_page: page_no,
            last_page: last_page(total_count, limit),
            orders,
        })
    }

    /// Count the full matching population, then fetch the requested window.
    async fn fetch_page(
        &self,
        query: Select<Order>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let total_count = query.clone().count(&*self.db).await?;
        let orders = query
            .offset((page - 1) * limit)
            .limit(limit)
            .all(&*self.db)
            .await?;
        Ok((orders, total_count))
    }

    /// Resolve the `name` facet to a user-id set: case-insensitive substring
    /// match on first name, last name, or email.
    async fn user_ids_matching(&self, name: &str) -> Result<Vec<Uuid>, ServiceError> {
        let pattern = format!("%{}%", name.to_lowercase());
        let users = User::find()
            .filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(user::Column::FirstName)))
                            .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(user::Column::LastName)))
                            .like(pattern.clone()),
                    )
                    .add(Expr::expr(Func::lower(Expr::col(user::Column::Email))).like(pattern)),
            )
            .all(&*self.db)
            .await?;
        Ok(users.into_iter().map(|u| u.id).collect())
    }

    async fn company_product_ids(&self, company_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        let products = Product::find()
            .filter(product::Column::CompanyId.eq(company_id))
            .all(&*self.db)
            .await?;
        Ok(products.into_iter().map(|p| p.id).collect())
    }

    async fn user_summaries(
        &self,
        orders: &[order::Model],
        full_record: bool,
    ) -> Result<HashMap<Uuid, UserSummary>, ServiceError> {
        let user_ids: HashSet<Uuid> = orders.iter().map(|o| o.user_id).collect();
        let users = User::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(&*self.db)
            .await?;
        Ok(users
            .into_iter()
            .map(|u| {
                (
                    u.id,
                    UserSummary {
                        id: u.id,
                        first_name: u.first_name,
                        last_name: u.last_name,
                        email: u.email,
                        role: full_record.then_some(u.role),
                        company_id: if full_record { u.company_id } else { None },
                    },
                )
            })
            .collect())
    }

    async fn item_expansions(
        &self,
        orders: &[order::Model],
    ) -> Result<HashMap<Uuid, Vec<OrderItemDetail>>, ServiceError> {
        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(&*self.db)
            .await?;

        let variant_ids: HashSet<Uuid> = items.iter().map(|i| i.variant_id).collect();
        let variants: HashMap<Uuid, String> = ProductVariant::find()
            .filter(product_variant::Column::Id.is_in(variant_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|v| (v.id, v.name))
            .collect();

        let mut grouped: HashMap<Uuid, Vec<OrderItemDetail>> = HashMap::new();
        for item in items {
            grouped
                .entry(item.order_id)
                .or_default()
                .push(OrderItemDetail {
                    variant_name: variants.get(&item.variant_id).cloned(),
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                });
        }
        Ok(grouped)
    }

    async fn address_expansions(
        &self,
        orders: &[order::Model],
    ) -> Result<HashMap<Uuid, AddressSummary>, ServiceError> {
        let address_ids: HashSet<Uuid> = orders.iter().map(|o| o.shipping_address_id).collect();
        let addresses = Address::find()
            .filter(address::Column::Id.is_in(address_ids))
            .all(&*self.db)
            .await?;
        Ok(addresses
            .into_iter()
            .map(|a| (a.id, AddressSummary::from(a)))
            .collect())
    }
}

fn apply_common_facets(
    mut query: Select<Order>,
    paid: Option<bool>,
    payment_method: Option<PaymentMethod>,
    period: Option<DateTime<Utc>>,
) -> Select<Order> {
    if let Some(paid) = paid {
        query = query.filter(order::Column::Paid.eq(paid));
    }
    if let Some(method) = payment_method {
        query = query.filter(order::Column::PaymentMethod.eq(method));
    }
    if let Some(period) = period {
        query = query.filter(order::Column::CreatedAt.gte(period));
    }
    query
}

/// Constrain to orders containing at least one item referencing one of the
/// given products.
fn constrain_to_products(query: Select<Order>, product_ids: Vec<Uuid>) -> Select<Order> {
    query
        .join(JoinType::InnerJoin, order::Relation::Items.def())
        .filter(order_item::Column::ProductId.is_in(product_ids))
        .distinct()
}

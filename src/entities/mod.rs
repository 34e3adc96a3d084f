//! Database entities for the order subsystem.
//!
//! `orders`/`order_items` are owned by this service. The remaining tables
//! (users, carts, products, addresses) belong to sibling services and are
//! only read here, except for carts which are consumed on cash-on-delivery
//! checkout.

pub mod address;
pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_variant;
pub mod user;

pub use address::{Entity as Address, Model as AddressModel};
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus, PaymentMethod};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use user::{Entity as User, Model as UserModel, UserRole};

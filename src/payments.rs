//! Gateway integration-id to canonical payment-method mapping.
//!
//! The gateway reports which integration settled a payment intent as an
//! opaque numeric id. The mapping from those ids to canonical method names is
//! deployment configuration, built once at startup and injected into the
//! order service.

use std::collections::HashMap;

use crate::config::AppConfig;
use crate::entities::PaymentMethod;

/// Immutable integration-id lookup table.
#[derive(Debug, Clone, Default)]
pub struct PaymentMethodMap {
    map: HashMap<i64, PaymentMethod>,
}

impl PaymentMethodMap {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut map = HashMap::new();
        for id in &cfg.card_integration_ids {
            map.insert(*id, PaymentMethod::Card);
        }
        for id in &cfg.wallet_integration_ids {
            map.insert(*id, PaymentMethod::MobileWallet);
        }
        Self { map }
    }

    pub fn with_mappings<I>(mappings: I) -> Self
    where
        I: IntoIterator<Item = (i64, PaymentMethod)>,
    {
        Self {
            map: mappings.into_iter().collect(),
        }
    }

    /// Resolve the canonical method for a confirmation.
    ///
    /// Only the first reported integration id is considered; an unknown or
    /// missing id falls back to cash on delivery.
    pub fn resolve(&self, integration_ids: &[i64]) -> PaymentMethod {
        integration_ids
            .first()
            .and_then(|id| self.map.get(id).copied())
            .unwrap_or(PaymentMethod::CashOnDelivery)
    }
}

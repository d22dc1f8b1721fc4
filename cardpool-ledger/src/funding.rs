//! Funding route storage: upsert semantics on the unique
//! `(provider, account, reference)` key and the two-step resolution the
//! funding router relies on.

use cardpool_common::model::BaasFundingRoute;
use cardpool_common::{CardpoolError, Result};

use crate::manager::Ledger;

impl Ledger {
    /// Inserts or replaces the route for its `(provider, account, reference)`
    /// key after validating that the target actually exists.
    pub async fn upsert_funding_route(&self, route: BaasFundingRoute) -> Result<BaasFundingRoute> {
        let mut state = self.state.write().await;
        state.wallet(&route.wallet_id)?;
        let card = state.card(&route.card_id)?;
        if card.wallet_id != route.wallet_id {
            return Err(CardpoolError::Validation(format!(
                "card {} does not belong to wallet {}",
                route.card_id, route.wallet_id
            )));
        }
        if !state.is_member(&route.wallet_id, &route.user_id) {
            return Err(CardpoolError::Forbidden(format!(
                "user {} is not a member of wallet {}",
                route.user_id, route.wallet_id
            )));
        }

        let key = (
            route.provider_name.clone(),
            route.provider_account_id.clone(),
            route.reference.clone(),
        );
        state.routes.insert(key, route.clone());
        Ok(route)
    }

    /// Exact match first, then the wallet default route (empty reference).
    pub async fn resolve_funding_route(
        &self,
        provider_name: &str,
        provider_account_id: &str,
        reference: &str,
    ) -> Option<BaasFundingRoute> {
        let state = self.state.read().await;
        let exact = (
            provider_name.to_string(),
            provider_account_id.to_string(),
            reference.to_string(),
        );
        if let Some(route) = state.routes.get(&exact) {
            return Some(route.clone());
        }
        if !reference.is_empty() {
            let fallback = (
                provider_name.to_string(),
                provider_account_id.to_string(),
                String::new(),
            );
            return state.routes.get(&fallback).cloned();
        }
        None
    }

    pub async fn list_funding_routes(&self, wallet_id: &str) -> Vec<BaasFundingRoute> {
        self.state
            .read()
            .await
            .routes
            .values()
            .filter(|r| r.wallet_id == wallet_id)
            .cloned()
            .collect()
    }
}

//! In-process gateway with the same guarantees as the libSQL store
//!
//! State lives in the gateway instance rather than in process-wide maps, so
//! each test or dry run owns its own isolated store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::OrderGateway;
use crate::error::{Error, Result};
use crate::models::{
    ConflictResolution, NewConflictResolution, Order, OrderId, ResolutionStats, TimeWindow,
};

#[derive(Default)]
struct MemoryState {
    orders: HashMap<OrderId, Order>,
    by_client_id: HashMap<(String, String), OrderId>,
    resolutions: Vec<ConflictResolution>,
}

#[derive(Clone, Default)]
pub struct InMemoryOrderGateway {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryOrderGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Every audit entry, in append order
    pub async fn audit_log(&self) -> Vec<ConflictResolution> {
        self.state.lock().await.resolutions.clone()
    }
}

#[async_trait]
impl OrderGateway for InMemoryOrderGateway {
    async fn find_by_client_generated_id(
        &self,
        business_id: &str,
        client_generated_id: &str,
    ) -> Result<Option<Order>> {
        let state = self.state.lock().await;
        let key = (business_id.to_string(), client_generated_id.to_string());
        Ok(state
            .by_client_id
            .get(&key)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(id).cloned())
    }

    async fn insert(&self, order: &Order) -> Result<Order> {
        let mut state = self.state.lock().await;
        let key = (
            order.business_id.clone(),
            order.client_generated_id.clone(),
        );
        if state.by_client_id.contains_key(&key) {
            return Err(Error::DuplicateClientId(order.client_generated_id.clone()));
        }
        state.by_client_id.insert(key, order.id);
        state.orders.insert(order.id, order.clone());
        Ok(order.clone())
    }

    async fn upsert(
        &self,
        order: &Order,
        expected_last_modified_at: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.orders.get_mut(&order.id) else {
            return Err(Error::NotFound(order.id.to_string()));
        };
        if stored.last_modified_at() != expected_last_modified_at
            || order.last_modified_at() < stored.last_modified_at()
        {
            return Ok(None);
        }
        *stored = order.clone();
        Ok(Some(order.clone()))
    }

    async fn append_audit_entry(
        &self,
        entry: &NewConflictResolution,
    ) -> Result<ConflictResolution> {
        let mut state = self.state.lock().await;
        let id = i64::try_from(state.resolutions.len() + 1)
            .map_err(|_| Error::Database("audit log is full".to_string()))?;
        let resolution = ConflictResolution::new(id, entry.clone());
        state.resolutions.push(resolution.clone());
        Ok(resolution)
    }

    async fn list_resolutions(
        &self,
        order_id: &OrderId,
        limit: usize,
    ) -> Result<Vec<ConflictResolution>> {
        let state = self.state.lock().await;
        Ok(state
            .resolutions
            .iter()
            .rev()
            .filter(|resolution| resolution.entry.order_id == *order_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn resolution_stats(
        &self,
        business_id: &str,
        window: TimeWindow,
    ) -> Result<ResolutionStats> {
        let state = self.state.lock().await;
        let mut stats = ResolutionStats::empty(window);
        for resolution in state.resolutions.iter().filter(|resolution| {
            resolution.entry.business_id == business_id
                && window.contains(resolution.entry.resolved_at)
        }) {
            stats.record(resolution.entry.resolution_action, 1);
            if resolution.entry.conflict_fields.is_empty() {
                stats.without_field_changes += 1;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{at, version};
    use crate::models::ResolutionAction;

    #[tokio::test]
    async fn enforces_unique_client_id_per_business() {
        let gateway = InMemoryOrderGateway::new();
        gateway
            .insert(&Order::new("bakery-1", "abc", version(120.0, 5)))
            .await
            .unwrap();
        let error = gateway
            .insert(&Order::new("bakery-1", "abc", version(120.0, 5)))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::DuplicateClientId(_)));
        gateway
            .insert(&Order::new("bakery-2", "abc", version(120.0, 5)))
            .await
            .unwrap();
        assert_eq!(gateway.order_count().await, 2);
    }

    #[tokio::test]
    async fn upsert_is_compare_and_swap() {
        let gateway = InMemoryOrderGateway::new();
        let order = Order::new("bakery-1", "abc", version(120.0, 5));
        gateway.insert(&order).await.unwrap();

        let newer = order.with_version(version(150.0, 10));
        assert!(gateway.upsert(&newer, at(1)).await.unwrap().is_none());
        assert!(gateway.upsert(&newer, at(5)).await.unwrap().is_some());

        let older = order.with_version(version(90.0, 7));
        assert!(gateway.upsert(&older, at(10)).await.unwrap().is_none());

        let stored = gateway.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.last_modified_at(), at(10));
    }

    #[tokio::test]
    async fn lists_most_recent_resolutions_first() {
        let gateway = InMemoryOrderGateway::new();
        let order = Order::new("bakery-1", "abc", version(120.0, 5));
        let other = Order::new("bakery-1", "def", version(80.0, 5));
        gateway.insert(&order).await.unwrap();
        gateway.insert(&other).await.unwrap();

        for (target, message) in [
            (&order, "first"),
            (&order, "second"),
            (&other, "other"),
            (&order, "third"),
        ] {
            gateway
                .append_audit_entry(&NewConflictResolution {
                    order_id: target.id,
                    business_id: target.business_id.clone(),
                    client_generated_id: target.client_generated_id.clone(),
                    resolution_action: ResolutionAction::ServerWins,
                    resolution_message: message.to_string(),
                    resolved_by: "tester".to_string(),
                    resolved_at: at(20),
                    local_timestamp: at(5),
                    server_timestamp: at(5),
                    conflict_fields: std::collections::BTreeSet::new(),
                })
                .await
                .unwrap();
        }

        let latest = gateway.list_resolutions(&order.id, 2).await.unwrap();
        let messages: Vec<_> = latest
            .iter()
            .map(|resolution| resolution.entry.resolution_message.as_str())
            .collect();
        assert_eq!(messages, vec!["third", "second"]);
    }
}

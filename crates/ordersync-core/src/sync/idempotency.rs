//! Maps a submission to at most one order of record

use std::sync::Arc;

use crate::db::OrderGateway;
use crate::error::{Error, Result};
use crate::models::{Order, ValidatedSubmission};

/// Result of the idempotency lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Idempotent {
    /// First sighting of the client-generated id; the submission was stored as-is
    Created(Order),
    /// An order of record already exists and must be reconciled
    Existing(Order),
}

pub struct IdempotencyResolver<G> {
    gateway: Arc<G>,
}

impl<G> Clone for IdempotencyResolver<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<G: OrderGateway> IdempotencyResolver<G> {
    pub const fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// The existing order for a client-generated id, if any
    pub async fn find_existing(
        &self,
        business_id: &str,
        client_generated_id: &str,
    ) -> Result<Option<Order>> {
        self.gateway
            .find_by_client_generated_id(business_id, client_generated_id)
            .await
    }

    /// Look up the order of record, creating it from the submission when new
    ///
    /// Losing an insert race to a concurrent submission of the same id is not
    /// an error: the winner's row is read back and returned as `Existing`.
    pub async fn resolve(
        &self,
        business_id: &str,
        submission: &ValidatedSubmission,
    ) -> Result<Idempotent> {
        let client_id = submission.client_generated_id.as_str();
        if let Some(existing) = self.find_existing(business_id, client_id).await? {
            return Ok(Idempotent::Existing(existing));
        }

        let order = Order::new(business_id, client_id, submission.version.clone());
        match self.gateway.insert(&order).await {
            Ok(created) => Ok(Idempotent::Created(created)),
            Err(Error::DuplicateClientId(_)) => {
                tracing::debug!(
                    business = business_id,
                    client_id,
                    "Lost insert race; reconciling against existing order"
                );
                self.find_existing(business_id, client_id)
                    .await?
                    .map(Idempotent::Existing)
                    .ok_or_else(|| Error::ConcurrentModification(client_id.to_string()))
            }
            Err(error) => Err(error),
        }
    }
}

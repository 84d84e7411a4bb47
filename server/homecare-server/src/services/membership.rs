// Case membership for the subscription authority, read from the store
use async_trait::async_trait;
use database_layer::CareStore;
use events_bus::{BusError, CaseMembership, MembershipLookup};
use std::sync::Arc;
use uuid::Uuid;

/// Live case membership, read from the store on every lookup
pub struct StoreMembership {
    store: Arc<dyn CareStore>,
}

impl StoreMembership {
    pub fn new(store: Arc<dyn CareStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MembershipLookup for StoreMembership {
    async fn membership(&self, case_id: Uuid) -> events_bus::Result<Option<CaseMembership>> {
        self.store
            .get_case(case_id)
            .await
            .map(|case| case.map(|case| case.membership()))
            .map_err(|e| BusError::MembershipLookup(e.to_string()))
    }
}

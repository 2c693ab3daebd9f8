use std::sync::Arc;

use crate::db::EntityStore;
use crate::services::{EnrollmentLedger, QueryFacade};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub fn ledger(&self) -> EnrollmentLedger {
        EnrollmentLedger::new(self.store.clone())
    }

    pub fn queries(&self) -> QueryFacade {
        QueryFacade::new(self.store.clone())
    }
}

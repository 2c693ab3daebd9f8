pub mod ledger;
pub mod queries;
pub mod seed;

pub use ledger::EnrollmentLedger;
pub use queries::QueryFacade;
pub use seed::seed_demo_data;

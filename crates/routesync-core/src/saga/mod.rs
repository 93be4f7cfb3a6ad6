//! Mutation sagas
//!
//! Every mutating operation is a [`Plan`]: a table of tagged steps run by one
//! generic runner. The validate-and-reload step is the commit boundary.
//! Failures before it are compensated in reverse (created DNS records
//! deleted, updated ones reverted, the config backup restored). Failures
//! after it are reported as inconsistencies and left for the user to resync.

pub mod executor;
pub mod result;
pub mod runner;
pub mod step;

pub use executor::{
    Collaborators, DeleteRequest, DnsSettings, EntryRequest, Reconciliation, SagaExecutor,
    UpdateRequest,
};
pub use result::{PREFLIGHT_STEP, SagaOutcome, SagaResult};
pub use step::{Action, Plan, Step};

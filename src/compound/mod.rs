//! Multi-step, multi-entity mutations that commit or roll back as one unit.

pub mod cascade;
pub mod executor;
pub mod step;

pub use cascade::{
    delete_company_plan, delete_contact_plan, delete_deal_plan, delete_user_plan,
    reassign_contact_plan,
};
pub use executor::{CompoundFailure, CompoundOutcome, StepResult};
pub use step::{CompoundOperation, CompoundStep, StepKind};

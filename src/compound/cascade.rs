//! Prebuilt compound operations that remove or rewire a record together with
//! everything pointing at it.

use super::{CompoundFailure, CompoundOperation, CompoundOutcome};
use crate::core::{EntityType, Filter, Patch, RecordId, StoreError};
use crate::facade::RecordStore;
use crate::storage::StorageAdapter;

/// Unlink deals, delete activities, delete the contact.
pub fn delete_contact_plan(contact: RecordId) -> CompoundOperation {
    CompoundOperation::new("delete_contact")
        .update_many(
            "unlink deals",
            EntityType::Deal,
            Filter::eq("contactId", contact),
            Patch::new().clear("contactId"),
        )
        .delete_many(
            "delete activities",
            EntityType::Activity,
            Filter::eq("contactId", contact),
        )
        .delete_one("delete contact", EntityType::Contact, contact)
}

/// Unlink contacts and deals, delete the company.
pub fn delete_company_plan(company: RecordId) -> CompoundOperation {
    CompoundOperation::new("delete_company")
        .update_many(
            "unlink contacts",
            EntityType::Contact,
            Filter::eq("companyId", company),
            Patch::new().clear("companyId"),
        )
        .update_many(
            "unlink deals",
            EntityType::Deal,
            Filter::eq("companyId", company),
            Patch::new().clear("companyId"),
        )
        .delete_one("delete company", EntityType::Company, company)
}

/// Delete the deal's activities, then the deal.
pub fn delete_deal_plan(deal: RecordId) -> CompoundOperation {
    CompoundOperation::new("delete_deal")
        .delete_many(
            "delete activities",
            EntityType::Activity,
            Filter::eq("dealId", deal),
        )
        .delete_one("delete deal", EntityType::Deal, deal)
}

/// Clear ownership on contacts, deals and activities, then delete the user.
pub fn delete_user_plan(user: RecordId) -> CompoundOperation {
    let mut op = CompoundOperation::new("delete_user");
    for (label, entity) in [
        ("unassign contacts", EntityType::Contact),
        ("unassign deals", EntityType::Deal),
        ("unassign activities", EntityType::Activity),
    ] {
        op = op.update_many(
            label,
            entity,
            Filter::eq("ownerId", user),
            Patch::new().clear("ownerId"),
        );
    }
    op.delete_one("delete user", EntityType::User, user)
}

/// Move deals and activities from `from` to `to`, then delete `from`.
pub fn reassign_contact_plan(from: RecordId, to: RecordId) -> crate::core::Result<CompoundOperation> {
    if from == to {
        return Err(StoreError::InvalidInput(format!(
            "cannot reassign contact {} to itself",
            from
        )));
    }

    Ok(CompoundOperation::new("reassign_contact")
        .update_many(
            "move deals",
            EntityType::Deal,
            Filter::eq("contactId", from),
            Patch::new().set("contactId", to),
        )
        .update_many(
            "move activities",
            EntityType::Activity,
            Filter::eq("contactId", from),
            Patch::new().set("contactId", to),
        )
        .delete_one("delete source contact", EntityType::Contact, from))
}

impl<S: StorageAdapter> RecordStore<S> {
    pub async fn delete_contact(&self, contact: RecordId) -> Result<CompoundOutcome, CompoundFailure> {
        self.execute_compound(delete_contact_plan(contact)).await
    }

    pub async fn delete_company(&self, company: RecordId) -> Result<CompoundOutcome, CompoundFailure> {
        self.execute_compound(delete_company_plan(company)).await
    }

    pub async fn delete_deal(&self, deal: RecordId) -> Result<CompoundOutcome, CompoundFailure> {
        self.execute_compound(delete_deal_plan(deal)).await
    }

    pub async fn delete_user(&self, user: RecordId) -> Result<CompoundOutcome, CompoundFailure> {
        self.execute_compound(delete_user_plan(user)).await
    }

    /// Merges contact `from` into `to`.
    ///
    /// A missing target is `NOT_FOUND` up front; if it disappears while the
    /// operation runs, the reference check inside the transaction rolls the
    /// whole merge back.
    pub async fn reassign_contact(&self, from: RecordId, to: RecordId) -> Result<CompoundOutcome, CompoundFailure> {
        let operation = reassign_contact_plan(from, to)
            .map_err(|err| CompoundFailure::rejected("reassign_contact", err.into()))?;
        self.get_with_version(EntityType::Contact, to)
            .await
            .map_err(|err| CompoundFailure::rejected("reassign_contact", err))?;
        self.execute_compound(operation).await
    }
}

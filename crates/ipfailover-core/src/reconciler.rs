//! Provider-agnostic record reconciliation
//!
//! Converges one record at one provider to a desired value:
//!
//! 1. Look the record up by exact name and type
//! 2. Found: update it in place (routing attributes carried over)
//! 3. Missing: create it
//!
//! Same-value updates are not special-cased, so running a reconciliation
//! twice is harmless. No retries; every failure comes back wrapped in
//! [`Error::DnsProvider`] with the provider and record attached.

use tracing::{debug, info};

use crate::config::RecordType;
use crate::error::{Error, Result};
use crate::traits::{DesiredRecord, DnsProvider, ObservedRecord};

/// What a successful reconciliation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    Created(ObservedRecord),
    Updated(ObservedRecord),
}

impl ReconcileAction {
    pub fn record(&self) -> &ObservedRecord {
        match self {
            ReconcileAction::Created(r) | ReconcileAction::Updated(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, ReconcileAction::Created(_))
    }
}

/// What a successful removal did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveAction {
    Deleted,
    AlreadyAbsent,
}

fn validate(desired: &DesiredRecord) -> Result<()> {
    if desired.name.trim().is_empty() {
        return Err(Error::invalid_input("Record name cannot be empty"));
    }
    if desired.ttl == 0 {
        return Err(Error::invalid_input(format!("Record {} has ttl 0", desired.name)));
    }
    if !desired.record_type.accepts(&desired.value) {
        return Err(Error::invalid_input(format!(
            "Value '{}' is not valid for a {} record",
            desired.value, desired.record_type
        )));
    }
    Ok(())
}

/// Converge `desired` at `provider`
pub async fn reconcile(provider: &dyn DnsProvider, desired: &DesiredRecord) -> Result<ReconcileAction> {
    let wrap = |e: Error| Error::dns_provider(provider.name(), &desired.name, e);

    validate(desired).map_err(wrap)?;

    let existing = provider
        .get_record(&desired.name, desired.record_type)
        .await
        .map_err(wrap)?;

    match existing {
        Some(existing) => {
            debug!(
                provider = provider.name(),
                record = %desired.name,
                from = %existing.value,
                to = %desired.value,
                "Updating record"
            );
            let updated = provider
                .update_record(&existing, desired)
                .await
                .map_err(wrap)?;
            info!(
                provider = provider.name(),
                record = %desired.name,
                value = %updated.value,
                "Record updated"
            );
            Ok(ReconcileAction::Updated(updated))
        }
        None => {
            let created = provider.create_record(desired).await.map_err(wrap)?;
            info!(
                provider = provider.name(),
                record = %desired.name,
                value = %created.value,
                "Record created"
            );
            Ok(ReconcileAction::Created(created))
        }
    }
}

/// Delete the record with this name and type if it exists
pub async fn remove(provider: &dyn DnsProvider, name: &str, record_type: RecordType) -> Result<RemoveAction> {
    let wrap = |e: Error| Error::dns_provider(provider.name(), name, e);

    if name.trim().is_empty() {
        return Err(wrap(Error::invalid_input("Record name cannot be empty")));
    }

    match provider.get_record(name, record_type).await.map_err(wrap)? {
        Some(existing) => {
            provider.delete_record(&existing).await.map_err(wrap)?;
            info!(provider = provider.name(), record = %name, %record_type, "Record deleted");
            Ok(RemoveAction::Deleted)
        }
        None => {
            debug!(provider = provider.name(), record = %name, %record_type, "Record already absent");
            Ok(RemoveAction::AlreadyAbsent)
        }
    }
}

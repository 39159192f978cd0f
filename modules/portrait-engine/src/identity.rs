// Identity resolution across the auth and record namespaces.
//
// Callers hand us whichever identity they had on hand. We try it as an auth
// identity first, then as a record identity. Nothing resolving is not an
// error: the raw input is then used for every later step.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::PortraitError;
use crate::traits::{bounded, RecordStore};
use crate::types::PersonIdentity;

pub async fn resolve_identity(
    records: &dyn RecordStore,
    raw: &str,
    timeout: Duration,
) -> PersonIdentity {
    let raw = raw.trim();

    match bounded(timeout, "auth identity lookup", records.lookup_by_auth(raw)).await {
        Ok(Some(link)) => {
            debug!(raw, record_identity = %link.record_identity, "Resolved as auth identity");
            return PersonIdentity::from_link(raw, link);
        }
        Ok(None) => {}
        Err(e) => warn!(raw, error = %e, "Auth identity lookup failed"),
    }

    match bounded(timeout, "record identity lookup", records.lookup_by_record(raw)).await {
        Ok(Some(link)) => {
            debug!(raw, auth_identity = ?link.auth_identity, "Resolved as record identity");
            return PersonIdentity::from_link(raw, link);
        }
        Ok(None) => {}
        Err(e) => warn!(raw, error = %e, "Record identity lookup failed"),
    }

    let err = PortraitError::IdentityUnresolved(raw.to_string());
    debug!(error = %err, "Proceeding with raw input");
    PersonIdentity::unresolved(raw)
}

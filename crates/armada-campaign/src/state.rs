//! Campaign state is a plain struct owned by the caller, with one
//! `Option<DeployedContract>` field per instance. Missions address their
//! field through an [`InstanceSlot`].

use armada_core::{ArmadaError, DeployedContract, Result};

/// Accessor for the state field a mission fills in.
pub type InstanceSlot<S> = fn(&mut S) -> &mut Option<DeployedContract>;

/// Handle stored in `slot`, or a not-found error naming the instance.
///
/// Missing handles mean a mission reads an instance that no earlier mission
/// produced, which is a mission ordering bug.
pub fn require<'a>(
    slot: &'a Option<DeployedContract>,
    instance: &str,
) -> Result<&'a DeployedContract> {
    slot.as_ref().ok_or_else(|| {
        ArmadaError::not_found(format!(
            "{instance} is not in campaign state; it must be deployed by an earlier mission"
        ))
    })
}

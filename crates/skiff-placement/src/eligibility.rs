//! Machine eligibility for a service.
//!
//! A placement allow-list is resolved against the machines known to the
//! cluster. Entries may name a machine or give its ID. An entry that
//! matches nothing is an error rather than silently shrinking the set, so
//! a typo never moves a service somewhere unexpected.

use std::collections::BTreeSet;

use tracing::debug;

use skiff_core::{MachineId, MachineInfo, Placement};

use crate::error::{PlacementError, PlacementResult};

/// The set of machines a service may run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    machines: BTreeSet<MachineId>,
}

impl Eligibility {
    /// Resolve `placement` against `machines`.
    pub fn resolve<'a, I>(service: &str, placement: &Placement, machines: I) -> PlacementResult<Self>
    where
        I: IntoIterator<Item = &'a MachineInfo>,
    {
        let machines: Vec<&MachineInfo> = machines.into_iter().collect();

        let unknown: Vec<String> = placement
            .machines
            .iter()
            .filter(|entry| !machines.iter().any(|m| m.id == **entry || m.name == **entry))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(PlacementError::UnknownMachines {
                service: service.to_string(),
                machines: unknown,
            });
        }

        let eligible: BTreeSet<MachineId> = machines
            .iter()
            .filter(|m| placement.allows(m))
            .map(|m| m.id.clone())
            .collect();
        if eligible.is_empty() {
            return Err(PlacementError::NoEligibleMachines(service.to_string()));
        }

        debug!(
            service,
            eligible = eligible.len(),
            total = machines.len(),
            "resolved placement"
        );
        Ok(Self { machines: eligible })
    }

    pub fn contains(&self, machine_id: &str) -> bool {
        self.machines.contains(machine_id)
    }

}

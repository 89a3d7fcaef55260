//! Load-aware round-robin spreading of new replicas.
//!
//! Each new replica goes to the candidate machine currently running the
//! fewest containers of the service, ties broken by machine name and then
//! ID. Once loads even out this degenerates into a plain round robin over
//! the sorted machines.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use skiff_core::MachineId;

/// A machine that may receive new replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub machine_id: MachineId,
    pub name: String,
    /// Containers of the service already on this machine.
    pub load: usize,
}

impl Candidate {
    pub fn new(machine_id: impl Into<MachineId>, name: impl Into<String>, load: usize) -> Self {
        Self {
            machine_id: machine_id.into(),
            name: name.into(),
            load,
        }
    }
}

/// Assign `count` new replicas to `candidates`.
///
/// Returns one machine ID per replica, in assignment order. Returns an
/// empty list when there are no candidates.
pub fn spread(candidates: &[Candidate], count: usize) -> Vec<MachineId> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Reverse<(usize, &str, &str)>> = candidates
        .iter()
        .map(|c| Reverse((c.load, c.name.as_str(), c.machine_id.as_str())))
        .collect();

    let mut assigned = Vec::with_capacity(count);
    while assigned.len() < count {
        let Some(Reverse((load, name, id))) = heap.pop() else {
            break;
        };
        assigned.push(id.to_string());
        heap.push(Reverse((load + 1, name, id)));
    }
    assigned
}

use std::collections::BTreeSet;

use crate::snapshot::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub timestamp: Timestamp,
    pub previous: Option<Timestamp>,
    pub refresh: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputerPlan {
    pub transfers: Vec<PlannedTransfer>,
    pub stale: Vec<Timestamp>,
}

impl ComputerPlan {
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty() && self.stale.is_empty()
    }
}

/// Works out which snapshots of one computer still need to be copied, oldest first.
///
/// The newest destination snapshot that the source still has is always copied again:
/// rsync creates the snapshot directory before it finishes, so an interrupted run leaves
/// a listed but incomplete tree behind.
pub fn plan_computer(local: &[Timestamp], remote: &[Timestamp]) -> ComputerPlan {
    let local_set: BTreeSet<&Timestamp> = local.iter().collect();
    let refresh = remote.iter().filter(|t| local_set.contains(t)).max().cloned();

    let mut available: BTreeSet<Timestamp> = remote.iter().cloned().collect();
    if let Some(newest) = &refresh {
        available.remove(newest);
    }
    let mut pending: Vec<&Timestamp> = local.iter().collect();
    pending.sort();
    pending.dedup();

    let mut transfers = Vec::new();
    for timestamp in pending {
        if available.contains(timestamp) {
            continue;
        }
        let previous = available.range::<Timestamp, _>(..timestamp).next_back().cloned();
        transfers.push(PlannedTransfer {
            timestamp: timestamp.clone(),
            previous,
            refresh: refresh.as_ref() == Some(timestamp),
        });
        available.insert(timestamp.clone());
    }

    let mut stale: Vec<Timestamp> = remote
        .iter()
        .filter(|t| !local_set.contains(t))
        .cloned()
        .collect();
    stale.sort();
    stale.dedup();

    ComputerPlan { transfers, stale }
}

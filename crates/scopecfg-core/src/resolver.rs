//! Most-specific-wins selection among candidate variables.

use scopecfg_protocol::{Candidate, Variable};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Pick one winning variable per key.
///
/// The candidate with the highest specificity wins. Equal specificity is
/// settled by the smallest variable id, so the outcome never depends on the
/// order the store returned rows in.
pub fn resolve(candidates: impl IntoIterator<Item = Candidate>) -> BTreeMap<String, Variable> {
    let mut winners: BTreeMap<String, Candidate> = BTreeMap::new();
    for candidate in candidates {
        match winners.entry(candidate.variable.key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
            Entry::Occupied(mut slot) => {
                if outranks(&candidate, slot.get()) {
                    slot.insert(candidate);
                }
            }
        }
    }
    winners
        .into_iter()
        .map(|(key, candidate)| (key, candidate.variable))
        .collect()
}

fn outranks(challenger: &Candidate, current: &Candidate) -> bool {
    challenger
        .specificity
        .cmp(&current.specificity)
        .then_with(|| current.variable.id.cmp(&challenger.variable.id))
        .is_gt()
}

//! Converge a resolver's membership to a freshly observed endpoint set.

use std::collections::HashSet;

use affinitygate_model::Endpoint;

/// One incremental membership mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Change {
    Remove(Endpoint),
    Add(Endpoint),
}

/// State that can be reconciled: a ring plus whatever bookkeeping must follow its membership.
pub trait MemberTable {
    /// Current members, in any order.
    fn members(&self) -> Vec<Endpoint>;
    /// Forget a member. Implementations take it off the ring before dropping its bookkeeping.
    fn remove_member(&mut self, endpoint: &Endpoint);
    /// Admit a member. Implementations set up its bookkeeping before putting it on the ring.
    fn add_member(&mut self, endpoint: &Endpoint);
}

/// Changes turning `old` into `new`: every removal first, then every addition, each in input order.
///
/// Duplicates in either input are collapsed.
pub fn difference(old: &[Endpoint], new: &[Endpoint]) -> Vec<Change> {
    let old_set: HashSet<&Endpoint> = old.iter().collect();
    let new_set: HashSet<&Endpoint> = new.iter().collect();
    let mut seen = HashSet::new();
    let removed = old.iter().filter(|endpoint| !new_set.contains(endpoint)).filter(|endpoint| seen.insert(*endpoint)).cloned().map(Change::Remove);
    let removed: Vec<Change> = removed.collect();
    let mut seen = HashSet::new();
    let added = new.iter().filter(|endpoint| !old_set.contains(endpoint)).filter(|endpoint| seen.insert(*endpoint)).cloned().map(Change::Add);
    removed.into_iter().chain(added).collect()
}

/// Apply the difference between the table's members and `snapshot`, returning the applied changes.
///
/// A snapshot equal to the current membership applies nothing.
pub fn reconcile<T>(table: &mut T, snapshot: &[Endpoint]) -> Vec<Change>
where
    T: MemberTable + ?Sized,
{
    let changes = difference(&table.members(), snapshot);
    for change in &changes {
        match change {
            Change::Remove(endpoint) => {
                tracing::debug!(address = %endpoint, "[AG.Ring] remove");
                table.remove_member(endpoint);
            }
            Change::Add(endpoint) => {
                tracing::debug!(address = %endpoint, "[AG.Ring] add");
                table.add_member(endpoint);
            }
        }
    }
    changes
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn eps(addresses: &[&str]) -> Vec<Endpoint> {
        addresses.iter().map(|a| Endpoint::from(*a)).collect()
    }

    fn add(address: &str) -> Change {
        Change::Add(Endpoint::from(address))
    }

    fn del(address: &str) -> Change {
        Change::Remove(Endpoint::from(address))
    }

    #[test]
    fn test_difference() {
        let cases: Vec<(Vec<Endpoint>, Vec<Endpoint>, Vec<Change>)> = vec![
            (eps(&[]), eps(&["b", "a"]), vec![add("b"), add("a")]),
            (eps(&["b", "a"]), eps(&[]), vec![del("b"), del("a")]),
            (eps(&["a"]), eps(&["b", "a"]), vec![add("b")]),
            (eps(&["a", "b"]), eps(&["a"]), vec![del("b")]),
            (eps(&["b", "d", "c"]), eps(&["d", "e", "f"]), vec![del("b"), del("c"), add("e"), add("f")]),
            (eps(&["a", "b"]), eps(&["b", "a"]), vec![]),
        ];
        for (old, new, expected) in cases {
            assert_eq!(difference(&old, &new), expected, "{old:?} -> {new:?}");
        }
    }

    #[test]
    fn test_difference_collapses_duplicates() {
        assert_eq!(difference(&eps(&["a", "a"]), &eps(&["c", "b", "c"])), vec![del("a"), add("c"), add("b")]);
    }

    fn sample(rng: &mut StdRng, pool: &[String]) -> Vec<Endpoint> {
        let len = rng.random_range(0..=pool.len() + 3);
        (0..len).map(|_| Endpoint::from(pool[rng.random_range(0..pool.len())].as_str())).collect()
    }

    #[test]
    fn test_difference_transforms_random_sets() {
        let pool: Vec<String> = (0..12).map(|i| format!("10.0.0.{i}:80")).collect();
        for seed in [1u64, 7, 42] {
            let mut rng = StdRng::seed_from_u64(seed);
            for round in 0..500 {
                let old = sample(&mut rng, &pool);
                let new = sample(&mut rng, &pool);
                let changes = difference(&old, &new);

                let distinct: HashSet<&Change> = changes.iter().collect();
                assert_eq!(distinct.len(), changes.len(), "seed {seed} round {round}: duplicate change");
                let additions = changes.iter().position(|change| matches!(change, Change::Add(_))).unwrap_or(changes.len());
                assert!(changes[additions..].iter().all(|change| matches!(change, Change::Add(_))), "seed {seed} round {round}: removal after an addition");

                let mut current: HashSet<Endpoint> = old.iter().cloned().collect();
                for change in &changes {
                    match change {
                        Change::Remove(endpoint) => assert!(current.remove(endpoint), "seed {seed} round {round}: superfluous removal of {endpoint}"),
                        Change::Add(endpoint) => assert!(current.insert(endpoint.clone()), "seed {seed} round {round}: superfluous addition of {endpoint}"),
                    }
                }
                assert_eq!(current, new.iter().cloned().collect::<HashSet<_>>(), "seed {seed} round {round}");
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        members: Vec<Endpoint>,
        log: Vec<Change>,
    }

    impl MemberTable for Recorder {
        fn members(&self) -> Vec<Endpoint> {
            self.members.clone()
        }
        fn remove_member(&mut self, endpoint: &Endpoint) {
            self.members.retain(|m| m != endpoint);
            self.log.push(Change::Remove(endpoint.clone()));
        }
        fn add_member(&mut self, endpoint: &Endpoint) {
            self.members.push(endpoint.clone());
            self.log.push(Change::Add(endpoint.clone()));
        }
    }

    #[test]
    fn test_reconcile_transforms_old_into_new() {
        let mut table = Recorder::default();
        assert_eq!(reconcile(&mut table, &eps(&["a", "b"])).len(), 2);
        let changes = reconcile(&mut table, &eps(&["b", "c"]));
        assert_eq!(changes, vec![del("a"), add("c")]);
        assert_eq!(table.log, vec![add("a"), add("b"), del("a"), add("c")]);
        let mut members = table.members();
        members.sort();
        assert_eq!(members, eps(&["b", "c"]));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut table = Recorder::default();
        reconcile(&mut table, &eps(&["a", "b", "c"]));
        let applied = table.log.len();
        assert!(reconcile(&mut table, &eps(&["c", "a", "b"])).is_empty());
        assert_eq!(table.log.len(), applied);
    }
}

//! Property tests for the object database against a BTreeSet reference
//! model: insertion conflicts, in-order traversal, successor lookup, and
//! subtree removal.

use std::collections::BTreeSet;

use proptest::prelude::*;

use minisnmpd::odb::Odb;
use minisnmpd::oid::Oid;
use minisnmpd::value::Value;

/// Arcs drawn from a small alphabet so prefix collisions actually happen.
fn arb_oid() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..6, 1..6)
}

fn arb_oid_set() -> impl Strategy<Value = Vec<Vec<u32>>> {
    prop::collection::vec(arb_oid(), 1..40)
}

/// Does the reference model make this insert a conflict?
fn conflicts(model: &BTreeSet<Vec<u32>>, candidate: &[u32]) -> bool {
    model.iter().any(|existing| {
        existing.as_slice() == candidate
            || existing.starts_with(candidate)
            || candidate.starts_with(existing)
    })
}

/// Insert everything, mirroring accepted OIDs into the model, and assert the
/// database agreed with the model about every conflict.
fn populate(odb: &mut Odb, oids: &[Vec<u32>]) -> BTreeSet<Vec<u32>> {
    let mut model = BTreeSet::new();
    for (i, arcs) in oids.iter().enumerate() {
        let oid = Oid::from_slice(arcs);
        let expected_conflict = conflicts(&model, arcs);
        let result = odb.insert(&oid, Value::Integer(i as i32));
        assert_eq!(
            result.is_err(),
            expected_conflict,
            "conflict disagreement for {}",
            oid
        );
        if result.is_ok() {
            model.insert(arcs.clone());
        }
    }
    model
}

proptest! {
    /// Iteration is strictly ascending and exactly covers the accepted
    /// mappings; every accepted mapping is retrievable.
    #[test]
    fn insert_iterate_get(oids in arb_oid_set()) {
        let mut odb = Odb::new();
        let model = populate(&mut odb, &oids);

        let walked: Vec<Vec<u32>> = odb.iter().map(|(oid, _)| oid.arcs().to_vec()).collect();
        let expected: Vec<Vec<u32>> = model.iter().cloned().collect();
        prop_assert_eq!(&walked, &expected);

        for window in walked.windows(2) {
            prop_assert!(window[0] < window[1]);
        }

        prop_assert_eq!(odb.len(), model.len());
        for arcs in &model {
            prop_assert!(odb.get(&Oid::from_slice(arcs)).is_some());
        }
    }

    /// get_next returns exactly the model's strict successor.
    #[test]
    fn get_next_matches_model(oids in arb_oid_set(), query in arb_oid()) {
        let mut odb = Odb::new();
        let model = populate(&mut odb, &oids);

        let expected = model
            .iter()
            .find(|arcs| arcs.as_slice() > query.as_slice())
            .cloned();
        let actual = odb
            .get_next(&Oid::from_slice(&query))
            .map(|(oid, _)| oid.arcs().to_vec());
        prop_assert_eq!(actual, expected);
    }

    /// get_next from the empty OID finds the minimum mapping.
    #[test]
    fn get_next_from_root_is_minimum(oids in arb_oid_set()) {
        let mut odb = Odb::new();
        let model = populate(&mut odb, &oids);

        let actual = odb.get_next(&Oid::empty()).map(|(oid, _)| oid.arcs().to_vec());
        prop_assert_eq!(actual, model.first().cloned());
    }

    /// Removing a subtree leaves exactly the mappings outside the removed
    /// prefix, still walkable in order.
    #[test]
    fn remove_subtree_matches_model(oids in arb_oid_set(), prefix in arb_oid()) {
        let mut odb = Odb::new();
        let mut model = populate(&mut odb, &oids);

        odb.remove(&Oid::from_slice(&prefix));
        model.retain(|arcs| !arcs.starts_with(&prefix));

        let mut walked = Vec::new();
        let mut cursor = Oid::empty();
        while let Some((next, _)) = odb.get_next(&cursor) {
            prop_assert!(next > cursor);
            walked.push(next.arcs().to_vec());
            cursor = next;
        }
        let expected: Vec<Vec<u32>> = model.iter().cloned().collect();
        prop_assert_eq!(walked, expected);
        prop_assert_eq!(odb.len(), model.len());
    }

    /// Clearing is idempotent and the database is reusable.
    #[test]
    fn clear_twice_and_reuse(oids in arb_oid_set()) {
        let mut odb = Odb::new();
        populate(&mut odb, &oids);

        odb.clear();
        prop_assert!(odb.is_empty());
        odb.clear();
        prop_assert!(odb.is_empty());

        let model = populate(&mut odb, &oids);
        prop_assert_eq!(odb.len(), model.len());
    }
}

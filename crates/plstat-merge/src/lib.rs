//! Fragment merger for plstat.
//!
//! Adapters each produce a partial record ("fragment"); this crate folds
//! them into the accumulating record with a recursive, first-writer-wins
//! policy: a key already present in the destination is never overwritten,
//! nested groups on both sides are merged key by key, and everything else
//! is copied in wholesale. Earlier-priority adapters are authoritative by
//! construction.

use plstat_model::{Group, Node, Record};
use tracing::debug;

/// A partial record produced by one adapter, prior to merging.
pub type Fragment = Group;

/// Merge `src` into `dest`, first writer wins.
///
/// For each key of `src`: absent in `dest` means the subtree is copied in;
/// groups on both sides recurse; any leaf collision keeps the `dest` side
/// untouched. Total over well-formed fragments — a leaf/group shape
/// collision is traced and skipped, never an error.
pub fn merge_into(dest: &mut Group, src: &Group) {
    for (key, src_node) in src {
        match dest.get_mut(key) {
            None => {
                dest.insert(key.clone(), src_node.clone());
            }
            Some(dest_node) => match (dest_node, src_node) {
                (Node::Group(dest_group), Node::Group(src_group)) => {
                    merge_into(dest_group, src_group);
                }
                _ => {
                    debug!(key = %key, "keeping existing value, first writer wins");
                }
            },
        }
    }
}

/// Extension trait folding fragments into a [`Record`].
pub trait MergeFragment {
    /// Merge a fragment into this record; the record owns the copied
    /// subtrees and the fragment can be discarded afterwards.
    fn merge_fragment(&mut self, fragment: &Fragment);
}

impl MergeFragment for Record {
    fn merge_fragment(&mut self, fragment: &Fragment) {
        merge_into(&mut self.fields, fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plstat_model::LeafValue;

    fn group(json: &str) -> Group {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn absent_keys_are_copied_in() {
        let mut dest = group(r#"{"a": {"value": 1}}"#);
        let src = group(r#"{"b": {"value": 2}}"#);
        merge_into(&mut dest, &src);
        assert_eq!(dest["b"], Node::Leaf(LeafValue::int(2)));
    }

    #[test]
    fn existing_leaf_wins_over_incoming() {
        let mut dest = group(r#"{"casa_version": {"value": "6.5.4"}}"#);
        let src = group(r#"{"casa_version": {"value": "6.6.1"}}"#);
        merge_into(&mut dest, &src);
        assert_eq!(dest["casa_version"], Node::Leaf(LeafValue::str("6.5.4")));
    }

    #[test]
    fn nested_groups_fill_gaps_only() {
        let mut dest = group(
            r#"{"EB": {"eb1": {"n_manualflags": {"value": 3}}}}"#,
        );
        let src = group(
            r#"{"EB": {"eb1": {"n_manualflags": {"value": 99}, "extra": {"value": 1}},
                       "eb2": {"n_manualflags": {"value": 0}}}}"#,
        );
        merge_into(&mut dest, &src);
        let eb = dest["EB"].as_group().unwrap();
        let eb1 = eb["eb1"].as_group().unwrap();
        assert_eq!(eb1["n_manualflags"], Node::Leaf(LeafValue::int(3)));
        assert_eq!(eb1["extra"], Node::Leaf(LeafValue::int(1)));
        assert!(eb.contains_key("eb2"));
    }

    #[test]
    fn leaf_group_collision_leaves_dest_untouched() {
        let mut dest = group(r#"{"STAGE": {"1": {"qa_score": {"value": 0.9}}}}"#);
        let src = group(r#"{"STAGE": {"value": "not a group"}}"#);
        let before = dest.clone();
        merge_into(&mut dest, &src);
        assert_eq!(dest, before);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut dest = group(r#"{"a": {"value": 1}}"#);
        let src = group(r#"{"a": {"value": 2}, "b": {"c": {"value": 3}}}"#);
        merge_into(&mut dest, &src);
        let once = dest.clone();
        merge_into(&mut dest, &src);
        assert_eq!(dest, once);
    }

    #[test]
    fn record_wrapper_merges_fragments_in_order() {
        let mut record = Record::new();
        record.merge_fragment(&group(r#"{"proposal_code": {"value": "2023.1.00001.S"}}"#));
        record.merge_fragment(&group(
            r#"{"proposal_code": {"value": "SHOULD_NOT_WIN"}, "total_time": {"value": 123.0}}"#,
        ));
        assert_eq!(
            record.get("proposal_code"),
            Some(&Node::Leaf(LeafValue::str("2023.1.00001.S")))
        );
        assert_eq!(
            record.get("total_time"),
            Some(&Node::Leaf(LeafValue::float(123.0)))
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        // Shallow fragments of int leaves are enough to pin the policy:
        // idempotence and first-writer stability do not depend on depth.
        fn arb_fragment() -> impl Strategy<Value = Group> {
            proptest::collection::btree_map(
                "[a-d]{1,2}",
                (0i64..10).prop_map(|i| Node::Leaf(LeafValue::int(i))),
                0..6,
            )
        }

        proptest! {
            #[test]
            fn idempotent(f in arb_fragment()) {
                let mut dest = Group::new();
                merge_into(&mut dest, &f);
                let once = dest.clone();
                merge_into(&mut dest, &f);
                prop_assert_eq!(dest, once);
            }

            #[test]
            fn first_writer_stable(f1 in arb_fragment(), f2 in arb_fragment()) {
                let mut dest = Group::new();
                merge_into(&mut dest, &f1);
                merge_into(&mut dest, &f2);
                for (key, node) in &f1 {
                    prop_assert_eq!(dest.get(key), Some(node));
                }
            }
        }
    }
}

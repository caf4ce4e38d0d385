//! Tests for Capability Negotiation

use super::*;
use crate::domain::value_objects::Cap;

fn specs(list: &[(&str, u32, u64)]) -> Vec<ProtocolSpec> {
    list.iter()
        .map(|(name, version, length)| ProtocolSpec::new(*name, *version, *length))
        .collect()
}

fn caps(list: &[(&str, u32, u64)]) -> Vec<Cap> {
    specs(list).iter().map(ProtocolSpec::cap).collect()
}

// =============================================================================
// TEST GROUP 1: Selection
// =============================================================================

#[test]
fn test_highest_shared_version_wins() {
    let local = specs(&[("eth", 63, 17), ("eth", 62, 17)]);
    let remote = specs(&[("eth", 63, 17), ("hello", 1, 3)]);

    let ours = CapabilityTable::negotiate(&local, &caps(&[("eth", 63, 17), ("hello", 1, 3)]));
    let theirs = CapabilityTable::negotiate(&remote, &caps(&[("eth", 63, 17), ("eth", 62, 17)]));

    assert_eq!(ours.len(), 1);
    let eth = ours.get("eth").unwrap();
    assert_eq!((eth.version, eth.offset, eth.length), (63, 16, 17));
    assert_eq!(eth.protocol_index, 0);
    assert_eq!(ours.entries()[0].range(), theirs.entries()[0].range());
}

#[test]
fn test_version_must_match_exactly() {
    let local = specs(&[("eth", 64, 17)]);
    let table = CapabilityTable::negotiate(&local, &caps(&[("eth", 63, 17)]));
    assert!(table.is_empty());
    assert_eq!(table.next_free_code(), 16);
}

#[test]
fn test_lower_shared_version_chosen_when_higher_not_shared() {
    let local = specs(&[("eth", 62, 8), ("eth", 66, 17)]);
    let table = CapabilityTable::negotiate(&local, &caps(&[("eth", 62, 8), ("eth", 63, 17)]));

    let eth = table.get("eth").unwrap();
    assert_eq!(eth.version, 62);
    assert_eq!(eth.protocol_index, 0);
}

#[test]
fn test_unmatched_local_protocols_stay_inert() {
    let local = specs(&[("snap", 1, 8), ("eth", 68, 17), ("les", 4, 23)]);
    let table = CapabilityTable::negotiate(&local, &caps(&[("eth", 68, 17)]));

    assert_eq!(table.len(), 1);
    assert!(table.get("snap").is_none());
    assert!(table.get("les").is_none());
}

// =============================================================================
// TEST GROUP 2: Offsets
// =============================================================================

#[test]
fn test_offsets_follow_name_order() {
    struct TestCase {
        local: Vec<(&'static str, u32, u64)>,
        expected: Vec<(&'static str, u64)>,
    }

    let remote = caps(&[("snap", 1, 8), ("eth", 68, 17), ("bzz", 2, 5)]);
    let cases = vec![
        TestCase {
            local: vec![("snap", 1, 8), ("eth", 68, 17), ("bzz", 2, 5)],
            expected: vec![("bzz", 16), ("eth", 21), ("snap", 38)],
        },
        TestCase {
            local: vec![("eth", 68, 17), ("snap", 1, 8)],
            expected: vec![("eth", 16), ("snap", 33)],
        },
        TestCase {
            local: vec![("snap", 1, 8)],
            expected: vec![("snap", 16)],
        },
    ];

    for case in cases {
        let table = CapabilityTable::negotiate(&specs(&case.local), &remote);
        let got: Vec<(&str, u64)> = table
            .entries()
            .iter()
            .map(|entry| (entry.name.as_str(), entry.offset))
            .collect();
        assert_eq!(got, case.expected);
    }
}

#[test]
fn test_both_sides_agree_regardless_of_declaration_order() {
    let a = specs(&[("snap", 1, 8), ("eth", 68, 17), ("eth", 67, 17)]);
    let b = specs(&[("eth", 67, 17), ("eth", 68, 17), ("snap", 1, 8), ("wit", 0, 4)]);

    let on_a = CapabilityTable::negotiate(&a, &b.iter().map(ProtocolSpec::cap).collect::<Vec<_>>());
    let on_b = CapabilityTable::negotiate(&b, &a.iter().map(ProtocolSpec::cap).collect::<Vec<_>>());

    let ranges = |table: &CapabilityTable| {
        table
            .entries()
            .iter()
            .map(|entry| (entry.cap(), entry.range()))
            .collect::<Vec<_>>()
    };
    assert_eq!(ranges(&on_a), ranges(&on_b));
}

#[test]
fn test_find_by_code() {
    let local = specs(&[("eth", 68, 17), ("snap", 1, 8)]);
    let table = CapabilityTable::negotiate(&local, &caps(&[("eth", 68, 17), ("snap", 1, 8)]));

    assert!(table.find_by_code(0).is_none());
    assert!(table.find_by_code(15).is_none());
    assert_eq!(table.find_by_code(16).unwrap().name, "eth");
    assert_eq!(table.find_by_code(32).unwrap().name, "eth");
    assert_eq!(table.find_by_code(33).unwrap().name, "snap");
    assert_eq!(table.find_by_code(40).unwrap().name, "snap");
    assert!(table.find_by_code(41).is_none());
    assert_eq!(table.next_free_code(), 41);
}

#[test]
fn test_display() {
    let table = CapabilityTable::negotiate(&specs(&[("eth", 63, 17)]), &caps(&[("eth", 63, 17)]));
    assert_eq!(table.entries()[0].to_string(), "eth/63@16..33");
}

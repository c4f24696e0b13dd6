use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;

use super::*;
use crate::audit::RecordingAuditSink;
use crate::config::LatLon;

fn example_config() -> GridConfig {
    GridConfig {
        boundary_corners: [
            LatLon::new(1.0, 0.0),
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 1.0),
            LatLon::new(1.0, 1.0),
        ],
        min_altitude: 0.0,
        max_altitude: 10.0,
        altitude_partitions: 1,
        longitude_partitions: 2,
        latitude_partitions: 2,
        ..GridConfig::default()
    }
}

fn stacked_config() -> GridConfig {
    GridConfig {
        max_altitude: 90.0,
        altitude_partitions: 3,
        longitude_partitions: 3,
        latitude_partitions: 4,
        ..example_config()
    }
}

fn setup(config: GridConfig) -> (AirspaceControlEngine, Arc<RecordingAuditSink>) {
    let sink = Arc::new(RecordingAuditSink::new());
    let registry = Arc::new(InMemoryPriorityRegistry::new(config.default_priority));
    let engine = AirspaceControlEngine::with_collaborators(config, registry, sink.clone())
        .expect("grid builds");
    (engine, sink)
}

fn center_cell(engine: &AirspaceControlEngine) -> String {
    engine.resolve_cell(0.5, 0.5, 5.0).expect("point inside grid")
}

#[test]
fn example_scenario_reserve_then_conflict() {
    let (engine, sink) = setup(example_config());
    assert_eq!(engine.cell_count(), 4);

    let cell = center_cell(&engine);
    assert!(engine.cell_ids().contains(&cell));

    let snapshot = engine.reserve("drone-A", &cell).unwrap();
    assert_eq!(snapshot.status, CellStatus::Allocated);
    assert_eq!(snapshot.owner.as_deref(), Some("drone-A"));

    let err = engine.reserve("drone-B", &cell).unwrap_err();
    assert_eq!(
        err,
        ControlError::Conflict {
            cell_id: cell.clone(),
            owner: "drone-A".to_string(),
        }
    );

    let denied = sink.events_of(AuditEventKind::ReservationDenied);
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].vehicle_id.as_deref(), Some("drone-B"));
    assert_eq!(sink.events_of(AuditEventKind::OwnershipChanged).len(), 1);
}

#[test]
fn random_interior_points_resolve_to_containing_cell() {
    let (engine, _) = setup(stacked_config());
    let mut rng = rand::rng();

    for _ in 0..500 {
        let lat = rng.random_range(0.001..0.999);
        let lon = rng.random_range(0.001..0.999);
        let alt = rng.random_range(0.01..89.99);
        let cell_id = engine.resolve_cell(lat, lon, alt).unwrap();
        let cell = engine.index().get(&cell_id).unwrap();
        assert!(cell.contains(lat, lon, alt));
    }

    assert!(engine.resolve_cell(1.5, 0.5, 5.0).is_err());
    assert!(engine.resolve_cell(0.5, 0.5, 95.0).is_err());
}

#[test]
fn grid_cells_never_overlap() {
    let (engine, _) = setup(stacked_config());
    let ids = engine.cell_ids();
    for (i, a) in ids.iter().enumerate() {
        let cell_a = engine.index().get(a).unwrap();
        for b in &ids[i + 1..] {
            let cell_b = engine.index().get(b).unwrap();
            assert!(!cell_a.overlaps(&cell_b), "{} overlaps {}", a, b);
        }
    }

    let report = engine.partition_report();
    assert!(report.overlapping_pairs.is_empty());
    // (a-1)*o*t + a*(o-1)*t + a*o*(t-1) for a=3, o=3, t=4
    assert_eq!(report.face_adjacent_pairs, 2 * 3 * 4 + 3 * 2 * 4 + 3 * 3 * 3);
}

#[test]
fn cell_count_matches_partition_product() {
    let (engine, _) = setup(stacked_config());
    assert_eq!(engine.cell_count(), 3 * 3 * 4);
    assert_eq!(engine.dims().total(), engine.cell_count());
}

#[test]
fn colliding_ids_abort_startup() {
    // Five bands inside one 10m bucket produce duplicate ids.
    let config = GridConfig {
        altitude_partitions: 5,
        ..example_config()
    };
    let err = AirspaceControlEngine::new(config).err().expect("must fail");
    match err {
        InitError::CellCountMismatch {
            expected,
            registered,
            collisions,
        } => {
            assert_eq!(expected, 20);
            assert_eq!(registered, 4);
            assert_eq!(collisions, 16);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn invalid_config_is_rejected() {
    let config = GridConfig {
        longitude_partitions: 0,
        ..example_config()
    };
    assert!(matches!(
        AirspaceControlEngine::new(config),
        Err(InitError::InvalidConfig(_))
    ));
}

#[test]
fn oversized_lease_is_rejected_at_startup() {
    let config = GridConfig {
        lease_duration_ms: u64::MAX,
        ..example_config()
    };
    assert!(matches!(
        AirspaceControlEngine::new(config),
        Err(InitError::InvalidConfig(_))
    ));
}

#[test]
fn neighbor_queries_by_kind() {
    let (engine, _) = setup(stacked_config());
    let low = engine.resolve_cell(0.1, 0.1, 15.0).unwrap();
    let high = engine.resolve_cell(0.1, 0.1, 45.0).unwrap();

    let upper = engine.query_neighbors(&low, NeighborKind::Upper).unwrap();
    assert!(upper.contains(&high));
    let lower = engine.query_neighbors(&high, NeighborKind::Lower).unwrap();
    assert!(lower.contains(&low));
    assert!(engine
        .query_neighbors(&low, NeighborKind::Lower)
        .unwrap()
        .is_empty());

    let err = engine
        .query_neighbors("nope", NeighborKind::All)
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn renew_requires_owner() {
    let (engine, sink) = setup(example_config());
    let cell = center_cell(&engine);
    let first = engine.reserve("drone-A", &cell).unwrap();

    let err = engine.renew("drone-B", &cell).unwrap_err();
    assert!(matches!(err, ControlError::Unauthorized { action: ControlAction::Renew, .. }));
    assert_eq!(sink.events_of(AuditEventKind::UnauthorizedRenew).len(), 1);

    std::thread::sleep(std::time::Duration::from_millis(5));
    let renewed = engine.renew("drone-A", &cell).unwrap();
    assert!(renewed.lease_expires_at.unwrap() > first.lease_expires_at.unwrap());
}

#[test]
fn renew_on_free_cell_is_unauthorized() {
    let (engine, _) = setup(example_config());
    let cell = center_cell(&engine);
    let err = engine.renew("drone-A", &cell).unwrap_err();
    assert_eq!(err.code(), "UNAUTHORIZED");
}

#[test]
fn sweep_reclaims_expired_lease() {
    let (engine, sink) = setup(example_config());
    let cell = center_cell(&engine);
    engine.set_priority("drone-A", 4);
    engine.reserve("drone-A", &cell).unwrap();
    assert_eq!(engine.vehicle_region("drone-A").as_deref(), Some(cell.as_str()));

    // Not yet due.
    assert!(engine.sweep_expired_leases_at(Utc::now()).is_empty());

    let later = Utc::now() + engine.lease_duration() + Duration::milliseconds(1);
    let expired = engine.sweep_expired_leases_at(later);
    assert_eq!(
        expired,
        vec![ExpiredLease {
            cell_id: cell.clone(),
            vehicle_id: "drone-A".to_string(),
            status: CellStatus::Free,
        }]
    );

    let snapshot = engine.query(&cell).unwrap();
    assert_eq!(snapshot.status, CellStatus::Free);
    assert!(snapshot.owner.is_none());
    assert!(snapshot.owner_priority.is_none());
    assert!(snapshot.lease_expires_at.is_none());
    assert!(engine.vehicle_region("drone-A").is_none());
    assert_eq!(sink.events_of(AuditEventKind::LeaseExpired).len(), 1);

    // Released cell is open to others again.
    assert!(engine.reserve("drone-B", &cell).is_ok());
}

#[test]
fn occupancy_round_trip() {
    let (engine, _) = setup(example_config());
    let cell = center_cell(&engine);

    let err = engine.add_occupant("drone-A", &cell).unwrap_err();
    assert!(matches!(
        err,
        ControlError::InvalidState {
            status: CellStatus::Free,
            action: ControlAction::Occupy,
            ..
        }
    ));

    engine.reserve("drone-A", &cell).unwrap();
    let occupied = engine.add_occupant("drone-A", &cell).unwrap();
    assert_eq!(occupied.status, CellStatus::Occupied);

    // Occupying twice is the wrong state, not a conflict.
    assert_eq!(
        engine.add_occupant("drone-A", &cell).unwrap_err().code(),
        "INVALID_STATE"
    );

    let released = engine.remove_occupant("drone-A", &cell).unwrap();
    assert_eq!(released.status, CellStatus::Free);
    assert!(released.owner.is_none());
    assert!(engine.vehicle_region("drone-A").is_none());
}

#[test]
fn exit_before_entry_is_invalid_state() {
    let (engine, _) = setup(example_config());
    let cell = center_cell(&engine);
    engine.reserve("drone-A", &cell).unwrap();
    let err = engine.remove_occupant("drone-A", &cell).unwrap_err();
    assert!(matches!(
        err,
        ControlError::InvalidState {
            status: CellStatus::Allocated,
            action: ControlAction::Exit,
            ..
        }
    ));
}

#[test]
fn other_vehicle_cannot_occupy_or_exit() {
    let (engine, sink) = setup(example_config());
    let cell = center_cell(&engine);
    engine.reserve("drone-A", &cell).unwrap();

    assert_eq!(
        engine.add_occupant("drone-B", &cell).unwrap_err().code(),
        "UNAUTHORIZED"
    );
    engine.add_occupant("drone-A", &cell).unwrap();
    assert_eq!(
        engine.remove_occupant("drone-B", &cell).unwrap_err().code(),
        "UNAUTHORIZED"
    );

    assert_eq!(sink.events_of(AuditEventKind::UnauthorizedOccupy).len(), 1);
    assert_eq!(sink.events_of(AuditEventKind::UnauthorizedExit).len(), 1);
    assert_eq!(engine.query(&cell).unwrap().owner.as_deref(), Some("drone-A"));
}

#[test]
fn owner_re_reserve_keeps_occupied_status() {
    let (engine, _) = setup(example_config());
    let cell = center_cell(&engine);
    engine.reserve("drone-A", &cell).unwrap();
    engine.add_occupant("drone-A", &cell).unwrap();

    engine.set_priority("drone-A", 9);
    let snapshot = engine.reserve("drone-A", &cell).unwrap();
    assert_eq!(snapshot.status, CellStatus::Occupied);
    assert_eq!(snapshot.owner_priority, Some(9));
}

#[test]
fn restricted_track_round_trip() {
    let (engine, sink) = setup(example_config());
    let cell = center_cell(&engine);

    let marked = engine.mark_restricted(&cell).unwrap();
    assert_eq!(marked.status, CellStatus::RestrictedAvailable);
    let entered = sink.events_of(AuditEventKind::RestrictedEntered);
    assert_eq!(entered.len(), 1);
    assert_eq!(entered[0].severity, AuditSeverity::Critical);

    assert_eq!(
        engine.reserve("drone-A", &cell).unwrap().status,
        CellStatus::RestrictedAllocated
    );
    assert_eq!(
        engine.add_occupant("drone-A", &cell).unwrap().status,
        CellStatus::RestrictedOccupied
    );
    assert_eq!(
        engine.remove_occupant("drone-A", &cell).unwrap().status,
        CellStatus::RestrictedAvailable
    );
}

#[test]
fn restricted_lease_expires_to_restricted_available() {
    let (engine, _) = setup(example_config());
    let cell = center_cell(&engine);
    engine.mark_restricted(&cell).unwrap();
    engine.reserve("drone-A", &cell).unwrap();

    let later = Utc::now() + engine.lease_duration() * 2;
    let expired = engine.sweep_expired_leases_at(later);
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].status, CellStatus::RestrictedAvailable);
    assert_eq!(
        engine.query(&cell).unwrap().status,
        CellStatus::RestrictedAvailable
    );
}

#[test]
fn no_fly_evicts_holder_and_blocks_reservation() {
    let (engine, sink) = setup(example_config());
    let cell = center_cell(&engine);
    engine.reserve("drone-A", &cell).unwrap();

    let closed = engine.mark_no_fly(&cell).unwrap();
    assert_eq!(closed.status, CellStatus::NoFly);
    assert!(closed.owner.is_none());
    assert!(closed.lease_expires_at.is_none());
    assert!(engine.vehicle_region("drone-A").is_none());

    let critical = sink.events_of(AuditEventKind::NoFlyEntered);
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].severity, AuditSeverity::Critical);

    let err = engine.reserve("drone-B", &cell).unwrap_err();
    assert!(matches!(
        err,
        ControlError::InvalidState {
            status: CellStatus::NoFly,
            ..
        }
    ));
    assert_eq!(engine.renew("drone-A", &cell).unwrap_err().code(), "UNAUTHORIZED");
}

#[test]
fn repeated_marking_is_still_audited() {
    let (engine, sink) = setup(example_config());
    let cell = center_cell(&engine);
    engine.mark_no_fly(&cell).unwrap();
    sink.clear();

    let snapshot = engine.mark_no_fly(&cell).unwrap();
    assert_eq!(snapshot.status, CellStatus::NoFly);
    let events = sink.events_of(AuditEventKind::NoFlyEntered);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, AuditSeverity::Critical);
    assert!(events[0].detail.contains("re-asserted"));

    let other = engine.resolve_cell(0.25, 0.25, 5.0).unwrap();
    engine.mark_restricted(&other).unwrap();
    engine.mark_restricted(&other).unwrap();
    let restricted = sink.events_of(AuditEventKind::RestrictedEntered);
    assert_eq!(restricted.len(), 2);
    assert!(restricted
        .iter()
        .all(|event| event.severity == AuditSeverity::Critical));
    assert!(restricted[1].detail.contains("re-asserted"));
}

#[test]
fn region_map_tracks_ownership_under_contention() {
    let (engine, _) = setup(example_config());
    let cell = center_cell(&engine);
    let far_future = Utc::now() + Duration::days(2);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..200 {
                let _ = engine.reserve("drone-A", &cell);
                let _ = engine.add_occupant("drone-A", &cell);
                let _ = engine.remove_occupant("drone-A", &cell);
                let _ = engine.reserve("drone-A", &cell);
            }
        });
        scope.spawn(|| {
            for _ in 0..200 {
                engine.sweep_expired_leases_at(far_future);
            }
        });
    });

    let owner = engine.query(&cell).unwrap().owner;
    let region = engine.vehicle_region("drone-A");
    assert_eq!(owner.is_some(), region.is_some());
    if let Some(region) = region {
        assert_eq!(region, cell);
    }
}

#[test]
fn higher_priority_does_not_preempt() {
    let (engine, _) = setup(example_config());
    let cell = center_cell(&engine);
    engine.set_priority("drone-A", 1);
    engine.set_priority("drone-B", 10);
    assert_eq!(engine.priority("drone-B"), 10);
    assert_eq!(engine.priority("unknown"), 0);

    let held = engine.reserve("drone-A", &cell).unwrap();
    assert_eq!(held.owner_priority, Some(1));

    let available = engine
        .index()
        .get(&cell)
        .map(|c| c.is_available_for_priority(engine.priority("drone-B")))
        .unwrap();
    assert!(available);
    assert_eq!(engine.reserve("drone-B", &cell).unwrap_err().code(), "CONFLICT");
}

#[test]
fn revoke_acknowledges_without_evicting() {
    let (engine, sink) = setup(example_config());
    let cell = center_cell(&engine);
    engine.reserve("drone-A", &cell).unwrap();

    assert!(engine.revoke(&cell).is_ok());
    assert_eq!(engine.query(&cell).unwrap().owner.as_deref(), Some("drone-A"));
    assert!(engine.revoke("unknown-cell").is_ok());
    let free = engine.resolve_cell(0.25, 0.25, 5.0).unwrap();
    assert!(engine.revoke(&free).is_ok());

    let events = sink.events_of(AuditEventKind::RevokeRequested);
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].vehicle_id.as_deref(), Some("drone-A"));
    assert!(events[0].detail.contains("drone-A not yet evicted"));
    assert!(events[1].vehicle_id.is_none());
    assert!(events[1].detail.contains("unknown cell"));
    assert!(events[2].vehicle_id.is_none());
    assert!(events[2].detail.contains("no owner"));
}

#[test]
fn unknown_cells_are_not_found() {
    let (engine, _) = setup(example_config());
    for err in [
        engine.reserve("drone-A", "missing").unwrap_err(),
        engine.renew("drone-A", "missing").unwrap_err(),
        engine.add_occupant("drone-A", "missing").unwrap_err(),
        engine.remove_occupant("drone-A", "missing").unwrap_err(),
        engine.mark_no_fly("missing").unwrap_err(),
        engine.query("missing").unwrap_err(),
    ] {
        assert_eq!(err.code(), "NOT_FOUND");
    }
}

#[test]
fn reserve_at_coordinate_and_bookkeeping() {
    let (engine, _) = setup(example_config());
    let snapshot = engine.reserve_at("drone-A", 0.25, 0.25, 5.0).unwrap();
    let other = engine.reserve_at("drone-A", 0.75, 0.75, 5.0).unwrap();
    assert_ne!(snapshot.cell_id, other.cell_id);

    let mut owned = engine.cells_owned_by("drone-A");
    owned.sort();
    let mut expected = vec![snapshot.cell_id.clone(), other.cell_id.clone()];
    expected.sort();
    assert_eq!(owned, expected);
    assert_eq!(engine.vehicle_region("drone-A"), Some(other.cell_id));

    let counts = engine.status_counts();
    assert_eq!(counts.get(&CellStatus::Allocated), Some(&2));
    assert_eq!(counts.get(&CellStatus::Free), Some(&2));

    assert!(engine.reserve_at("drone-A", 5.0, 5.0, 5.0).is_err());
}

#[test]
fn concurrent_reservations_grant_exactly_one() {
    let (engine, _) = setup(example_config());
    let cell = center_cell(&engine);

    let winners: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let engine = &engine;
                let cell = cell.clone();
                scope.spawn(move || engine.reserve(&format!("drone-{}", i), &cell).is_ok())
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum()
    });

    assert_eq!(winners, 1);
}

// Integration tests for derived distance and time queries against a synced plan

mod common;

use std::time::Duration;

use common::Harness;
use fpsync::flight_plan::Segment;
use fpsync::geo::{GeoPoint, radians_to_nm};

const TOLERANCE_NM: f64 = 1e-6;

/// KJFK CANDR DEEZZ HEERO KBOS, built through the follower
async fn route(h: &Harness) {
    let follower = h.follower();
    follower.set_active_origin_icao("KJFK").unwrap();
    h.settle().await;
    follower.set_active_destination_icao("KBOS").unwrap();
    h.settle().await;
    for icao in ["CANDR", "DEEZZ", "HEERO"] {
        follower
            .add_waypoint_icao_to_active(Segment::Enroute, icao, None)
            .unwrap();
        h.settle().await;
    }
}

fn fix(h: &Harness, icao: &str) -> GeoPoint {
    h.cockpit.navdata().waypoint(icao).unwrap().location
}

fn nm(a: GeoPoint, b: GeoPoint) -> f64 {
    radians_to_nm(a.distance(&b))
}

fn fly(h: &Harness, position: GeoPoint, ground_speed_knots: f64) {
    h.cockpit.airplane().update(|t| {
        t.position = position;
        t.ground_speed_knots = ground_speed_knots;
        t.on_ground = false;
    });
}

#[tokio::test]
async fn test_distance_to_destination_with_direct_to_on_plan() {
    let h = Harness::new().await;
    route(&h).await;
    let follower = h.follower();

    let position = GeoPoint::new(40.70, -73.70);
    fly(&h, position, 300.0);
    h.sim().set_direct_to(Some("DEEZZ")).unwrap();

    let to_target = nm(position, fix(&h, "DEEZZ"));
    let after_target = nm(fix(&h, "DEEZZ"), fix(&h, "HEERO")) + nm(fix(&h, "HEERO"), fix(&h, "KBOS"));

    let direct = follower.distance_to_direct_to().await.unwrap();
    assert!((direct - to_target).abs() < TOLERANCE_NM);

    // Distance to the target plus the rest of the plan after it
    let destination = follower.distance_to_destination().await.unwrap();
    assert!((destination - (to_target + after_target)).abs() < TOLERANCE_NM);
    assert!(destination > direct);

    // The direct-to target is on the plan, so it is also the active leg's fix
    assert_eq!(follower.active_leg_index_cached(), Some(2));
    let active = follower.distance_to_active_leg_fix().await.unwrap();
    assert!((active - to_target).abs() < TOLERANCE_NM);
    assert_eq!(
        follower.destination_waypoint().await.unwrap().icao,
        "KBOS"
    );

    let eta = follower.time_to_destination().await.unwrap();
    let expected = Duration::from_secs_f64(destination / 300.0 * 3600.0);
    assert!(eta.abs_diff(expected) < Duration::from_millis(1));
}

#[tokio::test]
async fn test_direct_to_off_plan_overrides_destination() {
    let h = Harness::new().await;
    route(&h).await;
    let master = h.master();

    let position = GeoPoint::new(41.0, -73.0);
    fly(&h, position, 240.0);
    h.sim().set_direct_to(Some("PUT")).unwrap();

    assert_eq!(master.destination_waypoint().await.unwrap().icao, "PUT");
    assert!(master.direct_to_leg().await.is_none());
    assert!(master.active_leg().await.is_none());
    assert!(master.distance_to_active_leg_fix().await.is_none());

    let to_put = nm(position, fix(&h, "PUT"));
    let destination = master.distance_to_destination().await.unwrap();
    assert!((destination - to_put).abs() < TOLERANCE_NM);

    // Selecting a leg cancels the direct-to
    master.set_active_leg(3).await.unwrap();
    assert!(!master.direct_to().is_active());
    assert_eq!(master.destination_waypoint_cached().unwrap().icao, "KBOS");
}

#[tokio::test]
async fn test_distance_along_plan_without_direct_to() {
    let h = Harness::new().await;
    route(&h).await;
    let follower = h.follower();

    // Parked at the origin, steering to CANDR
    let position = fix(&h, "KJFK");
    h.cockpit.airplane().update(|t| t.position = position);
    assert_eq!(follower.active_leg().await.unwrap().fix.icao, "CANDR");

    let to_candr = nm(position, fix(&h, "CANDR"));
    let active = follower.distance_to_active_leg_fix().await.unwrap();
    assert!((active - to_candr).abs() < TOLERANCE_NM);

    let plan = follower.active_plan();
    let destination = follower.distance_to_destination().await.unwrap();
    assert!((destination - plan.total_distance_nm()).abs() < TOLERANCE_NM);

    // On the ground there is no time estimate
    assert!(follower.time_to_destination().await.is_none());
    assert!(follower.time_to_active_leg_fix().await.is_none());
    assert!(follower.distance_to_direct_to().await.is_none());
}

#[tokio::test]
async fn test_time_queries_need_positive_ground_speed() {
    let h = Harness::new().await;
    route(&h).await;
    let master = h.master();

    fly(&h, fix(&h, "KJFK"), 0.0);
    master.sync_active_from_game(false).await.unwrap();
    assert!(master.distance_to_destination_cached().is_some());
    assert!(master.time_to_destination_cached().is_none());

    fly(&h, fix(&h, "KJFK"), -10.0);
    assert!(master.time_to_active_leg_fix_cached().is_none());

    fly(&h, fix(&h, "KJFK"), 120.0);
    let distance = master.distance_to_active_leg_fix_cached().unwrap();
    let time = master.time_to_active_leg_fix_cached().unwrap();
    let expected = Duration::from_secs_f64(distance / 120.0 * 3600.0);
    assert!(time.abs_diff(expected) < Duration::from_millis(1));
}

#[tokio::test]
async fn test_empty_plan_has_no_answers() {
    let h = Harness::new().await;
    let master = h.master();
    fly(&h, GeoPoint::new(40.0, -73.0), 200.0);

    assert!(master.origin_waypoint().await.is_none());
    assert!(master.destination_waypoint().await.is_none());
    assert!(master.active_leg().await.is_none());
    assert!(master.distance_to_active_leg_fix().await.is_none());
    assert!(master.distance_to_destination().await.is_none());
    assert!(master.time_to_destination().await.is_none());
    assert!(master.time_to_direct_to().await.is_none());
}

// Integration tests for the cockpit console, driven by the demo script

mod common;

use std::path::Path;

use common::Harness;
use fpsync::console::Console;
use fpsync::flight_plan::FlightPlanElement;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_demo_script_builds_the_same_plan_everywhere() {
    let h = Harness::new().await;
    let mut console = Console::new(&h.cockpit).unwrap();
    assert_eq!(console.selected(), "pfd");

    let script = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/demo.fps");
    let contents = std::fs::read_to_string(script).unwrap();

    let mut shown = Vec::new();
    for line in contents.lines() {
        let output = console
            .execute_line(line)
            .await
            .unwrap_or_else(|e| panic!("'{line}' failed: {e:#}"));
        if line.starts_with("show") {
            shown.push(output);
        }
        h.settle().await;
    }

    let pfd = h.cockpit.manager("pfd").unwrap().active_plan();
    let mfd = h.cockpit.manager("mfd").unwrap().active_plan();
    assert_eq!(pfd, mfd);
    assert_eq!(pfd.origin_waypoint().unwrap().icao, "KJFK");
    assert_eq!(pfd.destination_waypoint().unwrap().icao, "KBOS");
    assert_eq!(pfd.departure().unwrap().name, "DEEZZ5");
    assert_eq!(pfd.arrival().unwrap().name, "ROBUC3");
    assert_eq!(pfd.approach().unwrap().name, "ILS04R");
    let enroute: Vec<String> = pfd.enroute().iter().map(FlightPlanElement::describe).collect();
    assert_eq!(enroute, vec!["J75.PUT"]);

    assert!(shown[0].starts_with("[pfd] KJFK [DEEZZ5] J75.PUT [ROBUC3] [ILS04R] KBOS"));
    assert!(shown[1].starts_with("[mfd]"));
    assert!(shown.iter().any(|s| s.contains("direct-to GREKI")));
    assert!(!h.cockpit.manager("pfd").unwrap().direct_to().is_active());
}

#[tokio::test]
async fn test_console_reports_bad_input() {
    let h = Harness::new().await;
    let mut console = Console::new(&h.cockpit).unwrap();

    assert!(console.execute_line("on efb").await.is_err());
    assert_eq!(console.selected(), "pfd");
    assert!(console.execute_line("fly KBOS").await.is_err());
    assert!(console.execute_line("remove 4").await.is_err());
    assert_eq!(console.execute_line("# comment").await.unwrap(), "");
    assert_eq!(console.execute_line("   ").await.unwrap(), "");

    assert_eq!(console.execute_line("on mfd").await.unwrap(), "now on mfd");
    let err = console.execute_line("activate-approach").await.unwrap_err();
    assert!(format!("{err:#}").contains("master"));

    let status = console.execute_line("status").await.unwrap();
    assert!(status.contains("pfd      master"));
    assert!(status.contains("mfd      follower"));
}

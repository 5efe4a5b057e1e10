mod common;

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;

use pressroom_core::{settings, DeploymentStatus};
use pressroom_daemon::paths::socket_path;
use pressroom_daemon::{
    request_configure, request_history, request_status, request_stop, request_track, run_with,
    send_request, watch, DaemonError, DaemonRequest,
};

use common::{quiet_settings, service};

fn wait_for_socket(home: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !socket_path(home).exists() {
        assert!(Instant::now() < deadline, "daemon socket never appeared");
        thread::sleep(Duration::from_millis(20));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cli_requests_round_trip_over_the_socket() {
    let home = TempDir::new().unwrap();
    let (service, remote, _store) = service(home.path(), quiet_settings());
    remote.set("abc1234", DeploymentStatus::InProgress);
    let daemon = tokio::spawn(run_with(home.path().to_path_buf(), service));

    let home_path = home.path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        let home = home_path.as_path();
        wait_for_socket(home);

        let status = request_status(home).unwrap();
        assert_eq!(status["running"], Value::Bool(true));
        assert_eq!(status["banner"]["phase"], "hidden");

        let tracked = request_track(home, "abc1234", "Create post: a.md", Some("a.md")).unwrap();
        assert_eq!(tracked["tracked"], Value::Bool(true));
        assert_eq!(tracked["id"], 1);

        let ignored = request_track(home, "", "Save", None).unwrap();
        assert_eq!(ignored["tracked"], Value::Bool(false));
        assert_eq!(ignored["reason"], "empty_sha");

        let status = request_status(home).unwrap();
        assert_eq!(status["active"].as_array().unwrap().len(), 1);
        assert_eq!(status["banner"]["phase"], "active");

        let history = request_history(home).unwrap();
        assert_eq!(history["history"]["remote"]["state"], "fresh");
        assert_eq!(history["active"][0]["commitSha"], "abc1234");

        let applied = request_configure(home, Some(("poll_interval_secs", "1800"))).unwrap();
        assert_eq!(applied["settings"]["poll_interval_secs"], 1800);
        assert_eq!(settings::load_at(home).unwrap().poll_interval_secs, 1800);

        let rejected = request_configure(home, Some(("poll_interval_secs", "0")));
        assert!(matches!(rejected, Err(DaemonError::Protocol(_))));

        let unknown = send_request(home, &DaemonRequest::new("bogus")).unwrap();
        assert!(!unknown.ok);
        assert!(unknown.error.unwrap().contains("bogus"));

        let watch_home = home.to_path_buf();
        let watcher = thread::spawn(move || {
            let mut seen = None;
            watch(&watch_home, |event| {
                if event["event"] == "tracked" {
                    seen = Some(event);
                    return false;
                }
                true
            })
            .unwrap();
            seen
        });
        thread::sleep(Duration::from_millis(200));
        request_track(home, "def5678", "Update page: about.md", None).unwrap();
        let event = watcher.join().unwrap().expect("tracked event");
        assert_eq!(event["record"]["commitSha"], "def5678");

        request_stop(home).unwrap();
    })
    .await
    .unwrap();

    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon exits after stop")
        .unwrap()
        .unwrap();
    assert!(!socket_path(home.path()).exists());
}

#[test]
fn requests_fail_cleanly_without_a_daemon() {
    let home = TempDir::new().unwrap();
    let err = request_stop(home.path()).unwrap_err();
    assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
}

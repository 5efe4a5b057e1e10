use std::fs;

use chrono::{Duration, Utc};
use pressroom_core::{BannerSettings, CommitSha, DeploymentRecord, DeploymentStatus};
use pressroom_renderer::{
    bind_banner, bind_dashboard, user_template_dir_at, BannerState, RenderError, TemplateEngine,
};
use tempfile::TempDir;

fn two_active() -> Vec<DeploymentRecord> {
    let started = Utc::now() - Duration::seconds(20);
    vec![
        DeploymentRecord::pending(CommitSha::from("shaX"), "Create post: x.md", None, started),
        DeploymentRecord::pending(CommitSha::from("shaY"), "Update page: y.md", None, started),
    ]
}

#[test]
fn user_template_replaces_embedded_banner() {
    let home = TempDir::new().expect("home");
    let dir = user_template_dir_at(home.path());
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(
        dir.join("banner.txt.tera"),
        "[{{ banner.phase }}] {{ banner.active_count }}",
    )
    .expect("write override");
    fs::write(dir.join("notes.txt"), "ignored, not a template").expect("write");

    let engine = TemplateEngine::new(Some(&dir)).expect("engine");
    let view = bind_banner(
        &BannerState::Hidden,
        &two_active(),
        &BannerSettings::default(),
        Utc::now(),
    );
    assert_eq!(engine.banner(&view).expect("render"), "[active] 2");

    // Untouched templates keep their embedded text.
    let dashboard = bind_dashboard(&two_active(), &[], Utc::now());
    assert_eq!(
        engine.summary(&dashboard, None).expect("render"),
        "2 publishing, 0 in history"
    );
}

#[test]
fn missing_override_dir_falls_back_to_embedded() {
    let home = TempDir::new().expect("home");
    let engine = TemplateEngine::new(Some(&user_template_dir_at(home.path()))).expect("engine");
    let view = bind_banner(
        &BannerState::Hidden,
        &two_active(),
        &BannerSettings::default(),
        Utc::now(),
    );
    assert!(engine.banner(&view).expect("render").starts_with("Publishing 2 changes"));
}

#[test]
fn broken_override_is_a_template_error() {
    let home = TempDir::new().expect("home");
    let dir = user_template_dir_at(home.path());
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("row.txt.tera"), "{% if %}").expect("write");

    match TemplateEngine::new(Some(&dir)) {
        Err(RenderError::Tera(_)) => {}
        Err(other) => panic!("expected tera error, got {other}"),
        Ok(_) => panic!("expected a parse failure"),
    }
}

#[test]
fn row_line_carries_sha_status_and_link() {
    let engine = TemplateEngine::embedded().expect("engine");
    let now = Utc::now();
    let mut record = DeploymentRecord::pending(
        CommitSha::from("0123456789abcdef"),
        "Delete post: old.md",
        None,
        now - Duration::seconds(65),
    );
    record.workflow_url = Some("https://ci.example/runs/1".to_string());
    record.settle(DeploymentStatus::Completed, now);

    let view = bind_dashboard(&[], &[record], now);
    let line = engine.row(&view.history[0]).expect("render");
    assert_eq!(
        line,
        "0123456  completed  1m 05s  Delete post: old.md  https://ci.example/runs/1"
    );
}

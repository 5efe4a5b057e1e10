//! Tera rendering engine: [`Template`] names and [`TemplateEngine`].
//!
//! | Template  | File                | Used by                         |
//! |-----------|---------------------|---------------------------------|
//! | Banner    | `banner.txt.tera`   | `pressroom status`              |
//! | Summary   | `summary.txt.tera`  | `pressroom history` footer      |
//! | Row       | `row.txt.tera`      | `pressroom watch` settled lines |
//!
//! A file with the same name under `~/.pressroom/templates/` replaces the
//! embedded default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use crate::binder::{BannerView, DashboardRow, DashboardView};
use crate::context::TemplateContext;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates, baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    ("banner.txt.tera", include_str!("templates/banner.txt.tera")),
    ("summary.txt.tera", include_str!("templates/summary.txt.tera")),
    ("row.txt.tera", include_str!("templates/row.txt.tera")),
];

/// `<home>/.pressroom/templates`. Pure, no I/O.
pub fn user_template_dir_at(home: &Path) -> PathBuf {
    home.join(".pressroom").join("templates")
}

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut templates = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert((*name).to_string(), (*content).to_string());
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    Banner,
    Summary,
    Row,
}

impl Template {
    pub fn all() -> &'static [Template] {
        &[Template::Banner, Template::Summary, Template::Row]
    }

    pub fn name(self) -> &'static str {
        match self {
            Template::Banner => "banner.txt.tera",
            Template::Summary => "summary.txt.tera",
            Template::Row => "row.txt.tera",
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera-based engine for the plain-text views, with optional user overrides.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Embedded templates plus any overrides found in `user_template_dir`.
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        let tera = build_tera(user_template_dir)?;
        Ok(TemplateEngine { tera })
    }

    /// Embedded templates only.
    pub fn embedded() -> Result<Self, RenderError> {
        Self::new(None)
    }

    /// Render one template. Trailing whitespace is trimmed.
    pub fn render(&self, template: Template, ctx: &TemplateContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        let rendered = self.tera.render(template.name(), &tera_ctx)?;
        Ok(rendered.trim_end().to_string())
    }

    /// Banner line; empty when the banner is hidden.
    pub fn banner(&self, view: &BannerView) -> Result<String, RenderError> {
        self.render(Template::Banner, &TemplateContext::for_banner(view))
    }

    pub fn summary(
        &self,
        view: &DashboardView,
        remote_note: Option<&str>,
    ) -> Result<String, RenderError> {
        self.render(
            Template::Summary,
            &TemplateContext::for_dashboard(view, remote_note),
        )
    }

    pub fn row(&self, row: &DashboardRow) -> Result<String, RenderError> {
        self.render(Template::Row, &TemplateContext::for_row(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pressroom_core::{BannerSettings, CommitSha, DeploymentRecord, DeploymentStatus};

    use crate::binder::{bind_banner, bind_dashboard, BannerState};

    fn active(n: usize) -> Vec<DeploymentRecord> {
        (0..n)
            .map(|i| {
                DeploymentRecord::pending(
                    CommitSha::from(format!("sha{i}")),
                    "Create post",
                    None,
                    Utc::now() - Duration::seconds(12),
                )
            })
            .collect()
    }

    fn banner_text(engine: &TemplateEngine, list: &[DeploymentRecord]) -> String {
        let view = bind_banner(
            &BannerState::Hidden,
            list,
            &BannerSettings::default(),
            Utc::now(),
        );
        engine.banner(&view).expect("render")
    }

    #[test]
    fn embedded_templates_parse() {
        let engine = TemplateEngine::embedded().expect("engine");
        for template in Template::all() {
            assert!(engine.tera.get_template(template.name()).is_ok());
        }
    }

    #[test]
    fn banner_pluralizes_change_count() {
        let engine = TemplateEngine::embedded().expect("engine");
        assert!(banner_text(&engine, &active(1)).starts_with("Publishing 1 change ("));
        assert!(banner_text(&engine, &active(2)).starts_with("Publishing 2 changes ("));
        assert_eq!(banner_text(&engine, &[]), "");
    }

    #[test]
    fn settled_banner_text_follows_tone() {
        let engine = TemplateEngine::embedded().expect("engine");
        let settings = BannerSettings::default();
        let now = Utc::now();

        let mut state = BannerState::Hidden;
        state.settle(true, 3, now);
        let ok = engine
            .banner(&bind_banner(&state, &[], &settings, now))
            .expect("render");
        assert_eq!(ok, "Published 3 changes");

        state.settle(false, 1, now);
        let failed = engine
            .banner(&bind_banner(&state, &[], &settings, now))
            .expect("render");
        assert!(failed.starts_with("Publishing failed"));
    }

    #[test]
    fn summary_mentions_superseded_and_remote_note() {
        let engine = TemplateEngine::embedded().expect("engine");
        let now = Utc::now();
        let mut skipped = DeploymentRecord::pending(CommitSha::from("s"), "", None, now);
        skipped.settle(DeploymentStatus::Skipped, now);
        let view = bind_dashboard(&active(1), &[skipped], now);

        let text = engine
            .summary(&view, Some("CI not configured"))
            .expect("render");
        assert_eq!(
            text,
            "1 publishing, 0 in history, 1 superseded (CI not configured)"
        );

        let text = engine.summary(&view, None).expect("render");
        assert_eq!(text, "1 publishing, 0 in history, 1 superseded");
    }
}

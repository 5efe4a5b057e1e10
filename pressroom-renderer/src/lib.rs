//! # pressroom-renderer
//!
//! Pure presentation layer: binds tracker state and reconciled history to
//! banner and dashboard views, detects which content kinds a publish touched,
//! and renders the plain-text views through Tera templates.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use pressroom_core::BannerSettings;
//! use pressroom_renderer::{bind_banner, BannerState, TemplateEngine};
//!
//! fn show(state: &BannerState) {
//!     let view = bind_banner(state, &[], &BannerSettings::default(), Utc::now());
//!     if let Ok(engine) = TemplateEngine::embedded() {
//!         if let Ok(line) = engine.banner(&view) {
//!             println!("{line}");
//!         }
//!     }
//! }
//! ```

pub mod binder;
pub mod context;
pub mod engine;
pub mod error;
pub mod keywords;

pub use binder::{
    bind_banner, bind_dashboard, format_elapsed, BannerPhase, BannerState, BannerView,
    DashboardRow, DashboardView, Tone,
};
pub use context::TemplateContext;
pub use engine::{user_template_dir_at, Template, TemplateEngine};
pub use error::RenderError;
pub use keywords::{changed_kinds, ContentKind};

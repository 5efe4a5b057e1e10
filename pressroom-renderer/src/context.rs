//! Template context: serializable rendering payload built from bound views.

use serde::{Deserialize, Serialize};

use crate::binder::{BannerView, DashboardRow, DashboardView};
use crate::error::RenderError;

/// Payload handed to every template. Each template reads only the part it
/// renders; the rest stays `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateContext {
    pub banner: Option<BannerView>,
    pub dashboard: Option<DashboardView>,
    pub row: Option<DashboardRow>,
    /// Why remote history is missing from the dashboard, if it is.
    pub remote_note: Option<String>,
    pub pressroom_version: String,
}

impl TemplateContext {
    fn empty() -> Self {
        Self {
            pressroom_version: env!("CARGO_PKG_VERSION").to_string(),
            ..Self::default()
        }
    }

    pub fn for_banner(banner: &BannerView) -> Self {
        Self {
            banner: Some(banner.clone()),
            ..Self::empty()
        }
    }

    pub fn for_dashboard(dashboard: &DashboardView, remote_note: Option<&str>) -> Self {
        Self {
            dashboard: Some(dashboard.clone()),
            remote_note: remote_note.map(str::to_string),
            ..Self::empty()
        }
    }

    pub fn for_row(row: &DashboardRow) -> Self {
        Self {
            row: Some(row.clone()),
            ..Self::empty()
        }
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{bind_banner, BannerState};
    use chrono::Utc;
    use pressroom_core::BannerSettings;

    #[test]
    fn banner_context_leaves_other_sections_null() {
        let view = bind_banner(&BannerState::Hidden, &[], &BannerSettings::default(), Utc::now());
        let ctx = TemplateContext::for_banner(&view);
        let json = serde_json::to_value(&ctx).expect("serialize");
        assert_eq!(json["banner"]["phase"], "hidden");
        assert!(json["dashboard"].is_null());
        assert!(json["row"].is_null());
        ctx.to_tera_context().expect("context conversion");
    }
}

/// Reporting module
///
/// This module handles:
/// - Joining instances with images and gestures, grouping and sorting (aggregate.rs)
/// - Rendering the grouped rows as an HTML document (render.rs)

pub mod aggregate;
pub mod render;

pub use aggregate::{group_rows, DisplayFields, ImageSummary, ReportAggregator, ReportGroup, ReportRow};
pub use render::{render_html, ReportLinks};

use crate::error::Result;

impl ReportAggregator<'_> {
    /// Query, group and render in one step
    pub fn render_html(&self, links: &ReportLinks) -> Result<String> {
        let groups = self.groups()?;
        tracing::info!(groups = groups.len(), "rendering report");
        Ok(render_html(&groups, links))
    }
}

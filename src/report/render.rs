//! HTML rendering of grouped report rows.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::aggregate::{ReportGroup, ReportRow};

/// Heading used for rows whose gesture has no description
pub const NO_DESCRIPTION: &str = "No Description";

/// URL prefixes the rendered page links images through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLinks {
    pub uploads: String,
    pub crops: String,
    pub gesture_photos: String,
}

impl Default for ReportLinks {
    fn default() -> Self {
        Self {
            uploads: "/uploads/".to_string(),
            crops: "/crops/".to_string(),
            gesture_photos: "/gesture_photos/".to_string(),
        }
    }
}

const STYLE: &str = "\
body { font-family: sans-serif; }
table { border-collapse: collapse; width: 100%; margin-bottom: 40px; }
th, td { border: 1px solid #ccc; padding: 6px; text-align: center; font-size: 14px; vertical-align: top; }
th { background-color: #f2f2f2; }
td.icon-title { max-width: 150px; white-space: nowrap; overflow: hidden; text-overflow: ellipsis; }
td.left-align { text-align: left; width: 160px; }
img.source { max-height: 400px; display: block; margin-left: 0; margin-right: auto; }
img.thumb { max-height: 180px; }
img.header-img { max-height: 250px; margin: 10px 0; }
h2 { margin-top: 40px; }";

const COLUMNS: &[&str] = &[
    "Icon",
    "Gesture",
    "Icon Title",
    "Culture Period",
    "Date Approx",
    "Place of Creation",
    "Current Location",
    "Dimensions (mm)",
    "Materials",
    "Depicted Figures",
    "Source",
    "Location",
    "Interpretation Notes",
    "ID",
    "Image ID",
    "Gesture ID",
    "Image Filename",
];

/// Render a complete HTML document, one table per group
pub fn render_html(groups: &[ReportGroup], links: &ReportLinks) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
    html.push_str("<title>Gesture Instances Report</title>\n<style>\n");
    html.push_str(STYLE);
    html.push_str("\n</style>\n</head><body>\n");
    html.push_str("<h1>Gesture Instances Report (Grouped by Gesture Photo)</h1>\n");

    for group in groups {
        render_group(&mut html, group, links);
    }

    html.push_str("</body></html>\n");
    html
}

fn render_group(html: &mut String, group: &ReportGroup, links: &ReportLinks) {
    let heading = group.description.as_deref().unwrap_or(NO_DESCRIPTION);
    let _ = writeln!(html, "<h2>{}</h2>", escape(heading));
    if let Some(description) = &group.description {
        let _ = writeln!(
            html,
            "<img src=\"{}\" alt=\"Gesture Photo\" class=\"header-img\">",
            escape(&format!("{}{}", links.gesture_photos, description))
        );
    }

    html.push_str("<table>\n<tr>");
    for column in COLUMNS {
        let _ = write!(html, "<th>{column}</th>");
    }
    html.push_str("</tr>\n");

    for row in &group.rows {
        render_row(html, row, links);
    }
    html.push_str("</table>\n");
}

fn render_row(html: &mut String, row: &ReportRow, links: &ReportLinks) {
    let d = &row.display;
    let source_url = format!("{}{}", links.uploads, row.image_filename);
    let crop_url = format!("{}{}", links.crops, row.cropped_image_path);

    html.push_str("<tr>");
    let _ = write!(
        html,
        "<td class=\"left-align\"><img src=\"{}\" alt=\"Icon Image\" class=\"source\"></td>",
        escape(&source_url)
    );
    let _ = write!(
        html,
        "<td><img src=\"{}\" alt=\"Gesture Image\" class=\"thumb\"></td>",
        escape(&crop_url)
    );
    let _ = write!(
        html,
        "<td class=\"icon-title\">{}</td>",
        escape(d.icon_title.as_deref().unwrap_or("Untitled"))
    );

    let instance_id = row.gesture_instance_id.to_string();
    let image_id = row.image_id.to_string();
    let gesture_id = row.gesture_id.map(|id| id.to_string()).unwrap_or_default();
    let cells: [&str; 14] = [
        &d.culture_period,
        &d.date_approx,
        &d.place_of_creation,
        &d.current_location,
        &d.dimensions_mm,
        &d.materials,
        &d.depicted_figures,
        &d.source,
        &d.location,
        &d.interpretation_notes,
        &instance_id,
        &image_id,
        &gesture_id,
        &row.image_filename,
    ];
    for cell in cells {
        let _ = write!(html, "<td>{}</td>", escape(cell));
    }
    html.push_str("</tr>\n");
}

/// Escape text for use in element content and double-quoted attributes
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

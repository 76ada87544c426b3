//! Portal types and the page-independent decisions the scraper makes

use serde::Deserialize;

/// URL fragments that mean the portal accepted the login
const POST_LOGIN_MARKERS: [&str; 3] = ["menuPrincipal", "contribuyente", "portalcf.cloud.afip.gob.ar"];

/// The login form itself lives under `/contribuyente_/`, so it must be
/// excluded explicitly.
pub fn is_post_login_url(url: &str) -> bool {
    !url.contains("login.xhtml") && POST_LOGIN_MARKERS.iter().any(|m| url.contains(m))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Older periods
    Left,
    /// Newer periods
    Right,
}

impl Direction {
    pub fn arrow_selector(self) -> &'static str {
        match self {
            Self::Left => "a.left-button",
            Self::Right => "a.right-button",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearStep {
    Click(i32),
    Page(Direction),
    /// Target not reachable; use the most recent visible year
    Fallback(i32),
    Unavailable,
}

/// Next move in the year carousel given the years currently on screen.
pub fn decide_year_step(target: i32, visible: &[i32], can_page: bool) -> YearStep {
    let (Some(&min), Some(&max)) = (visible.iter().min(), visible.iter().max()) else {
        return YearStep::Unavailable;
    };

    if visible.contains(&target) {
        YearStep::Click(target)
    } else if can_page && target < min {
        YearStep::Page(Direction::Left)
    } else if can_page && target > max {
        YearStep::Page(Direction::Right)
    } else {
        YearStep::Fallback(max)
    }
}

/// Year buttons carry their period as text; anything else is ignored
pub fn parse_visible_years(labels: &[String]) -> Vec<i32> {
    labels
        .iter()
        .filter_map(|label| label.trim().parse().ok())
        .collect()
}

/// Scroll positions for viewport captures: `0, step, 2*step, …` while below
/// `height`. Always at least the top of the page.
pub fn scroll_offsets(height: u32, step: u32) -> Vec<u32> {
    let step = step.max(1);
    let mut offsets = vec![0];
    let mut y = step;
    while y < height {
        offsets.push(y);
        y += step;
    }
    offsets
}

/// One visible table as captured from the section page
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TableSnapshot {
    #[serde(default)]
    pub title: String,
    pub html: String,
}

/// Everything needed to re-render the section's tables outside the portal
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TablesSnapshot {
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub stylesheets: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableSnapshot>,
}

impl TablesSnapshot {
    /// Standalone HTML document for one table, styled like the portal
    pub fn render(&self, table: &TableSnapshot, taxpayer: &str, year: i32) -> String {
        let mut doc = String::from("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
        if !self.base.is_empty() {
            doc.push_str(&format!("<base href=\"{}\">", escape_html(&self.base)));
        }
        for href in &self.stylesheets {
            doc.push_str(&format!(
                "<link rel=\"stylesheet\" href=\"{}\">",
                escape_html(href)
            ));
        }
        doc.push_str(
            "<style>body{margin:16px;font-family:sans-serif}\
             table{border-collapse:collapse;width:100%}\
             td,th{border:1px solid #ccc;padding:4px}</style></head><body>",
        );
        doc.push_str(&format!(
            "<h2>Nuestra Parte {} - {}</h2>",
            year,
            escape_html(taxpayer)
        ));
        if !table.title.trim().is_empty() {
            doc.push_str(&format!("<h3>{}</h3>", escape_html(table.title.trim())));
        }
        doc.push_str(&table.html);
        doc.push_str("</body></html>");
        doc
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

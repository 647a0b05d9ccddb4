use serde::Serialize;

use super::schema::CATEGORIES;
use super::workbook::Workbook;
use crate::error::{Error, Result};

pub const DEFAULT_EMOJI: &str = "📁";

const COLOR_EMOJI: &[(&str, &str)] = &[
    ("#ef4444", "🔴"),
    ("#ff0000", "🔴"),
    ("#f97316", "🟠"),
    ("#ffa500", "🟠"),
    ("#eab308", "🟡"),
    ("#ffff00", "🟡"),
    ("#22c55e", "🟢"),
    ("#00ff00", "🟢"),
    ("#008000", "🟢"),
    ("#3b82f6", "🔵"),
    ("#0000ff", "🔵"),
    ("#8b5cf6", "🟣"),
    ("#800080", "🟣"),
    ("#a16207", "🟤"),
    ("#000000", "⚫"),
    ("#ffffff", "⚪"),
];

const NAME_EMOJI: &[(&[&str], &str)] = &[
    (&["food", "grocer", "meal", "restaurant", "dining"], "🍔"),
    (&["coffee", "cafe"], "☕"),
    (&["rent", "home", "house", "mortgage"], "🏠"),
    (&["transport", "car", "fuel", "gas", "taxi", "bus"], "🚗"),
    (&["travel", "flight", "vacation", "hotel"], "✈️"),
    (&["health", "medic", "doctor", "pharmacy"], "💊"),
    (&["fun", "entertain", "movie", "game"], "🎮"),
    (&["shop", "clothes", "clothing"], "🛍️"),
    (&["bill", "utilit", "electric", "water", "internet", "phone"], "💡"),
    (&["education", "school", "course", "book"], "📚"),
    (&["gift", "donation", "charity"], "🎁"),
    (&["salary", "income", "wage"], "💰"),
    (&["saving", "invest"], "🏦"),
    (&["pet"], "🐾"),
    (&["sport", "gym", "fitness"], "🏋️"),
];

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub scanned: usize,
    pub updated: usize,
}

/// Picks an emoji for a category that only has a color and a name.
#[must_use]
pub fn emoji_for(name: &str, color: Option<&str>) -> &'static str {
    if let Some(color) = color {
        let color = color.trim().to_ascii_lowercase();
        if let Some((_, emoji)) = COLOR_EMOJI.iter().find(|(c, _)| *c == color) {
            return *emoji;
        }
    }

    let name = name.to_lowercase();
    NAME_EMOJI
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| name.contains(*k)))
        .map_or(DEFAULT_EMOJI, |(_, emoji)| *emoji)
}

/// Fills the `emoji` column of every category row that has none.
///
/// The tab must already have an `emoji` column (`ensure_schema` adds it).
/// All rows are written back in one range update, in place: blank rows stay
/// blank and keep their positions.
pub async fn migrate_category_emoji(workbook: &Workbook) -> Result<MigrationReport> {
    let (header, rows) = workbook.raw_rows(&CATEGORIES).await?;
    let position = |column: &str| header.iter().position(|h| h == column);
    let emoji_col = position("emoji").ok_or_else(|| Error::InvalidRow {
        table: CATEGORIES.name,
        reason: "header has no emoji column".to_string(),
    })?;
    let name_col = position("name");
    let color_col = position("color");

    let mut report = MigrationReport::default();
    let mut values: Vec<Vec<String>> = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = row;
        cells.resize(header.len(), String::new());
        if cells.iter().all(|c| c.trim().is_empty()) {
            values.push(cells);
            continue;
        }

        report.scanned += 1;
        if cells[emoji_col].trim().is_empty() {
            let name = name_col.map_or("", |i| cells[i].as_str());
            let color = color_col
                .map(|i| cells[i].as_str())
                .filter(|c| !c.trim().is_empty());
            let emoji = emoji_for(name, color);
            cells[emoji_col] = emoji.to_string();
            report.updated += 1;
        }
        values.push(cells);
    }

    if report.updated > 0 {
        workbook
            .overwrite_rows(&CATEGORIES, header.len(), values)
            .await?;
    }

    tracing::info!(
        "Emoji migration on {}: scanned {}, updated {}",
        workbook.spreadsheet_id(),
        report.scanned,
        report.updated
    );

    Ok(report)
}

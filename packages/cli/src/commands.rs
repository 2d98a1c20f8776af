//! The steps behind each subcommand and menu entry.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input, MultiSelect};
use ecosystem_map_cli_utils::{IndicatifProgress, MultiProgress};
use ecosystem_map_feature_models::FeatureTable;
use ecosystem_map_render::render_html;
use ecosystem_map_session::{RenderOutput, Session, SessionError};

/// Widest a cell may be in the text table before it is truncated.
const MAX_CELL_WIDTH: usize = 32;

/// Downloads the project with a byte progress bar.
///
/// # Errors
///
/// Returns [`SessionError::Download`] if the download fails.
pub async fn download(session: &mut Session, multi: &MultiProgress) -> Result<(), SessionError> {
    let project = session.config().mergin.project.clone();
    let progress = IndicatifProgress::bytes_bar(multi, &format!("Downloading {project}"));

    let summary = session.download(progress).await?;

    println!(
        "Downloaded {project} {} into {} ({} files, {} bytes)",
        summary.version,
        session.config().snapshot.dir.display(),
        summary.files,
        summary.bytes
    );
    Ok(())
}

/// Marks the session downloaded if a snapshot is already on disk.
///
/// # Errors
///
/// Returns [`SessionError::NotDownloaded`] if there is no snapshot.
pub fn require_snapshot(session: &mut Session) -> Result<(), SessionError> {
    if session.adopt_existing_snapshot() {
        Ok(())
    } else {
        log::error!(
            "No snapshot at {}; run `ecosystem_map download` first",
            session.config().snapshot_path().display()
        );
        Err(SessionError::NotDownloaded)
    }
}

/// Renders the map for `users` and writes it to `output`.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be loaded, the page cannot be
/// rendered, or the file cannot be written.
pub async fn render_to_file(
    session: &mut Session,
    users: &[String],
    output: &Path,
    show_data: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = session.render(users)?;
    report(&result);

    let (width, height) = (session.config().map.width, session.config().map.height);
    let html = render_html(&result.map.document, width, height)?;
    tokio::fs::write(output, html).await?;

    println!(
        "Wrote {} ({} markers in {} layers)",
        output.display(),
        result.map.document.marker_count(),
        result.map.document.layers.len()
    );

    if show_data {
        print!("{}", text_table(&result.filtered));
    }

    Ok(())
}

/// Menu flow for rendering: makes sure data is present, asks for the
/// users, then either writes the map or prints the table.
///
/// # Errors
///
/// Returns an error if a prompt, the download, or the render fails.
pub async fn interactive_render(
    session: &mut Session,
    multi: &MultiProgress,
    table_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !session.adopt_existing_snapshot() {
        let fetch = Confirm::new()
            .with_prompt("No local data found. Download MLA637 data now?")
            .default(true)
            .interact()?;
        if !fetch {
            println!("Please download the MLA637 data first to view the map.");
            return Ok(());
        }
        download(session, multi).await?;
    }

    let known: Vec<String> = session.known_users()?.into_iter().collect();
    let users = if known.is_empty() {
        Vec::new()
    } else {
        let picked = MultiSelect::new()
            .with_prompt("Select users to display (none = All Users)")
            .items(&known)
            .interact()?;
        picked.into_iter().map(|i| known[i].clone()).collect()
    };

    if table_only {
        let result = session.render(&users)?;
        report(&result);
        print!("{}", text_table(&result.filtered));
        return Ok(());
    }

    let output: String = Input::new()
        .with_prompt("Output file")
        .default("ecosystem_map.html".to_string())
        .interact_text()?;

    render_to_file(session, &users, &PathBuf::from(output), false).await
}

/// Logs warnings and prints the statistics of one render pass.
fn report(result: &RenderOutput) {
    for warning in &result.warnings {
        log::warn!("{warning}");
    }
    for error in &result.map.errors {
        log::warn!("{error}");
    }
    for (label, value) in result.stats.metrics() {
        println!("{label}: {value}");
    }
}

/// Formats `table` as a fixed-width text table with lat/lon first.
fn text_table(table: &FeatureTable) -> String {
    let mut header = vec!["latitude".to_string(), "longitude".to_string()];
    header.extend(table.columns().iter().map(|c| clip(c)));

    let rows: Vec<Vec<String>> = table
        .rows()
        .iter()
        .map(|row| {
            let mut cells = vec![
                row.latitude().map(|v| v.to_string()).unwrap_or_default(),
                row.longitude().map(|v| v.to_string()).unwrap_or_default(),
            ];
            cells.extend(row.values.iter().map(|v| clip(&v.to_string())));
            cells
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(header[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    write_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_line(&mut out, &rule, &widths);
    for row in &rows {
        write_line(&mut out, row, &widths);
    }
    let _ = writeln!(out, "({} rows)", rows.len());
    out
}

fn write_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    let _ = writeln!(out, "{}", line.join(" | ").trim_end());
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_WIDTH {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
    clipped.push('…');
    clipped
}

#[cfg(test)]
mod tests {
    use ecosystem_map_feature_models::{FeatureRow, Point};

    use super::*;

    #[test]
    fn table_aligns_columns_and_counts_rows() {
        let table = FeatureTable::new(
            vec!["Your name".to_string()],
            vec![
                FeatureRow::new(Some(Point::new(-1.5, 53.25)), vec!["alice".into()]),
                FeatureRow::new(None, vec!["bob".into()]),
            ],
        )
        .unwrap();

        let text = text_table(&table);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "latitude | longitude | Your name");
        assert_eq!(lines[1], "-------- | --------- | ---------");
        assert_eq!(lines[2], "53.25    | -1.5      | alice");
        assert_eq!(lines[3], "         |           | bob");
        assert_eq!(lines[4], "(2 rows)");
    }

    #[test]
    fn long_cells_are_clipped() {
        let long = "x".repeat(40);
        let clipped = clip(&long);
        assert_eq!(clipped.chars().count(), MAX_CELL_WIDTH);
        assert!(clipped.ends_with('…'));
        assert_eq!(clip("short"), "short");
    }
}

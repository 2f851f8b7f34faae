use super::ui;
use crate::core::config::AppConfig;
use crate::core::repository::FundRepository;
use crate::harvest::{DetailHarvester, DetailReport, DetailTarget, ListHarvester, ListReport};
use crate::providers::browser::BrowserSession;
use anyhow::{Context, Result};
use comfy_table::Cell;
use tracing::warn;

impl ListReport {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Listing"), ui::header_cell("Count")]);
        let rows = [
            ("Funds found", self.total_funds as usize, false),
            ("Pages harvested", self.pages_done as usize, false),
            ("Pages failed", self.failed_pages.len(), true),
            ("Funds inserted", self.inserted, false),
            ("Funds updated", self.updated, false),
            ("Rows without link", self.skipped_rows, true),
            ("Write failures", self.write_failures, true),
        ];
        for (label, count, alert) in rows {
            table.add_row(vec![Cell::new(label), ui::count_cell(count, alert)]);
        }

        let mut output = format!(
            "{}\n\n{}",
            ui::style_text("Listing harvest", ui::StyleType::Title),
            table
        );
        if !self.failed_pages.is_empty() {
            let pages: Vec<String> = self.failed_pages.iter().map(u32::to_string).collect();
            output.push_str(&format!(
                "\n\nFailed pages: {}",
                ui::style_text(&pages.join(", "), ui::StyleType::Error)
            ));
        }
        output
    }
}

impl DetailReport {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Details"), ui::header_cell("Count")]);
        let rows = [
            ("Funds requested", self.requested, false),
            ("Funds updated", self.updated, false),
            ("Skipped (no ISIN)", self.skipped.len(), true),
            ("Failed", self.failed.len(), true),
        ];
        for (label, count, alert) in rows {
            table.add_row(vec![Cell::new(label), ui::count_cell(count, alert)]);
        }

        let mut output = format!(
            "{}\n\n{}",
            ui::style_text("Detail harvest", ui::StyleType::Title),
            table
        );
        for (label, ids) in [("Skipped", &self.skipped), ("Failed", &self.failed)] {
            if !ids.is_empty() {
                output.push_str(&format!(
                    "\n\n{}: {}",
                    label,
                    ui::style_text(&ids.join(", "), ui::StyleType::Error)
                ));
            }
        }
        output
    }
}

/// Harvests every listing page into base records with a fresh browser session.
/// Ctrl-C stops the run; the browser is closed either way.
pub async fn run_list(config: &AppConfig, repository: &dyn FundRepository) -> Result<()> {
    let session = BrowserSession::launch(&config.browser).await?;
    let harvester = ListHarvester::new(&session, repository, &config.source, &config.harvest);

    let outcome = tokio::select! {
        report = harvester.run() => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    session.close().await?;

    match outcome {
        Some(report) => {
            let report = report.context("Listing harvest failed")?;
            println!("{}", report.display_as_table());
        }
        None => warn!("Listing harvest interrupted"),
    }
    Ok(())
}

/// Harvests detail pages for `target` with a fresh browser session.
pub async fn run_detail(
    config: &AppConfig,
    repository: &dyn FundRepository,
    target: &DetailTarget,
) -> Result<()> {
    let session = BrowserSession::launch(&config.browser).await?;
    let pb = ui::new_progress_bar(0, true);
    let harvester = DetailHarvester::new(&session, repository, &config.source, &config.harvest)
        .with_progress(pb.clone());

    let outcome = tokio::select! {
        report = harvester.run(target) => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    pb.finish_and_clear();
    session.close().await?;

    match outcome {
        Some(report) => {
            let report = report.context("Detail harvest failed")?;
            println!("{}", report.display_as_table());
        }
        None => warn!("Detail harvest interrupted"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_report_names_failed_pages() {
        let report = ListReport {
            total_funds: 420,
            pages_total: 5,
            pages_done: 3,
            failed_pages: vec![2, 5],
            inserted: 250,
            updated: 50,
            ..Default::default()
        };

        let output = console::strip_ansi_codes(&report.display_as_table()).to_string();
        assert!(output.contains("Pages failed"));
        assert!(output.contains("250"));
        assert!(output.contains("Failed pages: 2, 5"));
    }

    #[test]
    fn test_detail_report_lists_skipped_and_failed() {
        let report = DetailReport {
            requested: 3,
            updated: 1,
            skipped: vec!["ie00b4l5y983".to_string()],
            failed: vec!["lu0274208692".to_string()],
        };

        let output = console::strip_ansi_codes(&report.display_as_table()).to_string();
        assert!(output.contains("Skipped: ie00b4l5y983"));
        assert!(output.contains("Failed: lu0274208692"));
    }

    #[test]
    fn test_clean_detail_report_has_no_id_lists() {
        let report = DetailReport {
            requested: 2,
            updated: 2,
            ..Default::default()
        };

        let output = console::strip_ansi_codes(&report.display_as_table()).to_string();
        assert!(!output.contains("Skipped:"));
        assert!(!output.contains("Failed:"));
    }
}

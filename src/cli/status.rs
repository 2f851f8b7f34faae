use super::ui;
use crate::core::fund::{Allocation, FundRecord, FundStats};
use crate::core::repository::FundRepository;
use anyhow::{Context, Result};
use comfy_table::Cell;

impl FundStats {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Funds"), ui::header_cell("Count")]);
        table.add_row(vec![
            Cell::new("Known"),
            ui::count_cell(self.total as usize, false),
        ]);
        table.add_row(vec![
            Cell::new("With details"),
            ui::count_cell(self.with_detail() as usize, false),
        ]);
        table.add_row(vec![
            Cell::new("Pending details"),
            ui::count_cell(self.pending_detail as usize, false),
        ]);
        table.to_string()
    }
}

fn text(value: &Option<String>) -> Cell {
    ui::format_optional_cell(value.as_deref(), str::to_string)
}

fn allocations_line(allocations: &[Allocation]) -> String {
    allocations
        .iter()
        .map(|a| match a.weight {
            Some(weight) => format!("{} {}", a.label, ui::percent(weight)),
            None => a.label.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl FundRecord {
    pub fn display_as_table(&self) -> String {
        let base = &self.base;
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Attribute"), ui::header_cell("Value")]);
        table.add_row(vec![Cell::new("Name"), text(&base.name)]);
        table.add_row(vec![
            Cell::new("TER"),
            ui::format_optional_cell(base.total_expense_ratio, ui::percent),
        ]);
        table.add_row(vec![
            Cell::new("Distributing"),
            Cell::new(if base.is_distributing { "yes" } else { "no" }),
        ]);
        table.add_row(vec![Cell::new("Replication"), text(&base.replication_method)]);
        table.add_row(vec![Cell::new("Fund volume"), text(&base.fund_volume)]);
        table.add_row(vec![Cell::new("Share class volume"), text(&base.share_class_volume)]);
        table.add_row(vec![
            Cell::new("Release date"),
            ui::format_optional_cell(base.release_date, |d| d.format("%Y-%m-%d").to_string()),
        ]);
        table.add_row(vec![
            Cell::new("Listed at"),
            Cell::new(self.base_scraped_at.format("%Y-%m-%d %H:%M UTC")),
        ]);

        if let Some(detail) = &self.detail {
            table.add_row(vec![Cell::new("ISIN"), Cell::new(&detail.isin)]);
            table.add_row(vec![Cell::new("WKN"), text(&detail.wkn)]);
            table.add_row(vec![Cell::new("Base index"), text(&detail.base_index)]);
            table.add_row(vec![Cell::new("Provider"), text(&detail.fund_provider)]);
            table.add_row(vec![Cell::new("Domicile"), text(&detail.fund_domicile)]);
            table.add_row(vec![Cell::new("Fund currency"), text(&detail.fund_currency)]);
            table.add_row(vec![
                Cell::new("Positions"),
                ui::format_optional_cell(detail.nr_positions, |n| n.to_string()),
            ]);
            table.add_row(vec![
                Cell::new("Top 10 weight"),
                ui::format_optional_cell(detail.weight_top_10, ui::percent),
            ]);
            table.add_row(vec![
                Cell::new("Countries"),
                Cell::new(allocations_line(&detail.country_composition)),
            ]);
            table.add_row(vec![
                Cell::new("Top holdings"),
                Cell::new(allocations_line(&detail.top_10_holdings)),
            ]);
            let exchanges: Vec<String> = detail
                .exchanges
                .iter()
                .map(|l| match &l.ticker {
                    Some(ticker) => format!("{} ({ticker})", l.name),
                    None => l.name.clone(),
                })
                .collect();
            table.add_row(vec![Cell::new("Exchanges"), Cell::new(exchanges.join(", "))]);
        }

        let detail_line = match self.detail_scraped_at {
            Some(at) => format!("Details harvested {}", at.format("%Y-%m-%d %H:%M UTC")),
            None => "Details pending".to_string(),
        };
        format!(
            "Fund: {}\n\n{}\n\n{}",
            ui::style_text(&base.id, ui::StyleType::Title),
            table,
            ui::style_text(&detail_line, ui::StyleType::Subtle)
        )
    }
}

/// Prints fund counts and, with `list_pending`, the ids still waiting for details.
pub async fn run_status(repository: &dyn FundRepository, list_pending: bool) -> Result<()> {
    let stats = repository.stats().await.context("Failed to read fund counts")?;
    println!("{}", stats.display_as_table());

    if list_pending {
        let ids = repository
            .list_ids_pending_detail()
            .await
            .context("Failed to list pending funds")?;
        if !ids.is_empty() {
            ui::print_separator();
            for id in ids {
                println!("{id}");
            }
        }
    }
    Ok(())
}

pub async fn run_show(repository: &dyn FundRepository, id: &str) -> Result<()> {
    let record = repository
        .find(id)
        .await
        .with_context(|| format!("Failed to read fund {id}"))?
        .with_context(|| format!("Unknown fund {id}"))?;
    println!("{}", record.display_as_table());
    Ok(())
}

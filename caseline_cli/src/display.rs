use caseline::filter::{DropReason, FilterReport};
use caseline::sources::{DataSource, Jurisdiction};
use comfy_table::{presets::NOTHING, *};
use strum::IntoEnumIterator;

fn bold(header: &str) -> Cell {
    Cell::new(header).add_attribute(Attribute::Bold)
}

fn new_table(header: Vec<Cell>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

pub fn sources_table(sources: &[Jurisdiction]) -> Table {
    let mut table = new_table(vec![
        bold("Source"),
        bold("Country"),
        bold("Snapshots from"),
        bold("Description"),
    ]);
    for source in sources {
        table.add_row(vec![
            source.name().to_string(),
            source.country_code().to_string(),
            source
                .snapshot_start()
                .map(|date| date.to_string())
                .unwrap_or_default(),
            source.description().to_string(),
        ]);
    }
    table
}

pub fn display_sources(sources: &[Jurisdiction]) {
    println!("\n{}", sources_table(sources));
}

/// The report goes to stderr so it never mixes with CSV written to stdout.
pub fn display_report(source: &str, report: &FilterReport) {
    let mut table = new_table(vec![bold("Rows"), bold("Count")]);
    table.add_row(vec!["kept".to_string(), report.kept.to_string()]);
    for reason in DropReason::iter() {
        table.add_row(vec![reason.to_string(), report.dropped(reason).to_string()]);
    }
    eprintln!("\n{source}\n{table}");
}

use std::{fs, path::Path};

use anyhow::{anyhow, Context};
use plotly::{
    common::Title,
    layout::{Axis, Layout},
    Bar, Plot,
};
use serde::Serialize;

use crate::geofile::feature::FeatureCollection;

use super::config::ReportConfig;

/// One bar of the chart.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub label: String,
    pub value: f64,
}

/// Collect (label, value) pairs of the features whose `value_field` is at least `threshold`,
/// in collection order. Null values never qualify.
pub fn select_report_rows(
    collection: &FeatureCollection,
    label_field: &str,
    value_field: &str,
    threshold: f64,
) -> anyhow::Result<Vec<ReportRow>> {
    let schema = &collection.schema;
    let label_position = schema.position(label_field).ok_or_else(|| {
        anyhow!(
            "Label field '{}' not found in '{}'",
            label_field,
            collection.name
        )
    })?;
    let value_position = schema.position(value_field).ok_or_else(|| {
        anyhow!(
            "Value field '{}' not found in '{}'",
            value_field,
            collection.name
        )
    })?;

    let mut rows = Vec::new();
    for feature in &collection.features {
        let value = match feature.attributes.get(value_position) {
            Some(value) if value.is_null() => continue,
            Some(value) => value.as_f64().ok_or_else(|| {
                anyhow!("Value field '{}' holds non-numeric {:?}", value_field, value)
            })?,
            None => continue,
        };
        if value >= threshold {
            let label = feature
                .attributes
                .get(label_position)
                .map(|label| label.to_string())
                .unwrap_or_default();
            rows.push(ReportRow { label, value });
        }
    }
    Ok(rows)
}

/// Render one bar per row into a standalone HTML file.
pub fn render_bar_chart(
    rows: &[ReportRow],
    config: &ReportConfig,
    output_filepath: &Path,
) -> anyhow::Result<()> {
    let labels: Vec<String> = rows.iter().map(|row| row.label.clone()).collect();
    let values: Vec<f64> = rows.iter().map(|row| row.value).collect();

    let mut plot = Plot::new();
    plot.add_trace(Bar::new(labels, values).name(&config.value_field));
    plot.set_layout(
        Layout::new()
            .title(Title::new(&config.title))
            .x_axis(Axis::new().title(Title::new(&config.label_field)))
            .y_axis(Axis::new().title(Title::new(&config.value_field))),
    );

    fs::write(output_filepath, plot.to_html())
        .with_context(|| format!("Writing chart to {:?}", output_filepath))?;
    log::info!("Wrote chart with {} bars to {:?}", rows.len(), output_filepath);
    Ok(())
}

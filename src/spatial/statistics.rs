use std::fmt;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::geofile::{
    feature::FeatureCollection,
    schema::FieldType,
};

/// Summary statistic computed over one numeric attribute of a collection.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    #[default]
    Sum,
    Mean,
    Min,
    Max,
    Count,
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Statistic::Sum => "SUM",
            Statistic::Mean => "MEAN",
            Statistic::Min => "MIN",
            Statistic::Max => "MAX",
            Statistic::Count => "COUNT",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub field: String,
    pub statistic: Statistic,
    /// Number of non-null values that contributed.
    pub count: usize,
    /// `None` when no value contributed and the statistic is undefined.
    pub value: Option<f64>,
}

/// Compute `statistic` over `field` of every feature in `collection`. Null values are ignored.
pub fn aggregate(
    collection: &FeatureCollection,
    field: &str,
    statistic: Statistic,
) -> anyhow::Result<AggregateResult> {
    let position = collection.schema.position(field).ok_or_else(|| {
        anyhow!(
            "Field '{}' does not exist in collection '{}'",
            field,
            collection.name
        )
    })?;
    if collection.schema.fields()[position].field_type == FieldType::Text {
        return Err(anyhow!(
            "Cannot compute {} over text field '{}'",
            statistic,
            field
        ));
    }

    let values: Vec<f64> = collection
        .features
        .iter()
        .filter_map(|feature| feature.attributes.get(position).and_then(|value| value.as_f64()))
        .collect();
    let count = values.len();
    let value = match statistic {
        Statistic::Sum => Some(values.iter().sum::<f64>()),
        Statistic::Count => Some(count as f64),
        Statistic::Mean if count > 0 => Some(values.iter().sum::<f64>() / count as f64),
        Statistic::Mean => None,
        Statistic::Min => values.iter().copied().reduce(f64::min),
        Statistic::Max => values.iter().copied().reduce(f64::max),
    };
    Ok(AggregateResult {
        field: field.to_string(),
        statistic,
        count,
        value,
    })
}

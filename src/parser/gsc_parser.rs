// Search Console `searchanalytics.query` response parsing
use crate::model::{ParserError, RawRow};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub trait Parser {
    fn parse(&self, body: &str) -> Result<Vec<RawRow>, ParserError>;
}

#[derive(Debug, Deserialize)]
struct SearchAnalyticsResponse {
    #[serde(default)]
    rows: Vec<SearchAnalyticsRow>,
}

#[derive(Debug, Deserialize)]
struct SearchAnalyticsRow {
    #[serde(default)]
    keys: Vec<String>,
    clicks: Option<f64>,
    impressions: Option<f64>,
    ctr: Option<f64>,
    position: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Query,
    Page,
    Date,
    Device,
}

impl Dimension {
    fn from_name(name: &str) -> Result<Self, ParserError> {
        match name.to_lowercase().as_str() {
            "query" => Ok(Dimension::Query),
            "page" => Ok(Dimension::Page),
            "date" => Ok(Dimension::Date),
            "device" => Ok(Dimension::Device),
            _ => Err(ParserError::UnsupportedDimension(name.to_string())),
        }
    }
}

/// Maps the positional `keys` array of each response row onto the dimensions
/// the request was made with. Device rows are left split; the normalizer
/// folds them after validating each one.
pub struct SearchAnalyticsParser {
    dimensions: Vec<Dimension>,
}

impl SearchAnalyticsParser {
    pub fn new(dimensions: &[String]) -> Result<Self, ParserError> {
        let dimensions = dimensions
            .iter()
            .map(|d| Dimension::from_name(d))
            .collect::<Result<Vec<_>, _>>()?;

        for (required, name) in [
            (Dimension::Query, "query"),
            (Dimension::Page, "page"),
            (Dimension::Date, "date"),
        ] {
            if !dimensions.contains(&required) {
                return Err(ParserError::MissingDimension(name));
            }
        }

        Ok(Self { dimensions })
    }

    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Vec<RawRow>, ParserError> {
        let body = fs::read_to_string(path.as_ref())?;
        info!("Read {} bytes from {}", body.len(), path.as_ref().display());
        self.parse(&body)
    }

    fn map_row(&self, row: SearchAnalyticsRow) -> RawRow {
        let mut raw = RawRow {
            clicks: row.clicks,
            impressions: row.impressions,
            ctr: row.ctr,
            position: row.position,
            ..RawRow::default()
        };

        // A short or long keys array leaves fields empty for the normalizer to reject.
        if row.keys.len() != self.dimensions.len() {
            debug!(
                "Row has {} keys, expected {}",
                row.keys.len(),
                self.dimensions.len()
            );
            return raw;
        }

        for (dimension, value) in self.dimensions.iter().zip(row.keys) {
            match dimension {
                Dimension::Query => raw.query = Some(value),
                Dimension::Page => raw.page = Some(value),
                Dimension::Date => raw.date = Some(value),
                Dimension::Device => raw.device = Some(value),
            }
        }
        raw
    }
}

impl Parser for SearchAnalyticsParser {
    fn parse(&self, body: &str) -> Result<Vec<RawRow>, ParserError> {
        let response: SearchAnalyticsResponse = serde_json::from_str(body)?;
        let rows: Vec<RawRow> = response
            .rows
            .into_iter()
            .map(|row| self.map_row(row))
            .collect();
        debug!("Mapped {} rows", rows.len());
        Ok(rows)
    }
}

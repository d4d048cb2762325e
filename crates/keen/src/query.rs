//! Query parameters and the named analysis wrappers.

use crate::client::KeenClient;
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of analysis, one per query endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Count,
    CountUnique,
    Sum,
    Minimum,
    Maximum,
    Average,
    Median,
    Percentile,
    SelectUnique,
    Extraction,
    MultiAnalysis,
    Funnel,
}

impl QueryKind {
    /// Endpoint name under `queries/`.
    pub fn endpoint(self) -> &'static str {
        match self {
            QueryKind::Count => "count",
            QueryKind::CountUnique => "count_unique",
            QueryKind::Sum => "sum",
            QueryKind::Minimum => "minimum",
            QueryKind::Maximum => "maximum",
            QueryKind::Average => "average",
            QueryKind::Median => "median",
            QueryKind::Percentile => "percentile",
            QueryKind::SelectUnique => "select_unique",
            QueryKind::Extraction => "extraction",
            QueryKind::MultiAnalysis => "multi_analysis",
            QueryKind::Funnel => "funnel",
        }
    }

    /// Whether the kind returns a raw list rather than a `result` wrapper.
    pub fn returns_raw(self) -> bool {
        matches!(
            self,
            QueryKind::SelectUnique
                | QueryKind::Extraction
                | QueryKind::MultiAnalysis
                | QueryKind::Funnel
        )
    }

    fn needs_collection(self) -> bool {
        self != QueryKind::Funnel
    }

    fn needs_target_property(self) -> bool {
        matches!(
            self,
            QueryKind::CountUnique
                | QueryKind::Sum
                | QueryKind::Minimum
                | QueryKind::Maximum
                | QueryKind::Average
                | QueryKind::Median
                | QueryKind::Percentile
                | QueryKind::SelectUnique
        )
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// A property filter: `{property_name, operator, property_value}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub property_name: String,
    pub operator: String,
    pub property_value: Value,
}

impl Filter {
    pub fn new(
        property_name: impl Into<String>,
        operator: impl Into<String>,
        property_value: impl Into<Value>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            operator: operator.into(),
            property_value: property_value.into(),
        }
    }
}

/// Relative (`"this_7_days"`) or absolute timeframe.
#[derive(Debug, Clone, PartialEq)]
pub enum Timeframe {
    Relative(String),
    Absolute { start: String, end: String },
}

impl Timeframe {
    fn encode(&self) -> Result<String, Error> {
        match self {
            Timeframe::Relative(name) => Ok(name.clone()),
            Timeframe::Absolute { start, end } => {
                Ok(serde_json::to_string(&serde_json::json!({
                    "start": start,
                    "end": end,
                }))?)
            }
        }
    }
}

impl From<&str> for Timeframe {
    fn from(name: &str) -> Self {
        Timeframe::Relative(name.to_string())
    }
}

impl From<String> for Timeframe {
    fn from(name: String) -> Self {
        Timeframe::Relative(name)
    }
}

/// One or several properties to group results by.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupBy {
    Single(String),
    Multiple(Vec<String>),
}

impl GroupBy {
    fn encode(&self) -> Result<String, Error> {
        match self {
            GroupBy::Single(name) => Ok(name.clone()),
            GroupBy::Multiple(names) => Ok(serde_json::to_string(names)?),
        }
    }
}

impl From<&str> for GroupBy {
    fn from(name: &str) -> Self {
        GroupBy::Single(name.to_string())
    }
}

impl From<String> for GroupBy {
    fn from(name: String) -> Self {
        GroupBy::Single(name)
    }
}

impl<S: Into<String>> From<Vec<S>> for GroupBy {
    fn from(names: Vec<S>) -> Self {
        GroupBy::Multiple(names.into_iter().map(Into::into).collect())
    }
}

/// Parameters shared by every query kind. Passed through to the API as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub event_collection: Option<String>,
    pub timeframe: Option<Timeframe>,
    pub timezone: Option<String>,
    pub filters: Vec<Filter>,
    pub group_by: Option<GroupBy>,
    pub interval: Option<String>,
    pub target_property: Option<String>,
    pub percentile: Option<f64>,
    pub analyses: Option<Map<String, Value>>,
    pub steps: Option<Vec<Value>>,
    pub property_names: Option<Vec<String>>,
    pub latest: Option<u64>,
    pub email: Option<String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_collection(mut self, collection: impl Into<String>) -> Self {
        self.event_collection = Some(collection.into());
        self
    }

    pub fn timeframe(mut self, timeframe: impl Into<Timeframe>) -> Self {
        self.timeframe = Some(timeframe.into());
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Add a filter. Filters accumulate.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn group_by(mut self, group_by: impl Into<GroupBy>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    /// Bucket results by interval, e.g. `"daily"`.
    pub fn interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    pub fn target_property(mut self, property: impl Into<String>) -> Self {
        self.target_property = Some(property.into());
        self
    }

    pub fn percentile(mut self, percentile: f64) -> Self {
        self.percentile = Some(percentile);
        self
    }

    pub fn analyses(mut self, analyses: Map<String, Value>) -> Self {
        self.analyses = Some(analyses);
        self
    }

    pub fn steps(mut self, steps: Vec<Value>) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn property_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.property_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Limit an extraction to the most recent `latest` events.
    pub fn latest(mut self, latest: u64) -> Self {
        self.latest = Some(latest);
        self
    }

    /// Have the extraction emailed instead of returned.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Check that the parameters `kind` requires are present.
    pub fn validate(&self, kind: QueryKind) -> Result<(), Error> {
        let missing = |what: &str| {
            Err(Error::InvalidQuery(format!(
                "{} query requires {}",
                kind, what
            )))
        };

        if kind.needs_collection()
            && self.event_collection.as_deref().map_or(true, str::is_empty)
        {
            return missing("an event_collection");
        }
        if kind.needs_target_property() && self.target_property.is_none() {
            return missing("a target_property");
        }
        match kind {
            QueryKind::Percentile if self.percentile.is_none() => missing("a percentile"),
            QueryKind::MultiAnalysis if self.analyses.is_none() => missing("analyses"),
            QueryKind::Funnel if self.steps.as_ref().map_or(true, Vec::is_empty) => {
                missing("at least one step")
            }
            _ => Ok(()),
        }
    }

    /// Encode as URL query pairs. Structured values are JSON-encoded.
    pub fn to_query_pairs(&self) -> Result<Vec<(&'static str, String)>, Error> {
        let mut pairs = Vec::new();

        if let Some(collection) = &self.event_collection {
            pairs.push(("event_collection", collection.clone()));
        }
        if let Some(timeframe) = &self.timeframe {
            pairs.push(("timeframe", timeframe.encode()?));
        }
        if let Some(timezone) = &self.timezone {
            pairs.push(("timezone", timezone.clone()));
        }
        if !self.filters.is_empty() {
            pairs.push(("filters", serde_json::to_string(&self.filters)?));
        }
        if let Some(group_by) = &self.group_by {
            pairs.push(("group_by", group_by.encode()?));
        }
        if let Some(interval) = &self.interval {
            pairs.push(("interval", interval.clone()));
        }
        if let Some(target) = &self.target_property {
            pairs.push(("target_property", target.clone()));
        }
        if let Some(percentile) = self.percentile {
            pairs.push(("percentile", percentile.to_string()));
        }
        if let Some(analyses) = &self.analyses {
            pairs.push(("analyses", serde_json::to_string(analyses)?));
        }
        if let Some(steps) = &self.steps {
            pairs.push(("steps", serde_json::to_string(steps)?));
        }
        if let Some(names) = &self.property_names {
            pairs.push(("property_names", serde_json::to_string(names)?));
        }
        if let Some(latest) = self.latest {
            pairs.push(("latest", latest.to_string()));
        }
        if let Some(email) = &self.email {
            pairs.push(("email", email.clone()));
        }

        Ok(pairs)
    }
}

// ============================================
// NAMED QUERIES
// ============================================

impl KeenClient {
    /// Count events in a collection.
    pub async fn count(
        &self,
        collection: impl Into<String>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.query(QueryKind::Count, params.event_collection(collection))
            .await
    }

    /// Sum a numeric property.
    pub async fn sum(
        &self,
        collection: impl Into<String>,
        target_property: impl Into<String>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.targeted(QueryKind::Sum, collection, target_property, params)
            .await
    }

    /// Minimum of a numeric property.
    pub async fn minimum(
        &self,
        collection: impl Into<String>,
        target_property: impl Into<String>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.targeted(QueryKind::Minimum, collection, target_property, params)
            .await
    }

    /// Maximum of a numeric property.
    pub async fn maximum(
        &self,
        collection: impl Into<String>,
        target_property: impl Into<String>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.targeted(QueryKind::Maximum, collection, target_property, params)
            .await
    }

    /// Average of a numeric property.
    pub async fn average(
        &self,
        collection: impl Into<String>,
        target_property: impl Into<String>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.targeted(QueryKind::Average, collection, target_property, params)
            .await
    }

    /// Median of a numeric property.
    pub async fn median(
        &self,
        collection: impl Into<String>,
        target_property: impl Into<String>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.targeted(QueryKind::Median, collection, target_property, params)
            .await
    }

    /// Percentile of a numeric property.
    pub async fn percentile(
        &self,
        collection: impl Into<String>,
        target_property: impl Into<String>,
        percentile: f64,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.targeted(
            QueryKind::Percentile,
            collection,
            target_property,
            params.percentile(percentile),
        )
        .await
    }

    /// Number of distinct values of a property.
    pub async fn count_unique(
        &self,
        collection: impl Into<String>,
        target_property: impl Into<String>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.targeted(QueryKind::CountUnique, collection, target_property, params)
            .await
    }

    /// Distinct values of a property.
    pub async fn select_unique(
        &self,
        collection: impl Into<String>,
        target_property: impl Into<String>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.targeted(QueryKind::SelectUnique, collection, target_property, params)
            .await
    }

    /// Raw events from a collection.
    pub async fn extraction(
        &self,
        collection: impl Into<String>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.query(QueryKind::Extraction, params.event_collection(collection))
            .await
    }

    /// Several analyses over one collection in a single request.
    pub async fn multi_analysis(
        &self,
        collection: impl Into<String>,
        analyses: Map<String, Value>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.query(
            QueryKind::MultiAnalysis,
            params.event_collection(collection).analyses(analyses),
        )
        .await
    }

    /// Funnel over a sequence of steps.
    pub async fn funnel(&self, steps: Vec<Value>, params: QueryParams) -> Result<Value, Error> {
        self.query(QueryKind::Funnel, params.steps(steps)).await
    }

    async fn targeted(
        &self,
        kind: QueryKind,
        collection: impl Into<String>,
        target_property: impl Into<String>,
        params: QueryParams,
    ) -> Result<Value, Error> {
        self.query(
            kind,
            params
                .event_collection(collection)
                .target_property(target_property),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(params: &QueryParams) -> Vec<(&'static str, String)> {
        params.to_query_pairs().unwrap()
    }

    #[test]
    fn test_filters_are_json_encoded() {
        let params = QueryParams::new()
            .event_collection("query test")
            .timeframe("today")
            .filter(Filter::new("number", "eq", 5));

        assert_eq!(
            pairs(&params),
            vec![
                ("event_collection", "query test".to_string()),
                ("timeframe", "today".to_string()),
                (
                    "filters",
                    r#"[{"property_name":"number","operator":"eq","property_value":5}]"#.to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_group_by_single_and_multiple() {
        let single = QueryParams::new().group_by("number");
        assert_eq!(pairs(&single), vec![("group_by", "number".to_string())]);

        let multiple = QueryParams::new().group_by(vec!["number", "string"]);
        assert_eq!(
            pairs(&multiple),
            vec![("group_by", r#"["number","string"]"#.to_string())]
        );
    }

    #[test]
    fn test_absolute_timeframe() {
        let params = QueryParams::new().timeframe(Timeframe::Absolute {
            start: "2024-01-01T00:00:00.000Z".into(),
            end: "2024-01-02T00:00:00.000Z".into(),
        });

        let encoded = pairs(&params);
        let (name, value) = &encoded[0];
        assert_eq!(*name, "timeframe");
        let decoded: Value = serde_json::from_str(value).unwrap();
        assert_eq!(decoded["start"], "2024-01-01T00:00:00.000Z");
        assert_eq!(decoded["end"], "2024-01-02T00:00:00.000Z");
    }

    #[test]
    fn test_structured_params() {
        let mut analyses = Map::new();
        analyses.insert(
            "total".into(),
            json!({"analysis_type": "sum", "target_property": "number"}),
        );

        let params = QueryParams::new()
            .interval("hourly")
            .percentile(80.0)
            .analyses(analyses)
            .property_names(["number"])
            .latest(10);

        assert_eq!(
            pairs(&params),
            vec![
                ("interval", "hourly".to_string()),
                ("percentile", "80".to_string()),
                (
                    "analyses",
                    r#"{"total":{"analysis_type":"sum","target_property":"number"}}"#.to_string()
                ),
                ("property_names", r#"["number"]"#.to_string()),
                ("latest", "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_validate_required_params() {
        let base = QueryParams::new().event_collection("c");

        assert!(base.validate(QueryKind::Count).is_ok());
        assert!(base.validate(QueryKind::Extraction).is_ok());
        assert!(matches!(
            QueryParams::new().validate(QueryKind::Count),
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            QueryParams::new().event_collection("").validate(QueryKind::Count),
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            base.validate(QueryKind::Sum),
            Err(Error::InvalidQuery(_))
        ));

        let targeted = base.clone().target_property("number");
        assert!(targeted.validate(QueryKind::Sum).is_ok());
        assert!(matches!(
            targeted.validate(QueryKind::Percentile),
            Err(Error::InvalidQuery(_))
        ));
        assert!(targeted.percentile(80.0).validate(QueryKind::Percentile).is_ok());

        assert!(matches!(
            base.validate(QueryKind::MultiAnalysis),
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            QueryParams::new().validate(QueryKind::Funnel),
            Err(Error::InvalidQuery(_))
        ));
        assert!(QueryParams::new()
            .steps(vec![json!({"event_collection": "a", "actor_property": "id"})])
            .validate(QueryKind::Funnel)
            .is_ok());
    }

    #[test]
    fn test_raw_kinds() {
        assert!(QueryKind::Extraction.returns_raw());
        assert!(QueryKind::Funnel.returns_raw());
        assert!(!QueryKind::Count.returns_raw());
        assert_eq!(QueryKind::CountUnique.to_string(), "count_unique");
    }
}

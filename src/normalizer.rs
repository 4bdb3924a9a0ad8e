//! Heuristic data normalization
//!
//! Infers one semantic type per column and coerces every row's values
//! accordingly. Inference runs an ordered chain of classifiers over the
//! FIRST row only (a consistency/performance trade-off: one decision per
//! column, applied uniformly), falling through to a generative
//! classification with a fixed terminal default of `text`.

use crate::executor::Row;
use crate::llm::{LlmClient, RetryPolicy};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Semantic column type, distinct from the storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Date,
    Time,
    Money,
    Percentage,
    Number,
    Boolean,
    Text,
    Unknown,
}

impl ColumnType {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "date" => Some(ColumnType::Date),
            "time" => Some(ColumnType::Time),
            "money" => Some(ColumnType::Money),
            "percentage" => Some(ColumnType::Percentage),
            "number" => Some(ColumnType::Number),
            "boolean" => Some(ColumnType::Boolean),
            _ => None,
        }
    }
}

pub type ColumnTypeMap = HashMap<String, ColumnType>;

lazy_static! {
    static ref MONEY_PATTERN: Regex = Regex::new(r"^\$?[\d,.]+$").unwrap();
    static ref PERCENT_PATTERN: Regex = Regex::new(r"^[\d,.]+%$").unwrap();
    static ref DATE_PATTERN: Regex =
        Regex::new(r"^\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}|\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4}$").unwrap();
    static ref TIME_PATTERN: Regex =
        Regex::new(r"^\d{1,2}:\d{2}(:\d{2})?(\s*[AaPp][Mm])?$").unwrap();
    static ref NUMERIC_PATTERN: Regex = Regex::new(r"^[\d,.]+$").unwrap();
}

const DATE_KEYWORDS: &[&str] = &["date", "time", "created", "updated"];
const MONEY_KEYWORDS: &[&str] = &[
    "price", "cost", "amount", "total", "revenue", "sales", "expense", "budget",
];
const PERCENT_KEYWORDS: &[&str] = &["percent", "rate", "ratio"];
const NUMBER_KEYWORDS: &[&str] = &["count", "number", "qty", "quantity", "id", "age"];

/// One rule-based classifier: column name + first-row sample in, verdict out.
/// `None` means "not my call", passing to the next strategy in the chain.
type RuleStrategy = fn(&str, &Value) -> Option<ColumnType>;

/// Rule tier, in strict priority order. First match wins.
const RULE_CHAIN: &[RuleStrategy] = &[
    null_sample,
    native_kind,
    date_rule,
    time_rule,
    money_rule,
    percent_rule,
    number_rule,
    long_text_rule,
];

fn null_sample(_name: &str, value: &Value) -> Option<ColumnType> {
    value.is_null().then_some(ColumnType::Unknown)
}

fn native_kind(_name: &str, value: &Value) -> Option<ColumnType> {
    match value {
        Value::String(_) => None,
        Value::Number(_) => Some(ColumnType::Number),
        Value::Bool(_) => Some(ColumnType::Boolean),
        _ => Some(ColumnType::Unknown),
    }
}

fn date_rule(name: &str, value: &Value) -> Option<ColumnType> {
    let sample = value.as_str()?;
    let name = name.to_lowercase();
    let by_name = DATE_KEYWORDS.iter().any(|k| name.contains(k));
    (by_name || DATE_PATTERN.is_match(sample)).then_some(ColumnType::Date)
}

fn time_rule(name: &str, value: &Value) -> Option<ColumnType> {
    let sample = value.as_str()?;
    (name.to_lowercase().contains("time") && TIME_PATTERN.is_match(sample))
        .then_some(ColumnType::Time)
}

fn money_rule(name: &str, value: &Value) -> Option<ColumnType> {
    let sample = value.as_str()?;
    let name = name.to_lowercase();
    let by_name = MONEY_KEYWORDS.iter().any(|k| name.contains(k));
    (by_name || MONEY_PATTERN.is_match(sample)).then_some(ColumnType::Money)
}

fn percent_rule(name: &str, value: &Value) -> Option<ColumnType> {
    let sample = value.as_str()?;
    let name = name.to_lowercase();
    let by_name = PERCENT_KEYWORDS.iter().any(|k| name.contains(k));
    (by_name || PERCENT_PATTERN.is_match(sample)).then_some(ColumnType::Percentage)
}

fn number_rule(name: &str, value: &Value) -> Option<ColumnType> {
    let sample = value.as_str()?;
    let name = name.to_lowercase();
    let by_name = NUMBER_KEYWORDS.iter().any(|k| name.contains(k));
    (by_name || NUMERIC_PATTERN.is_match(sample)).then_some(ColumnType::Number)
}

fn long_text_rule(_name: &str, value: &Value) -> Option<ColumnType> {
    let sample = value.as_str()?;
    (sample.chars().count() > 100).then_some(ColumnType::Text)
}

pub struct DataNormalizer {
    llm: LlmClient,
}

impl DataNormalizer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Coerce every row per a type map derived from the first row only.
    /// Never fails: coercion errors default per-value, and a failed
    /// generative classification defaults the column to `text`.
    pub async fn clean_rows(&self, rows: Vec<Row>) -> Vec<Row> {
        let Some(first) = rows.first() else {
            return Vec::new();
        };

        let mut types = ColumnTypeMap::new();
        for (name, sample) in first {
            let column_type = self.infer_type(name, sample).await;
            types.insert(name.clone(), column_type);
        }
        debug!("inferred column types: {:?}", types);

        rows.into_iter().map(|row| clean_row(row, &types)).collect()
    }

    /// Run the classifier chain for one column.
    pub async fn infer_type(&self, name: &str, sample: &Value) -> ColumnType {
        for rule in RULE_CHAIN {
            if let Some(verdict) = rule(name, sample) {
                return verdict;
            }
        }
        self.classify_with_llm(name, sample).await
    }

    /// Model-based tier, constrained to the fixed vocabulary. Any failure or
    /// out-of-vocabulary answer defaults to `text`.
    async fn classify_with_llm(&self, name: &str, sample: &Value) -> ColumnType {
        let sample_text = sample.as_str().unwrap_or_default();
        let prompt = format!(
            r#"Analyze this column name "{name}" with sample value "{sample}".
What data type is it most likely? Choose from:
1. date (dates in any format)
2. time (times in any format)
3. money (monetary values)
4. percentage (percentage values)
5. number (any numeric values)
6. boolean (true/false values)
7. text (general text)

Return ONLY the single word answer with no explanation."#,
            name = name,
            sample = sample_text
        );

        match self.llm.generate(&prompt, &RetryPolicy::CLASSIFY).await {
            Ok(answer) => {
                let label = answer.trim().to_lowercase();
                ColumnType::from_label(&label).unwrap_or(ColumnType::Text)
            }
            Err(e) => {
                debug!("type classification for {} failed, defaulting: {}", name, e);
                ColumnType::Text
            }
        }
    }
}

/// Coerce one row's values per the column type map. Nulls and non-string
/// values pass through unchanged regardless of inferred type.
pub fn clean_row(row: Row, types: &ColumnTypeMap) -> Row {
    row.into_iter()
        .map(|(name, value)| {
            let column_type = types.get(&name).copied().unwrap_or(ColumnType::Text);
            let cleaned = clean_value(value, column_type);
            (name, cleaned)
        })
        .collect()
}

fn clean_value(value: Value, column_type: ColumnType) -> Value {
    let Value::String(text) = value else {
        return value;
    };

    match column_type {
        ColumnType::Money => Value::from(parse_float(&text.replace(['$', ','], ""))),
        ColumnType::Percentage => {
            Value::from(parse_float(&text.replace(['%', ','], "")) / 100.0)
        }
        ColumnType::Number => Value::from(parse_float(&text.replace(',', ""))),
        ColumnType::Boolean => match text.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "y" | "t" => Value::Bool(true),
            "false" | "no" | "0" | "n" | "f" => Value::Bool(false),
            _ => Value::String(text),
        },
        ColumnType::Date => match parse_date_like(&text) {
            Some(canonical) => Value::String(canonical),
            None => Value::String(text),
        },
        _ => Value::String(text),
    }
}

fn parse_float(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(0.0)
}

/// Reparse a date-like string into a canonical RFC 3339 timestamp.
fn parse_date_like(text: &str) -> Option<String> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).to_rfc3339());
    }

    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&dt).to_rfc3339());
        }
    }

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y", "%m-%d-%Y"];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            let dt = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&dt).to_rfc3339());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules_only(name: &str, sample: &Value) -> Option<ColumnType> {
        RULE_CHAIN.iter().find_map(|rule| rule(name, sample))
    }

    #[test]
    fn null_sample_is_unknown() {
        assert_eq!(rules_only("anything", &Value::Null), Some(ColumnType::Unknown));
    }

    #[test]
    fn native_kinds_pass_through() {
        assert_eq!(rules_only("x", &json!(3.5)), Some(ColumnType::Number));
        assert_eq!(rules_only("x", &json!(true)), Some(ColumnType::Boolean));
    }

    #[test]
    fn date_wins_by_name_or_pattern() {
        assert_eq!(
            rules_only("created_at", &json!("whatever")),
            Some(ColumnType::Date)
        );
        assert_eq!(
            rules_only("col", &json!("2024-01-15")),
            Some(ColumnType::Date)
        );
    }

    #[test]
    fn money_wins_by_keyword_or_currency_pattern() {
        assert_eq!(
            rules_only("unit_price", &json!("whatever")),
            Some(ColumnType::Money)
        );
        assert_eq!(
            rules_only("col", &json!("$1,234.50")),
            Some(ColumnType::Money)
        );
    }

    #[test]
    fn percentage_and_number_rules() {
        assert_eq!(
            rules_only("conversion_rate", &json!("x")),
            Some(ColumnType::Percentage)
        );
        assert_eq!(rules_only("col", &json!("45%")), Some(ColumnType::Percentage));
        assert_eq!(rules_only("customer_id", &json!("x")), Some(ColumnType::Number));
    }

    #[test]
    fn long_strings_are_text() {
        let long = "x".repeat(101);
        assert_eq!(rules_only("notes", &json!(long)), Some(ColumnType::Text));
    }

    #[test]
    fn short_opaque_strings_fall_through_to_llm_tier() {
        assert_eq!(rules_only("col", &json!("maybe")), None);
    }

    #[test]
    fn money_coercion() {
        assert_eq!(
            clean_value(json!("$1,234.50"), ColumnType::Money),
            json!(1234.5)
        );
        assert_eq!(clean_value(json!("abc"), ColumnType::Money), json!(0.0));
    }

    #[test]
    fn percentage_coercion() {
        assert_eq!(
            clean_value(json!("45%"), ColumnType::Percentage),
            json!(0.45)
        );
    }

    #[test]
    fn boolean_coercion() {
        assert_eq!(clean_value(json!("Yes"), ColumnType::Boolean), json!(true));
        assert_eq!(clean_value(json!("no"), ColumnType::Boolean), json!(false));
        assert_eq!(
            clean_value(json!("maybe"), ColumnType::Boolean),
            json!("maybe")
        );
    }

    #[test]
    fn date_coercion_preserves_unparseable_input() {
        assert_eq!(
            clean_value(json!("not a date"), ColumnType::Date),
            json!("not a date")
        );
        let cleaned = clean_value(json!("2024-01-15"), ColumnType::Date);
        assert!(cleaned.as_str().unwrap().starts_with("2024-01-15T00:00:00"));
    }

    #[test]
    fn non_strings_pass_through_regardless_of_type() {
        assert_eq!(clean_value(json!(7), ColumnType::Money), json!(7));
        assert_eq!(clean_value(Value::Null, ColumnType::Number), Value::Null);
    }

    #[test]
    fn type_map_from_first_row_applies_to_all_rows() {
        // Second row has no currency symbol but still takes the money path.
        let mut types = ColumnTypeMap::new();
        types.insert("amount".to_string(), ColumnType::Money);

        let row1: Row = serde_json::from_value(json!({"amount": "$5"})).unwrap();
        let row2: Row = serde_json::from_value(json!({"amount": "5"})).unwrap();

        assert_eq!(clean_row(row1, &types)["amount"], json!(5.0));
        assert_eq!(clean_row(row2, &types)["amount"], json!(5.0));
    }
}

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity class of an alert, derived from detection confidence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// confidence >= 0.85
    Critical,
    /// 0.60 <= confidence < 0.85
    Alert,
    /// 0.20 <= confidence < 0.60
    FalsePositive,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Critical => "critical",
            AlertType::Alert => "alert",
            AlertType::FalsePositive => "false_positive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(AlertType::Critical),
            "alert" => Some(AlertType::Alert),
            "false_positive" => Some(AlertType::FalsePositive),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl sqlx::Type<sqlx::Postgres> for AlertType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("text")
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for AlertType {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for AlertType {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync + 'static>> {
        let text = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        AlertType::parse(&text).ok_or_else(|| format!("unknown alert type: {}", text).into())
    }
}

/// Persisted alert record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Alert {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub label: String,
    pub confidence: f64,
    /// Public path of the backing image, e.g. `/uploads/<file>`
    pub image: String,
    pub gps: String,
    pub gps_url: String,
    /// Wall-clock time at the configured fixed offset, without zone suffix
    pub timestamp: NaiveDateTime,
    pub seen: bool,
}

/// Alert document produced by the classifier, not yet persisted.
/// Has no `seen` flag: every stored alert starts unseen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAlert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub label: String,
    pub confidence: f64,
    pub image: String,
    pub gps: String,
    pub gps_url: String,
    pub timestamp: NaiveDateTime,
}

impl NewAlert {
    pub fn into_alert(self, id: Uuid) -> Alert {
        Alert {
            id,
            alert_type: self.alert_type,
            label: self.label,
            confidence: self.confidence,
            image: self.image,
            gps: self.gps,
            gps_url: self.gps_url,
            timestamp: self.timestamp,
            seen: false,
        }
    }
}

/// Bulk delete filter as sent by clients.
/// Confidence bounds are percentages (0-100).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    #[serde(rename = "type", default)]
    pub alert_type: Option<String>,
    #[serde(rename = "minConfidence", default)]
    pub min_confidence: Option<f64>,
    #[serde(rename = "maxConfidence", default)]
    pub max_confidence: Option<f64>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

/// Normalized filter understood by repositories. Every bound is inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertQuery {
    pub alert_type: Option<String>,
    pub confidence: Option<(f64, f64)>,
    pub timestamp: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl AlertQuery {
    pub fn matches(&self, alert: &Alert) -> bool {
        if let Some(alert_type) = &self.alert_type {
            if alert.alert_type.as_str() != alert_type {
                return false;
            }
        }
        if let Some((min, max)) = self.confidence {
            if alert.confidence < min || alert.confidence > max {
                return false;
            }
        }
        if let Some((from, to)) = self.timestamp {
            if alert.timestamp < from || alert.timestamp > to {
                return false;
            }
        }
        true
    }
}

impl AlertFilter {
    /// Normalize into a repository query. Timestamps with an explicit zone are
    /// shifted into `offset` so they compare against stored wall-clock times.
    /// A date range is only applied when both ends parse.
    pub fn resolve(&self, offset: FixedOffset) -> AlertQuery {
        let alert_type = self
            .alert_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let min = self.min_confidence.unwrap_or(0.0);
        let max = self.max_confidence.unwrap_or(100.0);
        let confidence = if min > 0.0 || max < 100.0 {
            Some((min / 100.0, max / 100.0))
        } else {
            None
        };

        let timestamp = match (self.from.as_deref(), self.to.as_deref()) {
            (Some(from), Some(to)) if !from.is_empty() && !to.is_empty() => {
                match (
                    parse_filter_datetime(from, offset, false),
                    parse_filter_datetime(to, offset, true),
                ) {
                    (Some(from), Some(to)) => Some((from, to)),
                    _ => {
                        log::warn!("Ignoring malformed date filter: from={} to={}", from, to);
                        None
                    }
                }
            }
            _ => None,
        };

        AlertQuery {
            alert_type,
            confidence,
            timestamp,
        }
    }
}

/// Parse an ISO-8601 date or datetime. A bare date maps to the start of the
/// day, or to its last instant when `end_of_day` is set.
fn parse_filter_datetime(
    value: &str,
    offset: FixedOffset,
    end_of_day: bool,
) -> Option<NaiveDateTime> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&offset).naive_local());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)?
    } else {
        NaiveTime::MIN
    };
    Some(date.and_time(time))
}

/// Result of a delete operation: records removed and the image paths whose
/// files were actually removed from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeleteOutcome {
    pub deleted: u64,
    pub files_deleted: Vec<String>,
}

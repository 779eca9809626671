use crate::config::AlertsConfig;
use crate::db::models::{AlertType, NewAlert};
use crate::services::inference::InferenceResult;
use chrono::{Duration, NaiveDateTime, Utc};

pub const CRITICAL_THRESHOLD: f64 = 0.85;
pub const ALERT_THRESHOLD: f64 = 0.60;
/// Minimum confidence for any alert to exist
pub const MIN_CONFIDENCE: f64 = 0.20;

/// Severity for a confidence value. Each lower bound belongs to its class.
pub fn alert_type_for(confidence: f64) -> Option<AlertType> {
    if confidence >= CRITICAL_THRESHOLD {
        Some(AlertType::Critical)
    } else if confidence >= ALERT_THRESHOLD {
        Some(AlertType::Alert)
    } else if confidence >= MIN_CONFIDENCE {
        Some(AlertType::FalsePositive)
    } else {
        None
    }
}

pub fn is_qualifying(confidence: f64) -> bool {
    confidence >= MIN_CONFIDENCE
}

/// Turns inference results into alert documents
#[derive(Debug, Clone)]
pub struct Classifier {
    image_prefix: String,
    map_url_prefix: String,
    utc_offset: Duration,
}

impl Classifier {
    pub fn new(image_prefix: &str, map_url_prefix: &str, utc_offset_hours: i32) -> Self {
        Self {
            image_prefix: image_prefix.trim_end_matches('/').to_string(),
            map_url_prefix: map_url_prefix.to_string(),
            utc_offset: Duration::hours(utc_offset_hours as i64),
        }
    }

    pub fn from_config(config: &AlertsConfig, image_prefix: &str) -> Self {
        Self::new(image_prefix, &config.map_url_prefix, config.utc_offset_hours)
    }

    /// Build the alert for a result, or `None` below the minimum confidence
    pub fn classify(&self, result: &InferenceResult, filename: &str, gps: &str) -> Option<NewAlert> {
        self.classify_at(result, filename, gps, self.now())
    }

    fn classify_at(
        &self,
        result: &InferenceResult,
        filename: &str,
        gps: &str,
        timestamp: NaiveDateTime,
    ) -> Option<NewAlert> {
        let alert_type = alert_type_for(result.confidence)?;

        Some(NewAlert {
            alert_type,
            label: result.label.clone(),
            confidence: result.confidence,
            image: format!("{}/{}", self.image_prefix, filename),
            gps: gps.to_string(),
            gps_url: format!("{}{}", self.map_url_prefix, gps),
            timestamp,
        })
    }

    /// Current wall-clock time at the configured fixed offset
    pub fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc() + self.utc_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new("/uploads", "https://www.google.com/maps?q=", 3)
    }

    fn result(confidence: f64) -> InferenceResult {
        InferenceResult {
            confidence,
            label: "human".to_string(),
        }
    }

    #[test]
    fn thresholds_include_lower_bounds() {
        assert_eq!(alert_type_for(1.0), Some(AlertType::Critical));
        assert_eq!(alert_type_for(0.85), Some(AlertType::Critical));
        assert_eq!(alert_type_for(0.8499), Some(AlertType::Alert));
        assert_eq!(alert_type_for(0.60), Some(AlertType::Alert));
        assert_eq!(alert_type_for(0.5999), Some(AlertType::FalsePositive));
        assert_eq!(alert_type_for(0.20), Some(AlertType::FalsePositive));
        assert_eq!(alert_type_for(0.1999), None);
        assert_eq!(alert_type_for(0.0), None);
        assert_eq!(alert_type_for(f64::NAN), None);
    }

    #[test]
    fn classify_derives_image_and_map_link() {
        let alert = classifier()
            .classify(&result(0.92), "abc.jpg", "24.7,46.7")
            .unwrap();
        assert_eq!(alert.alert_type, AlertType::Critical);
        assert_eq!(alert.label, "human");
        assert_eq!(alert.image, "/uploads/abc.jpg");
        assert_eq!(alert.gps, "24.7,46.7");
        assert_eq!(alert.gps_url, "https://www.google.com/maps?q=24.7,46.7");
    }

    #[test]
    fn classify_below_minimum_is_none() {
        assert!(classifier().classify(&result(0.19), "a.jpg", "1,2").is_none());
    }

    #[test]
    fn timestamp_is_shifted_by_fixed_offset() {
        let before = Utc::now().naive_utc() + Duration::hours(3);
        let alert = classifier().classify(&result(0.7), "a.jpg", "1,2").unwrap();
        let after = Utc::now().naive_utc() + Duration::hours(3);
        assert!(alert.timestamp >= before && alert.timestamp <= after);
    }

    #[test]
    fn trailing_slash_in_prefix_is_normalized() {
        let classifier = Classifier::new("/uploads/", "https://maps/?q=", 0);
        let alert = classifier.classify(&result(0.3), "a.png", "1,2").unwrap();
        assert_eq!(alert.image, "/uploads/a.png");
    }
}

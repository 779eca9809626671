pub mod alert_models;

pub use alert_models::{Alert, AlertFilter, AlertQuery, AlertType, DeleteOutcome, NewAlert};

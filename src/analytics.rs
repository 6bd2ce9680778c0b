//! Pass-through analytics: `contentId` / `artistId` never influence an
//! optimization, they are only forwarded to a sink once it succeeds.

use crate::types::{ContentType, StrategyKey};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    #[serde(rename = "ref")]
    pub reference: String,
    pub content_type: ContentType,
    pub strategy: StrategyKey,
    pub content_id: Option<String>,
    pub artist_id: Option<String>,
    pub original_size: u64,
    pub optimized_size: u64,
    pub size_reduction: f64,
    pub quality_score: f64,
}

pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: &AnalyticsEvent);
}

/// Emits every event as a structured log line
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn record(&self, event: &AnalyticsEvent) {
        info!(
            target: "content_optimizer::analytics",
            reference = %event.reference,
            content_type = %event.content_type,
            strategy = %event.strategy,
            content_id = event.content_id.as_deref().unwrap_or("-"),
            artist_id = event.artist_id.as_deref().unwrap_or("-"),
            size_reduction = event.size_reduction,
            quality_score = event.quality_score,
            "Optimization recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_camel_case() {
        let event = AnalyticsEvent {
            reference: "tracks/1.wav".into(),
            content_type: ContentType::Audio,
            strategy: StrategyKey::Streaming,
            content_id: Some("c-42".into()),
            artist_id: None,
            original_size: 1000,
            optimized_size: 400,
            size_reduction: 60.0,
            quality_score: 78.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["ref"], "tracks/1.wav");
        assert_eq!(json["contentType"], "AUDIO");
        assert_eq!(json["contentId"], "c-42");
        assert!(json["artistId"].is_null());

        // The default sink only logs
        TracingAnalytics.record(&event);
    }
}

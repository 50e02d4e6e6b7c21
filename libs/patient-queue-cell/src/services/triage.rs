use std::sync::Arc;
use async_trait::async_trait;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::{QueueError, UrgencyTier};

#[derive(Debug, Clone, Default)]
pub struct TriageRequest {
    pub symptoms: String,
    pub patient_age: Option<u32>,
    pub pain_level: Option<u8>,
}

/// External urgency classifier (AI service or rules engine). The queue engine
/// never classifies symptoms itself.
#[async_trait]
pub trait TriageClassifier: Send + Sync {
    async fn classify(&self, request: &TriageRequest) -> Result<UrgencyTier, QueueError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierSource {
    Manual,
    Classifier,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTier {
    pub tier: UrgencyTier,
    pub source: TierSource,
}

/// Manual override wins; otherwise ask the classifier within `limit`. Any
/// failure degrades to `fallback` so the admission itself still goes through.
pub async fn resolve_urgency_tier(
    manual_override: Option<&str>,
    classifier: Option<&Arc<dyn TriageClassifier>>,
    request: &TriageRequest,
    limit: Duration,
    fallback: UrgencyTier,
) -> ResolvedTier {
    if let Some(label) = manual_override.filter(|l| !l.trim().is_empty()) {
        let tier = UrgencyTier::from_urgency_label(label);
        debug!("Urgency manually set to {}", tier.name());
        return ResolvedTier { tier, source: TierSource::Manual };
    }

    let Some(classifier) = classifier else {
        debug!("No triage classifier configured, using {} tier", fallback.name());
        return ResolvedTier { tier: fallback, source: TierSource::Fallback };
    };

    match timeout(limit, classifier.classify(request)).await {
        Ok(Ok(tier)) => ResolvedTier { tier, source: TierSource::Classifier },
        Ok(Err(e)) => {
            warn!("Triage classification failed, using {} tier: {}", fallback.name(), e);
            ResolvedTier { tier: fallback, source: TierSource::Fallback }
        }
        Err(_) => {
            warn!(
                "Triage classification timed out after {}ms, using {} tier",
                limit.as_millis(),
                fallback.name()
            );
            ResolvedTier { tier: fallback, source: TierSource::Fallback }
        }
    }
}

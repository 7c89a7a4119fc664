//! Router Module
//!
//! Confidence-based routing between the local student and a cloud model.
//! The core only records the decision as an informational tag on the
//! trajectory; actually dispatching to a cloud backend is the external
//! router's job, as is maintaining the cache file.

use crate::config::RouterConfig;

pub struct ConfidenceRouter {
    enable: bool,
    cloud_threshold: f64,
    local_threshold: f64,
}

impl ConfidenceRouter {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            enable: config.enable,
            cloud_threshold: config.cloud_confidence_threshold,
            local_threshold: config.local_confidence_threshold,
        }
    }

    pub fn should_use_local(&self, confidence: f64) -> bool {
        if !self.enable {
            return false;
        }
        confidence >= self.local_threshold
    }

    pub fn should_escalate_cloud(&self, confidence: f64) -> bool {
        confidence < self.cloud_threshold
    }

    /// Routing tag for a confidence estimate. Disabled routing always
    /// reports "local".
    pub fn route(&self, confidence: f64) -> &'static str {
        if !self.enable {
            return "local";
        }
        if self.should_use_local(confidence) {
            "local"
        } else if self.should_escalate_cloud(confidence) {
            "cloud"
        } else {
            "local"
        }
    }
}

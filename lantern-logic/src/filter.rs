use serde::{Deserialize, Serialize};

use crate::feature::FeatureProperties;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, specta::Type)]
/// Display filter for sightings, `None` fields match everything
pub struct SightingFilter {
    pub eradication_status: Option<String>,
    pub visit_type: Option<String>,
}

impl SightingFilter {
    pub fn is_empty(&self) -> bool {
        self.eradication_status.is_none() && self.visit_type.is_none()
    }

    pub fn matches(&self, props: &FeatureProperties) -> bool {
        let status_ok = self
            .eradication_status
            .as_ref()
            .is_none_or(|s| s.eq_ignore_ascii_case(&props.eradication_status));
        let visit_ok = self
            .visit_type
            .as_ref()
            .is_none_or(|v| v.eq_ignore_ascii_case(&props.visit_type));
        status_ok && visit_ok
    }
}

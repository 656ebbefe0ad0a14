use std::sync::Arc;

use hyper::header::{HeaderMap, HeaderValue};
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use super::{HeaderKind, HeaderPolicy, RequiredHeader, INVALID_HEADER_VALUE, VERSION_NUMBER_FORMAT};

/// Builds request header sets under the policy's corruption percentages
#[derive(Debug, Clone)]
pub struct HeaderFactory {
    policy: Arc<HeaderPolicy>,
}

impl HeaderFactory {
    pub fn new(policy: Arc<HeaderPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &HeaderPolicy {
        &self.policy
    }

    /// Build a fresh header set.
    ///
    /// Each required header is dropped with probability
    /// `broken_headers_percent / 100`; surviving values are replaced by
    /// [`INVALID_HEADER_VALUE`] with probability `invalid_headers_percent / 100`.
    /// Passthrough headers are copied from `base` and skipped when it lacks them.
    pub fn build<R: Rng + ?Sized>(&self, base: &HeaderMap, rng: &mut R) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for header in self.policy.required() {
            if rng.gen_range(0..100) < self.policy.broken_headers_percent() {
                continue;
            }

            let value = match self.generate_value(header, base, rng) {
                Some(value) => value,
                None => continue,
            };

            let value = if rng.gen_range(0..100) < self.policy.invalid_headers_percent() {
                HeaderValue::from_static(INVALID_HEADER_VALUE)
            } else {
                value
            };

            headers.insert(header.name.clone(), value);
        }

        headers
    }

    fn generate_value<R: Rng + ?Sized>(
        &self,
        header: &RequiredHeader,
        base: &HeaderMap,
        rng: &mut R,
    ) -> Option<HeaderValue> {
        match header.kind {
            HeaderKind::SourceTag => Some(self.policy.source_tag().clone()),
            HeaderKind::DataType => self.policy.data_types().choose(rng).cloned(),
            HeaderKind::VersionId => HeaderValue::from_str(&Uuid::new_v4().to_string()).ok(),
            HeaderKind::VersionNumber => {
                let stamp = chrono::Local::now().format(VERSION_NUMBER_FORMAT).to_string();
                HeaderValue::from_str(&stamp).ok()
            }
            HeaderKind::PreSharedKey => self
                .policy
                .keys()
                .choose(rng)
                .and_then(|key| HeaderValue::from_str(key).ok()),
            HeaderKind::Passthrough => base.get(&header.name).cloned(),
        }
    }
}

//! Job instance entity
//!
//! A `JobInstance` is the immutable identity record for "this job, run with
//! these exact parameters". It is created exactly once per (job name, job
//! key) pair and never mutated afterwards, which is why its version is
//! pinned at 0.

use serde::{Deserialize, Serialize};

use crate::parameters::JobParameters;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInstance {
    /// Sequence-assigned identifier, immutable.
    pub id: i64,
    pub job_name: String,
    pub parameters: JobParameters,
    /// Fingerprint of `parameters`; with `job_name` this is the sole
    /// uniqueness discriminator for instance identity.
    pub job_key: String,
    /// Always 0; instances are never updated post-creation.
    pub version: i32,
}

impl JobInstance {
    pub fn new(id: i64, job_name: impl Into<String>, parameters: JobParameters) -> Self {
        let job_key = parameters.job_key();
        Self {
            id,
            job_name: job_name.into(),
            parameters,
            job_key,
            version: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_derives_key_and_starts_at_version_zero() {
        let params = JobParameters::new().with_string("region", "emea");
        let instance = JobInstance::new(42, "nightly-import", params.clone());

        assert_eq!(instance.id, 42);
        assert_eq!(instance.job_name, "nightly-import");
        assert_eq!(instance.job_key, params.job_key());
        assert_eq!(instance.version, 0);
    }
}

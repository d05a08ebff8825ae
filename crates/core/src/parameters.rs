//! Job parameters and the job key fingerprint
//!
//! A parameter set identifies a logical job run together with the job name.
//! The identity check works on a deterministic 128-bit fingerprint of the
//! parameter map, so insertion order of the map never matters.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single typed job parameter value.
///
/// Dates are canonicalized to epoch milliseconds, the resolution the
/// document store keeps for timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobParameter {
    String(String),
    Long(i64),
    Double(f64),
    Date(DateTime<Utc>),
}

impl JobParameter {
    /// Canonical string form used by the key fingerprint.
    pub fn canonical(&self) -> String {
        match self {
            JobParameter::String(s) => s.clone(),
            JobParameter::Long(v) => v.to_string(),
            JobParameter::Double(v) => v.to_string(),
            JobParameter::Date(d) => d.timestamp_millis().to_string(),
        }
    }
}

impl fmt::Display for JobParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// An ordered-irrelevant mapping from parameter name to typed value.
///
/// Backed by a sorted map so iteration is already in the lexicographic key
/// order the fingerprint requires.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobParameters {
    params: BTreeMap<String, JobParameter>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .insert(key.into(), JobParameter::String(value.into()));
        self
    }

    pub fn with_long(mut self, key: impl Into<String>, value: i64) -> Self {
        self.params.insert(key.into(), JobParameter::Long(value));
        self
    }

    pub fn with_double(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), JobParameter::Double(value));
        self
    }

    pub fn with_date(mut self, key: impl Into<String>, value: DateTime<Utc>) -> Self {
        self.params.insert(key.into(), JobParameter::Date(value));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JobParameter) {
        self.params.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&JobParameter> {
        self.params.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Iterate entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &JobParameter)> {
        self.params.iter()
    }

    /// Compute the deterministic fingerprint of this parameter set.
    ///
    /// Keys are concatenated ascending as `key=value;` pairs using each
    /// value's canonical form, and the UTF-8 bytes are hashed with MD5,
    /// rendered as 32 lowercase hex characters. This is an identity
    /// discriminator, not a cryptographic guarantee; collisions are an
    /// accepted residual risk.
    pub fn job_key(&self) -> String {
        let mut concatenated = String::new();
        for (key, value) in &self.params {
            concatenated.push_str(key);
            concatenated.push('=');
            concatenated.push_str(&value.canonical());
            concatenated.push(';');
        }

        let digest = Md5::digest(concatenated.as_bytes());
        hex::encode(digest)
    }
}

impl FromIterator<(String, JobParameter)> for JobParameters {
    fn from_iter<T: IntoIterator<Item = (String, JobParameter)>>(iter: T) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch_millis(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn job_key_is_32_lowercase_hex_chars() {
        let key = JobParameters::new()
            .with_string("job.key", "jobKey")
            .job_key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn job_key_ignores_insertion_order() {
        let ordered = JobParameters::new()
            .with_string("alpha", "1")
            .with_long("beta", 2)
            .with_double("gamma", 3.5)
            .with_date("delta", epoch_millis(7));
        let shuffled = JobParameters::new()
            .with_date("delta", epoch_millis(7))
            .with_double("gamma", 3.5)
            .with_string("alpha", "1")
            .with_long("beta", 2);

        assert_eq!(ordered.job_key(), shuffled.job_key());
    }

    #[test]
    fn job_key_differs_when_a_value_differs() {
        let base = JobParameters::new().with_string("alpha", "1").with_long("beta", 2);
        let other = JobParameters::new().with_string("alpha", "1").with_long("beta", 3);
        assert_ne!(base.job_key(), other.job_key());
    }

    #[test]
    fn job_key_differs_when_a_key_differs() {
        let base = JobParameters::new().with_string("alpha", "1");
        let other = JobParameters::new().with_string("alphb", "1");
        assert_ne!(base.job_key(), other.job_key());
    }

    #[test]
    fn empty_parameter_set_has_a_stable_key() {
        // MD5 of the empty string
        assert_eq!(
            JobParameters::new().job_key(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn canonical_forms() {
        assert_eq!(JobParameter::Long(1).canonical(), "1");
        assert_eq!(JobParameter::Double(7.7).canonical(), "7.7");
        assert_eq!(JobParameter::String("x".into()).canonical(), "x");
        assert_eq!(JobParameter::Date(epoch_millis(7)).canonical(), "7");
    }
}

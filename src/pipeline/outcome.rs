//! Per-entry submission outcome.

use crate::client::{b64, SignedCertificateTimestamp};
use crate::entry::EntryClass;
use serde::{Deserialize, Serialize};

/// Result of submitting one entry to the destination log.
///
/// `succeeded` holds exactly when an SCT is present and no error message is;
/// the constructors and the deserializer both enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OutcomeRecord", into = "OutcomeRecord")]
pub struct Outcome {
    index: u64,
    class: EntryClass,
    certificate_der: Vec<u8>,
    result: Result<SignedCertificateTimestamp, String>,
}

impl Outcome {
    pub fn success(
        index: u64,
        class: EntryClass,
        certificate_der: Vec<u8>,
        sct: SignedCertificateTimestamp,
    ) -> Self {
        Self {
            index,
            class,
            certificate_der,
            result: Ok(sct),
        }
    }

    pub fn failure(
        index: u64,
        class: EntryClass,
        certificate_der: Vec<u8>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            index,
            class,
            certificate_der,
            result: Err(error_message.into()),
        }
    }

    /// Source log index of the entry.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn class(&self) -> EntryClass {
        self.class
    }

    /// DER of the submitted leaf (certificate or precertificate).
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn proof_token(&self) -> Option<&SignedCertificateTimestamp> {
        self.result.as_ref().ok()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }
}

/// On-disk shape of an [`Outcome`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OutcomeRecord {
    index: u64,
    class: EntryClass,
    #[serde(with = "b64")]
    certificate_der: Vec<u8>,
    succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proof_token: Option<SignedCertificateTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl From<Outcome> for OutcomeRecord {
    fn from(o: Outcome) -> Self {
        let succeeded = o.result.is_ok();
        let (proof_token, error_message) = match o.result {
            Ok(sct) => (Some(sct), None),
            Err(msg) => (None, Some(msg)),
        };
        Self {
            index: o.index,
            class: o.class,
            certificate_der: o.certificate_der,
            succeeded,
            proof_token,
            error_message,
        }
    }
}

impl TryFrom<OutcomeRecord> for Outcome {
    type Error = String;

    fn try_from(r: OutcomeRecord) -> Result<Self, Self::Error> {
        let result = match (r.succeeded, r.proof_token, r.error_message) {
            (true, Some(sct), None) => Ok(sct),
            (false, None, Some(msg)) => Err(msg),
            (succeeded, token, msg) => {
                return Err(format!(
                    "inconsistent outcome for index {}: succeeded={} proof_token={} error_message={}",
                    r.index,
                    succeeded,
                    token.is_some(),
                    msg.is_some()
                ))
            }
        };
        Ok(Self {
            index: r.index,
            class: r.class,
            certificate_der: r.certificate_der,
            result,
        })
    }
}

//! Just enough DER to pull the subject common name and `notAfter` out of a
//! certificate or TBSCertificate.
//!
//! Failures here never stop an entry from being submitted; the log accepts or
//! rejects the DER on its own terms.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

const TAG_INTEGER: u8 = 0x02;
const TAG_OID: u8 = 0x06;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_GENERALIZED_TIME: u8 = 0x18;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_EXPLICIT_VERSION: u8 = 0xA0;

/// id-at-commonName (2.5.4.3)
const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];

/// Non-fatal certificate decoding problem.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DerError {
    #[error("DER truncated at offset {0}")]
    Truncated(usize),

    #[error("unexpected tag 0x{found:02x} for {field}, wanted 0x{wanted:02x}")]
    UnexpectedTag {
        field: &'static str,
        wanted: u8,
        found: u8,
    },

    #[error("unsupported DER length encoding")]
    BadLength,

    #[error("invalid time value {0:?}")]
    BadTime(String),
}

struct Tlv<'a> {
    tag: u8,
    value: &'a [u8],
}

struct DerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn peek_tag(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn read_tlv(&mut self) -> Result<Tlv<'a>, DerError> {
        let tag = *self.buf.get(self.pos).ok_or(DerError::Truncated(self.pos))?;
        let first = *self.buf.get(self.pos + 1).ok_or(DerError::Truncated(self.pos + 1))?;
        let mut cursor = self.pos + 2;
        let len = if first & 0x80 == 0 {
            usize::from(first)
        } else {
            let n = usize::from(first & 0x7F);
            if n == 0 || n > 4 {
                return Err(DerError::BadLength);
            }
            let bytes = self
                .buf
                .get(cursor..cursor + n)
                .ok_or(DerError::Truncated(cursor))?;
            cursor += n;
            bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b))
        };
        let value = self
            .buf
            .get(cursor..cursor + len)
            .ok_or(DerError::Truncated(cursor))?;
        self.pos = cursor + len;
        Ok(Tlv { tag, value })
    }

    fn expect(&mut self, field: &'static str, wanted: u8) -> Result<&'a [u8], DerError> {
        let tlv = self.read_tlv()?;
        if tlv.tag != wanted {
            return Err(DerError::UnexpectedTag {
                field,
                wanted,
                found: tlv.tag,
            });
        }
        Ok(tlv.value)
    }
}

/// The parts of a TBSCertificate the pipeline logs and routes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TbsSummary {
    pub subject_cn: Option<String>,
    pub not_after: DateTime<Utc>,
}

/// Summarise a full X.509 certificate.
pub fn summarize_certificate(cert_der: &[u8]) -> Result<TbsSummary, DerError> {
    let mut outer = DerReader::new(cert_der);
    let cert = outer.expect("Certificate", TAG_SEQUENCE)?;
    let mut inner = DerReader::new(cert);
    let tbs = inner.read_tlv()?;
    if tbs.tag != TAG_SEQUENCE {
        return Err(DerError::UnexpectedTag {
            field: "tbsCertificate",
            wanted: TAG_SEQUENCE,
            found: tbs.tag,
        });
    }
    summarize_tbs_contents(tbs.value)
}

/// Summarise a bare TBSCertificate, as carried in a precert leaf.
pub fn summarize_tbs(tbs_der: &[u8]) -> Result<TbsSummary, DerError> {
    let mut outer = DerReader::new(tbs_der);
    let tbs = outer.expect("TBSCertificate", TAG_SEQUENCE)?;
    summarize_tbs_contents(tbs)
}

fn summarize_tbs_contents(tbs: &[u8]) -> Result<TbsSummary, DerError> {
    let mut r = DerReader::new(tbs);
    if r.peek_tag() == Some(TAG_EXPLICIT_VERSION) {
        r.read_tlv()?;
    }
    r.expect("serialNumber", TAG_INTEGER)?;
    r.expect("signature", TAG_SEQUENCE)?;
    r.expect("issuer", TAG_SEQUENCE)?;
    let validity = r.expect("validity", TAG_SEQUENCE)?;
    let subject = r.expect("subject", TAG_SEQUENCE)?;

    let mut v = DerReader::new(validity);
    v.read_tlv()?;
    let not_after = parse_time(v.read_tlv()?)?;

    Ok(TbsSummary {
        subject_cn: common_name(subject)?,
        not_after,
    })
}

fn common_name(name: &[u8]) -> Result<Option<String>, DerError> {
    let mut rdns = DerReader::new(name);
    while !rdns.is_empty() {
        let set = rdns.expect("RelativeDistinguishedName", TAG_SET)?;
        let mut attrs = DerReader::new(set);
        while !attrs.is_empty() {
            let atv = attrs.expect("AttributeTypeAndValue", TAG_SEQUENCE)?;
            let mut fields = DerReader::new(atv);
            let oid = fields.expect("AttributeType", TAG_OID)?;
            if oid == OID_COMMON_NAME {
                let value = fields.read_tlv()?;
                return Ok(Some(String::from_utf8_lossy(value.value).into_owned()));
            }
        }
    }
    Ok(None)
}

fn parse_time(tlv: Tlv<'_>) -> Result<DateTime<Utc>, DerError> {
    let text = std::str::from_utf8(tlv.value).map_err(|_| DerError::BadTime(format!("{:?}", tlv.value)))?;
    let full = match tlv.tag {
        TAG_UTC_TIME => {
            let yy: u32 = text
                .get(0..2)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| DerError::BadTime(text.to_string()))?;
            let century = if yy >= 50 { "19" } else { "20" };
            format!("{}{}", century, text)
        }
        TAG_GENERALIZED_TIME => text.to_string(),
        found => {
            return Err(DerError::UnexpectedTag {
                field: "notAfter",
                wanted: TAG_UTC_TIME,
                found,
            })
        }
    };
    NaiveDateTime::parse_from_str(&full, "%Y%m%d%H%M%SZ")
        .map(|t| t.and_utc())
        .map_err(|_| DerError::BadTime(text.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal DER encoders for building synthetic certificates in tests.

    fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        let len = value.len();
        if len < 0x80 {
            out.push(len as u8);
        } else if len <= 0xFF {
            out.extend_from_slice(&[0x81, len as u8]);
        } else {
            out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
        }
        out.extend_from_slice(value);
        out
    }

    fn name(cn: &str) -> Vec<u8> {
        let mut atv = tlv(0x06, &[0x55, 0x04, 0x03]);
        atv.extend_from_slice(&tlv(0x0C, cn.as_bytes()));
        let set = tlv(0x31, &tlv(0x30, &atv));
        tlv(0x30, &set)
    }

    /// TBSCertificate with the given subject CN and UTCTime notAfter (`YYMMDDHHMMSSZ`).
    pub fn tbs(cn: &str, not_after: &str) -> Vec<u8> {
        let mut body = tlv(0xA0, &tlv(0x02, &[2]));
        body.extend_from_slice(&tlv(0x02, &[0x01, 0x23]));
        body.extend_from_slice(&tlv(0x30, &tlv(0x06, &[0x2A, 0x86, 0x48])));
        body.extend_from_slice(&name("Test Issuer"));
        let mut validity = tlv(0x17, b"200101000000Z");
        validity.extend_from_slice(&tlv(0x17, not_after.as_bytes()));
        body.extend_from_slice(&tlv(0x30, &validity));
        body.extend_from_slice(&name(cn));
        body.extend_from_slice(&tlv(0x30, &[]));
        tlv(0x30, &body)
    }

    /// Certificate wrapping [`tbs`] with a dummy signature.
    pub fn certificate(cn: &str, not_after: &str) -> Vec<u8> {
        let mut body = tbs(cn, not_after);
        body.extend_from_slice(&tlv(0x30, &tlv(0x06, &[0x2A, 0x86, 0x48])));
        body.extend_from_slice(&tlv(0x03, &[0x00, 0xDE, 0xAD]));
        tlv(0x30, &body)
    }
}

//! TLS presentation-language decoding for RFC 6962 log leaves.
//!
//! ```text
//! struct {
//!     Version version;                    // u8, v1 = 0
//!     MerkleLeafType leaf_type;           // u8, timestamped_entry = 0
//!     uint64 timestamp;
//!     LogEntryType entry_type;            // u16, x509 = 0, precert = 1
//!     select (entry_type) {
//!         case x509_entry: ASN.1Cert;                      // opaque<1..2^24-1>
//!         case precert_entry: opaque issuer_key_hash[32];
//!                             TBSCertificate;              // opaque<1..2^24-1>
//!     };
//!     CtExtensions extensions;            // opaque<0..2^16-1>
//! } MerkleTreeLeaf;
//! ```

use super::{EntryType, ParseError};

const LEAF_VERSION_V1: u8 = 0;
const LEAF_TYPE_TIMESTAMPED_ENTRY: u8 = 0;
const ISSUER_KEY_HASH_LEN: usize = 32;

/// Cursor over a TLS-encoded byte slice.
pub(crate) struct TlsReader<'a> {
    buf: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> TlsReader<'a> {
    pub(crate) fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, pos: 0, what }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let out = &self.buf[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(ParseError::Truncated {
                what: self.what,
                offset: self.pos,
                wanted: n,
            }),
        }
    }

    fn read_uint(&mut self, width: usize) -> Result<u64, ParseError> {
        let bytes = self.take(width)?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ParseError> {
        Ok(self.read_uint(2)? as u16)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, ParseError> {
        self.read_uint(8)
    }

    pub(crate) fn read_fixed(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        self.take(n)
    }

    /// Read a variable-length vector with a `len_width`-byte length prefix.
    pub(crate) fn read_opaque(&mut self, len_width: usize) -> Result<&'a [u8], ParseError> {
        let len = self.read_uint(len_width)? as usize;
        self.take(len)
    }

    /// Read `ASN.1Cert<0..2^24-1>` as a list of certificates.
    pub(crate) fn read_cert_list(&mut self) -> Result<Vec<Vec<u8>>, ParseError> {
        let list = self.read_opaque(3)?;
        let mut inner = TlsReader::new(list, self.what);
        let mut certs = Vec::new();
        while !inner.is_empty() {
            let cert = inner.read_opaque(3)?;
            if cert.is_empty() {
                return Err(ParseError::EmptyCertificate { what: self.what });
            }
            certs.push(cert.to_vec());
        }
        Ok(certs)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn finish(self) -> Result<(), ParseError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ParseError::TrailingData {
                what: self.what,
                remaining: self.buf.len() - self.pos,
            })
        }
    }
}

/// Decoded `MerkleTreeLeaf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MerkleTreeLeaf<'a> {
    pub timestamp: u64,
    pub entry: LeafEntry<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LeafEntry<'a> {
    X509 { cert: &'a [u8] },
    Precert { tbs_certificate: &'a [u8] },
}

/// Read only the header of a leaf, far enough to learn its entry type.
pub(crate) fn peek_entry_type(leaf_input: &[u8]) -> Result<EntryType, ParseError> {
    let mut r = TlsReader::new(leaf_input, "leaf_input");
    let (_, entry_type) = read_header(&mut r)?;
    Ok(entry_type)
}

/// Version, leaf type, timestamp and entry type.
fn read_header(r: &mut TlsReader<'_>) -> Result<(u64, EntryType), ParseError> {
    let version = r.read_u8()?;
    if version != LEAF_VERSION_V1 {
        return Err(ParseError::UnsupportedVersion(version));
    }
    let leaf_type = r.read_u8()?;
    if leaf_type != LEAF_TYPE_TIMESTAMPED_ENTRY {
        return Err(ParseError::UnknownLeafType(leaf_type));
    }
    let timestamp = r.read_u64()?;
    let entry_type = EntryType::from(r.read_u16()?);
    Ok((timestamp, entry_type))
}

pub(crate) fn parse_leaf(leaf_input: &[u8]) -> Result<MerkleTreeLeaf<'_>, ParseError> {
    let mut r = TlsReader::new(leaf_input, "leaf_input");
    let (timestamp, entry_type) = read_header(&mut r)?;
    let entry = match entry_type {
        EntryType::X509 => {
            let cert = r.read_opaque(3)?;
            if cert.is_empty() {
                return Err(ParseError::EmptyCertificate { what: "leaf_input" });
            }
            LeafEntry::X509 { cert }
        }
        EntryType::Precert => {
            // The destination log recomputes the issuer key hash from the chain.
            r.read_fixed(ISSUER_KEY_HASH_LEN)?;
            let tbs_certificate = r.read_opaque(3)?;
            if tbs_certificate.is_empty() {
                return Err(ParseError::EmptyCertificate { what: "leaf_input" });
            }
            LeafEntry::Precert { tbs_certificate }
        }
        EntryType::Unknown(other) => return Err(ParseError::UnknownEntryType(other)),
    };
    // CtExtensions; contents are not interpreted.
    r.read_opaque(2)?;
    r.finish()?;
    Ok(MerkleTreeLeaf { timestamp, entry })
}

/// `certificate_chain` extra data for an x509 entry.
pub(crate) fn parse_x509_extra(extra_data: &[u8]) -> Result<Vec<Vec<u8>>, ParseError> {
    let mut r = TlsReader::new(extra_data, "extra_data");
    let chain = r.read_cert_list()?;
    r.finish()?;
    Ok(chain)
}

/// `PrecertChainEntry` extra data: the submitted precertificate and its chain.
pub(crate) fn parse_precert_extra(extra_data: &[u8]) -> Result<(Vec<u8>, Vec<Vec<u8>>), ParseError> {
    let mut r = TlsReader::new(extra_data, "extra_data");
    let submitted = r.read_opaque(3)?;
    if submitted.is_empty() {
        return Err(ParseError::EmptyCertificate { what: "extra_data" });
    }
    let chain = r.read_cert_list()?;
    r.finish()?;
    Ok((submitted.to_vec(), chain))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Builders for TLS-encoded leaves used across the crate's tests.

    fn push_u24(out: &mut Vec<u8>, len: usize) {
        out.extend_from_slice(&(len as u32).to_be_bytes()[1..]);
    }

    fn push_opaque24(out: &mut Vec<u8>, data: &[u8]) {
        push_u24(out, data.len());
        out.extend_from_slice(data);
    }

    fn cert_list(certs: &[&[u8]]) -> Vec<u8> {
        let mut body = Vec::new();
        for c in certs {
            push_opaque24(&mut body, c);
        }
        let mut out = Vec::new();
        push_opaque24(&mut out, &body);
        out
    }

    fn header(entry_type: u16, timestamp: u64) -> Vec<u8> {
        let mut out = vec![0u8, 0u8];
        out.extend_from_slice(&timestamp.to_be_bytes());
        out.extend_from_slice(&entry_type.to_be_bytes());
        out
    }

    pub fn x509_leaf(cert: &[u8], timestamp: u64) -> Vec<u8> {
        let mut out = header(0, timestamp);
        push_opaque24(&mut out, cert);
        out.extend_from_slice(&[0, 0]);
        out
    }

    pub fn precert_leaf(tbs: &[u8], timestamp: u64) -> Vec<u8> {
        let mut out = header(1, timestamp);
        out.extend_from_slice(&[0xAB; 32]);
        push_opaque24(&mut out, tbs);
        out.extend_from_slice(&[0, 0]);
        out
    }

    pub fn x509_extra(chain: &[&[u8]]) -> Vec<u8> {
        cert_list(chain)
    }

    pub fn precert_extra(submitted: &[u8], chain: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        push_opaque24(&mut out, submitted);
        out.extend_from_slice(&cert_list(chain));
        out
    }
}

//! Provenance records and their self-referential `BOS_PROV` digest

use crate::error::{ArtifactError, ArtifactResult};
use crate::hash::sha256_hex;
use serde_json::{Map, Value};
use std::fmt::Write;

/// Field holding the digest of every other field
pub const BOS_PROV: &str = "BOS_PROV";

/// Where a package's source came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInfo {
    /// Upstream tarball pinned by digest (may be empty for unpinned sources)
    Sha256(String),
    /// Source vendored into the tree, identified by label
    Vendor(String),
}

impl Default for SourceInfo {
    fn default() -> Self {
        Self::Sha256(String::new())
    }
}

/// Identity of the package being stamped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub kind: String,
    pub target: String,
    pub source_url: String,
    pub source: SourceInfo,
    pub graph_hash: String,
    pub use_flags: Vec<String>,
}

/// Volatile build facts, only recorded for SLSA-style attestation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub time: String,
    pub host: String,
}

impl BuildInfo {
    /// Current UTC time and this machine's hostname
    pub fn capture() -> Self {
        Self {
            time: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            host: hostname().unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

fn hostname() -> Option<String> {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|name| !name.is_empty())
}

/// One line of a provenance ledger.
///
/// Fields are kept as a sorted JSON object so that records written by other
/// tools round-trip without losing unknown keys.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvenanceRecord {
    fields: Map<String, Value>,
}

impl ProvenanceRecord {
    /// Build a record and seal it with `BOS_PROV`.
    ///
    /// With `build` present, `buildTime` and `buildHost` are covered by the
    /// digest, so two otherwise identical builds no longer match.
    pub fn new(info: &PackageInfo, build: Option<&BuildInfo>) -> Self {
        let mut use_flags = info.use_flags.clone();
        use_flags.sort();

        let mut fields = Map::new();
        fields.insert("name".into(), info.name.clone().into());
        fields.insert("version".into(), info.version.clone().into());
        fields.insert("type".into(), info.kind.clone().into());
        fields.insert("target".into(), info.target.clone().into());
        fields.insert("sourceUrl".into(), info.source_url.clone().into());
        match &info.source {
            SourceInfo::Sha256(sha) => fields.insert("sourceSha256".into(), sha.clone().into()),
            SourceInfo::Vendor(label) => fields.insert("vendor".into(), label.clone().into()),
        };
        fields.insert("graphHash".into(), info.graph_hash.clone().into());
        fields.insert("useFlags".into(), use_flags.into());

        if let Some(build) = build {
            fields.insert("buildTime".into(), build.time.clone().into());
            fields.insert("buildHost".into(), build.host.clone().into());
        }

        let mut record = Self { fields };
        let digest = record.expected_bos_prov();
        record.fields.insert(BOS_PROV.into(), digest.into());
        record
    }

    /// Parse a ledger line
    pub fn parse(line: &str) -> ArtifactResult<Self> {
        match serde_json::from_str::<Value>(line.trim())? {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(ArtifactError::User(format!(
                "provenance record is not a JSON object: {}",
                other
            ))),
        }
    }

    /// String field, if present and a string
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Ledger dedup key, `name|version`
    pub fn key(&self) -> String {
        dedup_key(self.get("name").unwrap_or(""), self.get("version").unwrap_or(""))
    }

    pub fn bos_prov(&self) -> Option<&str> {
        self.get(BOS_PROV)
    }

    /// Digest of the canonical form of every field except `BOS_PROV`
    pub fn expected_bos_prov(&self) -> String {
        let mut covered = self.fields.clone();
        covered.remove(BOS_PROV);
        sha256_hex(canonical_json(&covered).as_bytes())
    }

    /// Whether the stored `BOS_PROV` matches the other fields
    pub fn verify(&self) -> bool {
        self.bos_prov() == Some(self.expected_bos_prov().as_str())
    }

    /// Canonical single-line form, as written to the ledger and ELF section
    pub fn to_line(&self) -> String {
        canonical_json(&self.fields)
    }
}

fn dedup_key(name: &str, version: &str) -> String {
    format!("{}|{}", name, version)
}

/// Compact JSON with sorted keys and non-ASCII characters escaped.
///
/// Escaping as `\uXXXX` keeps digests stable across ASCII-only JSON
/// writers, so ledgers sealed elsewhere still verify.
pub fn canonical_json(fields: &Map<String, Value>) -> String {
    // serde_json's Map is ordered by key unless `preserve_order` is enabled
    let compact = Value::Object(fields.clone()).to_string();
    escape_non_ascii(&compact)
}

fn escape_non_ascii(json: &str) -> String {
    if json.is_ascii() {
        return json.to_string();
    }
    let mut out = String::with_capacity(json.len() + 16);
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units) {
            let _ = write!(out, "\\u{:04x}", unit);
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn bash() -> PackageInfo {
        PackageInfo {
            name: "bash".to_string(),
            version: "5.3".to_string(),
            kind: "autotools".to_string(),
            target: "//packages/core:bash".to_string(),
            source_url: "https://ftp.gnu.org/gnu/bash/bash-5.3.tar.gz".to_string(),
            source: SourceInfo::Sha256("abc123".to_string()),
            graph_hash: "deadbeef".repeat(8),
            use_flags: vec!["readline".to_string(), "nls".to_string()],
        }
    }

    #[test]
    fn record_fields_and_seal() {
        let record = ProvenanceRecord::new(&bash(), None);
        assert_eq!(record.get("name"), Some("bash"));
        assert_eq!(record.get("type"), Some("autotools"));
        assert_eq!(record.get("sourceSha256"), Some("abc123"));
        assert_eq!(record.fields()["useFlags"], serde_json::json!(["nls", "readline"]));
        assert!(record.get("buildTime").is_none());
        assert_eq!(record.bos_prov().map(str::len), Some(64));
        assert!(record.verify());
    }

    #[test]
    fn canonical_line_is_sorted_and_compact() {
        let line = ProvenanceRecord::new(&bash(), None).to_line();
        assert!(line.starts_with("{\"BOS_PROV\":\""));
        assert!(line.contains("\"graphHash\":\"deadbeef"));
        assert!(!line.contains(": "));
        assert!(!line.contains(", "));
    }

    #[test]
    fn tampering_breaks_the_seal() {
        let record = ProvenanceRecord::new(&bash(), None);
        let tampered = record.to_line().replace("\"5.3\"", "\"5.4\"");
        assert!(!ProvenanceRecord::parse(&tampered).unwrap().verify());
        assert!(ProvenanceRecord::parse(&record.to_line()).unwrap().verify());
    }

    #[test]
    fn flags_change_the_seal() {
        let mut other = bash();
        other.use_flags = vec!["readline".to_string()];
        assert_ne!(
            ProvenanceRecord::new(&bash(), None).bos_prov(),
            ProvenanceRecord::new(&other, None).bos_prov()
        );
    }

    #[test]
    fn vendored_source_uses_vendor_field() {
        let mut info = bash();
        info.source = SourceInfo::Vendor("buckos:vendor:bash".to_string());
        let record = ProvenanceRecord::new(&info, None);
        assert_eq!(record.get("vendor"), Some("buckos:vendor:bash"));
        assert!(record.get("sourceSha256").is_none());
    }

    #[test]
    fn build_info_is_sealed() {
        let build = BuildInfo {
            time: "2026-01-01T00:00:00Z".to_string(),
            host: "builder-7".to_string(),
        };
        let record = ProvenanceRecord::new(&bash(), Some(&build));
        assert_eq!(record.get("buildHost"), Some("builder-7"));
        assert!(record.verify());
        assert_ne!(record.bos_prov(), ProvenanceRecord::new(&bash(), None).bos_prov());
    }

    #[test]
    fn captured_build_info_has_utc_timestamp() {
        let build = BuildInfo::capture();
        assert_eq!(build.time.len(), 20);
        assert!(build.time.ends_with('Z'));
        assert!(!build.host.is_empty());
    }

    #[test]
    fn hostname_is_never_blank() {
        if let Some(name) = hostname() {
            assert!(!name.is_empty());
            assert!(!name.contains('\0'));
        }
    }

    #[test]
    fn non_ascii_is_escaped() {
        let mut info = bash();
        info.name = "café".to_string();
        let line = ProvenanceRecord::new(&info, None).to_line();
        assert!(line.contains("\"caf\\u00e9\""));
        assert!(ProvenanceRecord::parse(&line).unwrap().verify());
        assert_eq!(escape_non_ascii("\"𝄞\""), "\"\\ud834\\udd1e\"");
    }

    #[test]
    fn parse_rejects_non_objects() {
        assert!(ProvenanceRecord::parse("[1,2]").is_err());
        assert!(ProvenanceRecord::parse("not json").is_err());
    }
}

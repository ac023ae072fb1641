//! Record-type catalogue and validator (§4.4).
//!
//! 37 writable record types, plus `CDS` kept as a `Forbidden` entry so
//! the validator can reject it before wasting a round trip on the
//! server's guaranteed 403. `CDNSKEY`/`DS`/`DNSKEY` carry `DnssecWarn`.
//! `RRSIG` and `NSEC3PARAM` are left out of the catalogue entirely —
//! the server never accepts them under any policy.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ValidationError;

pub const MIN_TTL: u32 = 3600;
pub const MAX_TTL: u32 = 86400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPolicy {
    Ordinary,
    DnssecManaged,
    DnssecWarn,
    Forbidden,
}

#[derive(Debug, Clone, Copy)]
pub struct RecordTypeInfo {
    pub name: &'static str,
    pub label: &'static str,
    pub format_hint: &'static str,
    pub example: &'static str,
    pub tooltip: &'static str,
    pub policy: RecordPolicy,
    regex: Option<&'static str>,
}

/// Returns the catalogue entry for `type_name`, case-sensitive, matching
/// the server's own type names (e.g. `"A"`, `"MX"`, `"TXT"`).
pub fn lookup(type_name: &str) -> Option<&'static RecordTypeInfo> {
    CATALOGUE.iter().find(|entry| entry.name == type_name)
}

pub fn all() -> &'static [RecordTypeInfo] {
    CATALOGUE
}

/// §4.4: each value is trimmed; empty values are invalid; lines are
/// validated independently. If the catalogue entry has a regex it is
/// authoritative; otherwise only non-emptiness and TTL bounds apply.
pub fn validate(type_name: &str, ttl: u32, records: &[String]) -> Result<(), ValidationError> {
    if !(MIN_TTL..=MAX_TTL).contains(&ttl) {
        return Err(ValidationError {
            index: 0,
            reason: format!("ttl<{MIN_TTL} or ttl>{MAX_TTL}"),
        });
    }

    let info = lookup(type_name);
    if let Some(info) = info {
        if info.policy == RecordPolicy::Forbidden {
            return Err(ValidationError {
                index: 0,
                reason: format!("{type_name} is server-managed and cannot be written"),
            });
        }
    }

    let compiled = info.and_then(|i| i.regex).map(|p| compiled_regex(p));

    for (index, raw) in records.iter().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError {
                index,
                reason: "empty record value".to_string(),
            });
        }
        if let Some(re) = &compiled {
            if !re.is_match(trimmed) {
                return Err(ValidationError {
                    index,
                    reason: format!("does not match expected format for {type_name}"),
                });
            }
        }
    }
    Ok(())
}

fn compiled_regex(pattern: &'static str) -> Regex {
    static CACHE: OnceLock<std::sync::Mutex<std::collections::HashMap<&'static str, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()));
    let mut guard = cache.lock().unwrap();
    guard
        .entry(pattern)
        .or_insert_with(|| Regex::new(pattern).expect("catalogue regex is valid"))
        .clone()
}

macro_rules! entry {
    ($name:expr, $label:expr, $hint:expr, $example:expr, $tooltip:expr, $policy:expr) => {
        RecordTypeInfo {
            name: $name,
            label: $label,
            format_hint: $hint,
            example: $example,
            tooltip: $tooltip,
            policy: $policy,
            regex: None,
        }
    };
    ($name:expr, $label:expr, $hint:expr, $example:expr, $tooltip:expr, $policy:expr, $regex:expr) => {
        RecordTypeInfo {
            name: $name,
            label: $label,
            format_hint: $hint,
            example: $example,
            tooltip: $tooltip,
            policy: $policy,
            regex: Some($regex),
        }
    };
}

const FQDN: &str = r"^(?:[a-zA-Z0-9_]([a-zA-Z0-9-_]{0,61}[a-zA-Z0-9_])?\.)+$";
/// `<number> <hostname>` formats (AFSDB's subtype, KX/LP's preference),
/// where the hostname may also be the root label `.` alone.
const NUM_THEN_HOST: &str = r"^\d+\s+(?:\.|(?:[a-zA-Z0-9_]([a-zA-Z0-9-_]{0,61}[a-zA-Z0-9_])?\.)+)$";
const SRV_RE: &str = r"^\d+\s+\d+\s+\d+\s+(?:\.|(?:[a-zA-Z0-9_]([a-zA-Z0-9-_]{0,61}[a-zA-Z0-9_])?\.)+)$";
const NAPTR_RE: &str =
    r#"^\d+\s+\d+\s+"[^"]*"\s+"[^"]*"\s+"[^"]*"\s+(?:\.|(?:[a-zA-Z0-9_]([a-zA-Z0-9-_]{0,61}[a-zA-Z0-9_])?\.)+)$"#;
const RP_RE: &str = r"^(?:\.|(?:[a-zA-Z0-9_]([a-zA-Z0-9-_]{0,61}[a-zA-Z0-9_])?\.)+)\s+(?:\.|(?:[a-zA-Z0-9_]([a-zA-Z0-9-_]{0,61}[a-zA-Z0-9_])?\.)+)$";
const SVCB_OR_HTTPS: &str =
    r"^\d+\s+(?:\.|(?:[a-zA-Z0-9_]([a-zA-Z0-9-_]{0,61}[a-zA-Z0-9_])?\.)+)(?:\s+\S.*)?$";
const MX_RE: &str = r"^\d+\s+(?:\.|(?:[a-zA-Z0-9_]([a-zA-Z0-9-_]{0,61}[a-zA-Z0-9_])?\.)+)$";

static CATALOGUE: &[RecordTypeInfo] = &[
    entry!("A", "IPv4 address", "<ipv4>", "1.2.3.4", "An IPv4 host address.", RecordPolicy::Ordinary, r"^\d{1,3}(\.\d{1,3}){3}$"),
    entry!("AAAA", "IPv6 address", "<ipv6>", "2001:db8::1", "An IPv6 host address.", RecordPolicy::Ordinary),
    entry!("AFSDB", "AFS database", "<subtype> <hostname>", "1 afsdb.example.", "AFS cell database location.", RecordPolicy::Ordinary, NUM_THEN_HOST),
    entry!("APL", "Address prefix list", "<family>:<prefix>", "1:192.168.0.0/24", "Lists of address ranges for a zone.", RecordPolicy::Ordinary),
    entry!("CAA", "Certification Authority Authorization", "<flags> <tag> <value>", "0 issue \"letsencrypt.org\"", "Restricts which CAs may issue certificates.", RecordPolicy::Ordinary),
    entry!("CDS", "Child DS", "<key tag> <algorithm> <digest type> <digest>", "60485 5 1 2BB1...", "Server-managed; published automatically, never writable.", RecordPolicy::Forbidden),
    entry!("CDNSKEY", "Child DNSKEY", "<flags> <protocol> <algorithm> <key>", "257 3 13 AwEAAd...", "Published for parent-side DS synchronization.", RecordPolicy::DnssecWarn),
    entry!("CERT", "Certificate", "<type> <key tag> <algorithm> <cert>", "PKIX 0 0 MIIB...", "Stores certificates or CRLs.", RecordPolicy::Ordinary),
    entry!("CNAME", "Canonical name", "<hostname>", "target.example.", "Alias to another hostname.", RecordPolicy::Ordinary, FQDN),
    entry!("DHCID", "DHCP identifier", "<base64>", "AAIBY2/AuCccgoJbsaxcQc9TUapptP69lOjxfNuVAA2kjEA=", "Associates a DHCP client with a name.", RecordPolicy::Ordinary),
    entry!("DNAME", "Delegation name", "<hostname>", "target.example.", "Redirects an entire subtree of the namespace.", RecordPolicy::Ordinary, FQDN),
    entry!("DNSKEY", "DNSSEC public key", "<flags> <protocol> <algorithm> <key>", "257 3 13 AwEAAd...", "Published DNSSEC signing key.", RecordPolicy::DnssecWarn),
    entry!("DLV", "DNSSEC Lookaside Validation", "<key tag> <algorithm> <digest type> <digest>", "1 13 2 ABCD...", "Deprecated at the DNS layer; kept writable for compatibility.", RecordPolicy::Ordinary),
    entry!("DS", "Delegation Signer", "<key tag> <algorithm> <digest type> <digest>", "60485 5 1 2BB1...", "Links a delegation to its child zone's DNSKEY.", RecordPolicy::DnssecWarn),
    entry!("EUI48", "48-bit EUI", "<eui48>", "00-00-5e-00-53-2a", "A 48-bit Extended Unique Identifier.", RecordPolicy::Ordinary, r"^([0-9A-Fa-f]{2}-){5}[0-9A-Fa-f]{2}$"),
    entry!("EUI64", "64-bit EUI", "<eui64>", "00-00-5e-ef-10-00-00-2a", "A 64-bit Extended Unique Identifier.", RecordPolicy::Ordinary, r"^([0-9A-Fa-f]{2}-){7}[0-9A-Fa-f]{2}$"),
    entry!("HINFO", "Host info", "\"<cpu>\" \"<os>\"", "\"PC\" \"Linux\"", "Host hardware and OS.", RecordPolicy::Ordinary),
    entry!("HTTPS", "HTTPS service binding", "<priority> <target> <params>", "1 . alpn=h2", "Service binding record for HTTPS.", RecordPolicy::Ordinary, SVCB_OR_HTTPS),
    entry!("KX", "Key exchanger", "<preference> <hostname>", "10 kx.example.", "Key exchange delegation.", RecordPolicy::Ordinary, NUM_THEN_HOST),
    entry!("L32", "32-bit locator", "<preference> <locator32>", "10 10.1.2.3", "ILNP 32-bit locator.", RecordPolicy::Ordinary),
    entry!("L64", "64-bit locator", "<preference> <locator64>", "10 2001:0DB8:1140:1000", "ILNP 64-bit locator.", RecordPolicy::Ordinary),
    entry!("LOC", "Location", "<coordinates>", "51 30 12.748 N 0 7 39.612 W 0.00m", "Geographic location.", RecordPolicy::Ordinary),
    entry!("LP", "Locator pointer", "<preference> <fqdn>", "10 l64-subnet.example.", "ILNP locator pointer.", RecordPolicy::Ordinary, NUM_THEN_HOST),
    entry!("MX", "Mail exchange", "<preference> <hostname>", "10 mail.example.", "Mail server for the zone.", RecordPolicy::Ordinary, MX_RE),
    entry!("NAPTR", "Naming authority pointer", "<order> <pref> <flags> <service> <regexp> <replacement>", "100 10 \"U\" \"E2U+sip\" \"\" .", "URN/URI resolution rules.", RecordPolicy::Ordinary, NAPTR_RE),
    entry!("NID", "Node identifier", "<preference> <nodeid>", "10 0014:4fff:ff20:ee64", "ILNP node identifier.", RecordPolicy::Ordinary),
    entry!("NS", "Name server", "<hostname>", "ns1.example.", "Delegates a zone/subname to a name server.", RecordPolicy::Ordinary, FQDN),
    entry!("OPENPGPKEY", "OpenPGP public key", "<base64>", "mDMEXt...", "Publishes an OpenPGP key for DANE.", RecordPolicy::Ordinary),
    entry!("PTR", "Pointer", "<hostname>", "host.example.", "Reverse-DNS pointer.", RecordPolicy::Ordinary, FQDN),
    entry!("RP", "Responsible person", "<mailbox> <txt-ref>", "admin.example. .", "Responsible-person contact record.", RecordPolicy::Ordinary, RP_RE),
    entry!("SMIMEA", "S/MIME association", "<usage> <selector> <matching type> <cert>", "3 0 0 30820...", "Associates an S/MIME cert with a name.", RecordPolicy::Ordinary),
    entry!("SPF", "Sender Policy Framework", "\"<spf text>\"", "\"v=spf1 mx -all\"", "Legacy SPF record; TXT is preferred.", RecordPolicy::Ordinary),
    entry!("SRV", "Service locator", "<priority> <weight> <port> <target>", "10 5 5060 sip.example.", "Locates a service on the network.", RecordPolicy::Ordinary, SRV_RE),
    entry!("SSHFP", "SSH fingerprint", "<algorithm> <type> <fingerprint>", "2 1 123456789abcdef...", "Publishes an SSH host key fingerprint.", RecordPolicy::Ordinary),
    entry!("SVCB", "Service binding", "<priority> <target> <params>", "1 . alpn=h3", "General-purpose service binding record.", RecordPolicy::Ordinary, SVCB_OR_HTTPS),
    entry!("TLSA", "TLSA / DANE", "<usage> <selector> <matching type> <cert>", "3 1 1 0a2f...", "Associates a TLS cert with a name.", RecordPolicy::Ordinary),
    entry!("TXT", "Text", "\"<text>\"", "\"v=spf1 mx -all\"", "Arbitrary text data.", RecordPolicy::Ordinary, r#"^".*"$"#),
    entry!("URI", "Uniform Resource Identifier", "<priority> <weight> \"<target>\"", "10 1 \"https://example.com/\"", "Publishes a URI for a service.", RecordPolicy::Ordinary),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalogue_type_accepts_its_example() {
        for info in CATALOGUE {
            if info.policy == RecordPolicy::Forbidden {
                continue;
            }
            let result = validate(info.name, 3600, &[info.example.to_string()]);
            assert!(result.is_ok(), "{} rejected its own example: {result:?}", info.name);
        }
    }

    #[test]
    fn every_catalogue_type_rejects_empty_string() {
        for info in CATALOGUE {
            let result = validate(info.name, 3600, &[String::new()]);
            assert!(result.is_err(), "{} accepted an empty record", info.name);
        }
    }

    #[test]
    fn ttl_bounds_enforced() {
        assert!(validate("A", 60, &["1.2.3.4".into()]).is_err());
        assert!(validate("A", 3599, &["1.2.3.4".into()]).is_err());
        assert!(validate("A", 86401, &["1.2.3.4".into()]).is_err());
        assert!(validate("A", 3600, &["1.2.3.4".into()]).is_ok());
        assert!(validate("A", 86400, &["1.2.3.4".into()]).is_ok());
    }

    #[test]
    fn cds_is_forbidden() {
        assert_eq!(lookup("CDS").unwrap().policy, RecordPolicy::Forbidden);
        let err = validate("CDS", 3600, &["60485 5 1 2BB1".to_string()]).unwrap_err();
        assert!(err.reason.contains("server-managed"));
    }

    #[test]
    fn rrsig_and_nsec3param_excluded() {
        assert!(lookup("RRSIG").is_none());
        assert!(lookup("NSEC3PARAM").is_none());
    }

    #[test]
    fn catalogue_has_37_writable_types() {
        let writable = CATALOGUE.iter().filter(|e| e.policy != RecordPolicy::Forbidden).count();
        assert_eq!(writable, 37);
    }

    #[test]
    fn dnssec_managed_types_are_tagged() {
        for name in ["DNSKEY", "DS", "CDNSKEY"] {
            assert_eq!(lookup(name).unwrap().policy, RecordPolicy::DnssecWarn);
        }
    }

    #[test]
    fn hostname_bearing_types_reject_missing_trailing_dot() {
        assert!(validate("KX", 3600, &["10 kx-no-trailing-dot".into()]).is_err());
        assert!(validate("AFSDB", 3600, &["1 afsdb-no-trailing-dot".into()]).is_err());
        assert!(validate("LP", 3600, &["10 lp-no-trailing-dot".into()]).is_err());
        assert!(validate("SRV", 3600, &["10 5 5060 sip-no-trailing-dot".into()]).is_err());
        assert!(validate("NAPTR", 3600, &["100 10 \"U\" \"E2U+sip\" \"\" no-trailing-dot".into()]).is_err());
        assert!(validate("RP", 3600, &["admin-no-trailing-dot .".into()]).is_err());
        assert!(validate("HTTPS", 3600, &["1 no-trailing-dot alpn=h2".into()]).is_err());
        assert!(validate("SVCB", 3600, &["1 no-trailing-dot alpn=h3".into()]).is_err());
    }
}

//! Compact claims codec.
//!
//! `decode_payload_segment` expands the base64url payload segment of a token into
//! [`DecodedClaims`]. Nothing decoded here is trusted until the signature
//! validator has accepted the same token.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ReasonCode;
use crate::services::audit::redact::REDACTED;
use crate::services::auth::schema::{self, AccessLevel, SchemaVersion};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchemaVersion(u64),
    #[error("claims cannot be encoded: {0}")]
    Unencodable(String),
}

impl ClaimsError {
    pub fn reason(&self) -> ReasonCode {
        match self {
            ClaimsError::UnsupportedSchemaVersion(_) => ReasonCode::UnsupportedSchemaVersion,
            ClaimsError::Malformed(_) | ClaimsError::Unencodable(_) => ReasonCode::MalformedToken,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketGrant {
    pub name: String,
    pub access_level: AccessLevel,
}

/// Credentials embedded in the token. Fields stay optional here; completeness is
/// checked when the authorization context is built.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EmbeddedCreds {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl fmt::Debug for EmbeddedCreds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedCreds")
            .field("access_key", &self.access_key.as_ref().map(|_| REDACTED))
            .field("secret_key", &self.secret_key.as_ref().map(|_| REDACTED))
            .field("session_token", &self.session_token.as_ref().map(|_| REDACTED))
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRef {
    pub role_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwsCredentialClaim {
    Embedded(EmbeddedCreds),
    Role(RoleRef),
}

/// Expanded claim set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedClaims {
    pub subject: String,
    pub tenant: Option<String>,
    pub issuer: Option<String>,
    pub audience: Vec<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub schema_version: SchemaVersion,
    pub permissions: BTreeSet<String>,
    pub buckets: Vec<BucketGrant>,
    pub roles: Vec<String>,
    pub aws_credentials: Option<AwsCredentialClaim>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum AudienceClaim {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CompactCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    k: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    s: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    st: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ra: Option<String>,
}

/// Wire form of the payload. Registered claims keep their standard names so the
/// JWT library can validate them.
#[derive(Debug, Serialize, Deserialize)]
struct CompactPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aud: Option<AudienceClaim>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
    v: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    bt: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bp: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    b: Vec<(u64, u64)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    r: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    c: Option<CompactCredentials>,
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, ClaimsError> {
    DateTime::from_timestamp(secs, 0).ok_or(ClaimsError::Malformed("timestamp out of range"))
}

/// Decode the payload segment (base64url, unpadded) of a compact token.
pub fn decode_payload_segment(segment: &str) -> Result<DecodedClaims, ClaimsError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| ClaimsError::Malformed("payload is not base64url"))?;

    let object: Map<String, Value> = serde_json::from_slice(&bytes)
        .map_err(|_| ClaimsError::Malformed("payload is not a json object"))?;

    decode_claims(object)
}

/// Expand an already parsed payload object.
pub fn decode_claims(object: Map<String, Value>) -> Result<DecodedClaims, ClaimsError> {
    // The version decides how the rest is read, so check it before the shape.
    let raw_version = object
        .get("v")
        .ok_or(ClaimsError::Malformed("missing schema version"))?
        .as_u64()
        .ok_or(ClaimsError::Malformed("schema version is not an integer"))?;
    let version = SchemaVersion::from_wire(raw_version)
        .ok_or(ClaimsError::UnsupportedSchemaVersion(raw_version))?;

    let payload: CompactPayload = serde_json::from_value(Value::Object(object))
        .map_err(|_| ClaimsError::Malformed("payload fields have unexpected types"))?;

    let subject = payload
        .sub
        .filter(|s| !s.trim().is_empty())
        .ok_or(ClaimsError::Malformed("missing subject"))?;
    let expires_at = timestamp(payload.exp.ok_or(ClaimsError::Malformed("missing exp"))?)?;
    let issued_at = payload.iat.map(timestamp).transpose()?;

    let audience = match payload.aud {
        None => Vec::new(),
        Some(AudienceClaim::Single(aud)) => vec![aud],
        Some(AudienceClaim::Multiple(auds)) => auds,
    };

    let permissions = decode_permissions(version, payload.p)?;
    let buckets = decode_buckets(version, payload.bt, payload.bp, payload.b)?;
    let aws_credentials = payload.c.map(decode_credentials).transpose()?;

    Ok(DecodedClaims {
        subject,
        tenant: payload.t.filter(|t| !t.trim().is_empty()),
        issuer: payload.iss,
        audience,
        issued_at,
        expires_at,
        schema_version: version,
        permissions,
        buckets,
        roles: payload.r,
        aws_credentials,
    })
}

fn decode_permissions(
    version: SchemaVersion,
    raw: Option<Value>,
) -> Result<BTreeSet<String>, ClaimsError> {
    let Some(raw) = raw else {
        return Ok(BTreeSet::new());
    };

    match version {
        SchemaVersion::V1 => {
            let codes = raw
                .as_array()
                .ok_or(ClaimsError::Malformed("v1 permissions must be an array"))?;
            codes
                .iter()
                .map(|code| {
                    code.as_str()
                        .and_then(schema::expand_permission)
                        .ok_or(ClaimsError::Malformed("unknown permission abbreviation"))
                })
                .collect()
        }
        SchemaVersion::V2 => {
            let bits = raw
                .as_u64()
                .ok_or(ClaimsError::Malformed("v2 permissions must be an integer"))?;
            schema::permissions_from_bits(bits)
                .ok_or(ClaimsError::Malformed("permission bit outside catalog"))
        }
    }
}

fn decode_buckets(
    version: SchemaVersion,
    table: Vec<String>,
    prefix: Option<String>,
    grants: Vec<(u64, u64)>,
) -> Result<Vec<BucketGrant>, ClaimsError> {
    let prefix = match (version, prefix) {
        (SchemaVersion::V1, Some(_)) => {
            return Err(ClaimsError::Malformed("bucket prefix is not part of v1"));
        }
        (_, prefix) => prefix.unwrap_or_default(),
    };

    let names: Vec<String> = table
        .into_iter()
        .map(|suffix| format!("{prefix}{suffix}"))
        .collect();
    if names.iter().any(|n| n.is_empty()) {
        return Err(ClaimsError::Malformed("empty bucket name"));
    }

    // Insertion order is preserved; a duplicate keeps the highest level.
    let mut out: Vec<BucketGrant> = Vec::with_capacity(grants.len());
    for (index, mask) in grants {
        let name = usize::try_from(index)
            .ok()
            .and_then(|i| names.get(i))
            .ok_or(ClaimsError::Malformed("bucket index out of range"))?;
        let level =
            AccessLevel::from_mask(mask).ok_or(ClaimsError::Malformed("invalid access mask"))?;

        match out.iter_mut().find(|g| &g.name == name) {
            Some(existing) => existing.access_level = existing.access_level.max(level),
            None => out.push(BucketGrant {
                name: name.clone(),
                access_level: level,
            }),
        }
    }

    Ok(out)
}

fn decode_credentials(raw: CompactCredentials) -> Result<AwsCredentialClaim, ClaimsError> {
    let has_embedded =
        raw.k.is_some() || raw.s.is_some() || raw.st.is_some() || raw.x.is_some();

    match (has_embedded, raw.ra) {
        (true, Some(_)) => Err(ClaimsError::Malformed(
            "credential block mixes embedded keys and a role",
        )),
        (false, Some(role_arn)) => Ok(AwsCredentialClaim::Role(RoleRef { role_arn })),
        (true, None) => Ok(AwsCredentialClaim::Embedded(EmbeddedCreds {
            access_key: raw.k,
            secret_key: raw.s,
            session_token: raw.st,
            expiration: raw.x.map(timestamp).transpose()?,
        })),
        (false, None) => Err(ClaimsError::Malformed("empty credential block")),
    }
}

/// Produce the compact payload for `claims` using `claims.schema_version`.
pub fn encode_claims(claims: &DecodedClaims) -> Result<Value, ClaimsError> {
    let version = claims.schema_version;

    let p = if claims.permissions.is_empty() {
        None
    } else {
        Some(match version {
            SchemaVersion::V1 => {
                let codes = claims
                    .permissions
                    .iter()
                    .map(|p| {
                        schema::compact_permission(p)
                            .map(Value::String)
                            .ok_or_else(|| ClaimsError::Unencodable(format!("permission {p}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(codes)
            }
            SchemaVersion::V2 => {
                let bits = schema::permissions_to_bits(&claims.permissions).ok_or_else(|| {
                    ClaimsError::Unencodable("permission outside v2 catalog".to_string())
                })?;
                Value::from(bits)
            }
        })
    };

    // Table in first-appearance order.
    let mut index: BTreeMap<&str, u64> = BTreeMap::new();
    let mut table: Vec<String> = Vec::new();
    let mut grants: Vec<(u64, u64)> = Vec::with_capacity(claims.buckets.len());
    for grant in &claims.buckets {
        let slot = match index.get(grant.name.as_str()) {
            Some(slot) => *slot,
            None => {
                let slot = table.len() as u64;
                index.insert(grant.name.as_str(), slot);
                table.push(grant.name.clone());
                slot
            }
        };
        grants.push((slot, grant.access_level.mask()));
    }

    let bp = match version {
        SchemaVersion::V2 => {
            let prefix = common_prefix(&table);
            // A prefix that swallows a whole name would leave an empty suffix.
            if prefix.is_empty() || table.iter().any(|n| n.len() == prefix.len()) {
                None
            } else {
                for name in table.iter_mut() {
                    *name = name[prefix.len()..].to_string();
                }
                Some(prefix)
            }
        }
        SchemaVersion::V1 => None,
    };

    let c = claims.aws_credentials.as_ref().map(|creds| match creds {
        AwsCredentialClaim::Embedded(e) => CompactCredentials {
            k: e.access_key.clone(),
            s: e.secret_key.clone(),
            st: e.session_token.clone(),
            x: e.expiration.map(|x| x.timestamp()),
            ra: None,
        },
        AwsCredentialClaim::Role(role) => CompactCredentials {
            ra: Some(role.role_arn.clone()),
            ..CompactCredentials::default()
        },
    });

    let aud = match claims.audience.as_slice() {
        [] => None,
        [single] => Some(AudienceClaim::Single(single.clone())),
        many => Some(AudienceClaim::Multiple(many.to_vec())),
    };

    let payload = CompactPayload {
        iss: claims.issuer.clone(),
        aud,
        sub: Some(claims.subject.clone()),
        iat: claims.issued_at.map(|t| t.timestamp()),
        exp: Some(claims.expires_at.timestamp()),
        v: version.as_wire(),
        t: claims.tenant.clone(),
        p,
        bt: table,
        bp,
        b: grants,
        r: claims.roles.clone(),
        c,
    };

    serde_json::to_value(payload).map_err(|e| ClaimsError::Unencodable(e.to_string()))
}

/// Encoded payload as it would appear in the middle segment of a token.
pub fn encode_payload_segment(claims: &DecodedClaims) -> Result<String, ClaimsError> {
    let value = encode_claims(claims)?;
    let bytes = serde_json::to_vec(&value).map_err(|e| ClaimsError::Unencodable(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn common_prefix(names: &[String]) -> String {
    let Some(first) = names.first() else {
        return String::new();
    };
    let mut len = first.len();
    for name in &names[1..] {
        len = first
            .char_indices()
            .zip(name.chars())
            .take_while(|((_, a), b)| a == b)
            .map(|((i, a), _)| i + a.len_utf8())
            .last()
            .unwrap_or(0)
            .min(len);
    }
    first[..len].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segment(value: Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&value).unwrap())
    }

    fn sample(version: SchemaVersion) -> DecodedClaims {
        DecodedClaims {
            subject: "user-1".to_string(),
            tenant: Some("acme".to_string()),
            issuer: Some("https://issuer.example".to_string()),
            audience: vec!["toolgate".to_string()],
            issued_at: DateTime::from_timestamp(1_700_000_000, 0),
            expires_at: DateTime::from_timestamp(1_700_003_600, 0).unwrap(),
            schema_version: version,
            permissions: ["storage:read", "package:create"]
                .into_iter()
                .map(String::from)
                .collect(),
            buckets: vec![
                BucketGrant {
                    name: "acme-data".to_string(),
                    access_level: AccessLevel::Read,
                },
                BucketGrant {
                    name: "acme-raw".to_string(),
                    access_level: AccessLevel::Admin,
                },
            ],
            roles: vec!["ReadWrite".to_string()],
            aws_credentials: Some(AwsCredentialClaim::Role(RoleRef {
                role_arn: "arn:aws:iam::123456789012:role/acme".to_string(),
            })),
        }
    }

    #[test]
    fn decodes_v1_abbreviations_and_bucket_table() {
        let seg = segment(json!({
            "sub": "u", "exp": 2_000_000_000i64, "v": 1,
            "p": ["s:r", "p:c"],
            "bt": ["data", "raw"],
            "b": [[0, 1], [1, 3]],
        }));

        let claims = decode_payload_segment(&seg).unwrap();
        assert!(claims.permissions.contains("storage:read"));
        assert!(claims.permissions.contains("package:create"));
        assert_eq!(claims.buckets[0].name, "data");
        assert_eq!(claims.buckets[0].access_level, AccessLevel::Read);
        assert_eq!(claims.buckets[1].access_level, AccessLevel::Write);
    }

    #[test]
    fn decodes_v2_bitmask_and_prefix() {
        let seg = segment(json!({
            "sub": "u", "exp": 2_000_000_000i64, "v": 2,
            "p": 0b11,
            "bp": "corp-",
            "bt": ["data"],
            "b": [[0, 7]],
        }));

        let claims = decode_payload_segment(&seg).unwrap();
        assert_eq!(claims.permissions.len(), 2);
        assert!(claims.permissions.contains("storage:write"));
        assert_eq!(claims.buckets[0].name, "corp-data");
        assert_eq!(claims.buckets[0].access_level, AccessLevel::Admin);
    }

    #[test]
    fn unknown_version_is_unsupported_not_malformed() {
        let seg = segment(json!({ "sub": "u", "exp": 1, "v": 9, "b": {"shape": "new"} }));
        assert_eq!(
            decode_payload_segment(&seg),
            Err(ClaimsError::UnsupportedSchemaVersion(9))
        );
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let cases = [
            json!({ "sub": "u", "exp": 1 }),
            json!({ "sub": "u", "exp": 1, "v": 1, "p": ["zz:r"] }),
            json!({ "sub": "u", "exp": 1, "v": 1, "bt": ["a"], "b": [[3, 1]] }),
            json!({ "sub": "u", "exp": 1, "v": 1, "bt": ["a"], "b": [[0, 0]] }),
            json!({ "sub": "u", "exp": 1, "v": 1, "bp": "x-" }),
            json!({ "sub": "u", "exp": 1, "v": 2, "p": ["s:r"] }),
            json!({ "exp": 1, "v": 1 }),
            json!({ "sub": "u", "exp": 1, "v": 1, "c": { "k": "a", "ra": "arn:x" } }),
            json!({ "sub": "u", "exp": 1, "v": 1, "c": {} }),
        ];

        for case in cases {
            let err = decode_payload_segment(&segment(case.clone())).unwrap_err();
            assert_eq!(err.reason(), ReasonCode::MalformedToken, "case: {case}");
        }

        assert!(matches!(
            decode_payload_segment("%%%"),
            Err(ClaimsError::Malformed(_))
        ));
    }

    #[test]
    fn duplicate_bucket_keeps_highest_level() {
        let seg = segment(json!({
            "sub": "u", "exp": 1, "v": 1,
            "bt": ["data"], "b": [[0, 1], [0, 2], [0, 1]],
        }));
        let claims = decode_payload_segment(&seg).unwrap();
        assert_eq!(claims.buckets.len(), 1);
        assert_eq!(claims.buckets[0].access_level, AccessLevel::Write);
    }

    #[test]
    fn partial_embedded_credentials_survive_decoding() {
        let seg = segment(json!({ "sub": "u", "exp": 1, "v": 1, "c": { "k": "AKIA" } }));
        let claims = decode_payload_segment(&seg).unwrap();
        match claims.aws_credentials {
            Some(AwsCredentialClaim::Embedded(creds)) => {
                assert_eq!(creds.access_key.as_deref(), Some("AKIA"));
                assert!(creds.secret_key.is_none());
            }
            other => panic!("unexpected credentials: {other:?}"),
        }
    }

    #[test]
    fn round_trips_every_supported_version() {
        for version in SchemaVersion::SUPPORTED {
            let claims = sample(version);
            let seg = encode_payload_segment(&claims).unwrap();
            assert_eq!(decode_payload_segment(&seg).unwrap(), claims);
        }
    }

    #[test]
    fn v2_encoding_factors_out_common_prefix() {
        let value = encode_claims(&sample(SchemaVersion::V2)).unwrap();
        assert_eq!(value["bp"], json!("acme-"));
        assert_eq!(value["bt"], json!(["data", "raw"]));
    }

    #[test]
    fn embedded_credentials_are_redacted_in_debug() {
        let creds = EmbeddedCreds {
            access_key: Some("AKIAEXAMPLE".to_string()),
            secret_key: Some("very-secret".to_string()),
            session_token: Some("token".to_string()),
            expiration: None,
        };
        let printed = format!("{creds:?}");
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("AKIAEXAMPLE"));
    }
}

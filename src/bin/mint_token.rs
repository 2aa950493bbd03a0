use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{Duration, DurationRound, Utc};
use clap::Parser;

use toolgate::services::auth::claims::{AwsCredentialClaim, BucketGrant, DecodedClaims, RoleRef};
use toolgate::services::auth::mint::TokenMinter;
use toolgate::services::auth::schema::{AccessLevel, SchemaVersion};

/// Mint a compact access token for local development.
///
/// Signs with the same key material the server verifies against:
/// - `--secret` (or JWT_SECRET) → HS256
/// - `--ed25519-private-pem` → EdDSA
#[derive(Parser, Debug)]
#[command(name = "mint-token", version, about)]
struct Args {
    /// HMAC shared secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Path to an Ed25519 private key in PEM (PKCS#8)
    #[arg(long, value_name = "FILE", conflicts_with = "secret")]
    ed25519_private_pem: Option<PathBuf>,

    /// Key id written to the header (for JWKS verification)
    #[arg(long)]
    kid: Option<String>,

    #[arg(long, env = "AUTH_ISSUER")]
    issuer: String,

    #[arg(long, env = "AUTH_AUDIENCE")]
    audience: String,

    #[arg(long)]
    subject: String,

    #[arg(long)]
    tenant: Option<String>,

    /// Lifetime in seconds
    #[arg(long, default_value_t = 900)]
    ttl_seconds: i64,

    /// Compact schema version (1 or 2)
    #[arg(long, default_value_t = 2)]
    schema_version: u64,

    /// Permission, e.g. storage:read (repeatable)
    #[arg(long = "permission")]
    permissions: Vec<String>,

    /// Bucket grant as name:level, e.g. analytics:read (repeatable)
    #[arg(long = "bucket")]
    buckets: Vec<String>,

    /// Role name (repeatable)
    #[arg(long = "role")]
    roles: Vec<String>,

    /// Role ARN the server should assume for this token
    #[arg(long)]
    role_arn: Option<String>,
}

fn parse_bucket(raw: &str) -> Result<BucketGrant> {
    let (name, level) = raw
        .rsplit_once(':')
        .with_context(|| format!("bucket grant '{raw}' must be name:level"))?;
    let access_level: AccessLevel = level
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown access level '{level}'"))?;
    Ok(BucketGrant {
        name: name.to_string(),
        access_level,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut minter = match (&args.secret, &args.ed25519_private_pem) {
        (_, Some(path)) => TokenMinter::ed25519(&fs::read_to_string(path)?)?,
        (Some(secret), None) => TokenMinter::hs256(secret.as_bytes()),
        (None, None) => bail!("either --secret or --ed25519-private-pem is required"),
    };
    if let Some(kid) = &args.kid {
        minter = minter.with_kid(kid);
    }

    let schema_version = SchemaVersion::from_wire(args.schema_version)
        .with_context(|| format!("unsupported schema version {}", args.schema_version))?;

    let now = Utc::now().duration_trunc(Duration::seconds(1))?;
    let claims = DecodedClaims {
        subject: args.subject,
        tenant: args.tenant,
        issuer: Some(args.issuer),
        audience: vec![args.audience],
        issued_at: Some(now),
        expires_at: now + Duration::seconds(args.ttl_seconds),
        schema_version,
        permissions: args.permissions.into_iter().collect(),
        buckets: args
            .buckets
            .iter()
            .map(|b| parse_bucket(b))
            .collect::<Result<Vec<_>>>()?,
        roles: args.roles,
        aws_credentials: args
            .role_arn
            .map(|role_arn| AwsCredentialClaim::Role(RoleRef { role_arn })),
    };

    println!("{}", minter.mint(&claims)?);
    Ok(())
}

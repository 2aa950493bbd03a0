//! `bucket_objects_list`: list keys in a granted bucket with the request's
//! scoped S3 client.

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{Map, Value, json};

use crate::services::auth::AuthorizationContext;
use crate::services::authz::gate::bucket_name;
use crate::services::credentials::ClientFactory;
use crate::services::tools::{ToolError, ToolHandler};

const DEFAULT_MAX_KEYS: i64 = 100;
const MAX_KEYS_LIMIT: i64 = 1000;

pub struct BucketObjectsListTool;

#[derive(Debug, PartialEq, Eq)]
struct ListArgs<'a> {
    bucket: &'a str,
    prefix: Option<&'a str>,
    max_keys: i32,
    continuation_token: Option<&'a str>,
}

fn parse_args(arguments: &Map<String, Value>) -> Result<ListArgs<'_>, ToolError> {
    let bucket = arguments
        .get("bucket")
        .and_then(Value::as_str)
        .and_then(bucket_name)
        .ok_or_else(|| ToolError::InvalidArguments("bucket is required".into()))?;

    // `s3://bucket/some/prefix` doubles as a prefix when none is given.
    let uri_prefix = arguments
        .get("bucket")
        .and_then(Value::as_str)
        .and_then(|raw| raw.trim().strip_prefix("s3://"))
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, prefix)| prefix)
        .filter(|p| !p.is_empty());

    let prefix = match arguments.get("prefix") {
        None | Some(Value::Null) => uri_prefix,
        Some(Value::String(p)) => Some(p.as_str()),
        Some(_) => return Err(ToolError::InvalidArguments("prefix must be a string".into())),
    };

    let max_keys = match arguments.get("max_keys") {
        None | Some(Value::Null) => DEFAULT_MAX_KEYS,
        Some(v) => v
            .as_i64()
            .filter(|n| (1..=MAX_KEYS_LIMIT).contains(n))
            .ok_or_else(|| ToolError::InvalidArguments("max_keys must be 1..=1000".into()))?,
    };

    let continuation_token = arguments.get("continuation_token").and_then(Value::as_str);

    Ok(ListArgs {
        bucket,
        prefix,
        max_keys: i32::try_from(max_keys).unwrap_or(100),
        continuation_token,
    })
}

#[async_trait]
impl ToolHandler for BucketObjectsListTool {
    fn name(&self) -> &'static str {
        "bucket_objects_list"
    }

    fn needs_cloud_credentials(&self) -> bool {
        true
    }

    async fn call(
        &self,
        ctx: &AuthorizationContext,
        arguments: &Map<String, Value>,
        clients: Option<&ClientFactory>,
    ) -> Result<Value, ToolError> {
        let args = parse_args(arguments)?;
        let clients =
            clients.ok_or_else(|| ToolError::Failed("no client factory for request".into()))?;

        let output = clients
            .s3_client()
            .list_objects_v2()
            .bucket(args.bucket)
            .set_prefix(args.prefix.map(str::to_string))
            .set_continuation_token(args.continuation_token.map(str::to_string))
            .max_keys(args.max_keys)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    error = %e,
                    tenant_id = %ctx.tenant_id(),
                    bucket = args.bucket,
                    "list_objects_v2 failed"
                );
                ToolError::Failed("list_objects_v2 failed".into())
            })?;

        let objects: Vec<Value> = output
            .contents()
            .iter()
            .map(|object| {
                json!({
                    "key": object.key(),
                    "size": object.size(),
                    "last_modified": object
                        .last_modified()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), 0))
                        .map(|t| t.to_rfc3339()),
                })
            })
            .collect();

        Ok(json!({
            "bucket": args.bucket,
            "prefix": args.prefix,
            "objects": objects,
            "truncated": output.is_truncated().unwrap_or(false),
            "next_continuation_token": output.next_continuation_token(),
        }))
    }
}

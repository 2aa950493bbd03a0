//! Static tool → requirement table.

use std::collections::BTreeMap;

use crate::services::auth::schema::AccessLevel;

/// What a tool requires from the caller's context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequirement {
    pub permission: &'static str,
    /// Argument holding the bucket the call touches, if any.
    pub bucket_argument: Option<&'static str>,
    /// Minimum level on that bucket. Ignored when there is no bucket argument.
    pub min_access: AccessLevel,
}

impl ToolRequirement {
    const fn plain(permission: &'static str) -> Self {
        Self {
            permission,
            bucket_argument: None,
            min_access: AccessLevel::Read,
        }
    }

    const fn bucket(permission: &'static str, argument: &'static str, min: AccessLevel) -> Self {
        Self {
            permission,
            bucket_argument: Some(argument),
            min_access: min,
        }
    }
}

const BUILTIN: &[(&str, ToolRequirement)] = &[
    ("bucket_objects_list", ToolRequirement::bucket("storage:read", "bucket", AccessLevel::Read)),
    ("bucket_object_info", ToolRequirement::bucket("storage:read", "bucket", AccessLevel::Read)),
    ("bucket_object_text", ToolRequirement::bucket("storage:read", "bucket", AccessLevel::Read)),
    ("bucket_object_fetch", ToolRequirement::bucket("storage:read", "bucket", AccessLevel::Read)),
    ("bucket_objects_put", ToolRequirement::bucket("storage:write", "bucket", AccessLevel::Write)),
    ("bucket_object_delete", ToolRequirement::bucket("storage:delete", "bucket", AccessLevel::Write)),
    ("package_browse", ToolRequirement::bucket("package:read", "registry", AccessLevel::Read)),
    ("package_create", ToolRequirement::bucket("package:create", "registry", AccessLevel::Write)),
    ("package_update", ToolRequirement::bucket("package:update", "registry", AccessLevel::Write)),
    ("package_delete", ToolRequirement::bucket("package:delete", "registry", AccessLevel::Admin)),
    ("athena_query_execute", ToolRequirement::plain("query:execute")),
    ("search_catalog", ToolRequirement::plain("search:read")),
    ("create_visualization", ToolRequirement::plain("visualization:create")),
    ("admin_users_list", ToolRequirement::plain("admin:read")),
    ("admin_user_create", ToolRequirement::plain("admin:write")),
    ("auth_status", ToolRequirement::plain("identity:read")),
];

#[derive(Debug, Clone, Default)]
pub struct ToolPermissionTable {
    entries: BTreeMap<String, ToolRequirement>,
}

impl ToolPermissionTable {
    pub fn builtin() -> Self {
        BUILTIN
            .iter()
            .map(|(name, req)| ((*name).to_string(), req.clone()))
            .collect()
    }

    pub fn get(&self, tool: &str) -> Option<&ToolRequirement> {
        self.entries.get(tool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ToolRequirement)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, ToolRequirement)> for ToolPermissionTable {
    fn from_iter<T: IntoIterator<Item = (String, ToolRequirement)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

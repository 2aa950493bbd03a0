mod auth_status;
mod bucket_objects_list;

pub use auth_status::AuthStatusTool;
pub use bucket_objects_list::BucketObjectsListTool;

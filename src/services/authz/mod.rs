pub mod gate;
pub mod table;

pub use gate::{AuthDecision, ToolAuthorizationGate, ToolInvocationRequest, VisibleTool};
pub use table::{ToolPermissionTable, ToolRequirement};

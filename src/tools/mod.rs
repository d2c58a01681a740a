//! 工具层：Tool trait、注册表、执行器、共享 HTTP 会话、REST 操作适配与 dry-run 包装

pub mod dry_run;
pub mod executor;
pub mod http;
pub mod registry;
pub mod rest;

pub use dry_run::{dry_run_registry, DryRunTool};
pub use executor::ToolExecutor;
pub use http::{Auth, Endpoint, HttpSession};
pub use registry::{Tool, ToolError, ToolRegistry};
pub use rest::{parse_args, registry_of, render, schema_of, Operation, RestTool};

//! Functional core of the sitemap engine: entry resolution, document layout,
//! XML rendering and the per-request engine facade.

pub mod common;
pub mod engine;
pub mod errors;
pub mod hooks;
pub mod layout;
pub mod render;
pub mod resolve;

pub use common::health::health_check;
pub use common::hostname::{HostPortError, get_api_base_url};
pub use common::logging::{DEFAULT_LOG_SETTINGS, setup_logging};
pub use common::settings::config_path;
pub use engine::{RenderedDocument, RequestScope, SitemapEngine};
pub use errors::{Result, SitemapError};
pub use hooks::Hooks;

pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod translate;

pub use config::{ModelMap, ProxyConfig};
pub use error::{ProxyError, Result, TranslateError, TranslateResult};
pub use logging::SharedLog;
pub use server::{build_router, AppState};
pub use translate::convert::{request_convert, response_convert, stream_convert};
pub use translate::{ConvertOptions, Direction, Protocol};

mod auth;
mod config;
mod logging;
mod nonce;
mod render;
mod server;

pub use auth::{ADMIN_COOKIE, AdminAuth};
pub use config::{
    CliAction, ControllerConfig, LaunchConfig, parse_cli_args, print_cli_help, version_text,
};
pub use logging::init as init_logging;
pub use nonce::{NONCE_ACTION, NONCE_FIELD, NonceError, NonceRegistry};
pub use render::escape_html;
pub use server::{
    ADMIN_PAGE_PATH, ControllerError, ControllerState, Diagnostics, ErrorResponse,
    HostEnvironment, LOGIN_PATH, MutationResponse, build_controller_app,
};

use std::{net::SocketAddr, path::PathBuf};

use staging_core::parse_canonical_url;

pub const DEFAULT_ADDR: &str = "127.0.0.1:9200";
pub const DEFAULT_OPTIONS_PATH: &str = ".wcs-staging/options.json";
pub const DEFAULT_BILLING_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_NONCE_TTL_SECS: u64 = 12 * 60 * 60;

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Canonical address of the site this controller guards.
    pub site_url: String,
    /// `None` keeps options in memory only.
    pub options_path: Option<PathBuf>,
    pub admin_token: Option<String>,
    pub billing_active: bool,
    pub billing_status_url: Option<String>,
    pub billing_version: Option<String>,
    pub billing_timeout_ms: u64,
    pub nonce_ttl_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            site_url: "https://example.com".to_string(),
            options_path: None,
            admin_token: None,
            billing_active: true,
            billing_status_url: None,
            billing_version: None,
            billing_timeout_ms: DEFAULT_BILLING_TIMEOUT_MS,
            nonce_ttl_secs: DEFAULT_NONCE_TTL_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LaunchConfig {
    pub addr: SocketAddr,
    pub controller: ControllerConfig,
}

#[derive(Debug)]
pub enum CliAction {
    Run(Box<LaunchConfig>),
    Help,
    Version,
}

#[derive(Default)]
struct CliArgs {
    addr: Option<String>,
    site_url: Option<String>,
    options_path: Option<String>,
    ephemeral: bool,
    admin_token: Option<String>,
    billing_status_url: Option<String>,
    billing_version: Option<String>,
    billing_inactive: bool,
    billing_timeout_ms: Option<String>,
    nonce_ttl_secs: Option<String>,
}

/// Parses command line flags, falling back to `STAGING_CONTROLLER_*`
/// variables looked up through `env`.
pub fn parse_cli_args(
    args: impl IntoIterator<Item = String>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<CliAction, String> {
    let mut args = args.into_iter().peekable();
    let mut cli = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "-V" | "--version" => return Ok(CliAction::Version),
            "--addr" => cli.addr = Some(next_arg_value("--addr", &mut args)?),
            "--site-url" => cli.site_url = Some(next_arg_value("--site-url", &mut args)?),
            "--options-path" => {
                cli.options_path = Some(next_arg_value("--options-path", &mut args)?);
            }
            "--ephemeral" => cli.ephemeral = true,
            "--admin-token" => cli.admin_token = Some(next_arg_value("--admin-token", &mut args)?),
            "--billing-status-url" => {
                cli.billing_status_url = Some(next_arg_value("--billing-status-url", &mut args)?);
            }
            "--billing-version" => {
                cli.billing_version = Some(next_arg_value("--billing-version", &mut args)?);
            }
            "--billing-inactive" => cli.billing_inactive = true,
            "--billing-timeout-ms" => {
                cli.billing_timeout_ms = Some(next_arg_value("--billing-timeout-ms", &mut args)?);
            }
            "--nonce-ttl-secs" => {
                cli.nonce_ttl_secs = Some(next_arg_value("--nonce-ttl-secs", &mut args)?);
            }
            _ => return Err(format!("unknown argument: {arg}")),
        }
    }

    let from_env = |key: &str| {
        env(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let addr_text = cli
        .addr
        .or_else(|| from_env("STAGING_CONTROLLER_ADDR"))
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let addr = addr_text
        .parse::<SocketAddr>()
        .map_err(|_| format!("invalid --addr: {addr_text}"))?;

    let site_url = cli
        .site_url
        .or_else(|| from_env("STAGING_CONTROLLER_SITE_URL"))
        .ok_or_else(|| "--site-url (or STAGING_CONTROLLER_SITE_URL) is required".to_string())?;
    if parse_canonical_url(&site_url).is_none() {
        return Err(format!(
            "--site-url must be an absolute http(s) url with a domain host (use localhost, not an IP), got: {site_url}"
        ));
    }

    let options_path = if cli.ephemeral {
        None
    } else {
        Some(PathBuf::from(
            cli.options_path
                .or_else(|| from_env("STAGING_CONTROLLER_OPTIONS_PATH"))
                .unwrap_or_else(|| DEFAULT_OPTIONS_PATH.to_string()),
        ))
    };

    let billing_active = if cli.billing_inactive {
        false
    } else {
        match from_env("STAGING_CONTROLLER_BILLING_ACTIVE") {
            Some(value) => parse_bool("STAGING_CONTROLLER_BILLING_ACTIVE", &value)?,
            None => true,
        }
    };

    let billing_timeout_ms = parse_u64_setting(
        "--billing-timeout-ms",
        cli.billing_timeout_ms
            .or_else(|| from_env("STAGING_CONTROLLER_BILLING_TIMEOUT_MS")),
        DEFAULT_BILLING_TIMEOUT_MS,
    )?;
    let nonce_ttl_secs = parse_u64_setting(
        "--nonce-ttl-secs",
        cli.nonce_ttl_secs
            .or_else(|| from_env("STAGING_CONTROLLER_NONCE_TTL_SECS")),
        DEFAULT_NONCE_TTL_SECS,
    )?;

    Ok(CliAction::Run(Box::new(LaunchConfig {
        addr,
        controller: ControllerConfig {
            site_url,
            options_path,
            admin_token: cli
                .admin_token
                .or_else(|| from_env("STAGING_CONTROLLER_ADMIN_TOKEN")),
            billing_active,
            billing_status_url: cli
                .billing_status_url
                .or_else(|| from_env("STAGING_CONTROLLER_BILLING_STATUS_URL")),
            billing_version: cli
                .billing_version
                .or_else(|| from_env("STAGING_CONTROLLER_BILLING_VERSION")),
            billing_timeout_ms,
            nonce_ttl_secs,
        },
    })))
}

fn next_arg_value(
    flag: &str,
    args: &mut std::iter::Peekable<impl Iterator<Item = String>>,
) -> Result<String, String> {
    let value = args
        .next()
        .ok_or_else(|| format!("missing value for {flag}"))?;
    if value.trim().is_empty() {
        return Err(format!("value for {flag} cannot be empty"));
    }
    Ok(value)
}

fn parse_u64_setting(flag: &str, value: Option<String>, default: u64) -> Result<u64, String> {
    match value {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid {flag}: {value}")),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("invalid {key}: {value}")),
    }
}

pub fn print_cli_help() {
    eprintln!(concat!(
        "Usage: wcs-staging-controller --site-url <URL> [options]\n\n",
        "Options:\n",
        "  --addr <ADDR>                  Listen address (default: 127.0.0.1:9200)\n",
        "  --site-url <URL>               Canonical site url compared against the stored url\n",
        "  --options-path <PATH>          Option store file (default: .wcs-staging/options.json)\n",
        "  --ephemeral                    Keep options in memory only\n",
        "  --admin-token <TOKEN>          Admin token (default: generated and logged at startup)\n",
        "  --billing-status-url <URL>     Billing system staging status endpoint\n",
        "  --billing-version <VERSION>    Billing library version shown in diagnostics\n",
        "  --billing-inactive             Billing system is not installed; disable controls\n",
        "  --billing-timeout-ms <MS>      Billing status request timeout (default: 2000)\n",
        "  --nonce-ttl-secs <SECS>        Form token lifetime (default: 43200)\n",
        "  -V, --version                  Show version with git metadata\n",
        "  -h, --help                     Show this help\n\n",
        "Every option except --ephemeral and --billing-inactive can also be set through\n",
        "STAGING_CONTROLLER_<OPTION> (STAGING_CONTROLLER_BILLING_ACTIVE=false for the latter).\n"
    ));
}

pub fn version_text() -> String {
    let binary = env!("CARGO_PKG_NAME");
    let git_tag = option_env!("WCS_BUILD_GIT_TAG").unwrap_or("untagged");
    let git_commit = option_env!("WCS_BUILD_GIT_COMMIT").unwrap_or("unknown");
    let git_dirty = option_env!("WCS_BUILD_GIT_DIRTY").unwrap_or("false");
    let dirty = matches!(git_dirty, "true" | "1" | "yes" | "dirty");

    if dirty {
        format!("{binary} {git_tag} (dirty commit: {git_commit})")
    } else {
        format!("{binary} {git_tag}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|item| item.to_string()).collect()
    }

    fn no_env(_key: &str) -> Option<String> {
        None
    }

    fn launch(action: CliAction) -> LaunchConfig {
        match action {
            CliAction::Run(config) => *config,
            other => panic!("expected run action, got {other:?}"),
        }
    }

    #[test]
    fn flags_override_defaults() {
        let config = launch(
            parse_cli_args(
                args(&[
                    "--site-url",
                    "https://shop.example.com",
                    "--addr",
                    "0.0.0.0:9300",
                    "--ephemeral",
                    "--billing-inactive",
                    "--nonce-ttl-secs",
                    "60",
                ]),
                no_env,
            )
            .expect("args should parse"),
        );
        assert_eq!(config.addr.port(), 9300);
        assert_eq!(config.controller.site_url, "https://shop.example.com");
        assert!(config.controller.options_path.is_none());
        assert!(!config.controller.billing_active);
        assert_eq!(config.controller.nonce_ttl_secs, 60);
        assert_eq!(config.controller.billing_timeout_ms, DEFAULT_BILLING_TIMEOUT_MS);
    }

    #[test]
    fn environment_fills_missing_flags() {
        let env = HashMap::from([
            ("STAGING_CONTROLLER_SITE_URL", "https://env.example.com"),
            ("STAGING_CONTROLLER_ADMIN_TOKEN", "secret"),
            ("STAGING_CONTROLLER_BILLING_ACTIVE", "false"),
            ("STAGING_CONTROLLER_BILLING_VERSION", "7.2.0"),
        ]);
        let lookup = |key: &str| env.get(key).map(|value| value.to_string());
        let config = launch(parse_cli_args(Vec::new(), lookup).expect("env should parse"));
        assert_eq!(config.addr.to_string(), DEFAULT_ADDR);
        assert_eq!(config.controller.site_url, "https://env.example.com");
        assert_eq!(config.controller.admin_token.as_deref(), Some("secret"));
        assert!(!config.controller.billing_active);
        assert_eq!(config.controller.billing_version.as_deref(), Some("7.2.0"));
        assert_eq!(
            config.controller.options_path,
            Some(PathBuf::from(DEFAULT_OPTIONS_PATH))
        );
    }

    #[test]
    fn site_url_is_required_and_validated() {
        let err = parse_cli_args(Vec::new(), no_env).expect_err("site url is required");
        assert!(err.contains("--site-url"));

        let err = parse_cli_args(args(&["--site-url", "shop.example.com"]), no_env)
            .expect_err("relative url should be rejected");
        assert!(err.contains("absolute"));

        let err = parse_cli_args(args(&["--site-url", "http://127.0.0.1:8080"]), no_env)
            .expect_err("ip literal host should be rejected");
        assert!(err.contains("domain host"));
    }

    #[test]
    fn bad_flags_are_reported() {
        assert!(parse_cli_args(args(&["--bogus"]), no_env).is_err());
        assert!(parse_cli_args(args(&["--site-url"]), no_env).is_err());
        assert!(
            parse_cli_args(
                args(&["--site-url", "https://a.test", "--billing-timeout-ms", "soon"]),
                no_env
            )
            .is_err()
        );
        assert!(matches!(
            parse_cli_args(args(&["--version"]), no_env),
            Ok(CliAction::Version)
        ));
    }
}

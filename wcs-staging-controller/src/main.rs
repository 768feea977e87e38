use std::env;

use staging_controller::{
    CliAction, ControllerState, build_controller_app, init_logging, parse_cli_args,
    print_cli_help, version_text,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let launch = match parse_cli_args(env::args().skip(1), |key| env::var(key).ok()) {
        Ok(CliAction::Run(launch)) => *launch,
        Ok(CliAction::Help) => {
            print_cli_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("{}", version_text());
            return Ok(());
        }
        Err(err) => {
            eprintln!("error: {err}\n");
            print_cli_help();
            return Err(err.into());
        }
    };

    init_logging()?;
    info!("{}", version_text());

    let state = ControllerState::bootstrap(&launch.controller).await?;
    info!(
        "guarding site_url={} billing_active={}",
        launch.controller.site_url, launch.controller.billing_active
    );
    let app = build_controller_app(state);
    let listener = tokio::net::TcpListener::bind(launch.addr).await?;
    info!(
        "staging controller listening on http://{}/admin/wcs-staging-controller",
        listener.local_addr()?
    );
    axum::serve(listener, app).await?;
    Ok(())
}

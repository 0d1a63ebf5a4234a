use log::info;
use std::env;

mod config;
mod error;
mod handlers;
mod models;
mod payment;
mod publish;
mod registration_service;
mod routes;
mod state;

#[cfg(test)]
mod tests;

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env()?;
    let port = config.port;
    let app = routes::create_router(config).await?;

    if env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        info!("Starting event service on AWS Lambda");
        lambda_http::run(app).await
    } else {
        let addr = format!("0.0.0.0:{}", port);
        info!("Starting event service locally on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

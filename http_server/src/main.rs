use crate::authentication::IdentityServiceAuthenticator;
use crate::configuration::Settings;
use crate::use_case_app_container::UseCaseAppContainer;
use actix_web::{web, App, HttpServer};
use actix_web_opentelemetry::RequestTracing;
use anyhow::Context;
use notifications::FcmGateway;
use shared_kernel::http_client::HttpClient;
use shared_kernel::tracing::{config_telemetry, shutdown_global_tracer_provider};
use sqlx_postgres::repository::Repository;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;
use use_cases::authentication::Authenticator;
use use_cases::flash_offers::gateway::PushGateway;
use use_cases::AppImpl;

mod authentication;
mod configuration;
mod errors;
mod leak_scanner;
mod routes;
mod use_case_app_container;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config_telemetry("flash_offers_http_server")?;

    let settings = Settings::load()?;
    let gateway: Arc<dyn PushGateway> = Arc::new(
        FcmGateway::new(&settings.gateway).context("Failed to build the push gateway client")?,
    );
    let http_client = HttpClient::new(
        settings.application.outbound_max_retries,
        settings.application.outbound_timeout(),
    )?;
    let authenticator: Arc<dyn Authenticator> = Arc::new(IdentityServiceAuthenticator::new(
        &settings.identity,
        http_client,
    )?);
    let repository = Repository::new(&settings.database).await?;
    let dispatch_settings = settings.dispatch.clone();

    let address = settings.application.address();
    tracing::info!(%address, "Starting flash offer notification server");

    let result = HttpServer::new(move || {
        let app = AppImpl::new(
            repository.clone(),
            gateway.clone(),
            authenticator.clone(),
            dispatch_settings.clone(),
        );
        let app_container = UseCaseAppContainer::new(app);
        App::new()
            .wrap(TracingLogger::default())
            .wrap(RequestTracing::new())
            .configure(routes::config)
            .app_data(web::Data::new(app_container))
    })
    .bind(address)?
    .run()
    .await
    .context("Server failed to run");

    shutdown_global_tracer_provider();
    result
}

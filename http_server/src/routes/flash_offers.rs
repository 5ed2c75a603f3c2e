use crate::authentication::bearer_token;
use crate::errors::ApiError;
use crate::use_case_app_container::UseCaseAppContainer;
use actix_web::{web, HttpRequest, HttpResponse};

#[tracing::instrument(err, skip_all, level = "info")]
async fn notify(
    body: web::Bytes,
    app: web::Data<UseCaseAppContainer>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let outcome = app
        .get_client()
        .flash_offer_notifications()
        .dispatch(bearer_token(&req), &body)
        .await?;

    Ok(HttpResponse::Ok().json(outcome))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/flash-offers").service(web::resource("/notify").route(web::post().to(notify))),
    );
}

mod flash_offers;
mod health;

use actix_web::web;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::init_routes)
        .service(web::scope("/api").configure(flash_offers::init_routes));
}

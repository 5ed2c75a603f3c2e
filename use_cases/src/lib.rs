use crate::authentication::Authenticator;
use crate::flash_offers::gateway::PushGateway;
use crate::flash_offers::settings::DispatchSettings;
use crate::flash_offers::{FlashOfferNotificationInteractor, FlashOfferNotificationInteractorImpl};
use crate::repositories::Repository;
use std::sync::Arc;

pub mod actor;
pub mod authentication;
pub mod flash_offers;
mod repositories;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub trait App: Send + Sync {
    fn flash_offer_notifications(&self) -> &dyn FlashOfferNotificationInteractor;
}

pub struct AppImpl {
    flash_offer_notifications: Arc<dyn FlashOfferNotificationInteractor>,
}

impl App for AppImpl {
    fn flash_offer_notifications(&self) -> &dyn FlashOfferNotificationInteractor {
        self.flash_offer_notifications.as_ref()
    }
}

impl AppImpl {
    pub fn new<R: Repository + 'static>(
        repo: R,
        gateway: Arc<dyn PushGateway>,
        authenticator: Arc<dyn Authenticator>,
        settings: DispatchSettings,
    ) -> Self {
        let repository = Arc::new(repo);
        let flash_offer_notifications =
            FlashOfferNotificationInteractorImpl::new(repository, gateway, authenticator, settings);

        Self {
            flash_offer_notifications: Arc::new(flash_offer_notifications),
        }
    }
}

use crate::users::UserId;
use shared_kernel::string_key;
use strum_macros::{Display, EnumString};

string_key!(PushToken);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    Ios,
    Android,
}

/// A device the user registered for push. The engine never creates these; it only flips
/// `active` to false once the gateway reports the token as permanently undeliverable.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRegistration {
    pub user_id: UserId,
    pub token: PushToken,
    pub platform: Platform,
    pub active: bool,
}

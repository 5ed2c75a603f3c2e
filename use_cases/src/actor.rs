use entities::users::UserId;

/// The caller once the identity service has vouched for its bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub email: Option<String>,
}

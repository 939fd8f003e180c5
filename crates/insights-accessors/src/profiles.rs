//! User profile and role lookups.

use insights_gateway::{Filter, Gateway, GatewayExt, GatewayResult};
use insights_model::{tables, Role, UserId, UserProfile};

/// The profile of `user_id`, or `None` when the user has none.
pub async fn get_user_profile(
    gateway: &dyn Gateway,
    user_id: &UserId,
) -> GatewayResult<Option<UserProfile>> {
    gateway
        .find_one_as(tables::USER_PROFILES, &Filter::all().eq("id", user_id.as_str()))
        .await
}

/// The role of `user_id`; users without a profile are plain users.
pub async fn get_user_role(gateway: &dyn Gateway, user_id: &UserId) -> GatewayResult<Role> {
    Ok(get_user_profile(gateway, user_id)
        .await?
        .map(|profile| profile.role)
        .unwrap_or_default())
}

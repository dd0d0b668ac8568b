//! Dashboard operations: track a listing, list tracked listings, unsubscribe

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{ListingUrl, Session, TrackedProperty, User};
use crate::store::{SessionStore, StoreError};

/// Start tracking `raw_url` for the session's user
///
/// The URL is validated before any store call. The property is found or
/// created through the unique URL, and the user's mirror row is restored if
/// it is missing. A second subscription to the same property fails with
/// [`AppError::AlreadyTracking`].
pub async fn add_property(
    store: &dyn SessionStore,
    session: &Session,
    raw_url: &str,
) -> Result<TrackedProperty> {
    let url = ListingUrl::parse(raw_url).ok_or(AppError::InvalidListingUrl)?;
    let token = &session.access_token;
    let user_id = session.user_id();

    let property = store.upsert_property(token, url.as_str()).await?;

    if store
        .find_subscription(token, user_id, property.id)
        .await?
        .is_some()
    {
        tracing::info!("User {} already tracks {}", user_id, property.url);
        return Err(AppError::AlreadyTracking);
    }

    ensure_user_record(store, session).await?;

    let subscription = match store.insert_subscription(token, user_id, property.id).await {
        Ok(subscription) => subscription,
        // Lost a race with another request for the same pair
        Err(StoreError::Conflict(_)) => return Err(AppError::AlreadyTracking),
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        "User {} now tracks listing {} ({})",
        user_id,
        url.listing_id(),
        subscription.id
    );

    Ok(TrackedProperty {
        subscription_id: subscription.id,
        property,
    })
}

pub async fn list_tracked(store: &dyn SessionStore, session: &Session) -> Result<Vec<TrackedProperty>> {
    Ok(store
        .list_tracked(&session.access_token, session.user_id())
        .await?)
}

/// Remove one of the session user's subscriptions
pub async fn unsubscribe(
    store: &dyn SessionStore,
    session: &Session,
    subscription_id: Uuid,
) -> Result<()> {
    let removed = store
        .delete_subscription(&session.access_token, session.user_id(), subscription_id)
        .await?;

    if !removed {
        return Err(AppError::SubscriptionNotFound);
    }

    tracing::info!(
        "User {} unsubscribed {}",
        session.user_id(),
        subscription_id
    );
    Ok(())
}

/// Make sure the mirrored `users` row exists for the session's identity
///
/// Subscriptions reference this row, so it is checked again before every
/// subscription insert.
pub async fn ensure_user_record(store: &dyn SessionStore, session: &Session) -> Result<()> {
    let token = &session.access_token;
    let user_id = session.user_id();

    if store.find_user(token, user_id).await?.is_some() {
        return Ok(());
    }

    let user = User::mirror(user_id, session.user.email.as_deref());
    match store.insert_user(token, &user).await {
        Ok(()) => {
            tracing::info!("Created user record for {}", user_id);
            Ok(())
        }
        // Created by a concurrent request
        Err(StoreError::Conflict(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

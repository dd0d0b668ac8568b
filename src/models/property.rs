use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    LISTING_CANONICAL_BASE, LISTING_HOST, LISTING_PATH_SEGMENT, UNKNOWN_STATUS,
};

/// A tracked listing, shared by every user who subscribes to its URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    /// Canonical listing URL (unique)
    pub url: String,
    /// Last status reported by the checker
    #[serde(default)]
    pub current_status: Option<String>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Property {
    pub fn status_or_unknown(&self) -> &str {
        self.current_status.as_deref().unwrap_or(UNKNOWN_STATUS)
    }
}

/// A validated listing URL in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingUrl {
    listing_id: String,
    canonical: String,
}

impl ListingUrl {
    /// Validate a user-supplied listing URL
    ///
    /// Accepts `http`/`https` on `rightmove.co.uk` or `www.rightmove.co.uk`
    /// with a `/properties/<digits>` path. Query string and fragment are
    /// dropped from the canonical form.
    pub fn parse(raw: &str) -> Option<Self> {
        let url = reqwest::Url::parse(raw.trim()).ok()?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }

        let host = url.host_str()?.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        if host != LISTING_HOST {
            return None;
        }

        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        if segments.next()? != LISTING_PATH_SEGMENT {
            return None;
        }

        let listing_id = segments.next()?;
        if listing_id.is_empty() || !listing_id.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if segments.next().is_some() {
            return None;
        }

        Some(Self {
            listing_id: listing_id.to_string(),
            canonical: format!("{}{}", LISTING_CANONICAL_BASE, listing_id),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn listing_id(&self) -> &str {
        &self.listing_id
    }
}

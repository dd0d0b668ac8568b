/// Host every tracked listing must belong to
pub const LISTING_HOST: &str = "rightmove.co.uk";

/// Path segment preceding the numeric listing id
pub const LISTING_PATH_SEGMENT: &str = "properties";

/// Canonical form stored for every listing URL
pub const LISTING_CANONICAL_BASE: &str = "https://www.rightmove.co.uk/properties/";

/// Status shown when the checker has not reported one yet
pub const UNKNOWN_STATUS: &str = "Unknown";

// =============================================================================
// Session Cookies
// =============================================================================

/// Namespace owned by the session bridge. Every cookie starting with it
/// belongs to the auth subsystem.
pub const AUTH_COOKIE_PREFIX: &str = "sb-";

/// Substrings that also mark a cookie as auth state
pub const AUTH_COOKIE_MARKERS: [&str; 4] =
    ["supabase", "auth-token", "access-token", "refresh-token"];

/// Suffix of the primary session cookie (`sb-<ref>-auth-token`)
pub const SESSION_COOKIE_SUFFIX: &str = "-auth-token";

/// Suffix of the PKCE verifier cookie, appended to the primary name
pub const CODE_VERIFIER_SUFFIX: &str = "-code-verifier";

/// Marker in front of base64url encoded cookie values
pub const COOKIE_VALUE_BASE64_PREFIX: &str = "base64-";

/// Largest value written into a single cookie before chunking
pub const COOKIE_CHUNK_SIZE: usize = 3180;

/// Session cookie lifetime (400 days, the browser maximum)
pub const SESSION_COOKIE_MAX_AGE_SECS: i64 = 400 * 24 * 60 * 60;

/// PKCE verifier cookie lifetime (10 minutes)
pub const CODE_VERIFIER_MAX_AGE_SECS: i64 = 600;

/// Refresh a session that expires within this window
pub const SESSION_EXPIRY_MARGIN_SECS: i64 = 90;

/// Length of a generated PKCE code verifier
pub const CODE_VERIFIER_LENGTH: usize = 64;

// =============================================================================
// Sign-out Flags
// =============================================================================

/// Header that marks a request as a sign-out
pub const SIGNOUT_HEADER: &str = "x-signout";

/// Query parameter that marks a request as a sign-out
pub const SIGNOUT_QUERY_PARAM: &str = "signout";

/// Path fragment that marks a request as a sign-out
pub const SIGNOUT_PATH_FRAGMENT: &str = "/logout";

// =============================================================================
// Paths
// =============================================================================

pub const HOME_PATH: &str = "/";
pub const SIGN_IN_PATH: &str = "/sign-in";
pub const DASHBOARD_PATH: &str = "/dashboard";

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for a URL that is not a listing
pub const ERR_INVALID_LISTING_URL: &str = "Please enter a valid Rightmove property URL";

/// Error message for a second subscription to the same listing
pub const ERR_ALREADY_TRACKING: &str = "You are already tracking this property";

/// Error message when adding a property without a session
pub const ERR_SIGN_IN_REQUIRED: &str = "You must be signed in to add properties";

/// Backend failure while adding a property
pub const ERR_ADD_PROPERTY_FAILED: &str = "Failed to add property";

/// Backend failure on any other operation
pub const ERR_REQUEST_FAILED: &str = "Something went wrong, please try again";

/// Session missing or rejected outside the add-property form
pub const ERR_SESSION_REQUIRED: &str = "Please sign in to continue";

/// Error message for a malformed sign-in email
pub const ERR_INVALID_EMAIL: &str = "Please enter a valid email address";

/// Error message for a failed sign-in round trip
pub const ERR_SIGN_IN_FAILED: &str = "Sign in failed, please try again";

/// Error message when the tracked list cannot be loaded
pub const ERR_LOAD_FAILED: &str = "Failed to load your properties";

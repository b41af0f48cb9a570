//! User-Agent string sent with every request.

/// Project URL included in the User-Agent so site operators can reach us.
const PROJECT_UA_URL: &str = "https://github.com/fierce/pdf-mirror";

/// Default User-Agent: `pdf-mirror/<version> (+<project url>)`.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("pdf-mirror/{version} (+{PROJECT_UA_URL})")
}

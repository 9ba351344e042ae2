use cookie::time::{Duration, OffsetDateTime};
use cookie::Cookie;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};

use crate::error::{Result, SessionError};

use super::{Options, SameSite};

/// Find the value of the cookie called `name` in the request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|parsed| parsed.ok())
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

/// Build a session cookie from the session's options.
///
/// `max_age > 0` sets both `Max-Age` and `Expires`; `max_age < 0` expires the
/// cookie immediately; `max_age == 0` leaves a browser-session cookie.
pub fn new_cookie(name: &str, value: &str, options: &Options) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .path(options.path.clone())
        .secure(options.secure)
        .http_only(options.http_only);

    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(match same_site {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        });
    }

    if options.max_age > 0 {
        let age = Duration::seconds(options.max_age);
        builder = builder.max_age(age);
        // Past the representable date range only Max-Age is sent.
        if let Some(expires) = OffsetDateTime::now_utc().checked_add(age) {
            builder = builder.expires(expires);
        }
    } else if options.max_age < 0 {
        builder = builder
            .max_age(Duration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH + Duration::seconds(1));
    }

    builder.build()
}

/// Append a cookie to the response headers as a `Set-Cookie` line.
pub fn set_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) -> Result<()> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| SessionError::InvalidHeader(e.to_string()))?;
    headers.append(SET_COOKIE, value);
    Ok(())
}

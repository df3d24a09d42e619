//! Cross-origin check on the `Origin` / `Referer` request headers.

use crate::core::types::Action;
use crate::error::AuthRejection;

/// Allow or reject a request by comparing the browser-supplied origin to `Host`.
///
/// - `list` is always allowed.
/// - If `Origin` is present its authority must equal `Host`, else `OriginMismatch`.
/// - Otherwise, if `Referer` is present, same check, else `RefererMismatch`.
/// - Neither header present: allowed (non-browser client).
pub fn check_origin(
    action: Action,
    origin: Option<&str>,
    referer: Option<&str>,
    host: Option<&str>,
) -> Result<(), AuthRejection> {
    if action.skips_origin_check() {
        return Ok(());
    }
    if let Some(origin) = origin {
        if !same_authority(origin, host) {
            return Err(AuthRejection::OriginMismatch);
        }
        return Ok(());
    }
    if let Some(referer) = referer
        && !same_authority(referer, host)
    {
        return Err(AuthRejection::RefererMismatch);
    }
    Ok(())
}

fn same_authority(url: &str, host: Option<&str>) -> bool {
    match (authority(url), host) {
        (Some(authority), Some(host)) => authority.eq_ignore_ascii_case(host.trim()),
        _ => false,
    }
}

/// `host[:port]` part of an absolute URL, without userinfo.
fn authority(url: &str) -> Option<&str> {
    let (_, rest) = url.trim().split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    let authority = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);
    (!authority.is_empty()).then_some(authority)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_foreign_origin() {
        assert_eq!(
            check_origin(
                Action::Run,
                Some("https://evil.example"),
                None,
                Some("nautilus.local")
            ),
            Err(AuthRejection::OriginMismatch)
        );
    }

    #[test]
    fn allows_matching_origin() {
        assert_eq!(
            check_origin(
                Action::Run,
                Some("https://nautilus.local"),
                Some("https://evil.example/page"),
                Some("nautilus.local")
            ),
            Ok(())
        );
    }

    #[test]
    fn port_is_part_of_the_authority() {
        assert_eq!(
            check_origin(
                Action::Stop,
                Some("http://nautilus.local:8080"),
                None,
                Some("nautilus.local:8080")
            ),
            Ok(())
        );
        assert_eq!(
            check_origin(
                Action::Stop,
                Some("http://nautilus.local:9999"),
                None,
                Some("nautilus.local:8080")
            ),
            Err(AuthRejection::OriginMismatch)
        );
    }

    #[test]
    fn falls_back_to_referer() {
        assert_eq!(
            check_origin(
                Action::Respond,
                None,
                Some("https://evil.example/x?y=1"),
                Some("nautilus.local")
            ),
            Err(AuthRejection::RefererMismatch)
        );
        assert_eq!(
            check_origin(
                Action::Respond,
                None,
                Some("https://NAUTILUS.local/index.html"),
                Some("nautilus.local")
            ),
            Ok(())
        );
    }

    #[test]
    fn allows_requests_without_browser_headers() {
        assert_eq!(check_origin(Action::Run, None, None, None), Ok(()));
    }

    #[test]
    fn opaque_or_hostless_origins_mismatch() {
        assert_eq!(
            check_origin(Action::Token, Some("null"), None, Some("nautilus.local")),
            Err(AuthRejection::OriginMismatch)
        );
        assert_eq!(
            check_origin(Action::Token, Some("https://nautilus.local"), None, None),
            Err(AuthRejection::OriginMismatch)
        );
    }

    #[test]
    fn list_skips_the_check() {
        assert_eq!(
            check_origin(
                Action::List,
                Some("https://evil.example"),
                None,
                Some("nautilus.local")
            ),
            Ok(())
        );
    }
}

//! Scope validation against a client's allowed scopes and a previously-granted scope set.
//!
//! Parsing/formatting is a pure function of a space-separated string; validation comes in
//! two distinct flavours rather than one overloaded entry point, per the design notes:
//! `validate_scopes_against_client` (dynamic, authorize/token-issuance time) and
//! `validate_scopes_within_grant` (static, refresh-token narrowing).

use crate::error::OAuthError;
use crate::models::{OAuthClient, OAuthScope};

pub const OPENID_SCOPE: &str = "openid";

/// Split on whitespace, drop empties. `""` and `None` both parse to an empty set.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Join with single spaces. Inverse of `parse_scopes` up to set/ordering equivalence.
pub fn format_scopes(scopes: &[String]) -> String {
    scopes.join(" ")
}

pub fn is_openid_request(scopes: &[String]) -> bool {
    scopes.iter().any(|s| s == OPENID_SCOPE)
}

/// Dynamic validation: the requested set must be a subset of `client.allowed_scopes`, each
/// requested scope must exist and be active in the catalogue, and — if the client is PUBLIC —
/// each must also be marked public. An empty requested set is valid and yields an empty grant.
///
/// `catalogue` is expected to already be the result of looking up exactly `requested` by name
/// (e.g. via `OAuthRepository::find_scopes_by_names`), so a name with no matching row is
/// implicitly "unknown" rather than silently dropped.
pub fn validate_scopes_against_client(
    requested: &[String],
    client: &OAuthClient,
    catalogue: &[OAuthScope],
) -> Result<Vec<String>, OAuthError> {
    if requested.is_empty() {
        return Ok(Vec::new());
    }

    for scope in requested {
        if !client.allowed_scopes.iter().any(|s| s == scope) {
            return Err(OAuthError::InvalidScope(format!(
                "scope '{scope}' is not allowed for this client"
            )));
        }

        let catalogue_entry = catalogue.iter().find(|s| &s.name == scope);
        let catalogue_entry = match catalogue_entry {
            Some(entry) if entry.is_active => entry,
            _ => {
                return Err(OAuthError::InvalidScope(format!(
                    "scope '{scope}' is unknown"
                )))
            }
        };

        if client.is_public() && !catalogue_entry.is_public {
            return Err(OAuthError::InvalidScope(format!(
                "scope '{scope}' is not available to public clients"
            )));
        }
    }

    Ok(requested.to_vec())
}

/// Static validation: used by refresh-token narrowing. Every requested scope must already
/// appear in the previously-granted set; requesting a wider set is `invalid_scope`.
pub fn validate_scopes_within_grant(
    requested: &[String],
    previously_granted: &[String],
) -> Result<Vec<String>, OAuthError> {
    if requested.is_empty() {
        return Ok(previously_granted.to_vec());
    }

    for scope in requested {
        if !previously_granted.iter().any(|s| s == scope) {
            return Err(OAuthError::InvalidScope(format!(
                "scope '{scope}' exceeds the originally granted scope"
            )));
        }
    }

    Ok(requested.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn client(public: bool, allowed: &[&str]) -> OAuthClient {
        OAuthClient {
            id: Uuid::new_v4(),
            client_id: "demo".to_string(),
            secret_hash: None,
            secret_expires_at: None,
            name: "demo".to_string(),
            client_type: if public {
                crate::models::ClientType::Public
            } else {
                crate::models::ClientType::Confidential
            },
            redirect_uris: vec![],
            allowed_scopes: allowed.iter().map(|s| s.to_string()).collect(),
            grant_types: vec![],
            jwks_uri: None,
            require_pkce: false,
            is_active: true,
            access_token_ttl_secs: None,
            refresh_token_ttl_secs: None,
            created_at: Utc::now(),
        }
    }

    fn scope(name: &str, is_public: bool) -> OAuthScope {
        OAuthScope {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            is_public,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn parse_format_roundtrip() {
        let parsed = parse_scopes("openid  profile   read");
        assert_eq!(parsed, vec!["openid", "profile", "read"]);
        assert_eq!(format_scopes(&parsed), "openid profile read");
    }

    #[test]
    fn empty_request_yields_empty_grant() {
        let c = client(false, &["openid"]);
        let granted = validate_scopes_against_client(&[], &c, &[]).unwrap();
        assert!(granted.is_empty());
    }

    #[test]
    fn public_client_rejects_non_public_scope() {
        let c = client(true, &["openid", "admin"]);
        let catalogue = vec![scope("openid", true), scope("admin", false)];
        let requested = vec!["admin".to_string()];
        let err = validate_scopes_against_client(&requested, &c, &catalogue).unwrap_err();
        assert!(matches!(err, OAuthError::InvalidScope(_)));
    }

    #[test]
    fn confidential_client_may_receive_non_public_scope() {
        let c = client(false, &["admin"]);
        let catalogue = vec![scope("admin", false)];
        let requested = vec!["admin".to_string()];
        let granted = validate_scopes_against_client(&requested, &c, &catalogue).unwrap();
        assert_eq!(granted, requested);
    }

    #[test]
    fn scope_outside_allowed_set_rejected() {
        let c = client(false, &["openid"]);
        let requested = vec!["profile".to_string()];
        let err = validate_scopes_against_client(&requested, &c, &[]).unwrap_err();
        assert!(matches!(err, OAuthError::InvalidScope(_)));
    }

    #[test]
    fn refresh_narrowing_allows_subset_rejects_superset() {
        let granted = vec!["openid".to_string(), "profile".to_string()];
        let narrowed = validate_scopes_within_grant(&["openid".to_string()], &granted).unwrap();
        assert_eq!(narrowed, vec!["openid".to_string()]);

        let err =
            validate_scopes_within_grant(&["openid".to_string(), "admin".to_string()], &granted)
                .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidScope(_)));
    }

    #[test]
    fn refresh_narrowing_empty_request_keeps_full_grant() {
        let granted = vec!["openid".to_string(), "profile".to_string()];
        let narrowed = validate_scopes_within_grant(&[], &granted).unwrap();
        assert_eq!(narrowed, granted);
    }

    #[test]
    fn openid_detection() {
        assert!(is_openid_request(&["openid".to_string(), "profile".to_string()]));
        assert!(!is_openid_request(&["profile".to_string()]));
    }
}

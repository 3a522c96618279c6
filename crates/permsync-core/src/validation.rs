//! Admin input validation.
//!
//! Every admin request passes through these checks before the store is
//! touched. Names are trimmed; blank names are dropped; a request that ends
//! up empty is rejected.

use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::grant::{GroupMembership, PermissionGrant};
use crate::types::PlayerId;

/// Parse a player id, rejecting blanks and non-UUIDs.
pub fn parse_player_id(raw: &str) -> Result<PlayerId, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidPlayerId(raw.to_string()));
    }
    trimmed
        .parse()
        .map_err(|_| ValidationError::InvalidPlayerId(raw.to_string()))
}

/// Trim a group name, rejecting blanks.
pub fn require_group_name(raw: &str) -> Result<String, ValidationError> {
    require_non_blank(raw, "group_name")
}

/// Trim a permission string, rejecting blanks.
pub fn require_permission(raw: &str) -> Result<String, ValidationError> {
    require_non_blank(raw, "permission")
}

fn require_non_blank(raw: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Missing(field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Trim and deduplicate a list of names. Fails with `Missing(field)` if
/// nothing is left.
pub fn sanitize_names<S: AsRef<str>>(
    values: impl IntoIterator<Item = S>,
    field: &'static str,
) -> Result<Vec<String>, ValidationError> {
    let mut names: Vec<String> = values
        .into_iter()
        .filter_map(|v| {
            let trimmed = v.as_ref().trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect();
    names.sort();
    names.dedup();

    if names.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    Ok(names)
}

/// Trim grant permissions and collapse duplicates (last expiry wins).
pub fn sanitize_grants(
    grants: impl IntoIterator<Item = PermissionGrant>,
) -> Result<Vec<PermissionGrant>, ValidationError> {
    let by_key: BTreeMap<String, Option<i64>> = grants
        .into_iter()
        .filter_map(|g| {
            let permission = g.permission.trim();
            (!permission.is_empty()).then(|| (permission.to_string(), g.expires_at))
        })
        .collect();

    if by_key.is_empty() {
        return Err(ValidationError::Missing("permission_grants"));
    }
    Ok(by_key
        .into_iter()
        .map(|(permission, expires_at)| PermissionGrant {
            permission,
            expires_at,
        })
        .collect())
}

/// Trim membership group names and collapse duplicates (last expiry wins).
pub fn sanitize_memberships(
    memberships: impl IntoIterator<Item = GroupMembership>,
) -> Result<Vec<GroupMembership>, ValidationError> {
    let by_key: BTreeMap<String, Option<i64>> = memberships
        .into_iter()
        .filter_map(|m| {
            let name = m.group_name.trim();
            (!name.is_empty()).then(|| (name.to_string(), m.expires_at))
        })
        .collect();

    if by_key.is_empty() {
        return Err(ValidationError::Missing("group_memberships"));
    }
    Ok(by_key
        .into_iter()
        .map(|(group_name, expires_at)| GroupMembership {
            group_name,
            expires_at,
        })
        .collect())
}

/// Reject any entry whose expiry is not strictly after `now`.
pub fn reject_past_expiry<'a>(
    entries: impl IntoIterator<Item = (&'a str, Option<i64>)>,
    now: i64,
) -> Result<(), ValidationError> {
    for (key, expires_at) in entries {
        if let Some(expires_at) = expires_at {
            if expires_at <= now {
                return Err(ValidationError::PastExpiry {
                    key: key.to_string(),
                    expires_at,
                    now,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_player_id() {
        let id = PlayerId::random();
        assert_eq!(parse_player_id(&format!("  {id} ")).unwrap(), id);
        assert!(matches!(
            parse_player_id("   "),
            Err(ValidationError::InvalidPlayerId(_))
        ));
        assert!(matches!(
            parse_player_id("not-a-uuid"),
            Err(ValidationError::InvalidPlayerId(_))
        ));
    }

    #[test]
    fn test_sanitize_names_trims_and_dedupes() {
        let names = sanitize_names([" fly", "fly ", "", "build"], "permissions").unwrap();
        assert_eq!(names, vec!["build".to_string(), "fly".to_string()]);
    }

    #[test]
    fn test_sanitize_names_rejects_all_blank() {
        assert_eq!(
            sanitize_names(["  ", ""], "permissions"),
            Err(ValidationError::Missing("permissions"))
        );
    }

    #[test]
    fn test_sanitize_grants_last_expiry_wins() {
        let grants = sanitize_grants([
            PermissionGrant::until("fly", 10),
            PermissionGrant::until(" fly ", 20),
            PermissionGrant::permanent(" "),
        ])
        .unwrap();
        assert_eq!(grants, vec![PermissionGrant::until("fly", 20)]);
    }

    #[test]
    fn test_sanitize_memberships_rejects_empty() {
        assert_eq!(
            sanitize_memberships(Vec::new()),
            Err(ValidationError::Missing("group_memberships"))
        );
    }

    #[test]
    fn test_past_expiry() {
        assert!(reject_past_expiry([("fly", None), ("build", Some(101))], 100).is_ok());
        // exactly now counts as past
        assert_eq!(
            reject_past_expiry([("fly", Some(100))], 100),
            Err(ValidationError::PastExpiry {
                key: "fly".into(),
                expires_at: 100,
                now: 100,
            })
        );
    }

    #[test]
    fn test_require_group_name() {
        assert_eq!(require_group_name(" admins ").unwrap(), "admins");
        assert_eq!(
            require_group_name("  "),
            Err(ValidationError::Missing("group_name"))
        );
        assert_eq!(require_permission("\tfly").unwrap(), "fly");
    }
}

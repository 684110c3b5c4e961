//! Login and location binding flows.
//!
//! A device is bound to one location by an admin; the bound location code is
//! remembered locally. Employees then log in with a personal passcode, which
//! resolves their role and must grant access to the bound location.

use tracing::{info, warn};

use crate::error::ChecklistError;
use crate::fields::Role;
use crate::prefs::{Preferences, LOCATION_CODE_KEY};
use crate::store::{Document, RemoteStore};

/// A verified entry of the `locations` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub code: String,
    pub name: String,
}

/// Who is using the checklist and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub role: Role,
    pub location_code: String,
    /// Site name, used to pick location hints and external task settings.
    pub location: String,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn user_locations(user: &Document) -> Vec<&str> {
    user.fields
        .get("location")
        .and_then(|v| v.as_array())
        .map(|codes| codes.iter().filter_map(|c| c.as_str()).collect())
        .unwrap_or_default()
}

/// Look up a location by code. Codes are compared upper-cased.
pub fn verify_location_code<S: RemoteStore>(
    store: &S,
    code: &str,
) -> Result<Location, ChecklistError> {
    let wanted = code.trim().to_uppercase();
    let location = store
        .get_all("locations")?
        .into_iter()
        .find(|doc| doc.str_field("Code") == Some(wanted.as_str()))
        .map(|doc| Location {
            code: wanted.clone(),
            name: doc.str_field("Name").unwrap_or(&wanted).to_string(),
        });
    match location {
        Some(location) => {
            info!(code = %location.code, name = %location.name, "location verified");
            Ok(location)
        }
        None => {
            warn!(code = %wanted, "location verification failed");
            Err(ChecklistError::UnknownLocation(wanted))
        }
    }
}

/// Accept the code only if it is the passcode of an admin user.
pub fn verify_admin<S: RemoteStore>(store: &S, code: &str) -> Result<(), ChecklistError> {
    let verified = !code.is_empty()
        && store.get_all("users")?.iter().any(|user| {
            user.str_field("passcode") == Some(code) && user.str_field("role") == Some("Admin")
        });
    if verified {
        Ok(())
    } else {
        Err(ChecklistError::InvalidAdminCode)
    }
}

/// Bind this device to a location. Requires an admin passcode.
pub fn bind_location<S: RemoteStore>(
    store: &S,
    prefs: &mut Preferences,
    code: &str,
    admin_code: &str,
) -> Result<Location, ChecklistError> {
    let location = verify_location_code(store, code)?;
    verify_admin(store, admin_code)?;
    prefs.set(LOCATION_CODE_KEY, &location.code)?;
    Ok(location)
}

/// Forget the bound location. Requires an admin passcode.
pub fn reset_location<S: RemoteStore>(
    store: &S,
    prefs: &mut Preferences,
    admin_code: &str,
) -> Result<(), ChecklistError> {
    verify_admin(store, admin_code)?;
    prefs.remove(LOCATION_CODE_KEY)?;
    info!("location binding reset");
    Ok(())
}

/// The location code this device is bound to.
pub fn remembered_location(prefs: &Preferences) -> Result<String, ChecklistError> {
    prefs
        .get(LOCATION_CODE_KEY)
        .map(str::to_string)
        .ok_or(ChecklistError::NoRememberedLocation)
}

/// Log in at a location with a personal passcode.
pub fn login<S: RemoteStore>(
    store: &S,
    location_code: &str,
    passcode: &str,
) -> Result<Session, ChecklistError> {
    if passcode.is_empty() {
        return Err(ChecklistError::InvalidPasscode);
    }
    let users = store.get_all("users")?;
    let user = users
        .iter()
        .find(|u| u.str_field("passcode") == Some(passcode))
        .ok_or(ChecklistError::InvalidPasscode)?;

    let location = verify_location_code(store, location_code)?;
    if !user_locations(user).contains(&location.code.as_str()) {
        return Err(ChecklistError::LocationNotPermitted);
    }

    let role = Role::from_document(user.str_field("role"));
    info!(location = %location.name, ?role, "logged in");
    Ok(Session { role, location_code: location.code, location: location.name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{fields_from, DocumentStore};
    use serde_json::json;

    fn seeded() -> DocumentStore {
        let mut store = DocumentStore::in_memory();
        store
            .merge_document("locations", "w", fields_from(json!({"Code": "LOC001", "Name": "Waimea"})))
            .unwrap();
        store
            .merge_document("locations", "c", fields_from(json!({"Code": "LOC002", "Name": "CMP"})))
            .unwrap();
        store
            .merge_document(
                "users",
                "kai",
                fields_from(json!({"passcode": "1111", "role": "Regular", "location": ["LOC001"]})),
            )
            .unwrap();
        store
            .merge_document(
                "users",
                "boss",
                fields_from(json!({"passcode": "999999", "role": "Admin", "location": ["LOC001", "LOC002"]})),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_location_codes_are_upper_cased() {
        let store = seeded();
        let location = verify_location_code(&store, "loc002").unwrap();
        assert_eq!(location, Location { code: "LOC002".into(), name: "CMP".into() });
        assert!(matches!(
            verify_location_code(&store, "LOC404"),
            Err(ChecklistError::UnknownLocation(code)) if code == "LOC404"
        ));
    }

    #[test]
    fn test_login_resolves_role_and_checks_permissions() {
        let store = seeded();
        let session = login(&store, "LOC001", "1111").unwrap();
        assert_eq!(session.role, Role::Employee);
        assert_eq!(session.location, "Waimea");

        assert!(login(&store, "LOC002", "999999").unwrap().is_admin());
        assert!(matches!(
            login(&store, "LOC002", "1111"),
            Err(ChecklistError::LocationNotPermitted)
        ));
        assert!(matches!(login(&store, "LOC001", "0000"), Err(ChecklistError::InvalidPasscode)));
        assert!(matches!(login(&store, "LOC001", ""), Err(ChecklistError::InvalidPasscode)));
    }

    #[test]
    fn test_bind_and_reset_require_admin() {
        let store = seeded();
        let dir = tempfile::tempdir().unwrap();
        let mut prefs = Preferences::open(&dir.path().join("prefs.json")).unwrap();

        assert!(matches!(
            bind_location(&store, &mut prefs, "loc001", "1111"),
            Err(ChecklistError::InvalidAdminCode)
        ));
        assert!(matches!(remembered_location(&prefs), Err(ChecklistError::NoRememberedLocation)));

        bind_location(&store, &mut prefs, "loc001", "999999").unwrap();
        assert_eq!(remembered_location(&prefs).unwrap(), "LOC001");

        assert!(reset_location(&store, &mut prefs, "").is_err());
        reset_location(&store, &mut prefs, "999999").unwrap();
        assert!(remembered_location(&prefs).is_err());
    }
}

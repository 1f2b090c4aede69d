use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::types::User;
use crate::Store;

/// Signup payload. Verification flows live outside this subsystem;
/// accounts start unverified.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
}

impl Store {
    #[instrument(skip(self, new), fields(email = %new.email))]
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let id = Uuid::now_v7().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let salt = SaltString::generate(&mut OsRng);
        let credential_hash = Argon2::default()
            .hash_password(new.password.as_bytes(), &salt)
            .map_err(|e| StoreError::Corrupt(format!("credential hash: {e}")))?
            .to_string();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO users (id, email, credential_hash, verified, prefs, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, '{}', ?4, ?4)",
            rusqlite::params![id, new.email, credential_hash, now],
        )?;

        Ok(User {
            id,
            email: new.email.clone(),
            credential_hash,
            verified: false,
            prefs: serde_json::json!({}),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, email, credential_hash, verified, prefs, created_at, updated_at
             FROM users WHERE id = ?1",
            rusqlite::params![id],
            row_to_user,
        ) {
            Ok(u) => Ok(u),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::NotFound(format!("user {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let prefs: serde_json::Value =
        serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        credential_hash: row.get(2)?,
        verified: row.get::<_, i64>(3)? != 0,
        prefs,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_get_user() {
        let store = Store::open_in_memory().unwrap();
        let user = store
            .create_user(&NewUser {
                email: "bob@example.com".into(),
                password: "correct horse".into(),
            })
            .unwrap();
        assert!(!user.verified);
        assert!(user.credential_hash.starts_with("$argon2"));

        let got = store.get_user(&user.id).unwrap();
        assert_eq!(got.email, "bob@example.com");
        assert!(matches!(
            store.get_user("missing").unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let new = NewUser {
            email: "dup@example.com".into(),
            password: "pw".into(),
        };
        store.create_user(&new).unwrap();
        assert!(store.create_user(&new).is_err());
    }
}

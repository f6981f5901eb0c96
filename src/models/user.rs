//! User-related models

use serde::{Deserialize, Serialize};

use super::de::string_or_u64;
use super::UserId;

/// User object as returned by `/auth/user/`, `/usuarios/{id}/`, or embedded in messages.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    #[serde(deserialize_with = "string_or_u64", alias = "pk")]
    pub id: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, alias = "nombre_completo")]
    pub nombre: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "foto_perfil", alias = "avatar_url")]
    pub avatar: Option<String>,
}

/// Denormalized user summary used for ownership checks and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    pub email: Option<String>,
}

impl From<RawUser> for UserSummary {
    fn from(raw: RawUser) -> Self {
        let full_name = match (raw.first_name.as_deref(), raw.last_name.as_deref()) {
            (Some(first), Some(last)) if !first.is_empty() || !last.is_empty() => {
                Some(format!("{} {}", first, last).trim().to_string())
            }
            (Some(first), None) if !first.is_empty() => Some(first.to_string()),
            _ => None,
        };
        let name = raw
            .nombre
            .filter(|n| !n.trim().is_empty())
            .or(full_name)
            .or(raw.username.filter(|n| !n.is_empty()))
            .or_else(|| raw.email.clone())
            .unwrap_or_else(|| format!("User {}", raw.id));

        Self {
            id: raw.id,
            name,
            avatar: raw.avatar.filter(|a| !a.is_empty()),
            email: raw.email,
        }
    }
}

impl RawUser {
    /// Whether the object carries anything beyond the id (embedded summaries often don't).
    pub fn has_profile(&self) -> bool {
        self.username.is_some()
            || self.nombre.is_some()
            || self.first_name.is_some()
            || self.email.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawUser {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_name_preference() {
        let u: UserSummary =
            raw(r#"{"id": 1, "nombre": "Ana Ruiz", "username": "ana", "first_name": "X"}"#).into();
        assert_eq!(u.name, "Ana Ruiz");

        let u: UserSummary =
            raw(r#"{"id": 2, "first_name": "Luis", "last_name": "Gil", "username": "lg"}"#).into();
        assert_eq!(u.name, "Luis Gil");

        let u: UserSummary = raw(r#"{"id": 3, "username": "marta"}"#).into();
        assert_eq!(u.name, "marta");

        let u: UserSummary = raw(r#"{"id": "4"}"#).into();
        assert_eq!(u.name, "User 4");
    }

    #[test]
    fn test_avatar_aliases() {
        let u: UserSummary = raw(r#"{"id": 5, "foto_perfil": "https://cdn/x.png"}"#).into();
        assert_eq!(u.avatar.as_deref(), Some("https://cdn/x.png"));
        let u: UserSummary = raw(r#"{"pk": 6, "avatar": ""}"#).into();
        assert_eq!(u.id, 6);
        assert_eq!(u.avatar, None);
    }
}

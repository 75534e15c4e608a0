use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default, alias = "username")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Body for `PUT /users/{id}`. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
}

/// Registration may or may not log the user in straight away.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Answer of the token check endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtectedResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user: Option<User>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_auth_response() {
        let resp: AuthResponse = serde_json::from_value(json!({
            "token": "a.b.c",
            "user": {"_id": "u1", "name": "Ada", "email": "ada@example.com"},
        }))
        .unwrap();
        assert_eq!(resp.token, "a.b.c");
        let user = resp.user.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.name, "Ada");
    }

    #[test]
    fn test_parse_register_response_without_token() {
        let resp: RegisterResponse =
            serde_json::from_value(json!({"message": "User created"})).unwrap();
        assert_eq!(resp.message.as_deref(), Some("User created"));
        assert!(resp.token.is_none());
        assert!(resp.user.is_none());
    }

    #[test]
    fn test_credentials_body() {
        let creds = Credentials {
            email: "ada@example.com".to_string(),
            password: "secret".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&creds).unwrap(),
            json!({"email": "ada@example.com", "password": "secret"})
        );
    }
}

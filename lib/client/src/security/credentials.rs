use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Security material of a client: its registration and its last access token.
///
/// Serialized as the `parameters.security` object of a profile:
/// `{"client_id": .., "client_secret": .., "jwt": .., "expires": "<RFC 3339>", "type": "bearer"}`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rfc3339_option"
    )]
    pub expires: Option<OffsetDateTime>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Credentials {
    /// Whether the client registered and has both a client id and a secret.
    pub fn is_registered(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// The registration as `(client_id, client_secret)`.
    pub fn client(&self) -> Option<(&str, &str)> {
        Some((self.client_id.as_deref()?, self.client_secret.as_deref()?))
    }

    pub fn set_client(&mut self, client_id: impl Into<String>, client_secret: impl Into<String>) {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
    }

    pub fn set_token(
        &mut self,
        jwt: impl Into<String>,
        token_type: impl Into<String>,
        expires: OffsetDateTime,
    ) {
        self.jwt = Some(jwt.into());
        self.token_type = Some(token_type.into());
        self.expires = Some(expires);
    }

    /// True when there is no token or when it expired.
    pub fn is_token_expired(&self) -> bool {
        self.is_token_expired_at(OffsetDateTime::now_utc())
    }

    pub fn is_token_expired_at(&self, now: OffsetDateTime) -> bool {
        match (&self.jwt, self.expires) {
            (Some(_), Some(expires)) => expires <= now,
            _ => true,
        }
    }

    pub fn has_valid_token(&self) -> bool {
        !self.is_token_expired()
    }

    /// The `Authorization` header value for the current token, if it is still valid.
    pub fn bearer(&self) -> Option<String> {
        if self.is_token_expired() {
            return None;
        }
        self.jwt.as_ref().map(|jwt| format!("Bearer {jwt}"))
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("jwt", &self.jwt.as_ref().map(|_| "***"))
            .field("expires", &self.expires)
            .field("token_type", &self.token_type)
            .finish()
    }
}

mod rfc3339_option {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(
        value: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => {
                let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&formatted)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OffsetDateTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .filter(|value| !value.is_empty())
            .map(|value| OffsetDateTime::parse(&value, &Rfc3339).map_err(de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::format_description::well_known::Rfc3339;
    use time::Duration;

    #[test]
    fn profile_security_object() -> Result<(), Box<dyn std::error::Error>> {
        let credentials: Credentials = serde_json::from_value(json!({
            "client_id": "id",
            "client_secret": "secret",
            "jwt": "abc",
            "expires": "2030-01-01T00:00:00Z",
            "type": "bearer"
        }))?;
        assert_eq!(credentials.client(), Some(("id", "secret")));
        assert_eq!(
            credentials.expires,
            Some(OffsetDateTime::parse("2030-01-01T00:00:00Z", &Rfc3339)?)
        );
        assert_eq!(credentials.token_type.as_deref(), Some("bearer"));
        assert_eq!(
            serde_json::from_value::<Credentials>(serde_json::to_value(&credentials)?)?,
            credentials
        );
        Ok(())
    }

    #[test]
    fn empty_object_is_unregistered() -> Result<(), serde_json::Error> {
        let credentials: Credentials = serde_json::from_value(json!({"expires": ""}))?;
        assert!(!credentials.is_registered());
        assert!(credentials.is_token_expired());
        assert_eq!(serde_json::to_value(&credentials)?, json!({}));
        Ok(())
    }

    #[test]
    fn token_expiry() {
        let now = OffsetDateTime::now_utc();
        let mut credentials = Credentials::default();
        credentials.set_token("abc", "bearer", now + Duration::hours(1));
        assert!(!credentials.is_token_expired_at(now));
        assert!(credentials.is_token_expired_at(now + Duration::hours(2)));
        assert_eq!(credentials.bearer().as_deref(), Some("Bearer abc"));

        credentials.set_token("abc", "bearer", now - Duration::seconds(1));
        assert!(!credentials.has_valid_token());
        assert_eq!(credentials.bearer(), None);
    }

    #[test]
    fn debug_hides_secrets() {
        let mut credentials = Credentials::default();
        credentials.set_client("id", "very-secret");
        assert!(!format!("{credentials:?}").contains("very-secret"));
    }
}

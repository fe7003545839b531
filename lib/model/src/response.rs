use crate::{BindingsResults, ErrorKind, ErrorResponse};
use time::OffsetDateTime;

/// Successful SPARQL 1.1 update. `body` is whatever the endpoint returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateResponse {
    pub token: Option<u64>,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryResponse {
    pub token: Option<u64>,
    pub results: BindingsResults,
}

/// Reply to a subscribe request: `{"subscribed": spuid, "alias": ..., "firstResults": ...}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeResponse {
    pub spuid: String,
    pub alias: Option<String>,
    pub first_results: BindingsResults,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsubscribeResponse {
    pub spuid: String,
}

/// An access token granted by the authorization server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: OffsetDateTime,
}

/// Client credentials issued on registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationResponse {
    pub client_id: String,
    pub client_secret: String,
}

/// The outcome of every protocol operation.
///
/// Exactly one variant is populated; the `is_*` predicates are views over the discriminant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Update(UpdateResponse),
    Query(QueryResponse),
    Subscribe(SubscribeResponse),
    Unsubscribe(UnsubscribeResponse),
    Error(ErrorResponse),
    Token(TokenResponse),
    Registration(RegistrationResponse),
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Response::Update(_))
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Response::Query(_))
    }

    pub fn is_subscribe(&self) -> bool {
        matches!(self, Response::Subscribe(_))
    }

    pub fn is_unsubscribe(&self) -> bool {
        matches!(self, Response::Unsubscribe(_))
    }

    pub fn is_token(&self) -> bool {
        matches!(self, Response::Token(_))
    }

    pub fn is_registration(&self) -> bool {
        matches!(self, Response::Registration(_))
    }

    pub fn as_error(&self) -> Option<&ErrorResponse> {
        match self {
            Response::Error(error) => Some(error),
            _ => None,
        }
    }

    /// The error kind, if this is an error.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.as_error().map(|error| error.kind)
    }

    pub fn as_query(&self) -> Option<&QueryResponse> {
        match self {
            Response::Query(query) => Some(query),
            _ => None,
        }
    }

    pub fn as_subscribe(&self) -> Option<&SubscribeResponse> {
        match self {
            Response::Subscribe(subscribe) => Some(subscribe),
            _ => None,
        }
    }

    /// Converts into a [`Result`], keeping the error variant as the error.
    pub fn into_result(self) -> Result<Response, ErrorResponse> {
        match self {
            Response::Error(error) => Err(error),
            response => Ok(response),
        }
    }
}

impl From<ErrorResponse> for Response {
    fn from(error: ErrorResponse) -> Self {
        Response::Error(error)
    }
}

impl From<Result<Response, ErrorResponse>> for Response {
    fn from(result: Result<Response, ErrorResponse>) -> Self {
        result.unwrap_or_else(Response::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_follow_the_discriminant() {
        let response = Response::Update(UpdateResponse {
            token: None,
            body: String::new(),
        });
        assert!(response.is_update());
        assert!(!response.is_error());
        assert!(!response.is_query());

        let response = Response::from(ErrorResponse::timeout("no reply"));
        assert!(response.is_error());
        assert_eq!(response.error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(response.as_error().map(|e| e.code), Some(408));
    }

    #[test]
    fn result_conversion() {
        let response: Response = Err(ErrorResponse::unauthorized("register first")).into();
        assert_eq!(response.error_kind(), Some(ErrorKind::Unauthorized));
        response.into_result().unwrap_err();
    }
}

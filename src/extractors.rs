use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::bail_relay;
use crate::error::{FieldError, RelayError};

/// Checks a deserialized request body before any upstream call is made.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldError>>;
}

/// JSON body extractor that rejects malformed or invalid requests with a 400.
pub(crate) struct ValidatedJson<T>(pub(crate) T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let value = match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => value,
            Err(rejection) => bail_relay!("body", "{}", rejection.body_text()),
        };
        value.validate().map_err(RelayError::validation)?;
        Ok(ValidatedJson(value))
    }
}

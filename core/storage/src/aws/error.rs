//! SDK error normalization for the cloud backend.

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use objstore_common::Error;

/// Map an SDK failure onto the taxonomy.
///
/// The service error code wins. Errors without one fall back to the HTTP
/// status, with `missing` deciding what a 404 means; everything else keeps
/// the SDK's full error context.
pub fn map_sdk_error<E>(err: SdkError<E>, resource: &str, missing: fn(String) -> Error) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if let Some(mapped) = err
        .code()
        .and_then(|code| Error::from_service_code(code, resource))
    {
        return mapped;
    }

    match err.raw_response().map(|response| response.status().as_u16()) {
        Some(404) => missing(resource.to_string()),
        Some(403) => Error::AccessDenied(resource.to_string()),
        _ => Error::Backend(DisplayErrorContext(&err).to_string()),
    }
}

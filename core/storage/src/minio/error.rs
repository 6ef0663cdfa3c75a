//! Native error normalization for the S3-compatible backend.

use s3::error::S3Error;
use s3::request::ResponseData;
use serde::Deserialize;

use objstore_common::{Error, Result};

/// S3 XML error document.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Parse the `<Error>` document an S3 service returns with failed requests.
fn parse_error_body(body: &str) -> Option<ErrorBody> {
    quick_xml::de::from_str(body).ok()
}

/// Map a failed HTTP exchange onto the taxonomy.
///
/// The XML error code is preferred. Bodiless responses (HEAD, DELETE bucket)
/// fall back to the status code, with `missing` deciding what a 404 means.
pub fn status_error(status: u16, body: &str, resource: &str, missing: fn(String) -> Error) -> Error {
    if let Some(parsed) = parse_error_body(body) {
        if let Some(err) = Error::from_service_code(&parsed.code, resource) {
            return err;
        }
        return Error::Backend(format!("{}: {}", parsed.code, parsed.message));
    }

    match status {
        404 => missing(resource.to_string()),
        403 => Error::AccessDenied(resource.to_string()),
        409 => Error::BucketNotEmpty(resource.to_string()),
        412 => Error::PreconditionFailed(resource.to_string()),
        _ => Error::Backend(format!("HTTP {} for {}: {}", status, resource, body.trim())),
    }
}

/// Map a client-side failure onto the taxonomy.
pub fn map_s3_error(err: S3Error, resource: &str, missing: fn(String) -> Error) -> Error {
    match err {
        S3Error::HttpFailWithBody(status, body) => status_error(status, &body, resource, missing),
        other => Error::Backend(other.to_string()),
    }
}

/// Pass successful responses through, turning the rest into errors.
pub fn check_response(
    response: ResponseData,
    resource: &str,
    missing: fn(String) -> Error,
) -> Result<ResponseData> {
    let status = response.status_code();
    if (200..300).contains(&status) {
        return Ok(response);
    }
    let body = String::from_utf8_lossy(response.bytes()).into_owned();
    Err(status_error(status, &body, resource, missing))
}

/// Whether an HTTP status reports success.
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

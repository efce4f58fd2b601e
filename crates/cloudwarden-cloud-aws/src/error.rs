//! AWS error classification
//!
//! Maps SDK failures onto [`ProviderError`] using the service error code
//! (`ProvideErrorMetadata::code`) rather than matching on message text.

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use cloudwarden_cloud::ProviderError;

/// Rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "SlowDown",
    "RequestThrottled",
];

/// Service-side hiccups worth retrying
const UNAVAILABLE_CODES: &[&str] = &[
    "InternalError",
    "InternalFailure",
    "ServiceUnavailable",
    "ServiceFailure",
    "Unavailable",
];

const UNAUTHORIZED_CODES: &[&str] = &[
    "UnauthorizedOperation",
    "AccessDenied",
    "AccessDeniedException",
    "AuthFailure",
    "InvalidClientTokenId",
    "ExpiredToken",
    "SignatureDoesNotMatch",
];

const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidVolume.NotFound",
    "InvalidSnapshot.NotFound",
    "NoSuchEntity",
    "NoSuchBucket",
    "NoSuchKey",
];

const ALREADY_EXISTS_CODES: &[&str] = &["EntityAlreadyExists"];

const INVALID_PARAMETER_CODES: &[&str] = &[
    "InvalidParameterValue",
    "InvalidParameterCombination",
    "MissingParameter",
    "ValidationError",
    "InvalidInstanceID.Malformed",
    "InvalidVolumeID.Malformed",
    "InvalidSnapshotID.Malformed",
];

/// Classify a service error code and message
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> ProviderError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if THROTTLING_CODES.contains(&c) => ProviderError::Throttled(message),
        Some(c) if UNAVAILABLE_CODES.contains(&c) => ProviderError::Unavailable(message),
        Some(c) if UNAUTHORIZED_CODES.contains(&c) => ProviderError::Unauthorized(message),
        Some(c) if NOT_FOUND_CODES.contains(&c) => ProviderError::NotFound(message),
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => ProviderError::AlreadyExists(message),
        Some(c) if INVALID_PARAMETER_CODES.contains(&c) => {
            ProviderError::InvalidParameter(message)
        }
        Some(c) => ProviderError::Rejected {
            code: c.to_string(),
            message,
        },
        None => ProviderError::Rejected {
            code: "Unknown".to_string(),
            message,
        },
    }
}

/// Classify any SDK operation error
///
/// Transport failures (timeouts, dispatch failures, unparseable responses)
/// are transient. Service errors go through [`classify_aws_error`].
pub fn classify_sdk_error<E, R>(error: &SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ProviderError::Unavailable(DisplayErrorContext(error).to_string())
        }
        SdkError::ServiceError(_) => {
            let message = error
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(error).to_string());
            classify_aws_error(error.code(), Some(&message))
        }
        _ => ProviderError::Rejected {
            code: "ConstructionFailure".to_string(),
            message: DisplayErrorContext(error).to_string(),
        },
    }
}

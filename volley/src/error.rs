// Copyright 2025 Oxide Computer Company

//! Error taxonomy for the dispatch core
//!
//! Errors come in two tiers.  [`BuildError`] covers everything that can go
//! wrong while routes are being registered.  These are fatal: a
//! misclassified parameter or a route with no methods means the application
//! is miswired, and it must not start.  [`DispatchError`] covers everything
//! that can go wrong while an individual request is being resolved, invoked,
//! or serialized.  These are recoverable: the routing collaborator catches
//! them and converts them into a client-facing error response, using
//! [`DispatchError::recommended_status_code`] to pick a status.
//!
//! The core never swallows a request-time error.  Every failure carries
//! enough context (parameter name, raw input, target type) that the caller
//! can produce a precise response without inspecting a backtrace.  No
//! retries happen here: parsing and serialization are pure and
//! deterministic, so retrying could not change the outcome.

use http::StatusCode;

/// Errors detected while registering routes and classifying handler
/// signatures.  All of these indicate a configuration defect; the
/// application must not start.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A parameter was declared with a type that has no classification:
    /// it is not a framework context type, not a path-convertible scalar,
    /// and not a structured body model.
    #[error(
        "parameter {parameter:?} has a type that cannot be classified: \
         {detail}"
    )]
    UnroutableParameterType { parameter: String, detail: String },

    /// The handler bound to an operation is not invocable asynchronously.
    /// Dispatch awaits every handler, so blocking handlers are rejected at
    /// registration time.
    #[error("handler for operation {operation:?} must be asynchronous")]
    CoroutineRequired { operation: String },

    /// A route was registered with no HTTP methods bound.
    #[error("route {pattern:?} has no HTTP methods bound")]
    NoHttpMethodsDefined { pattern: String },

    /// The same path capture is declared with conflicting types by two
    /// method implementations on one route.
    #[error(
        "path capture {capture:?} in route {pattern:?} is declared with \
         conflicting types"
    )]
    PathTypeMismatch { pattern: String, capture: String },

    /// Generic inconsistency in route wiring (duplicate parameter names,
    /// duplicate method registrations, and the like).
    #[error("configuration inconsistency: {0}")]
    Configuration(String),
}

/// Errors raised while resolving arguments for a request, invoking the
/// handler, or serializing its return value.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A path value or structured body failed to convert or validate.
    /// `raw` is the offending input text (empty when the input was absent
    /// altogether) and `target` describes the type it failed to become.
    #[error("parameter {parameter:?}: unable to parse {raw:?} as {target}")]
    ValueParse { parameter: String, raw: String, target: String },

    /// A handler return value (or some value nested within it) has no wire
    /// rendering.  This indicates a defect in handler code, not bad client
    /// input, and surfaces as a 500.
    #[error("object of type {type_name} is not serializable")]
    NotSerializable { type_name: String },

    /// A structured-body parameter was declared without a concrete model
    /// type, so the body cannot be validated against anything.
    #[error("parameter {parameter:?} requires a concrete model type")]
    TypeRequired { parameter: String },

    /// The framework failed to supply a context object that the classifier
    /// promised would exist.  Fatal in intent: this is a wiring bug, not a
    /// property of the request.
    #[error("configuration inconsistency: {0}")]
    Configuration(String),
}

impl DispatchError {
    /// Returns the recommended status code for this error.
    ///
    /// The routing collaborator applies this when constructing the HTTP
    /// response; the core itself never writes responses.
    pub fn recommended_status_code(&self) -> StatusCode {
        match self {
            DispatchError::ValueParse { .. } => StatusCode::BAD_REQUEST,
            DispatchError::NotSerializable { .. }
            | DispatchError::TypeRequired { .. }
            | DispatchError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::DispatchError;
    use http::StatusCode;

    #[test]
    fn test_recommended_status_codes() {
        let parse = DispatchError::ValueParse {
            parameter: "id".to_string(),
            raw: "bogus".to_string(),
            target: "uuid".to_string(),
        };
        assert_eq!(parse.recommended_status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            parse.to_string(),
            "parameter \"id\": unable to parse \"bogus\" as uuid"
        );

        let nonser = DispatchError::NotSerializable {
            type_name: "non-finite float".to_string(),
        };
        assert_eq!(
            nonser.recommended_status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

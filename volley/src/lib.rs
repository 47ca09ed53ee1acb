// Copyright 2025 Oxide Computer Company

//! Volley is the typed dispatch core of an HTTP server framework: it turns
//! declared handler signatures into cached injection plans, converts raw
//! path captures and request bodies into typed arguments, invokes the
//! async handler, and serializes the returned value into response bytes.
//! It deliberately stops at that boundary: socket handling, TLS, routing
//! tables, and response writing belong to the surrounding framework.
//!
//! The pieces fit together like this:
//!
//! * A [`ModelSchema`] declares the field list of a structured request
//!   body, since Rust offers no runtime reflection to discover one.
//! * An [`Endpoint`] pairs an async [`Handler`] with one [`ParamSpec`] per
//!   parameter; [`Endpoint::classify`] runs once at registration time and
//!   produces an immutable [`RoutePlan`] (or a fatal [`BuildError`]).
//! * A [`Route`] binds the per-method plans to one path pattern and
//!   rejects inconsistent capture declarations up front.
//! * At request time, [`RoutePlan::dispatch`] resolves [`Arguments`] from
//!   the path captures and [`RequestContext`], awaits the handler, and
//!   serializes the result; any failure is a [`DispatchError`] carrying a
//!   recommended status code.
//!
//! ```
//! use futures::executor::block_on;
//! use http::Method;
//! use slog::o;
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use volley::Endpoint;
//! use volley::Handler;
//! use volley::ParamSpec;
//! use volley::ParamType;
//! use volley::RequestContext;
//! use volley::ReturnType;
//! use volley::SemanticType;
//! use volley::Value;
//!
//! let plan = Arc::new(
//!     Endpoint::new(
//!         "widget_get",
//!         Method::GET,
//!         Handler::async_fn(|args| async move {
//!             let id = args.value("widget_id").cloned();
//!             Ok(Some(Value::mapping([("id", id.unwrap())])))
//!         }),
//!     )
//!     .param(ParamSpec::new(
//!         "widget_id",
//!         ParamType::Scalar(SemanticType::Uuid),
//!     ))
//!     .returning(ReturnType::Mapping)
//!     .classify()
//!     .unwrap(),
//! );
//!
//! let log = slog::Logger::root(slog::Discard, o!());
//! let mut captures = BTreeMap::new();
//! captures.insert(
//!     "widget_id".to_string(),
//!     "8c2cf754-3176-4a63-9f91-23ce1e38a0b9".to_string(),
//! );
//! let ctx = RequestContext::new(log);
//! let body = block_on(plan.dispatch(&captures, &ctx)).unwrap().unwrap();
//! assert_eq!(
//!     body.body.as_ref(),
//!     br#"{"id":"8c2cf754-3176-4a63-9f91-23ce1e38a0b9"}"#,
//! );
//! ```
//!
//! String-to-type conversion lives in one table keyed by [`SemanticType`];
//! the same table serves path captures, union path parameters, and string
//! coercion inside body validation, so a given input text converts
//! identically everywhere it appears.

mod conversion;
mod error;
mod plan;
mod resolve;
mod schema;
mod serialize;
mod value;

pub use conversion::configure_boolean_tokens;
pub use conversion::convert_bool;
pub use conversion::format_isoduration;
pub use conversion::parse_date;
pub use conversion::parse_datetime;
pub use conversion::BooleanTokens;
pub use conversion::ParseError;
pub use conversion::SemanticType;
pub use error::BuildError;
pub use error::DispatchError;
pub use plan::ContextKind;
pub use plan::Endpoint;
pub use plan::Handler;
pub use plan::HandlerFuture;
pub use plan::HandlerResult;
pub use plan::ParamSpec;
pub use plan::ParamType;
pub use plan::ParameterKind;
pub use plan::ParameterLocation;
pub use plan::ParameterMetadata;
pub use plan::ParameterPlan;
pub use plan::PathTarget;
pub use plan::ReturnType;
pub use plan::Route;
pub use plan::RoutePlan;
pub use resolve::Argument;
pub use resolve::Arguments;
pub use resolve::BodyContentType;
pub use resolve::ContextObjects;
pub use resolve::RequestContext;
pub use resolve::RequestInfo;
pub use schema::FieldSpec;
pub use schema::FieldType;
pub use schema::ModelInstance;
pub use schema::ModelSchema;
pub use schema::ValidationError;
pub use serialize::serialize;
pub use serialize::ResponseContentType;
pub use serialize::SerializedBody;
pub use serialize::CONTENT_TYPE_JSON;
pub use value::Value;

// Copyright 2025 Oxide Computer Company

//! Per-request argument resolution
//!
//! For each invocation the resolver walks the route plan's parameters in
//! declaration order and produces one argument per parameter: context
//! objects are injected by reference, path captures are converted through
//! the conversion table, and structured bodies are deserialized and
//! validated against the declared model schema.
//!
//! Resolution is read-only with respect to the plan: any number of requests
//! may resolve against the same [`RoutePlan`](crate::RoutePlan)
//! concurrently.  Each structured-body parameter triggers a fresh parse of
//! the body bytes, so two body parameters see independently-validated
//! instances; this mirrors the resolver's strictly per-parameter contract.

use crate::error::DispatchError;
use crate::plan::ContextKind;
use crate::plan::ParameterKind;
use crate::plan::RoutePlan;
use crate::schema::ModelSchema;
use crate::serialize::serialize;
use crate::serialize::ResponseContentType;
use crate::serialize::SerializedBody;
use crate::value::Value;
use bytes::Bytes;
use http::HeaderMap;
use http::Method;
use http::Uri;
use slog::debug;
use slog::warn;
use slog::Logger;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Basic information about the active request, injectable into handlers
/// that declare a request parameter.
#[derive(Debug)]
pub struct RequestInfo {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: SocketAddr,
}

impl RequestInfo {
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        remote_addr: SocketAddr,
    ) -> RequestInfo {
        RequestInfo { method, uri, headers, remote_addr }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

/// The wire encoding of a request body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyContentType {
    Json,
    UrlEncoded,
}

impl BodyContentType {
    pub fn mime_type(&self) -> &'static str {
        match self {
            BodyContentType::Json => "application/json",
            BodyContentType::UrlEncoded => {
                "application/x-www-form-urlencoded"
            }
        }
    }

    /// Match a `Content-Type` header value, ignoring parameters such as
    /// `charset`.
    pub fn from_mime_type(header: &str) -> Option<BodyContentType> {
        let mime = header.split(';').next().unwrap_or("").trim();
        match mime {
            "application/json" => Some(BodyContentType::Json),
            "application/x-www-form-urlencoded" => {
                Some(BodyContentType::UrlEncoded)
            }
            _ => None,
        }
    }
}

/// The framework-owned objects available for context injection.
///
/// The endpoint object is not here: it is the route plan itself, which the
/// resolver already holds.
#[derive(Clone, Default)]
pub struct ContextObjects {
    request: Option<Arc<RequestInfo>>,
    application: Option<Arc<dyn Any + Send + Sync>>,
}

impl ContextObjects {
    pub fn new() -> ContextObjects {
        ContextObjects::default()
    }

    pub fn with_request(mut self, request: Arc<RequestInfo>) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_application(
        mut self,
        application: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        self.application = Some(application);
        self
    }
}

impl fmt::Debug for ContextObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextObjects")
            .field("request", &self.request)
            .field("application", &self.application.is_some())
            .finish()
    }
}

/// Everything the resolver needs from the surrounding framework for one
/// request: injectable context objects, the raw body (if any), and a
/// request-scoped logger.
pub struct RequestContext {
    pub objects: ContextObjects,
    pub body: Option<Bytes>,
    pub body_content_type: BodyContentType,
    pub log: Logger,
}

impl RequestContext {
    pub fn new(log: Logger) -> RequestContext {
        RequestContext {
            objects: ContextObjects::new(),
            body: None,
            body_content_type: BodyContentType::Json,
            log,
        }
    }

    pub fn with_objects(mut self, objects: ContextObjects) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_body(
        mut self,
        body: Bytes,
        content_type: BodyContentType,
    ) -> Self {
        self.body = Some(body);
        self.body_content_type = content_type;
        self
    }
}

/// One resolved argument.
#[derive(Clone)]
pub enum Argument {
    /// A converted path value, a validated body, or a default.
    Value(Value),
    Request(Arc<RequestInfo>),
    Endpoint(Arc<RoutePlan>),
    Application(Arc<dyn Any + Send + Sync>),
}

// Arc<dyn Any> has no Debug; spell the impl out.
impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Argument::Request(r) => {
                f.debug_tuple("Request").field(r).finish()
            }
            Argument::Endpoint(p) => {
                f.debug_tuple("Endpoint").field(&p.operation_id()).finish()
            }
            Argument::Application(_) => f.write_str("Application(..)"),
        }
    }
}

/// The resolved arguments for one invocation, one entry per declared
/// parameter, in declaration order.
#[derive(Clone, Debug)]
pub struct Arguments {
    items: Vec<(String, Argument)>,
}

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.items
            .iter()
            .find(|(item, _)| item == name)
            .map(|(_, arg)| arg)
    }

    /// The converted value bound to `name`, if that parameter resolved to
    /// a plain value.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name) {
            Some(Argument::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn request(&self, name: &str) -> Option<&Arc<RequestInfo>> {
        match self.get(name) {
            Some(Argument::Request(r)) => Some(r),
            _ => None,
        }
    }

    pub fn endpoint(&self, name: &str) -> Option<&Arc<RoutePlan>> {
        match self.get(name) {
            Some(Argument::Endpoint(p)) => Some(p),
            _ => None,
        }
    }

    /// Downcast the application object to its concrete type.
    pub fn application<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> Option<Arc<T>> {
        match self.get(name) {
            Some(Argument::Application(app)) => {
                Arc::clone(app).downcast::<T>().ok()
            }
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.items.iter().map(|(name, arg)| (name.as_str(), arg))
    }
}

impl RoutePlan {
    /// Resolve arguments for one request against this plan.
    ///
    /// `captures` holds the raw path capture strings the router extracted
    /// for this request.  Resolution never mutates the plan and never
    /// retries: conversion is deterministic, so the first failure is
    /// definitive and maps to a client error via
    /// [`DispatchError::recommended_status_code`].
    pub fn resolve(
        self: &Arc<Self>,
        captures: &BTreeMap<String, String>,
        ctx: &RequestContext,
    ) -> Result<Arguments, DispatchError> {
        let mut items = Vec::with_capacity(self.parameters().len());
        for param in self.parameters() {
            let argument = match param.kind() {
                ParameterKind::ContextInjection(ContextKind::Request) => {
                    match &ctx.objects.request {
                        Some(request) => {
                            Argument::Request(Arc::clone(request))
                        }
                        None => {
                            return Err(DispatchError::Configuration(
                                format!(
                                    "no request information available for \
                                     parameter {:?}",
                                    param.name()
                                ),
                            ));
                        }
                    }
                }
                ParameterKind::ContextInjection(ContextKind::Endpoint) => {
                    Argument::Endpoint(Arc::clone(self))
                }
                ParameterKind::ContextInjection(
                    ContextKind::Application,
                ) => match &ctx.objects.application {
                    Some(application) => {
                        Argument::Application(Arc::clone(application))
                    }
                    None => {
                        return Err(DispatchError::Configuration(format!(
                            "no application object available for \
                             parameter {:?}",
                            param.name()
                        )));
                    }
                },
                ParameterKind::PathValue(target) => {
                    match captures.get(param.name()) {
                        Some(raw) => {
                            let value =
                                target.parse(raw).map_err(|e| {
                                    DispatchError::ValueParse {
                                        parameter: param.name().to_string(),
                                        raw: e.raw,
                                        target: e.target,
                                    }
                                })?;
                            Argument::Value(value)
                        }
                        None => match param.default() {
                            Some(default) => {
                                Argument::Value(default.clone())
                            }
                            None => {
                                return Err(DispatchError::ValueParse {
                                    parameter: param.name().to_string(),
                                    raw: String::new(),
                                    target: target.to_string(),
                                });
                            }
                        },
                    }
                }
                ParameterKind::StructuredBody(None) => {
                    return Err(DispatchError::TypeRequired {
                        parameter: param.name().to_string(),
                    });
                }
                ParameterKind::StructuredBody(Some(schema)) => {
                    Argument::Value(resolve_body(param.name(), schema, ctx)?)
                }
            };
            items.push((param.name().to_string(), argument));
        }
        Ok(Arguments { items })
    }

    /// Resolve, invoke the handler, and serialize its return value.
    ///
    /// This is the full request-time pipeline.  Errors from any stage
    /// propagate to the caller, which turns them into an error response.
    pub async fn dispatch(
        self: &Arc<Self>,
        captures: &BTreeMap<String, String>,
        ctx: &RequestContext,
    ) -> Result<Option<SerializedBody>, DispatchError> {
        debug!(ctx.log, "dispatching request";
            "operation" => self.operation_id());
        let arguments = self.resolve(captures, ctx).map_err(|error| {
            warn!(ctx.log, "argument resolution failed";
                "operation" => self.operation_id(),
                "error" => %error);
            error
        })?;
        let returned = (self.handler())(arguments).await.map_err(|error| {
            warn!(ctx.log, "handler failed";
                "operation" => self.operation_id(),
                "error" => %error);
            error
        })?;
        serialize(
            returned.as_ref(),
            self.return_type(),
            ResponseContentType::Json,
        )
    }
}

// The body is parsed from scratch for every structured-body parameter the
// plan declares.  Two body parameters therefore receive independent model
// instances; mutation of one is invisible through the other.
fn resolve_body(
    parameter: &str,
    schema: &Arc<ModelSchema>,
    ctx: &RequestContext,
) -> Result<Value, DispatchError> {
    let Some(body) = &ctx.body else {
        return Err(DispatchError::ValueParse {
            parameter: parameter.to_string(),
            raw: String::new(),
            target: format!("model {}", schema.name()),
        });
    };

    let generic = match ctx.body_content_type {
        BodyContentType::Json => {
            let mut deserializer =
                serde_json::Deserializer::from_slice(body);
            serde_path_to_error::deserialize::<_, serde_json::Value>(
                &mut deserializer,
            )
            .map_err(|e| DispatchError::ValueParse {
                parameter: parameter.to_string(),
                raw: body_excerpt(body),
                target: format!("model {} ({})", schema.name(), e),
            })?
        }
        BodyContentType::UrlEncoded => {
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_bytes(body).map_err(|e| {
                    DispatchError::ValueParse {
                        parameter: parameter.to_string(),
                        raw: body_excerpt(body),
                        target: format!("model {} ({})", schema.name(), e),
                    }
                })?;
            serde_json::Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect(),
            )
        }
    };

    schema.validate(&generic).map_err(|e| DispatchError::ValueParse {
        parameter: if e.field.is_empty() {
            parameter.to_string()
        } else {
            format!("{}.{}", parameter, e.field)
        },
        raw: e.raw,
        target: e.expected,
    })
}

// The cut must land on a character boundary: the body is
// client-controlled and may put a multibyte character at the limit.
fn body_excerpt(body: &Bytes) -> String {
    const LIMIT: usize = 256;
    let mut text = String::from_utf8_lossy(body).into_owned();
    if text.len() > LIMIT {
        let mut cut = LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

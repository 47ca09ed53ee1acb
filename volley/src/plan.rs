// Copyright 2025 Oxide Computer Company

//! Signature classification and route plans
//!
//! Rust offers no runtime reflection over function signatures, so handlers
//! are registered with a declarative descriptor per parameter: a
//! [`ParamSpec`] naming the parameter and tagging its target type.  At
//! registration time [`Endpoint::classify`] turns the descriptors into an
//! immutable [`RoutePlan`] holding one [`ParameterPlan`] per parameter, in
//! declaration order.  The plan is computed exactly once; request handling
//! only reads it.
//!
//! A parameter's [`ParameterKind`] is a pure function of its declared type:
//! the three fixed framework context types classify as context injection,
//! model types classify as structured body, and scalar types classify as
//! path values.  Anything else is a registration-time configuration error,
//! never a request-time one.

use crate::conversion::ParseError;
use crate::conversion::SemanticType;
use crate::error::BuildError;
use crate::error::DispatchError;
use crate::resolve::Arguments;
use crate::schema::ModelSchema;
use crate::value::Value;
use debug_ignore::DebugIgnore;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::Method;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The three framework-supplied objects a parameter may be bound to
/// directly, with no string conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    /// Basic information about the active request.
    Request,
    /// The active route plan (the analogue of "the handler object").
    Endpoint,
    /// The application-wide singleton supplied by the framework.
    Application,
}

/// The declared type of a handler parameter.
#[derive(Clone, Debug)]
pub enum ParamType {
    /// Inject the active request's [`RequestInfo`](crate::RequestInfo).
    Request,
    /// Inject the active [`RoutePlan`].
    Endpoint,
    /// Inject the application singleton object.
    Application,
    /// A path capture converted to one scalar type.
    Scalar(SemanticType),
    /// A path capture converted by first-match over several scalar types,
    /// in declaration order.
    Union(Vec<SemanticType>),
    /// The request body, validated against a model schema.
    Body(Arc<ModelSchema>),
    /// A body parameter whose model type has not been supplied.  The
    /// classifier records it, and resolving it fails with
    /// [`DispatchError::TypeRequired`].
    UntypedBody,
}

/// Declarative descriptor for one handler parameter.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    name: String,
    ty: ParamType,
    default: Option<Value>,
}

impl ParamSpec {
    pub fn new<S: Into<String>>(name: S, ty: ParamType) -> ParamSpec {
        ParamSpec { name: name.into(), ty, default: None }
    }

    /// Supply a default, making the parameter optional.  Only meaningful
    /// for path-value parameters.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// The conversion target of a path-value parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum PathTarget {
    Single(SemanticType),
    Union(Vec<SemanticType>),
}

impl PathTarget {
    /// Parse a raw capture string, trying union members in order; the
    /// first type that accepts the input wins.
    pub fn parse(&self, raw: &str) -> Result<Value, ParseError> {
        match self {
            PathTarget::Single(ty) => ty.parse(raw),
            PathTarget::Union(types) => {
                for ty in types {
                    if let Ok(value) = ty.parse(raw) {
                        return Ok(value);
                    }
                }
                Err(ParseError {
                    raw: raw.to_string(),
                    target: self.to_string(),
                })
            }
        }
    }

    /// OpenAPI-style `(type, format)` pair.  Unions are described as plain
    /// strings since their wire form is the union of the members' forms.
    pub fn schema(&self) -> (&'static str, Option<&'static str>) {
        match self {
            PathTarget::Single(ty) => ty.schema(),
            PathTarget::Union(_) => ("string", None),
        }
    }
}

impl fmt::Display for PathTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathTarget::Single(ty) => write!(f, "{}", ty),
            PathTarget::Union(types) => {
                let names: Vec<String> =
                    types.iter().map(|t| t.to_string()).collect();
                f.write_str(&names.join(" | "))
            }
        }
    }
}

/// The injection strategy chosen for a parameter.
#[derive(Clone, Debug)]
pub enum ParameterKind {
    ContextInjection(ContextKind),
    PathValue(PathTarget),
    StructuredBody(Option<Arc<ModelSchema>>),
}

/// The cached classification of one parameter: computed once at
/// registration, immutable for the function's lifetime.
#[derive(Clone, Debug)]
pub struct ParameterPlan {
    name: String,
    kind: ParameterKind,
    required: bool,
    default: Option<Value>,
}

impl ParameterPlan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }

    /// False only if the parameter has a default.
    pub fn required(&self) -> bool {
        self.required
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

/// The declared return type of a handler.
#[derive(Clone, Debug, PartialEq)]
pub enum ReturnType {
    /// The handler produces no body; serialization is skipped entirely.
    None,
    Scalar(SemanticType),
    Sequence,
    Mapping,
    Model(Arc<ModelSchema>),
}

/// Result type produced by handler functions.
pub type HandlerResult = Result<Option<Value>, DispatchError>;

/// The future a handler invocation evaluates to.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

pub(crate) type AsyncHandler =
    Arc<dyn Fn(Arguments) -> HandlerFuture + Send + Sync>;
type BlockingHandler = Arc<dyn Fn(Arguments) -> HandlerResult + Send + Sync>;

/// A handler implementation bound to an operation.
///
/// Dispatch awaits every handler, so only the [`Handler::Async`] arm can
/// be classified; registering a blocking handler fails with
/// [`BuildError::CoroutineRequired`].
#[derive(Clone)]
pub enum Handler {
    Async(AsyncHandler),
    Blocking(BlockingHandler),
}

impl Handler {
    /// Wrap an async function or closure.
    pub fn async_fn<F, Fut>(func: F) -> Handler
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Handler::Async(Arc::new(move |args| func(args).boxed()))
    }

    /// Wrap a synchronous function.  Kept for frameworks that accept both
    /// kinds at their own outer layer; classification rejects it.
    pub fn blocking_fn<F>(func: F) -> Handler
    where
        F: Fn(Arguments) -> HandlerResult + Send + Sync + 'static,
    {
        Handler::Blocking(Arc::new(func))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Async(_) => f.write_str("Handler::Async(..)"),
            Handler::Blocking(_) => f.write_str("Handler::Blocking(..)"),
        }
    }
}

/// Registration record for one operation: an operation id (used in logs and
/// error messages), an HTTP method, a handler, and the declared parameter
/// and return types.
#[derive(Debug)]
pub struct Endpoint {
    operation_id: String,
    method: Method,
    handler: Handler,
    parameters: Vec<ParamSpec>,
    return_type: ReturnType,
}

impl Endpoint {
    pub fn new<S: Into<String>>(
        operation_id: S,
        method: Method,
        handler: Handler,
    ) -> Endpoint {
        Endpoint {
            operation_id: operation_id.into(),
            method,
            handler,
            parameters: Vec::new(),
            return_type: ReturnType::None,
        }
    }

    /// Append a parameter descriptor.  Order of calls is the declaration
    /// order the resolver will reproduce.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn returning(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    /// Classify this endpoint's parameters, producing the immutable
    /// [`RoutePlan`].  Invoked once per route registration; all failures
    /// here are fatal configuration errors.
    pub fn classify(self) -> Result<RoutePlan, BuildError> {
        let handler = match self.handler {
            Handler::Async(f) => f,
            Handler::Blocking(_) => {
                return Err(BuildError::CoroutineRequired {
                    operation: self.operation_id,
                });
            }
        };

        let mut seen = BTreeSet::new();
        let mut parameters = Vec::with_capacity(self.parameters.len());
        for spec in self.parameters {
            if !seen.insert(spec.name.clone()) {
                return Err(BuildError::Configuration(format!(
                    "operation {:?} declares parameter {:?} twice",
                    self.operation_id, spec.name
                )));
            }
            parameters.push(classify_param(&self.operation_id, spec)?);
        }

        Ok(RoutePlan {
            operation_id: self.operation_id,
            method: self.method,
            handler: DebugIgnore(handler),
            parameters,
            return_type: self.return_type,
        })
    }
}

// ParameterKind is a pure function of the declared type; nothing else about
// the spec participates in the choice.
fn classify_param(
    operation_id: &str,
    spec: ParamSpec,
) -> Result<ParameterPlan, BuildError> {
    let kind = match spec.ty {
        ParamType::Request => {
            ParameterKind::ContextInjection(ContextKind::Request)
        }
        ParamType::Endpoint => {
            ParameterKind::ContextInjection(ContextKind::Endpoint)
        }
        ParamType::Application => {
            ParameterKind::ContextInjection(ContextKind::Application)
        }
        ParamType::Scalar(ty) => {
            ParameterKind::PathValue(PathTarget::Single(ty))
        }
        ParamType::Union(types) if types.is_empty() => {
            return Err(BuildError::UnroutableParameterType {
                parameter: spec.name,
                detail: "union of no types".to_string(),
            });
        }
        ParamType::Union(mut types) => {
            if types.len() == 1 {
                ParameterKind::PathValue(PathTarget::Single(types.remove(0)))
            } else {
                ParameterKind::PathValue(PathTarget::Union(types))
            }
        }
        ParamType::Body(schema) => {
            ParameterKind::StructuredBody(Some(schema))
        }
        ParamType::UntypedBody => ParameterKind::StructuredBody(None),
    };

    if spec.default.is_some() {
        match kind {
            ParameterKind::PathValue(_) => (),
            _ => {
                return Err(BuildError::Configuration(format!(
                    "operation {:?}: parameter {:?} cannot have a default",
                    operation_id, spec.name
                )));
            }
        }
    }

    let required = spec.default.is_none();
    Ok(ParameterPlan {
        name: spec.name,
        kind,
        required,
        default: spec.default,
    })
}

/// Where a parameter's value comes from on the wire, for schema-document
/// collaborators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Body,
}

/// Schema metadata for one API-visible parameter.  Context-injection
/// parameters are internal and produce no metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParameterMetadata {
    pub name: String,
    pub location: ParameterLocation,
    pub schema_type: &'static str,
    pub format: Option<&'static str>,
    pub required: bool,
}

/// The cached, immutable classification result for one registered handler:
/// built once at application startup and shared read-only across all
/// concurrent request invocations.
#[derive(Debug)]
pub struct RoutePlan {
    operation_id: String,
    method: Method,
    handler: DebugIgnore<AsyncHandler>,
    parameters: Vec<ParameterPlan>,
    return_type: ReturnType,
}

impl RoutePlan {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Parameter plans in declaration order.
    pub fn parameters(&self) -> &[ParameterPlan] {
        &self.parameters
    }

    pub fn return_type(&self) -> &ReturnType {
        &self.return_type
    }

    pub(crate) fn handler(&self) -> &AsyncHandler {
        &self.handler.0
    }

    /// Schema metadata for the API-visible parameters, derived from the
    /// same plans the resolver executes.
    pub fn parameter_metadata(&self) -> Vec<ParameterMetadata> {
        self.parameters
            .iter()
            .filter_map(|param| match param.kind() {
                ParameterKind::ContextInjection(_) => None,
                ParameterKind::PathValue(target) => {
                    let (schema_type, format) = target.schema();
                    Some(ParameterMetadata {
                        name: param.name().to_string(),
                        location: ParameterLocation::Path,
                        schema_type,
                        format,
                        required: param.required(),
                    })
                }
                ParameterKind::StructuredBody(_) => Some(ParameterMetadata {
                    name: param.name().to_string(),
                    location: ParameterLocation::Body,
                    schema_type: "object",
                    format: None,
                    required: param.required(),
                }),
            })
            .collect()
    }
}

/// One registered path pattern and the per-method plans bound to it.
///
/// Patterns use `{name}` segments for path captures, e.g.
/// `/widgets/{widget_id}`.  The surrounding framework owns pattern
/// matching; the route only records which capture names exist so that
/// conflicting per-method declarations can be rejected up front.
#[derive(Debug)]
pub struct Route {
    pattern: String,
    captures: Vec<String>,
    methods: IndexMap<Method, Arc<RoutePlan>>,
}

impl Route {
    /// Classify every endpoint and bind the results to this pattern.
    pub fn build(
        pattern: &str,
        endpoints: Vec<Endpoint>,
    ) -> Result<Route, BuildError> {
        if endpoints.is_empty() {
            return Err(BuildError::NoHttpMethodsDefined {
                pattern: pattern.to_string(),
            });
        }

        let captures = pattern_captures(pattern);
        let mut methods = IndexMap::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let method = endpoint.method.clone();
            let plan = Arc::new(endpoint.classify()?);
            if methods.insert(method.clone(), plan).is_some() {
                return Err(BuildError::Configuration(format!(
                    "method {} bound twice on route {:?}",
                    method, pattern
                )));
            }
        }

        // Two methods on one route may both declare a capture, but they
        // must agree on its type.
        let mut capture_types: BTreeMap<&str, &PathTarget> = BTreeMap::new();
        for plan in methods.values() {
            for param in plan.parameters() {
                let ParameterKind::PathValue(target) = param.kind() else {
                    continue;
                };
                if !captures.iter().any(|c| c == param.name()) {
                    continue;
                }
                match capture_types.get(param.name()) {
                    Some(existing) if *existing != target => {
                        return Err(BuildError::PathTypeMismatch {
                            pattern: pattern.to_string(),
                            capture: param.name().to_string(),
                        });
                    }
                    _ => {
                        capture_types.insert(param.name(), target);
                    }
                }
            }
        }

        Ok(Route { pattern: pattern.to_string(), captures, methods })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Capture names appearing in the pattern, in path order.
    pub fn captures(&self) -> &[String] {
        &self.captures
    }

    pub fn lookup(&self, method: &Method) -> Option<&Arc<RoutePlan>> {
        self.methods.get(method)
    }

    pub fn methods(
        &self,
    ) -> impl Iterator<Item = (&Method, &Arc<RoutePlan>)> {
        self.methods.iter()
    }
}

fn pattern_captures(pattern: &str) -> Vec<String> {
    pattern
        .split('/')
        .filter_map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .map(str::to_string)
        })
        .collect()
}

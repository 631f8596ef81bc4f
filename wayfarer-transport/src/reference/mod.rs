//! Immutable proxy references.
//!
//! A [`Reference`] describes what a proxy points at. It has two shapes:
//!
//! - **fixed**: bound to one established connection
//! - **routable**: reached through its own endpoints, an adapter id resolved
//!   by a locator, or its identity alone (a well-known object)
//!
//! References are cheap to clone and never mutated. Every `change_*`
//! operation returns a new reference; operations that only make sense for
//! the routable shape fail with [`ReferenceError::FixedProxy`] on a fixed
//! one.
//!
//! Equality covers every observable field, so equal references share
//! cached connections.

mod builder;
mod resolve;

pub use builder::ReferenceBuilder;
pub use resolve::ConnectionFuture;

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::connection::connection_id;
use crate::{
    Connection, EncodingVersion, Endpoint, EndpointSelection, Identity, InvocationMode,
    LocatorInfo, ProtocolVersion, ReferenceError, RouterInfo,
};

/// Request context: string key/value pairs sent with every invocation.
pub type Context = BTreeMap<String, String>;

/// Target of a routable reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RoutableTarget {
    endpoints: Vec<Endpoint>,
    adapter_id: String,
    locator_info: Option<Arc<LocatorInfo>>,
    router_info: Option<Arc<RouterInfo>>,
    collocation_optimized: bool,
    cache_connection: bool,
    prefer_secure: bool,
    endpoint_selection: EndpointSelection,
    locator_cache_timeout: i32,
    connection_id: String,
    timeout: Option<i32>,
}

#[derive(Clone)]
enum ReferenceKind {
    Fixed(Arc<dyn Connection>),
    Routable(RoutableTarget),
}

impl PartialEq for ReferenceKind {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReferenceKind {}

impl PartialOrd for ReferenceKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReferenceKind {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Fixed(a), Self::Fixed(b)) => connection_id(a).cmp(&connection_id(b)),
            (Self::Fixed(_), Self::Routable(_)) => Ordering::Less,
            (Self::Routable(_), Self::Fixed(_)) => Ordering::Greater,
            (Self::Routable(a), Self::Routable(b)) => a.cmp(b),
        }
    }
}

#[derive(Clone)]
struct ReferenceData {
    identity: Identity,
    facet: String,
    mode: InvocationMode,
    secure: bool,
    protocol: ProtocolVersion,
    encoding: EncodingVersion,
    invocation_timeout: i32,
    context: Arc<Context>,
    compress: Option<bool>,
    kind: ReferenceKind,
    hash: OnceLock<u64>,
}

type CommonKey<'a> = (
    &'a Identity,
    &'a str,
    InvocationMode,
    bool,
    ProtocolVersion,
    EncodingVersion,
    i32,
    &'a Context,
    Option<bool>,
);

/// Immutable description of a proxy's target.
///
/// Build one with [`ReferenceBuilder`] or
/// [`ProxyRuntime::reference`](crate::ProxyRuntime::reference).
///
/// # Examples
///
/// ```
/// use wayfarer_transport::{Endpoint, Identity, InvocationMode, ReferenceBuilder};
///
/// let reference = ReferenceBuilder::new(Identity::new("hello"))
///     .endpoints(vec![Endpoint::tcp("localhost", 10000)])
///     .build()
///     .expect("valid reference");
///
/// let oneway = reference.change_mode(InvocationMode::Oneway).expect("routable");
/// assert_eq!(oneway.mode(), InvocationMode::Oneway);
/// assert_eq!(reference.mode(), InvocationMode::Twoway);
/// assert_eq!(oneway.to_string(), "hello -o -e 1.1:tcp -h localhost -p 10000 -t 60000");
/// ```
#[derive(Clone)]
pub struct Reference {
    inner: Arc<ReferenceData>,
}

impl Reference {
    fn from_data(data: ReferenceData) -> Self {
        Self {
            inner: Arc::new(data),
        }
    }

    fn derive(&self, change: impl FnOnce(&mut ReferenceData)) -> Reference {
        let mut data = ReferenceData::clone(&self.inner);
        change(&mut data);
        data.hash = OnceLock::new();
        Self::from_data(data)
    }

    fn routable(&self) -> Option<&RoutableTarget> {
        match &self.inner.kind {
            ReferenceKind::Routable(target) => Some(target),
            ReferenceKind::Fixed(_) => None,
        }
    }

    fn routable_or_fixed_error(
        &self,
        operation: &'static str,
    ) -> Result<&RoutableTarget, ReferenceError> {
        self.routable()
            .ok_or(ReferenceError::FixedProxy { operation })
    }

    fn derive_routable(&self, change: impl FnOnce(&mut RoutableTarget)) -> Reference {
        self.derive(|data| {
            if let ReferenceKind::Routable(target) = &mut data.kind {
                change(target);
            }
        })
    }

    fn common_key(&self) -> CommonKey<'_> {
        let data = &self.inner;
        (
            &data.identity,
            data.facet.as_str(),
            data.mode,
            data.secure,
            data.protocol,
            data.encoding,
            data.invocation_timeout,
            &*data.context,
            data.compress,
        )
    }

    fn hash_value(&self) -> u64 {
        *self.inner.hash.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.common_key().hash(&mut hasher);
            match &self.inner.kind {
                ReferenceKind::Fixed(connection) => connection_id(connection).hash(&mut hasher),
                ReferenceKind::Routable(target) => target.hash(&mut hasher),
            }
            hasher.finish()
        })
    }

    // Accessors

    /// Identity of the target object.
    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// Facet of the target object; empty for the default facet.
    pub fn facet(&self) -> &str {
        &self.inner.facet
    }

    /// Invocation mode.
    pub fn mode(&self) -> InvocationMode {
        self.inner.mode
    }

    /// Whether invocations are batched.
    pub fn is_batch(&self) -> bool {
        self.inner.mode.is_batch()
    }

    /// Whether invocations expect a response.
    pub fn is_twoway(&self) -> bool {
        self.inner.mode.is_twoway()
    }

    /// Whether only secure endpoints may be used.
    pub fn secure(&self) -> bool {
        self.inner.secure
    }

    /// Protocol version.
    pub fn protocol(&self) -> ProtocolVersion {
        self.inner.protocol
    }

    /// Encoding version.
    pub fn encoding(&self) -> EncodingVersion {
        self.inner.encoding
    }

    /// Invocation timeout in milliseconds, `-1` for none.
    pub fn invocation_timeout(&self) -> i32 {
        self.inner.invocation_timeout
    }

    /// Request context.
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Compression override, `None` when the endpoints decide.
    pub fn compress(&self) -> Option<bool> {
        self.inner.compress
    }

    /// Whether the reference is bound to a connection.
    pub fn is_fixed(&self) -> bool {
        matches!(self.inner.kind, ReferenceKind::Fixed(_))
    }

    /// Connection a fixed reference is bound to.
    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        match &self.inner.kind {
            ReferenceKind::Fixed(connection) => Some(connection),
            ReferenceKind::Routable(_) => None,
        }
    }

    /// Direct endpoints; empty for indirect and fixed references.
    pub fn endpoints(&self) -> &[Endpoint] {
        self.routable()
            .map(|target| target.endpoints.as_slice())
            .unwrap_or(&[])
    }

    /// Adapter id; empty unless resolved through an adapter.
    pub fn adapter_id(&self) -> &str {
        self.routable()
            .map(|target| target.adapter_id.as_str())
            .unwrap_or("")
    }

    /// Locator used for indirect resolution.
    pub fn locator_info(&self) -> Option<&Arc<LocatorInfo>> {
        self.routable()
            .and_then(|target| target.locator_info.as_ref())
    }

    /// Router requests are sent through.
    pub fn router_info(&self) -> Option<&Arc<RouterInfo>> {
        self.routable()
            .and_then(|target| target.router_info.as_ref())
    }

    /// Whether in-process servants may be invoked directly.
    pub fn collocation_optimized(&self) -> bool {
        self.routable()
            .is_some_and(|target| target.collocation_optimized)
    }

    /// Whether the resolved connection is cached.
    pub fn cache_connection(&self) -> bool {
        self.routable()
            .map_or(true, |target| target.cache_connection)
    }

    /// Whether secure endpoints are tried first.
    pub fn prefer_secure(&self) -> bool {
        self.routable().is_some_and(|target| target.prefer_secure)
    }

    /// Endpoint ordering policy.
    pub fn endpoint_selection(&self) -> EndpointSelection {
        self.routable()
            .map_or(EndpointSelection::Random, |target| target.endpoint_selection)
    }

    /// Locator cache timeout in seconds.
    pub fn locator_cache_timeout(&self) -> i32 {
        self.routable()
            .map_or(0, |target| target.locator_cache_timeout)
    }

    /// Connection id; references with different ids never share a connection.
    pub fn connection_id(&self) -> &str {
        self.routable()
            .map(|target| target.connection_id.as_str())
            .unwrap_or("")
    }

    /// Endpoint timeout override in milliseconds.
    pub fn timeout(&self) -> Option<i32> {
        self.routable().and_then(|target| target.timeout)
    }

    /// Whether endpoints come from a locator.
    pub fn is_indirect(&self) -> bool {
        self.routable()
            .is_some_and(|target| target.endpoints.is_empty())
    }

    /// Whether the target is resolved by identity alone.
    pub fn is_well_known(&self) -> bool {
        self.routable()
            .is_some_and(|target| target.endpoints.is_empty() && target.adapter_id.is_empty())
    }

    // Changes valid for both shapes

    /// Copy with a different request context.
    pub fn change_context(&self, context: Context) -> Reference {
        if *self.inner.context == context {
            return self.clone();
        }
        self.derive(|data| data.context = Arc::new(context))
    }

    /// Copy with a different secure flag.
    pub fn change_secure(&self, secure: bool) -> Reference {
        if self.inner.secure == secure {
            return self.clone();
        }
        self.derive(|data| data.secure = secure)
    }

    /// Copy targeting a different object.
    pub fn change_identity(&self, identity: Identity) -> Result<Reference, ReferenceError> {
        if identity.is_null() {
            return Err(ReferenceError::IllegalIdentity {
                identity: identity.to_string(),
            });
        }
        if self.inner.identity == identity {
            return Ok(self.clone());
        }
        Ok(self.derive(|data| data.identity = identity))
    }

    /// Copy targeting a different facet.
    pub fn change_facet(&self, facet: impl Into<String>) -> Reference {
        let facet = facet.into();
        if self.inner.facet == facet {
            return self.clone();
        }
        self.derive(|data| data.facet = facet)
    }

    /// Copy with a different invocation timeout.
    pub fn change_invocation_timeout(&self, timeout: i32) -> Reference {
        if self.inner.invocation_timeout == timeout {
            return self.clone();
        }
        self.derive(|data| data.invocation_timeout = timeout)
    }

    // Changes rejected by fixed references

    /// Copy with a different encoding version.
    pub fn change_encoding(&self, encoding: EncodingVersion) -> Result<Reference, ReferenceError> {
        self.routable_or_fixed_error("change_encoding")?;
        if !encoding.is_supported() {
            return Err(ReferenceError::UnsupportedEncoding { version: encoding });
        }
        if self.inner.encoding == encoding {
            return Ok(self.clone());
        }
        Ok(self.derive(|data| data.encoding = encoding))
    }

    /// Copy with compression forced on or off.
    pub fn change_compress(&self, compress: bool) -> Result<Reference, ReferenceError> {
        self.routable_or_fixed_error("change_compress")?;
        if self.inner.compress == Some(compress) {
            return Ok(self.clone());
        }
        Ok(self.derive(|data| data.compress = Some(compress)))
    }

    /// Copy with a different invocation mode.
    pub fn change_mode(&self, mode: InvocationMode) -> Result<Reference, ReferenceError> {
        self.routable_or_fixed_error("change_mode")?;
        if self.inner.mode == mode {
            return Ok(self.clone());
        }
        Ok(self.derive(|data| data.mode = mode))
    }

    /// Copy with direct endpoints; clears the adapter id.
    pub fn change_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Reference, ReferenceError> {
        let target = self.routable_or_fixed_error("change_endpoints")?;
        if target.endpoints == endpoints && target.adapter_id.is_empty() {
            return Ok(self.clone());
        }
        Ok(self.derive_routable(|target| {
            target.endpoints = endpoints;
            target.adapter_id.clear();
        }))
    }

    /// Copy resolved through `adapter_id`; clears the endpoints.
    pub fn change_adapter_id(
        &self,
        adapter_id: impl Into<String>,
    ) -> Result<Reference, ReferenceError> {
        let target = self.routable_or_fixed_error("change_adapter_id")?;
        let adapter_id = adapter_id.into();
        if target.adapter_id == adapter_id && target.endpoints.is_empty() {
            return Ok(self.clone());
        }
        Ok(self.derive_routable(|target| {
            target.adapter_id = adapter_id;
            target.endpoints.clear();
        }))
    }

    /// Copy with a different locator.
    pub fn change_locator(
        &self,
        locator: Option<Arc<LocatorInfo>>,
    ) -> Result<Reference, ReferenceError> {
        let target = self.routable_or_fixed_error("change_locator")?;
        if target.locator_info == locator {
            return Ok(self.clone());
        }
        Ok(self.derive_routable(|target| target.locator_info = locator))
    }

    /// Copy with a different router.
    pub fn change_router(&self, router: Option<Arc<RouterInfo>>) -> Result<Reference, ReferenceError> {
        let target = self.routable_or_fixed_error("change_router")?;
        if target.router_info == router {
            return Ok(self.clone());
        }
        Ok(self.derive_routable(|target| target.router_info = router))
    }

    /// Copy with collocation optimization switched.
    pub fn change_collocation_optimized(&self, enabled: bool) -> Result<Reference, ReferenceError> {
        let target = self.routable_or_fixed_error("change_collocation_optimized")?;
        if target.collocation_optimized == enabled {
            return Ok(self.clone());
        }
        Ok(self.derive_routable(|target| target.collocation_optimized = enabled))
    }

    /// Copy with connection caching switched.
    pub fn change_cache_connection(&self, enabled: bool) -> Result<Reference, ReferenceError> {
        let target = self.routable_or_fixed_error("change_cache_connection")?;
        if target.cache_connection == enabled {
            return Ok(self.clone());
        }
        Ok(self.derive_routable(|target| target.cache_connection = enabled))
    }

    /// Copy preferring secure or insecure endpoints.
    pub fn change_prefer_secure(&self, prefer_secure: bool) -> Result<Reference, ReferenceError> {
        let target = self.routable_or_fixed_error("change_prefer_secure")?;
        if target.prefer_secure == prefer_secure {
            return Ok(self.clone());
        }
        Ok(self.derive_routable(|target| target.prefer_secure = prefer_secure))
    }

    /// Copy with a different endpoint ordering policy.
    pub fn change_endpoint_selection(
        &self,
        selection: EndpointSelection,
    ) -> Result<Reference, ReferenceError> {
        let target = self.routable_or_fixed_error("change_endpoint_selection")?;
        if target.endpoint_selection == selection {
            return Ok(self.clone());
        }
        Ok(self.derive_routable(|target| target.endpoint_selection = selection))
    }

    /// Copy with a different locator cache timeout, in seconds.
    pub fn change_locator_cache_timeout(&self, timeout: i32) -> Result<Reference, ReferenceError> {
        let target = self.routable_or_fixed_error("change_locator_cache_timeout")?;
        if target.locator_cache_timeout == timeout {
            return Ok(self.clone());
        }
        Ok(self.derive_routable(|target| target.locator_cache_timeout = timeout))
    }

    // Changes accepted by both shapes but only effective on routable ones

    /// Copy forcing `timeout` on every endpoint. A fixed reference is
    /// returned unchanged.
    pub fn change_timeout(&self, timeout: i32) -> Result<Reference, ReferenceError> {
        match self.routable() {
            Some(target) if target.timeout != Some(timeout) => {
                Ok(self.derive_routable(|target| target.timeout = Some(timeout)))
            }
            _ => Ok(self.clone()),
        }
    }

    /// Copy with a different connection id. A fixed reference is returned
    /// unchanged.
    pub fn change_connection_id(
        &self,
        connection_id: impl Into<String>,
    ) -> Result<Reference, ReferenceError> {
        let connection_id = connection_id.into();
        match self.routable() {
            Some(target) if target.connection_id != connection_id => {
                Ok(self.derive_routable(|target| target.connection_id = connection_id))
            }
            _ => Ok(self.clone()),
        }
    }

    /// Fixed reference with the same common fields, bound to `connection`.
    pub fn change_connection(&self, connection: Arc<dyn Connection>) -> Reference {
        if let ReferenceKind::Fixed(current) = &self.inner.kind {
            if connection_id(current) == connection_id(&connection) {
                return self.clone();
            }
        }
        self.derive(|data| data.kind = ReferenceKind::Fixed(connection))
    }

    /// Property-dictionary form of a routable reference under `prefix`.
    ///
    /// Locator and router references are nested under `<prefix>.Locator`
    /// and `<prefix>.Router`.
    pub fn to_property(&self, prefix: &str) -> Result<BTreeMap<String, String>, ReferenceError> {
        let target = self.routable_or_fixed_error("to_property")?;
        let flag = |enabled: bool| String::from(if enabled { "1" } else { "0" });

        let mut properties = BTreeMap::new();
        properties.insert(prefix.to_string(), self.to_string());
        properties.insert(
            format!("{prefix}.CollocationOptimized"),
            flag(target.collocation_optimized),
        );
        properties.insert(
            format!("{prefix}.ConnectionCached"),
            flag(target.cache_connection),
        );
        properties.insert(format!("{prefix}.PreferSecure"), flag(target.prefer_secure));
        properties.insert(
            format!("{prefix}.EndpointSelection"),
            target.endpoint_selection.to_string(),
        );
        properties.insert(
            format!("{prefix}.LocatorCacheTimeout"),
            target.locator_cache_timeout.to_string(),
        );
        properties.insert(
            format!("{prefix}.InvocationTimeout"),
            self.inner.invocation_timeout.to_string(),
        );
        for (key, value) in self.inner.context.iter() {
            properties.insert(format!("{prefix}.Context.{key}"), value.clone());
        }

        if let Some(router) = &target.router_info {
            properties.extend(router.proxy().to_property(&format!("{prefix}.Router"))?);
        }
        if let Some(locator) = &target.locator_info {
            properties.extend(locator.proxy().to_property(&format!("{prefix}.Locator"))?);
        }
        Ok(properties)
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.common_key() == other.common_key() && self.inner.kind == other.inner.kind)
    }
}

impl Eq for Reference {}

impl PartialOrd for Reference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Reference {
    fn cmp(&self, other: &Self) -> Ordering {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Ordering::Equal;
        }
        self.common_key()
            .cmp(&other.common_key())
            .then_with(|| self.inner.kind.cmp(&other.inner.kind))
    }
}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_value());
    }
}

/// Quote `s` when it contains characters with meaning in the stringified form.
fn quoted(s: &str) -> String {
    let needs_quotes =
        s.is_empty() || s.chars().any(|c| c.is_whitespace() || matches!(c, ':' | '@' | '"'));
    if needs_quotes {
        format!("\"{}\"", s.replace('"', "\\\""))
    } else {
        s.to_string()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = &self.inner;
        write!(f, "{}", quoted(&data.identity.to_string()))?;
        if !data.facet.is_empty() {
            write!(f, " -f {}", quoted(&data.facet))?;
        }
        write!(f, " {}", data.mode.flag())?;
        if data.secure {
            write!(f, " -s")?;
        }
        if data.protocol != ProtocolVersion::V1_0 {
            write!(f, " -p {}", data.protocol)?;
        }
        write!(f, " -e {}", data.encoding)?;

        if let ReferenceKind::Routable(target) = &data.kind {
            for endpoint in &target.endpoints {
                write!(f, ":{endpoint}")?;
            }
            if !target.adapter_id.is_empty() {
                write!(f, " @ {}", quoted(&target.adapter_id))?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("proxy", &self.to_string())
            .field("fixed", &self.is_fixed())
            .finish()
    }
}

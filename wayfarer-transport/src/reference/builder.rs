//! Builder for new references.

use std::sync::{Arc, OnceLock};

use super::{Context, Reference, ReferenceData, ReferenceKind, RoutableTarget};
use crate::{
    Connection, DefaultsAndOverrides, EncodingVersion, Endpoint, EndpointSelection, Identity,
    InvocationMode, LocatorInfo, ProtocolVersion, ReferenceError, RouterInfo,
};

/// Builder for [`Reference`] values.
///
/// Starts from the runtime defaults (or the built-in ones with
/// [`ReferenceBuilder::new`]). Setting endpoints clears the adapter id and
/// the other way round, like the corresponding `change_*` operations.
///
/// # Examples
///
/// ```
/// use wayfarer_transport::{Identity, ReferenceBuilder};
///
/// let well_known = ReferenceBuilder::new(Identity::new("registry"))
///     .locator_cache_timeout(30)
///     .build()
///     .expect("valid reference");
/// assert!(well_known.is_well_known());
///
/// assert!(ReferenceBuilder::new(Identity::default()).build().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ReferenceBuilder {
    identity: Identity,
    facet: String,
    mode: InvocationMode,
    secure: bool,
    protocol: ProtocolVersion,
    encoding: EncodingVersion,
    invocation_timeout: i32,
    context: Context,
    compress: Option<bool>,
    target: RoutableTarget,
}

impl ReferenceBuilder {
    /// Builder for `identity` using the built-in defaults.
    pub fn new(identity: Identity) -> Self {
        Self::with_defaults(identity, &DefaultsAndOverrides::default())
    }

    /// Builder for `identity` using `defaults`.
    pub fn with_defaults(identity: Identity, defaults: &DefaultsAndOverrides) -> Self {
        Self {
            identity,
            facet: String::new(),
            mode: InvocationMode::Twoway,
            secure: false,
            protocol: ProtocolVersion::V1_0,
            encoding: defaults.encoding,
            invocation_timeout: defaults.invocation_timeout,
            context: Context::new(),
            compress: None,
            target: RoutableTarget {
                endpoints: Vec::new(),
                adapter_id: String::new(),
                locator_info: None,
                router_info: None,
                collocation_optimized: defaults.collocation_optimized,
                cache_connection: true,
                prefer_secure: defaults.prefer_secure,
                endpoint_selection: defaults.endpoint_selection,
                locator_cache_timeout: defaults.locator_cache_timeout,
                connection_id: String::new(),
                timeout: None,
            },
        }
    }

    /// Set the facet.
    pub fn facet(mut self, facet: impl Into<String>) -> Self {
        self.facet = facet.into();
        self
    }

    /// Set the invocation mode.
    pub fn mode(mut self, mode: InvocationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Require secure endpoints.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the protocol version.
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the encoding version.
    pub fn encoding(mut self, encoding: EncodingVersion) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the invocation timeout in milliseconds.
    pub fn invocation_timeout(mut self, timeout: i32) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Set the request context.
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Force compression on or off.
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    /// Use direct endpoints.
    pub fn endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.target.endpoints = endpoints;
        self.target.adapter_id.clear();
        self
    }

    /// Resolve through an object adapter.
    pub fn adapter_id(mut self, adapter_id: impl Into<String>) -> Self {
        self.target.adapter_id = adapter_id.into();
        self.target.endpoints.clear();
        self
    }

    /// Set the locator.
    pub fn locator(mut self, locator: Arc<LocatorInfo>) -> Self {
        self.target.locator_info = Some(locator);
        self
    }

    /// Set the router.
    pub fn router(mut self, router: Arc<RouterInfo>) -> Self {
        self.target.router_info = Some(router);
        self
    }

    /// Enable or disable collocation optimization.
    pub fn collocation_optimized(mut self, enabled: bool) -> Self {
        self.target.collocation_optimized = enabled;
        self
    }

    /// Enable or disable connection caching.
    pub fn cache_connection(mut self, enabled: bool) -> Self {
        self.target.cache_connection = enabled;
        self
    }

    /// Try secure endpoints first.
    pub fn prefer_secure(mut self, prefer_secure: bool) -> Self {
        self.target.prefer_secure = prefer_secure;
        self
    }

    /// Set the endpoint ordering policy.
    pub fn endpoint_selection(mut self, selection: EndpointSelection) -> Self {
        self.target.endpoint_selection = selection;
        self
    }

    /// Set the locator cache timeout in seconds.
    pub fn locator_cache_timeout(mut self, timeout: i32) -> Self {
        self.target.locator_cache_timeout = timeout;
        self
    }

    /// Set the connection id.
    pub fn connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.target.connection_id = connection_id.into();
        self
    }

    /// Force an endpoint timeout in milliseconds.
    pub fn timeout(mut self, timeout: i32) -> Self {
        self.target.timeout = Some(timeout);
        self
    }

    /// Build a routable reference.
    pub fn build(self) -> Result<Reference, ReferenceError> {
        self.validate()?;
        Ok(self.finish(None))
    }

    /// Build a reference bound to `connection`.
    pub fn build_fixed(self, connection: Arc<dyn Connection>) -> Result<Reference, ReferenceError> {
        self.validate()?;
        Ok(self.finish(Some(connection)))
    }

    fn validate(&self) -> Result<(), ReferenceError> {
        if self.identity.is_null() {
            return Err(ReferenceError::IllegalIdentity {
                identity: self.identity.to_string(),
            });
        }
        if !self.protocol.is_supported() {
            return Err(ReferenceError::UnsupportedProtocol {
                version: self.protocol,
            });
        }
        if !self.encoding.is_supported() {
            return Err(ReferenceError::UnsupportedEncoding {
                version: self.encoding,
            });
        }
        Ok(())
    }

    fn finish(self, connection: Option<Arc<dyn Connection>>) -> Reference {
        let kind = match connection {
            Some(connection) => ReferenceKind::Fixed(connection),
            None => ReferenceKind::Routable(self.target),
        };
        Reference::from_data(ReferenceData {
            identity: self.identity,
            facet: self.facet,
            mode: self.mode,
            secure: self.secure,
            protocol: self.protocol,
            encoding: self.encoding,
            invocation_timeout: self.invocation_timeout,
            context: Arc::new(self.context),
            compress: self.compress,
            kind,
            hash: OnceLock::new(),
        })
    }
}

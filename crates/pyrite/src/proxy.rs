//! Opaque handles for host-managed foreign values.

/// Identifier for a value owned by the host, opaque to the runtime.
///
/// Proxy values are immediates that round-trip between host and runtime
/// without heap allocation; the interop bridge gives them behavior by
/// adapting them into instances of a registered foreign type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProxyId(u32);

impl ProxyId {
    /// Creates a proxy id from a raw host handle.
    #[must_use]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw host handle.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

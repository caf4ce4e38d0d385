//! # Sub-protocol Port
//!
//! What a capability implementation provides to be multiplexed over a
//! session.

use crate::domain::ProtocolSpec;
use crate::service::ProtocolContext;
use async_trait::async_trait;

/// Error type returned by sub-protocol handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A sub-protocol implementation.
///
/// One instance may serve many sessions at once; per-session state belongs
/// in a map keyed by [`ProtocolContext::remote_id`].
///
/// # Guarantees
///
/// For every session where this protocol's capability was negotiated:
/// - `connected` runs once, before any `received`
/// - `received` calls run one at a time, in wire order
/// - `disconnected` runs exactly once when the session ends for any reason
///
/// Sessions where the capability was not negotiated never call the
/// protocol at all. A handler that fails or panics is logged and does not
/// affect other protocols on the same session.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct Echo;
///
/// #[async_trait]
/// impl Protocol for Echo {
///     fn spec(&self) -> ProtocolSpec {
///         ProtocolSpec::new("echo", 1, 2)
///     }
///
///     async fn received(&self, ctx: &ProtocolContext, code: u64, payload: Vec<u8>)
///         -> Result<(), BoxError>
///     {
///         ctx.send_data(code, &payload).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Protocol: Send + Sync + 'static {
    /// Name, version and code-space length this implementation speaks.
    fn spec(&self) -> ProtocolSpec;

    /// Session established and capability bound.
    async fn connected(&self, _ctx: &ProtocolContext) {}

    /// Inbound message with a local (offset-subtracted) code.
    async fn received(
        &self,
        ctx: &ProtocolContext,
        code: u64,
        payload: Vec<u8>,
    ) -> Result<(), BoxError>;

    /// Session ended.
    async fn disconnected(&self, _ctx: &ProtocolContext) {}
}

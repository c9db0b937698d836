//! # Inference
//!
//! Everything between a user query and provider text:
//!
//! ```text
//! registry ──► request::build ──► Transport::send ──┬─► extract_response
//!                                                   └─► sse::decode ─► extract_stream_delta
//! ```

pub mod provider;
pub mod providers;
pub mod registry;
pub mod request;
pub mod sse;
pub mod transport;
pub mod types;

pub use provider::{Dialect, PayloadArgs, ProviderError, WireFormat};
pub use registry::{AuthScheme, BaseUrl, Endpoint, PROVIDERS, PartialConfig, ProviderConfig};
pub use request::{RequestDescriptor, RequestOptions};
pub use transport::{ByteStream, HttpTransport, RawResponse, Transport};
pub use types::{ChatMessage, Image, MessageContent, Role};

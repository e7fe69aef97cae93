pub mod embedding;
pub mod error;
pub mod providers;
pub mod router;

pub use embedding::{cosine, local_embedding, EmbeddingProvider, EmbeddingService};
pub use error::RouterError;
pub use providers::{extract_json, ProviderConfig, ProviderKind};
pub use router::{Capability, ModelRouter, RouterConfig, RouterDiagnostics, StreamEvent};

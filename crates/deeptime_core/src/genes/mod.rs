pub mod activation;
pub mod diversity;

pub use activation::{ActivationEvent, ActivationResult, GeneActivationService};
pub use diversity::GeneDiversityService;

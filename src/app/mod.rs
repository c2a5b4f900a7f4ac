// Application layer - Use case interactors

pub mod container;
pub mod encode_interactor;
pub mod evaluate_interactor;

// Re-export interactors
pub use container::{AppContainer, DefaultAppContainer, Ports};
pub use encode_interactor::{EncodeInteractor, EncodeMode, EncodeRequest};
pub use evaluate_interactor::EvaluateInteractor;

pub mod catalog;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod errors;
pub mod gateway;
pub mod metrics;
pub mod providers;
pub mod server;
pub mod session;
pub mod speech;
pub mod transcript;

// Re-export commonly used types for easier access
pub use catalog::{CatalogIndex, ModelConfig, ProviderConfig};
pub use config::{Settings, load_settings};
pub use controller::{AdvisorController, ViewState};
pub use dispatcher::Dispatcher;
pub use errors::{AppError, AppResult, DispatchError};
pub use gateway::{AsyncGateway, Collaborators, Completion, Operation, Outcome};
pub use providers::DispatchResult;
pub use server::{AppState, create_app, start_server};
pub use session::{ChatDispatch, ConversationSession, Role, Turn};

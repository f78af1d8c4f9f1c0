pub mod context;
pub mod factory;
pub mod resources;

pub use context::AppContext;
pub use factory::{HttpApiFactory, ProviderFactory, RemoteApiFactory};
pub use resources::{AppResources, select_store};

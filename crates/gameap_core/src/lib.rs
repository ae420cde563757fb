pub mod api;
pub mod buffer;
pub mod domain;
pub mod executor;
pub mod fs;
pub mod memory;
pub mod repository;

pub use api::{ApiError, ApiRequest, ApiRequestMaker, ApiResponse};
pub use buffer::{NullOutput, OutputWriter, SafeBuffer};
pub use domain::*;
pub use executor::{Executor, ExecutorError, ExecutorOptions};
pub use repository::{
    GDTaskRepository, RepositoryError, ServerRepository, ServerTaskRepository,
};

mod default;
mod detailed;
mod extendable;
mod lookup;

pub use default::DefaultExecutor;
pub use detailed::DetailedExecutor;
pub use extendable::{CommandHandler, ExtendableExecutor};
pub use lookup::{join_command, look_path, resolve_executable, resolve_work_dir, split_command};

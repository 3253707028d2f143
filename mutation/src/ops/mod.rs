//! Primitive operations, one module each.

mod kill;
mod link;
mod set;
mod spawn;
mod unlink;

pub use kill::execute_kill;
pub use link::execute_link;
pub use set::execute_set;
pub use spawn::{execute_spawn, execute_spawn_item};
pub use unlink::execute_unlink;

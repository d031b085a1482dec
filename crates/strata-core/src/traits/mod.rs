pub mod hook;
pub mod store;

pub use hook::AppendHook;
pub use store::{Backend, EntryStore};

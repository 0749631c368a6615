pub mod types;

pub use types::{ReadMode, ServerAddr, ServerInfo, Tag, TagSet, UnknownReadMode};

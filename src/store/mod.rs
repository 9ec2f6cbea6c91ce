mod copy;
mod file;
mod fs;
mod node;
mod reader;
mod tag;
mod walk;

pub use copy::dir_mode;
pub use file::{File, LocalFile};
pub use fs::EmbeddedFs;
pub use node::{DirNode, FileNode, Node, NodeInfo, MODE_DIR, MODE_PERM};
pub use reader::Reader;
pub use tag::{EntityTag, GZIP_MARKER};
pub use walk::WalkControl;

pub(crate) use node::base_name;

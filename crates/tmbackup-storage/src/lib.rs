pub mod listing;
pub mod prune;
pub mod rsync;
pub mod transfer;

pub use listing::list_remote;
pub use prune::prune;
pub use rsync::Rsync;
pub use transfer::{ensure_computer_dir, Transfer};

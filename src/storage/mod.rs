pub mod arweave;
pub mod ipfs;
pub mod local;
pub mod locator;
pub mod router;
pub mod store;

pub use arweave::ArweaveStore;
pub use ipfs::IpfsStore;
pub use local::LocalStore;
pub use locator::{BackendKind, StorageLocator};
pub use router::{ReadRetry, StorageRouter};
pub use store::{Durability, MetadataStore};

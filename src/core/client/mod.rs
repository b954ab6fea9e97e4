pub mod catalog;
pub mod platform;
pub mod provisioner;

pub use catalog::{AssetRef, Catalog, GitHubReleases, LATEST};
pub use platform::{ClientLayout, Platform};
pub use provisioner::{remove_tree, ClientProvisioner};

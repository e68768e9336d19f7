//! dockhand-proxy: reverse-proxy routing and network topology.
//!
//! Keeps the proxy's view of the world consistent with the service
//! definitions: which hosts route where, and which networks the proxy
//! must be attached to in order to reach them.
//!
//! # Components
//!
//! - **`labels`**: per-domain router/service/middleware labels
//! - **`file_config`**: the same routing as hot-reloaded `{app}.yml` files
//! - **`resolver`**: picks the network a service is advertised on
//! - **`connectivity`**: attaches/detaches the proxy service or container
//! - **`networks`**: network create/delete/assign/unassign

pub mod connectivity;
pub mod error;
pub mod file_config;
pub mod labels;
pub mod networks;
pub mod resolver;

pub use connectivity::{ConnectivityManager, SyncStats};
pub use error::{ProxyError, ProxyResult};
pub use file_config::{DynamicConfigFiles, FileConfig};
pub use labels::{Labels, generate_labels, merge_labels};
pub use networks::NetworkManager;
pub use resolver::resolve_network;

//! Container port publication and host port allocation.
//!
//! This library turns port-publish specs such as `9876:80`, `8000-8080:80/udp`
//! or `9800-9803:80-83` into concrete host-to-container bindings, allocates
//! host ports when none are given, and returns them to the pool when a
//! container is unpublished.
//!
//! ```
//! use portpub::PortMapper;
//! use portpub_config::EngineConfig;
//!
//! let mapper = PortMapper::new(&EngineConfig::default()).unwrap();
//! mapper.publish_raw("web", &["9876:80"]).unwrap();
//! let lines = portpub::render::container_lines(&mapper.query_by_container("web", None).unwrap());
//! assert_eq!(lines, vec!["80/tcp -> 0.0.0.0:9876"]);
//! ```

pub mod allocator;
pub mod error;
pub mod mapping;
pub mod range;
pub mod render;
pub mod resolver;
pub mod spec;
pub mod store;
pub mod table;

pub use allocator::{HostPortRequest, PortPool, RangeAllocator};
pub use error::{ParseError, PortError, Result};
pub use mapping::{Binding, HostKey, Protocol};
pub use range::PortRange;
pub use resolver::PortMapper;
pub use spec::{Exposure, PortSpec};
pub use store::{ContainerRecord, StateSnapshot, StateStore};
pub use table::BindingTable;

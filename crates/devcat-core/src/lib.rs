//! devcat Core - Device-type model and derived criteria index
//!
//! This crate provides the pure (I/O free) part of the devcat system:
//! - Device-type, service, and content-variable tree types
//! - Composite identifier codec for service-group scoped device-type views
//! - Criteria extraction from content-variable trees
//! - Aspect closure table construction for ancestor/descendant lookups
//! - Semantic filter types consumed by the query engine

pub mod aspect;
pub mod criteria;
pub mod device_type;
pub mod filter;
pub mod function;
pub mod idmodifier;

pub use aspect::{build_aspect_nodes, Aspect, AspectNode, AspectTreeError};
pub use criteria::{extract_criteria, extract_criteria_for_id, DeviceTypeCriteria};
pub use device_type::{Content, ContentVariable, DeviceType, Interaction, Service, ServiceGroup};
pub use filter::{FilterCriteria, QueryOptions};
pub use function::FunctionKind;
pub use idmodifier::{IdModifierError, ModifierParams, SERVICE_GROUP_SELECTION};

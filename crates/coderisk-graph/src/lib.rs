pub mod backend;
pub mod builder;
pub mod cochange;
pub mod local;
pub mod model;
pub mod queries;
pub mod remote;

pub use backend::GraphBackend;
pub use builder::{BuildInput, BuildReport, GraphBuilder};
pub use cochange::{compute_cochange, CoChangePair};
pub use local::LocalGraphStore;
pub use model::{Direction, GraphCounts, GraphEdge, GraphNode};
pub use queries::{CoChangeNeighbor, GraphReader, IncidentLink};
pub use remote::RemoteGraphStore;

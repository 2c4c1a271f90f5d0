//! Data model: Bead, Agent, Project, Provider, and the persistence seam
//! (`BeadStore`) an external backend implements.

pub mod agent;
pub mod bead;
pub mod project;
pub mod provider;

pub use agent::{Agent, AgentRole, AgentStatus};
pub use bead::{Bead, BeadStatus, BeadStore, BeadType, InMemoryBeadStore, ReadyFilter};
pub use project::{GitStrategy, Project};
pub use provider::Provider;

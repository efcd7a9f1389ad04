pub mod engine;
pub mod matcher;
pub mod retry;
pub mod ticket_created;

pub use engine::{Delivery, EngineError, WorkflowEngine, WorkflowEvent};
pub use retry::RetryPolicy;
pub use ticket_created::{PgTicketStore, TicketCreatedWorkflow};

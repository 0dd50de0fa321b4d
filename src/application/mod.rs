//! Application layer: the manager façade, the validation chains and the
//! transformation pipeline that sit on top of the domain model.

pub mod context;
pub mod manager;
pub mod pipeline;
pub mod validation;

pub use context::{OperationContext, PipelineContext, TargetRef};
pub use manager::TreeManager;
pub use pipeline::{Stage, TransformationPipeline};
pub use validation::{Validate, ValidationChain};

pub mod flow;
pub mod interceptor;

pub use flow::{FlowSnapshot, TaskPacket};
pub use interceptor::Interceptor;

//! 模型驱动层：流式驱动抽象与脚本化实现

pub mod mock;
pub mod traits;

pub use mock::{Script, ScriptedModelDriver, ScriptedTurn};
pub use traits::{LlmError, ModelChunk, ModelDriver, ModelRequest, ModelStream};

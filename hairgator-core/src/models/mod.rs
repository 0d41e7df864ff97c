pub mod conversation;
pub mod style;

pub use conversation::{ConversationKey, ConversationMessage, Role};
pub use style::StyleRecord;

pub mod blocked;
pub mod events;

pub use blocked::{BlockSource, ImageBlockedPayload, TokenCategorySummary};
pub use events::{ChatCompletionEvent, ContentSnapshot, FunctionCallPayload};

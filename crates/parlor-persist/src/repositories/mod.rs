mod document;
mod message;
mod model;
mod thread;

pub use document::DocumentRepository;
pub use message::MessageRepository;
pub use model::ModelRepository;
pub use thread::ThreadRepository;

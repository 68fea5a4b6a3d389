/// XML record parsing for the metadata service exports
pub mod parser;
pub mod records;

pub use parser::MtdXmlParser;
pub use records::{ActorRecord, DatasetRecord, FrameworkRecord};

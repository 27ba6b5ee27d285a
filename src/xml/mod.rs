pub mod document;
pub mod editor;

pub use document::{MetadataDocument, XmlDeclaration, XmlElement, XmlNode};
pub use editor::XmlDocumentEditor;

use crate::constants::MetadataTags;
use crate::error::{ReconError, Result};
use crate::types::ReconciliationFieldRecord;
use crate::xml::document::{MetadataDocument, XmlElement, XmlNode};
use tracing::{debug, warn};

/// Structural edits on an exported resource-object document.
///
/// The document is expected to hold exactly one `Resource` element directly
/// under the `xl-ddm-data` root; reconciliation fields are its
/// `ReconField` children.
#[derive(Debug, Clone, Default)]
pub struct XmlDocumentEditor {
    tags: MetadataTags,
}

impl XmlDocumentEditor {
    pub fn new(tags: MetadataTags) -> Self {
        Self { tags }
    }

    fn check_root(&self, root: &XmlElement) -> Result<()> {
        if root.name != self.tags.root {
            return Err(ReconError::DocumentStructure(format!(
                "expected root element '{}', found '{}'",
                self.tags.root, root.name
            )));
        }
        let count = root
            .child_elements()
            .filter(|e| e.name == self.tags.resource)
            .count();
        match count {
            1 => Ok(()),
            0 => Err(ReconError::DocumentStructure(format!(
                "no '{}' element under '{}'",
                self.tags.resource, self.tags.root
            ))),
            n => Err(ReconError::DocumentStructure(format!(
                "{} '{}' elements under '{}', expected one",
                n, self.tags.resource, self.tags.root
            ))),
        }
    }

    pub fn resource<'a>(&self, document: &'a MetadataDocument) -> Result<&'a XmlElement> {
        self.check_root(document.root())?;
        document
            .root()
            .child_elements()
            .find(|e| e.name == self.tags.resource)
            .ok_or_else(|| ReconError::DocumentStructure(format!("no '{}' element", self.tags.resource)))
    }

    pub fn resource_mut<'a>(&self, document: &'a mut MetadataDocument) -> Result<&'a mut XmlElement> {
        self.check_root(document.root())?;
        document
            .root_mut()
            .child_elements_mut()
            .find(|e| e.name == self.tags.resource)
            .ok_or_else(|| ReconError::DocumentStructure(format!("no '{}' element", self.tags.resource)))
    }

    /// Value of the `name` attribute on the `Resource` element
    pub fn resource_name(&self, document: &MetadataDocument) -> Result<Option<String>> {
        Ok(self
            .resource(document)?
            .attribute(&self.tags.name_attr)
            .map(str::to_string))
    }

    /// Names of the top-level reconciliation fields, in document order
    pub fn field_names(&self, document: &MetadataDocument) -> Result<Vec<String>> {
        Ok(self
            .resource(document)?
            .child_elements()
            .filter(|e| e.name == self.tags.recon_field)
            .filter_map(|e| e.attribute(&self.tags.name_attr))
            .map(str::to_string)
            .collect())
    }

    /// Last-update timestamp of the resource object: text of the first
    /// `OBJ_UPDATE` element, at any depth, whose text is not empty.
    pub fn get_update_timestamp(&self, document: &MetadataDocument) -> Option<String> {
        document
            .root()
            .descendants()
            .into_iter()
            .filter(|e| e.name == self.tags.object_update)
            .map(|e| e.text().trim().to_string())
            .find(|text| !text.is_empty())
    }

    /// Append a new `ReconField` element as the last child of `Resource`
    pub fn add_field(&self, document: &mut MetadataDocument, record: &ReconciliationFieldRecord) -> Result<()> {
        let timestamp = self.get_update_timestamp(document).unwrap_or_else(|| {
            warn!(
                "No {} timestamp in document; '{}' will have an empty {}",
                self.tags.object_update, record.name, self.tags.field_update
            );
            String::new()
        });

        let mut field = XmlElement::new(self.tags.recon_field.as_str());
        field.set_attribute(self.tags.repo_type_attr.as_str(), self.tags.repo_type.as_str());
        field.set_attribute(self.tags.name_attr.as_str(), record.name.as_str());
        field.append_child(XmlElement::with_text(self.tags.field_update.as_str(), timestamp));
        field.append_child(XmlElement::with_text(
            self.tags.field_type.as_str(),
            record.field_type.as_str(),
        ));
        field.append_child(XmlElement::with_text(
            self.tags.field_required.as_str(),
            if record.is_required { "1" } else { "0" },
        ));

        self.resource_mut(document)?.append_child(field);
        debug!("Added {} '{}' to document", self.tags.recon_field, record.name);
        Ok(())
    }

    /// Detach the `ReconField` child of `Resource` whose name matches exactly.
    /// Returns the removed element.
    pub fn remove_field(&self, document: &mut MetadataDocument, name: &str) -> Result<XmlElement> {
        let recon_field = self.tags.recon_field.clone();
        let name_attr = self.tags.name_attr.clone();
        let resource = self.resource_mut(document)?;

        let positions: Vec<usize> = resource
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, node)| match node {
                XmlNode::Element(e) if e.name == recon_field && e.attribute(&name_attr) == Some(name) => Some(i),
                _ => None,
            })
            .collect();

        let index = match positions.as_slice() {
            [] => {
                return Err(ReconError::NotFound(format!(
                    "{} '{}' is not present in the document",
                    recon_field, name
                )))
            }
            [index] => *index,
            _ => {
                return Err(ReconError::DocumentStructure(format!(
                    "{} '{}' appears {} times in the document",
                    recon_field,
                    name,
                    positions.len()
                )))
            }
        };

        match resource.children.remove(index) {
            XmlNode::Element(element) => {
                debug!("Removed {} '{}' from document", recon_field, name);
                Ok(element)
            }
            _ => Err(ReconError::DocumentStructure(format!(
                "node at position {} is not an element",
                index
            ))),
        }
    }
}

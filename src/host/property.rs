use crate::core::{AssetPath, NodeHandle};

/// Save-game property value as reported by a live node
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Bytes(Vec<u8>),
    /// Hard reference to another graph node
    Object(Option<NodeHandle>),
    /// Hard reference to a top-level asset, preloaded before dependents are recreated
    Asset(Option<AssetPath>),
    /// Soft reference, resolved lazily by the host
    SoftAsset(AssetPath),
    Array(Vec<PropertyValue>),
    Struct(PropertyBag),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

/// Ordered property list; order is preserved through save and load
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyBag(Vec<Property>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: PropertyValue) -> Self {
        self.set(name, value);
        self
    }

    /// Replace an existing property or append a new one
    pub fn set(&mut self, name: &str, value: PropertyValue) {
        match self.0.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Property {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn push(&mut self, property: Property) {
        self.0.push(property);
    }

    /// Replace every property present in `other`, keep the rest
    pub fn merge(&mut self, other: PropertyBag) {
        for property in other.0 {
            self.set(&property.name, property.value);
        }
    }
}

impl FromIterator<Property> for PropertyBag {
    fn from_iter<T: IntoIterator<Item = Property>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

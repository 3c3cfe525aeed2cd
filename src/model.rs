//! Entity metadata consumed during resolution and SQL generation.
//!
//! The compiler never reflects over storage itself; a [`MetadataProvider`]
//! hands it one [`EntityModel`] per entity shape. [`Catalog`] is the
//! in-memory provider, loadable from JSON:
//!
//! ```json
//! {
//!   "entities": [{
//!     "name": "Product",
//!     "table": "products",
//!     "properties": [
//!       { "name": "Id", "column": "id", "type": "Int64", "key": true },
//!       { "name": "Name", "serialized_name": "name", "column": "name", "type": "String" }
//!     ]
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Primitive types a property may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    SByte,
    Int16,
    Int32,
    Int64,
    Decimal,
    Double,
    Single,
    String,
    Date,
    TimeOfDay,
    DateTimeOffset,
    Duration,
    Guid,
    Binary,
    Geography,
    Geometry,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 18] = [
        PrimitiveType::Boolean,
        PrimitiveType::Byte,
        PrimitiveType::SByte,
        PrimitiveType::Int16,
        PrimitiveType::Int32,
        PrimitiveType::Int64,
        PrimitiveType::Decimal,
        PrimitiveType::Double,
        PrimitiveType::Single,
        PrimitiveType::String,
        PrimitiveType::Date,
        PrimitiveType::TimeOfDay,
        PrimitiveType::DateTimeOffset,
        PrimitiveType::Duration,
        PrimitiveType::Guid,
        PrimitiveType::Binary,
        PrimitiveType::Geography,
        PrimitiveType::Geometry,
    ];

    /// Qualified name as written in `cast`/`isof` (`Edm.Int32`).
    pub fn edm_name(&self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "Edm.Boolean",
            PrimitiveType::Byte => "Edm.Byte",
            PrimitiveType::SByte => "Edm.SByte",
            PrimitiveType::Int16 => "Edm.Int16",
            PrimitiveType::Int32 => "Edm.Int32",
            PrimitiveType::Int64 => "Edm.Int64",
            PrimitiveType::Decimal => "Edm.Decimal",
            PrimitiveType::Double => "Edm.Double",
            PrimitiveType::Single => "Edm.Single",
            PrimitiveType::String => "Edm.String",
            PrimitiveType::Date => "Edm.Date",
            PrimitiveType::TimeOfDay => "Edm.TimeOfDay",
            PrimitiveType::DateTimeOffset => "Edm.DateTimeOffset",
            PrimitiveType::Duration => "Edm.Duration",
            PrimitiveType::Guid => "Edm.Guid",
            PrimitiveType::Binary => "Edm.Binary",
            PrimitiveType::Geography => "Edm.Geography",
            PrimitiveType::Geometry => "Edm.Geometry",
        }
    }

    /// Look up a primitive by its qualified name, ignoring case.
    pub fn from_edm_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.edm_name().eq_ignore_ascii_case(name))
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            PrimitiveType::Byte
                | PrimitiveType::SByte
                | PrimitiveType::Int16
                | PrimitiveType::Int32
                | PrimitiveType::Int64
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral()
            || matches!(
                self,
                PrimitiveType::Decimal | PrimitiveType::Double | PrimitiveType::Single
            )
    }

    pub fn is_spatial(&self) -> bool {
        matches!(self, PrimitiveType::Geography | PrimitiveType::Geometry)
    }
}

/// Relationship from a property to another entity or to a collection table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationModel {
    /// Name of the related entity, when it is an entity
    #[serde(default)]
    pub target_entity: Option<String>,
    pub target_table: String,
    /// Column on this entity's table joining to `target_column`
    pub source_column: String,
    pub target_column: String,
    #[serde(default)]
    pub collection: bool,
    /// For collections of primitives: the column holding the element value
    #[serde(default)]
    pub value_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyModel {
    pub name: String,
    #[serde(default)]
    pub serialized_name: Option<String>,
    pub column: String,
    #[serde(rename = "type")]
    pub ty: PrimitiveType,
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub searchable: bool,
    /// Enum-flags property; the only kind `has` accepts.
    #[serde(default)]
    pub flags: bool,
    #[serde(default)]
    pub navigation: Option<NavigationModel>,
}

impl PropertyModel {
    pub fn new(name: &str, column: &str, ty: PrimitiveType) -> Self {
        PropertyModel {
            name: name.to_string(),
            serialized_name: None,
            column: column.to_string(),
            ty,
            key: false,
            searchable: false,
            flags: false,
            navigation: None,
        }
    }

    pub fn serialized_as(mut self, name: &str) -> Self {
        self.serialized_name = Some(name.to_string());
        self
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn flags(mut self) -> Self {
        self.flags = true;
        self
    }

    pub fn navigation(mut self, navigation: NavigationModel) -> Self {
        self.navigation = Some(navigation);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.navigation.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityModel {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub properties: Vec<PropertyModel>,
}

impl EntityModel {
    pub fn new(name: &str, table: &str) -> Self {
        EntityModel {
            name: name.to_string(),
            table: table.to_string(),
            properties: Vec::new(),
        }
    }

    pub fn with(mut self, property: PropertyModel) -> Self {
        self.properties.push(property);
        self
    }

    /// Find a property by declared name, then by serialized name.
    pub fn property(&self, name: &str) -> Option<&PropertyModel> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|p| p.serialized_name.as_deref() == Some(name))
            })
    }
}

/// Source of entity metadata.
pub trait MetadataProvider {
    fn entity(&self, name: &str) -> Option<&EntityModel>;

    /// The model a navigation property leads to, if the provider knows it.
    fn navigation_target(&self, navigation: &NavigationModel) -> Option<&EntityModel> {
        navigation
            .target_entity
            .as_deref()
            .and_then(|name| self.entity(name))
    }
}

/// In-memory [`MetadataProvider`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub entities: Vec<EntityModel>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entity: EntityModel) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl MetadataProvider for Catalog {
    fn entity(&self, name: &str) -> Option<&EntityModel> {
        self.entities.iter().find(|e| e.name == name)
    }
}

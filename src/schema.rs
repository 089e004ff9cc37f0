//! The schema registry: tables, their typed columns and the relationships
//! between them.
//!
//! The registry is the single source of truth the query builder checks typed
//! fields against and resolves implicit joins with. It is built once, from a
//! YAML document or through [SchemaRegistry::define_table], and only read
//! afterwards.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::CreateTable;
use crate::error::{Error, Result, SchemaError};
use crate::field::{Field, SqlType, TableRef};
use crate::table::{ColumnDef, ForeignKey};
use crate::tokenizer;

const BUNDLED_SCHEMA: &str = include_str!("../schema/sakila.yaml");

/// A relationship as declared on its child table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    /// Columns of the declaring table.
    pub columns: Vec<String>,
    /// The parent table.
    pub references: String,
    /// Columns of the parent table, its primary key when left out.
    #[serde(default)]
    pub referenced_columns: Vec<String>,
}

/// A table as written in a schema file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    tables: Vec<TableDef>,
}

/// A directed foreign-key edge from a child table to the table it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub name: String,
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
    /// A nullable child column makes the relationship optional: implicit
    /// joins through it keep child rows without a parent.
    pub optional: bool,
}

/// Registered description of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub relationships: Vec<Relationship>,
}

impl TableMeta {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    /// In definition order.
    tables: Vec<TableMeta>,
    index: HashMap<String, usize>,
}

/// Read access to one registered table.
#[derive(Debug, Clone, Copy)]
pub struct TableHandle<'r> {
    meta: &'r TableMeta,
}

impl<'r> TableHandle<'r> {
    pub fn name(&self) -> &'r str {
        &self.meta.name
    }

    pub fn columns(&self) -> &'r [ColumnDef] {
        &self.meta.columns
    }

    pub fn primary_key(&self) -> &'r [String] {
        &self.meta.primary_key
    }

    pub fn relationships(&self) -> &'r [Relationship] {
        &self.meta.relationships
    }

    pub fn column(&self, name: &str) -> std::result::Result<&'r ColumnDef, SchemaError> {
        self.meta.column(name).ok_or_else(|| SchemaError::UnknownColumn {
            table: self.meta.name.clone(),
            column: name.to_string(),
        })
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.meta.name)
    }

    /// A typed field for a column, checked against the declared type.
    ///
    /// ```
    /// use filmdb::SchemaRegistry;
    ///
    /// let registry = SchemaRegistry::bundled().unwrap();
    /// let film = registry.table("film").unwrap();
    /// assert!(film.field::<String>("title").is_ok());
    /// assert!(film.field::<i32>("title").is_err());
    /// ```
    pub fn field<T: SqlType>(&self, name: &str) -> std::result::Result<Field<T>, SchemaError> {
        let column = self.column(name)?;
        if column.data_type != T::DATA_TYPE {
            return Err(SchemaError::TypeMismatch {
                table: self.meta.name.clone(),
                column: name.to_string(),
                expected: T::DATA_TYPE,
                found: column.data_type,
            });
        }
        Ok(Field::new(self.table_ref(), name))
    }

    pub fn meta(&self) -> &'r TableMeta {
        self.meta
    }
}

/// Identifiers must render as bare SQL names.
pub(crate) fn check_name(name: &str) -> std::result::Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(SchemaError::InvalidName(name.to_string()));
    }
    if tokenizer::keyword(name).is_some() {
        return Err(SchemaError::ReservedName(name.to_string()));
    }
    Ok(())
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The movie-rental schema shipped with the crate, parsed once.
    pub fn bundled() -> Result<Arc<SchemaRegistry>> {
        static BUNDLED: OnceLock<std::result::Result<Arc<SchemaRegistry>, String>> = OnceLock::new();
        BUNDLED
            .get_or_init(|| {
                Self::from_yaml(BUNDLED_SCHEMA)
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .clone()
            .map_err(|e| Error::Config(format!("bundled schema is invalid: {e}")))
    }

    /// Load a registry from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a registry from a YAML string. Tables are defined in document order.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: SchemaFile = serde_yaml::from_str(yaml)?;
        let mut registry = Self::new();
        for table in file.tables {
            registry.define_table(table)?;
        }
        debug!(tables = registry.tables.len(), "schema registry loaded");
        Ok(registry)
    }

    /// Registers a table.
    ///
    /// Relationships may reference tables registered before, or the table
    /// itself. A relationship must reference the primary key of its target,
    /// with as many columns and compatible types.
    pub fn define_table(&mut self, def: TableDef) -> std::result::Result<TableHandle<'_>, SchemaError> {
        check_name(&def.name)?;
        if self.index.contains_key(&def.name) {
            return Err(SchemaError::DuplicateTable(def.name));
        }
        // relationship names double as path steps, so they must not shadow other tables
        for table in &self.tables {
            if let Some(rel) = table.relationships.iter().find(|r| r.name == def.name) {
                return Err(SchemaError::InvalidRelationship {
                    table: table.name.clone(),
                    name: rel.name.clone(),
                    reason: format!("its name is taken by table {}", def.name),
                });
            }
        }

        for (i, column) in def.columns.iter().enumerate() {
            check_name(&column.name)?;
            if def.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(SchemaError::DuplicateColumn {
                    table: def.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        if def.columns.is_empty() {
            return Err(SchemaError::InvalidQuery(format!("table {} has no columns", def.name)));
        }
        for key in &def.primary_key {
            if !def.columns.iter().any(|c| &c.name == key) {
                return Err(SchemaError::UnknownColumn {
                    table: def.name.clone(),
                    column: key.clone(),
                });
            }
        }

        let mut relationships: Vec<Relationship> = Vec::with_capacity(def.relationships.len());
        for rel in &def.relationships {
            let relationship = self.check_relationship(&def, rel)?;
            if relationships.iter().any(|r| r.name == relationship.name) {
                return Err(SchemaError::InvalidRelationship {
                    table: def.name.clone(),
                    name: rel.name.clone(),
                    reason: "defined twice".into(),
                });
            }
            relationships.push(relationship);
        }

        let position = self.tables.len();
        self.index.insert(def.name.clone(), position);
        self.tables.push(TableMeta {
            name: def.name,
            columns: def.columns,
            primary_key: def.primary_key,
            relationships,
        });
        Ok(TableHandle {
            meta: &self.tables[position],
        })
    }

    fn check_relationship(
        &self,
        def: &TableDef,
        rel: &RelationshipDef,
    ) -> std::result::Result<Relationship, SchemaError> {
        check_name(&rel.name)?;
        let invalid = |reason: String| SchemaError::InvalidRelationship {
            table: def.name.clone(),
            name: rel.name.clone(),
            reason,
        };
        if rel.name != rel.references && (self.index.contains_key(&rel.name) || rel.name == def.name) {
            return Err(invalid(format!("its name is taken by table {}", rel.name)));
        }

        // (columns, primary key) of the target
        let (target_columns, target_key) = if rel.references == def.name {
            (def.columns.as_slice(), def.primary_key.as_slice())
        } else {
            let target = self.table(&rel.references)?;
            (target.columns(), target.primary_key())
        };
        let referenced = if rel.referenced_columns.is_empty() {
            target_key.to_vec()
        } else {
            rel.referenced_columns.clone()
        };
        if rel.columns.is_empty() || rel.columns.len() != referenced.len() {
            return Err(invalid(format!(
                "{} columns reference {} columns",
                rel.columns.len(),
                referenced.len()
            )));
        }
        let same_key = referenced.len() == target_key.len() && referenced.iter().all(|c| target_key.contains(c));
        if !same_key {
            return Err(invalid(format!(
                "({}) is not the primary key of {}",
                referenced.join(", "),
                rel.references
            )));
        }

        let mut optional = false;
        for (local, remote) in rel.columns.iter().zip(&referenced) {
            let local_def = def
                .columns
                .iter()
                .find(|c| &c.name == local)
                .ok_or_else(|| SchemaError::UnknownColumn {
                    table: def.name.clone(),
                    column: local.clone(),
                })?;
            let remote_def = target_columns
                .iter()
                .find(|c| &c.name == remote)
                .ok_or_else(|| SchemaError::UnknownColumn {
                    table: rel.references.clone(),
                    column: remote.clone(),
                })?;
            let compatible = local_def.data_type == remote_def.data_type
                || (local_def.data_type.is_integer() && remote_def.data_type.is_integer());
            if !compatible {
                return Err(invalid(format!(
                    "{local} has type {} but {}.{remote} has type {}",
                    local_def.data_type, rel.references, remote_def.data_type
                )));
            }
            optional |= local_def.nullable;
        }

        Ok(Relationship {
            name: rel.name.clone(),
            from_table: def.name.clone(),
            from_columns: rel.columns.clone(),
            to_table: rel.references.clone(),
            to_columns: referenced,
            optional,
        })
    }

    pub fn table(&self, name: &str) -> std::result::Result<TableHandle<'_>, SchemaError> {
        self.index
            .get(name)
            .map(|&i| TableHandle { meta: &self.tables[i] })
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }

    /// Every table, in definition order.
    pub fn tables(&self) -> impl Iterator<Item = TableHandle<'_>> {
        self.tables.iter().map(|meta| TableHandle { meta })
    }

    /// The only relationship leading from `from` to `to`.
    ///
    /// # Errors
    /// [SchemaError::UnknownRelationship] when there is none,
    /// [SchemaError::AmbiguousRelationship] listing the candidates when there
    /// are several.
    pub fn resolve_relationship(
        &self,
        from: &str,
        to: &str,
    ) -> std::result::Result<&Relationship, SchemaError> {
        let source = self.table(from)?;
        self.table(to)?;
        let candidates: Vec<&Relationship> = source
            .relationships()
            .iter()
            .filter(|r| r.to_table == to)
            .collect();
        match candidates.as_slice() {
            [] => Err(SchemaError::UnknownRelationship {
                from: from.to_string(),
                to: to.to_string(),
            }),
            [relationship] => Ok(relationship),
            _ => Err(SchemaError::AmbiguousRelationship {
                from: from.to_string(),
                to: to.to_string(),
                candidates: candidates.iter().map(|r| r.name.clone()).collect(),
            }),
        }
    }

    /// A relationship of `from` picked by name.
    pub fn relationship(&self, from: &str, name: &str) -> std::result::Result<&Relationship, SchemaError> {
        self.table(from)?
            .relationships()
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| SchemaError::UnknownRelationship {
                from: from.to_string(),
                to: name.to_string(),
            })
    }

    /// `CREATE TABLE` statements for every table, parents first.
    pub fn create_statements(&self) -> Vec<CreateTable> {
        self.tables
            .iter()
            .map(|table| CreateTable {
                name: table.name.clone(),
                columns: table.columns.clone(),
                primary_key: table.primary_key.clone(),
                foreign_keys: table
                    .relationships
                    .iter()
                    .map(|r| ForeignKey {
                        columns: r.from_columns.clone(),
                        table: r.to_table.clone(),
                        referenced: r.to_columns.clone(),
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::data_type::DataType;

    fn table(name: &str, columns: Vec<ColumnDef>, primary_key: &[&str]) -> TableDef {
        TableDef {
            name: name.into(),
            columns,
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
            relationships: vec![],
        }
    }

    fn relationship(name: &str, columns: &[&str], references: &str) -> RelationshipDef {
        RelationshipDef {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            references: references.into(),
            referenced_columns: vec![],
        }
    }

    fn language() -> TableDef {
        table(
            "language",
            vec![
                ColumnDef::new("language_id", DataType::Int).not_null(),
                ColumnDef::new("name", DataType::Text).not_null(),
            ],
            &["language_id"],
        )
    }

    #[test]
    fn test_bundled_schema() {
        let registry = SchemaRegistry::bundled().unwrap();

        let names: Vec<&str> = registry.tables().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec!["language", "actor", "film", "category", "film_actor", "film_category"]
        );
        let film_actor = registry.table("film_actor").unwrap();
        assert_eq!(film_actor.primary_key(), ["actor_id", "film_id"]);
        assert_eq!(film_actor.column("actor_id").unwrap().data_type, DataType::SmallInt);
        assert!(matches!(
            film_actor.column("rating"),
            Err(SchemaError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_resolve_relationship() {
        let registry = SchemaRegistry::bundled().unwrap();

        let rel = registry.resolve_relationship("film_actor", "actor").unwrap();
        assert_eq!(rel.name, "actor");
        assert_eq!(rel.from_columns, ["actor_id"]);
        assert_eq!(rel.to_columns, ["actor_id"]);
        assert!(!rel.optional);

        assert_eq!(
            registry.resolve_relationship("film", "language"),
            Err(SchemaError::AmbiguousRelationship {
                from: "film".into(),
                to: "language".into(),
                candidates: vec!["language".into(), "original_language".into()],
            })
        );
        assert_eq!(
            registry.resolve_relationship("actor", "category"),
            Err(SchemaError::UnknownRelationship {
                from: "actor".into(),
                to: "category".into(),
            })
        );
        // edges are directed from child to parent
        assert!(registry.resolve_relationship("actor", "film_actor").is_err());
        assert_eq!(
            registry.resolve_relationship("film", "rental"),
            Err(SchemaError::UnknownTable("rental".into()))
        );
    }

    #[test]
    fn test_relationship_by_name() {
        let registry = SchemaRegistry::bundled().unwrap();

        let rel = registry.relationship("film", "original_language").unwrap();
        assert_eq!(rel.to_table, "language");
        assert!(rel.optional);
        assert!(registry.relationship("film", "director").is_err());
    }

    #[test]
    fn test_typed_field_lookup() {
        let registry = SchemaRegistry::bundled().unwrap();
        let film = registry.table("film").unwrap();

        let title = film.field::<String>("title").unwrap();
        assert_eq!(title.name(), "title");
        assert_eq!(title.table().name(), "film");
        assert!(matches!(
            film.field::<i32>("language_id"),
            Err(SchemaError::TypeMismatch {
                expected: DataType::Int,
                found: DataType::SmallInt,
                ..
            })
        ));
    }

    #[test]
    fn test_define_table_rejects_invalid_definitions() {
        let mut registry = SchemaRegistry::new();
        registry.define_table(language()).unwrap();

        assert_eq!(
            registry.define_table(language()).map(|_| ()),
            Err(SchemaError::DuplicateTable("language".into()))
        );
        assert_eq!(
            registry
                .define_table(table("select", vec![ColumnDef::new("a", DataType::Int)], &[]))
                .map(|_| ()),
            Err(SchemaError::ReservedName("select".into()))
        );
        assert_eq!(
            registry
                .define_table(table("my film", vec![ColumnDef::new("a", DataType::Int)], &[]))
                .map(|_| ()),
            Err(SchemaError::InvalidName("my film".into()))
        );
        assert!(matches!(
            registry.define_table(table(
                "t",
                vec![ColumnDef::new("a", DataType::Int), ColumnDef::new("a", DataType::Text)],
                &[]
            )),
            Err(SchemaError::DuplicateColumn { .. })
        ));
        assert!(matches!(
            registry.define_table(table("t", vec![ColumnDef::new("a", DataType::Int)], &["b"])),
            Err(SchemaError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_define_table_checks_relationships() {
        let mut registry = SchemaRegistry::new();
        registry.define_table(language()).unwrap();
        let columns = vec![
            ColumnDef::new("film_id", DataType::Int).not_null(),
            ColumnDef::new("language_id", DataType::SmallInt),
            ColumnDef::new("title", DataType::Text),
        ];

        let mut film = table("film", columns.clone(), &["film_id"]);
        film.relationships = vec![relationship("studio", &["language_id"], "studio")];
        assert_eq!(
            registry.define_table(film).map(|_| ()),
            Err(SchemaError::UnknownTable("studio".into()))
        );

        let mut film = table("film", columns.clone(), &["film_id"]);
        film.relationships = vec![relationship("language", &["title"], "language")];
        assert!(matches!(
            registry.define_table(film),
            Err(SchemaError::InvalidRelationship { .. })
        ));

        let mut film = table("film", columns.clone(), &["film_id"]);
        film.relationships = vec![relationship("language", &["language_id", "film_id"], "language")];
        assert!(matches!(
            registry.define_table(film),
            Err(SchemaError::InvalidRelationship { .. })
        ));

        let mut film = table("film", columns.clone(), &["film_id"]);
        film.relationships = vec![
            relationship("language", &["language_id"], "language"),
            relationship("language", &["language_id"], "language"),
        ];
        assert!(matches!(
            registry.define_table(film),
            Err(SchemaError::InvalidRelationship { .. })
        ));

        let mut film = table("film", columns, &["film_id"]);
        film.relationships = vec![
            relationship("language", &["language_id"], "language"),
            relationship("sequel_of", &["film_id"], "film"),
        ];
        let handle = registry.define_table(film).unwrap();
        assert_eq!(handle.relationships().len(), 2);
        // a nullable child column makes the relationship optional
        assert!(handle.relationships()[0].optional);
        assert!(!handle.relationships()[1].optional);
    }

    #[test]
    fn test_relationship_names_do_not_shadow_tables() {
        let mut registry = SchemaRegistry::new();
        registry.define_table(language()).unwrap();
        let mut film = table(
            "film",
            vec![
                ColumnDef::new("film_id", DataType::Int).not_null(),
                ColumnDef::new("language_id", DataType::SmallInt),
            ],
            &["film_id"],
        );
        film.relationships = vec![relationship("category", &["language_id"], "language")];
        registry.define_table(film).unwrap();

        let category = table("category", vec![ColumnDef::new("category_id", DataType::Int)], &["category_id"]);
        assert!(matches!(
            registry.define_table(category),
            Err(SchemaError::InvalidRelationship { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "tables:\n  - name: language\n    columns:\n      - {{ name: language_id, type: int, nullable: false }}\n      - {{ name: name, type: text }}\n    primary_key: [language_id]"
        )
        .unwrap();

        let registry = SchemaRegistry::load(file.path()).unwrap();
        let language = registry.table("language").unwrap();
        assert!(!language.columns()[0].nullable);
        assert!(language.columns()[1].nullable);
    }

    #[test]
    fn test_load_invalid_yaml() {
        assert!(matches!(SchemaRegistry::from_yaml("tables: 3"), Err(Error::Yaml(_))));
        assert!(matches!(
            SchemaRegistry::from_yaml("tables:\n  - { name: t, columns: [{ name: a, type: blob }] }"),
            Err(Error::Yaml(_))
        ));
        assert!(matches!(
            SchemaRegistry::load("/nonexistent/schema.yaml"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_create_statements() {
        let registry = SchemaRegistry::bundled().unwrap();

        let statements = registry.create_statements();
        assert_eq!(statements.len(), 6);
        assert_eq!(
            statements[4].to_string(),
            "CREATE TABLE film_actor (actor_id SMALLINT NOT NULL, film_id SMALLINT NOT NULL, \
             PRIMARY KEY (actor_id, film_id), FOREIGN KEY (actor_id) REFERENCES actor (actor_id), \
             FOREIGN KEY (film_id) REFERENCES film (film_id))"
        );
    }
}

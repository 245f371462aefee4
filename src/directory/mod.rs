//! Entity directory: credential lookup and entity resolution.
//!
//! The directory is a read-only table loaded once at startup. Lookups go
//! through the [`EntityDirectory`] trait so the backing store can change
//! without touching the scope filter or the aggregator.

use crate::error::{DashboardError, DashboardResult};
use crate::models::{Entity, Role, Scope};
use anyhow::{bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Resolves login credentials to an entity.
pub trait EntityDirectory {
    fn authenticate(&self, code: &str, password: &str) -> DashboardResult<Entity>;
}

/// One record of the directory file.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityRecord {
    pub code: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub school: Option<String>,
}

/// On-disk layout of the directory file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryFile {
    /// Password accepted for any known code.
    #[serde(default)]
    pub master_password: Option<String>,
    #[serde(default, rename = "entity")]
    pub entities: Vec<EntityRecord>,
}

struct Credential {
    password: SecretString,
    entity: Entity,
}

/// Table-driven directory backed by a TOML file.
pub struct StaticDirectory {
    credentials: HashMap<String, Credential>,
    master_password: Option<SecretString>,
}

impl StaticDirectory {
    /// Load and validate a directory file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read directory file: {}", path.display()))?;

        let file: DirectoryFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse directory file: {}", path.display()))?;

        let directory = Self::from_file(file)?;
        info!(
            "Loaded {} entities from {}",
            directory.len(),
            path.display()
        );
        Ok(directory)
    }

    /// Build a directory from parsed records, validating the hierarchy.
    pub fn from_file(file: DirectoryFile) -> Result<Self> {
        let mut credentials = HashMap::new();

        for record in file.entities {
            if record.code.is_empty() || record.password.is_empty() {
                bail!("Directory record with empty code or password");
            }
            let scope = scope_for_record(&record)?;
            let name = record
                .name
                .clone()
                .unwrap_or_else(|| default_name(record.role, &record.code));

            let entity = Entity {
                code: record.code.clone(),
                name,
                scope,
            };

            let credential = Credential {
                password: SecretString::from(record.password),
                entity,
            };

            if credentials.insert(record.code.clone(), credential).is_some() {
                bail!("Duplicate entity code in directory: {}", record.code);
            }
        }

        validate_hierarchy(&credentials)?;

        let master_password = file
            .master_password
            .filter(|p| !p.is_empty())
            .map(SecretString::from);

        Ok(Self {
            credentials,
            master_password,
        })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    #[allow(dead_code)] // Pairs with len()
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl EntityDirectory for StaticDirectory {
    fn authenticate(&self, code: &str, password: &str) -> DashboardResult<Entity> {
        if code.is_empty() || password.is_empty() {
            return Err(DashboardError::InvalidCredentials(code.to_string()));
        }

        let Some(credential) = self.credentials.get(code) else {
            debug!("Unknown entity code: {}", code);
            return Err(DashboardError::InvalidCredentials(code.to_string()));
        };

        if credential.password.expose_secret() == password {
            return Ok(credential.entity.clone());
        }

        if let Some(ref master) = self.master_password {
            if master.expose_secret() == password {
                warn!("Entity {} authenticated with the master password", code);
                return Ok(credential.entity.clone());
            }
        }

        Err(DashboardError::InvalidCredentials(code.to_string()))
    }
}

fn default_name(role: Role, code: &str) -> String {
    match role {
        Role::State => "Ceará".to_string(),
        Role::RegionalCoordination => format!("Regional {}", code),
        Role::Municipality => format!("Município {}", code),
        Role::School => format!("Escola {}", code),
    }
}

/// Derive the scope of a record, requiring exactly the identifiers its role needs.
fn scope_for_record(record: &EntityRecord) -> Result<Scope> {
    let require = |field: &Option<String>, label: &str| -> Result<String> {
        match field {
            Some(value) if !value.is_empty() => Ok(value.clone()),
            _ => bail!(
                "Entity {} ({:?}) is missing its {} identifier",
                record.code,
                record.role,
                label
            ),
        }
    };
    let forbid = |field: &Option<String>, label: &str| -> Result<()> {
        if field.is_some() {
            bail!(
                "Entity {} ({:?}) must not carry a {} identifier",
                record.code,
                record.role,
                label
            );
        }
        Ok(())
    };

    let scope = match record.role {
        Role::State => {
            forbid(&record.region, "region")?;
            forbid(&record.municipality, "municipality")?;
            forbid(&record.school, "school")?;
            Scope::State
        }
        Role::RegionalCoordination => {
            forbid(&record.municipality, "municipality")?;
            forbid(&record.school, "school")?;
            Scope::RegionalCoordination {
                region: require(&record.region, "region")?,
            }
        }
        Role::Municipality => {
            forbid(&record.school, "school")?;
            Scope::Municipality {
                region: require(&record.region, "region")?,
                municipality: require(&record.municipality, "municipality")?,
            }
        }
        Role::School => Scope::School {
            region: require(&record.region, "region")?,
            municipality: require(&record.municipality, "municipality")?,
            school: require(&record.school, "school")?,
        },
    };

    Ok(scope)
}

/// Reject records whose parents disagree with a registered parent entity.
fn validate_hierarchy(credentials: &HashMap<String, Credential>) -> Result<()> {
    let mut municipality_regions: HashMap<&str, &str> = HashMap::new();
    let mut seen_scopes: HashSet<&Scope> = HashSet::new();

    for credential in credentials.values() {
        let scope = &credential.entity.scope;
        if !seen_scopes.insert(scope) {
            bail!(
                "Entity {} shares its scope with another entity",
                credential.entity.code
            );
        }
        if let Scope::Municipality {
            region,
            municipality,
        } = scope
        {
            if let Some(other) = municipality_regions.insert(municipality, region) {
                if other != region.as_str() {
                    bail!(
                        "Municipality {} is listed under both region {} and region {}",
                        municipality,
                        other.min(region.as_str()),
                        other.max(region.as_str())
                    );
                }
            }
        }
    }

    for credential in credentials.values() {
        if let Scope::School {
            region,
            municipality,
            ..
        } = &credential.entity.scope
        {
            if let Some(parent_region) = municipality_regions.get(municipality.as_str()) {
                if *parent_region != region.as_str() {
                    bail!(
                        "School {} places municipality {} in region {}, but the directory has it in {}",
                        credential.entity.code,
                        municipality,
                        region,
                        parent_region
                    );
                }
            }
        }
    }

    Ok(())
}

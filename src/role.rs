//! The node's own role
//!
//! Resolved once at boot from configuration and, when still unknown,
//! filled in later by the conductor's assignment. After it becomes concrete
//! it never changes for the life of the process. An assigned role can be
//! persisted to disk and read back on the next boot.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, RoleError};
use crate::protocol::{LinkAddress, Role};
use crate::songs::Song;

/// File name of the persisted role in the platform data directory
pub const ROLE_FILE_NAME: &str = "role.toml";

/// How the role is provisioned at boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RoleSource {
    /// Start unknown and wait for the conductor
    Auto,
    /// Role pinned in configuration
    Fixed { role: Role },
    /// Look the node's own address up in a provisioning table
    AddressTable { entries: Vec<AddressRole> },
    /// Role persisted by an earlier auto-assigned run
    Stored,
}

impl Default for RoleSource {
    fn default() -> Self {
        RoleSource::Auto
    }
}

/// One row of the provisioning table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRole {
    pub address: LinkAddress,
    pub role: Role,
}

impl RoleSource {
    /// Role the node boots with; table misses and a missing stored role
    /// fall back to `Unknown`
    pub fn resolve(&self, own: LinkAddress, store: Option<&RoleStore>) -> Role {
        match self {
            RoleSource::Auto => {
                tracing::info!("Auto-assign mode, waiting for role assignment");
                Role::Unknown
            }
            RoleSource::Fixed { role } => *role,
            RoleSource::AddressTable { entries } => {
                match entries.iter().find(|entry| entry.address == own) {
                    Some(entry) => {
                        tracing::info!("Found {} in address table: {}", own, entry.role);
                        entry.role
                    }
                    None => {
                        tracing::warn!("Address {} not in table, falling back to auto-assign", own);
                        Role::Unknown
                    }
                }
            }
            RoleSource::Stored => match store.map(RoleStore::load) {
                Some(Ok(Some(role))) => {
                    tracing::info!("Read stored role: {}", role);
                    role
                }
                Some(Ok(None)) | None => {
                    tracing::warn!("No stored role, falling back to auto-assign");
                    Role::Unknown
                }
                Some(Err(e)) => {
                    tracing::warn!("Failed to read stored role ({}), falling back to auto-assign", e);
                    Role::Unknown
                }
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredRole {
    role: Role,
}

/// Small TOML file holding the last role granted to this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleStore {
    path: PathBuf,
}

impl RoleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location in the platform data directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "ensemble", "ensemble-sync")
            .map(|dirs| dirs.data_dir().join(ROLE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored role; `None` when nothing has been stored yet
    pub fn load(&self) -> Result<Option<Role>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        let stored: StoredRole = toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?;
        Ok(Some(stored.role).filter(|role| !role.is_unknown()))
    }

    pub fn save(&self, role: Role) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let text = toml::to_string(&StoredRole { role }).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(&self.path, text)?;
        tracing::info!("Saved role {} to {}", role, self.path.display());
        Ok(())
    }
}

/// Local role shared between the discovery and control workers
#[derive(Debug)]
pub struct LocalRole {
    role: RwLock<Role>,
    store: Option<RoleStore>,
}

impl LocalRole {
    pub fn new(initial: Role) -> Self {
        Self {
            role: RwLock::new(initial),
            store: None,
        }
    }

    /// Like `new`, but an accepted assignment is also written to `store`
    pub fn with_store(initial: Role, store: RoleStore) -> Self {
        Self {
            role: RwLock::new(initial),
            store: Some(store),
        }
    }

    pub fn get(&self) -> Role {
        *self.role.read()
    }

    pub fn is_conductor(&self) -> bool {
        self.get().is_conductor()
    }

    /// Accept a part granted by the conductor. Only valid while unknown.
    pub fn accept_assignment(&self, granted: Role) -> std::result::Result<(), RoleError> {
        if granted.part_number().is_none() {
            return Err(RoleError::NotAPart(granted.to_string()));
        }
        self.set_once(granted)?;

        if let Some(store) = &self.store {
            if let Err(e) = store.save(granted) {
                tracing::warn!("Failed to persist role to {}: {}", store.path().display(), e);
            }
        }
        Ok(())
    }

    /// Explicit override (debug or provisioning pin). Only valid while unknown.
    pub fn pin(&self, role: Role) -> std::result::Result<(), RoleError> {
        if role.is_unknown() {
            return Err(RoleError::NotAPart(role.to_string()));
        }
        self.set_once(role)
    }

    fn set_once(&self, role: Role) -> std::result::Result<(), RoleError> {
        let mut current = self.role.write();
        if !current.is_unknown() {
            return Err(RoleError::AlreadyResolved(current.to_string()));
        }
        *current = role;
        tracing::info!("Role set to: {} ({})", role, role.to_wire());
        Ok(())
    }

    /// Whether this node should play `song` with its current role
    pub fn should_play(&self, song: &Song) -> bool {
        should_play(self.get(), song)
    }
}

/// Playback gate: conductor and unknown never play; performers play full
/// ensemble pieces and any piece whose mask includes their part.
pub fn should_play(role: Role, song: &Song) -> bool {
    match role.part_bit() {
        None => false,
        Some(bit) => song.kind.is_full_ensemble() || song.parts_mask & bit != 0,
    }
}

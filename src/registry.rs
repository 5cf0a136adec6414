//! Card content registry returned by GET STATUS
//!
//! With P2=00 the card answers with plain length-value records:
//! `len ‖ AID ‖ lifecycle ‖ privileges`, plus a list of executable-module
//! AIDs for the load-files-and-modules category.

use crate::aid::Aid;
use crate::constants::get_status_p1;
use crate::{Error, Result};

/// What kind of registry entry a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The issuer security domain itself
    IssuerSecurityDomain,
    /// An application instance
    Application,
    /// A supplementary security domain
    SecurityDomain,
    /// An executable load file
    ExecutableLoadFile,
    /// An executable load file reported together with its modules
    ExecutableLoadFileAndModules,
}

/// One registry record
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// AID of the object
    pub aid: Aid,
    /// Lifecycle state byte
    pub lifecycle: u8,
    /// Privilege byte
    pub privileges: u8,
    /// Entry kind
    pub kind: EntryKind,
    /// Module AIDs, for the load-files-and-modules category
    pub executable_aids: Vec<Aid>,
}

/// All records reported by a full GET STATUS sweep
#[derive(Debug, Clone, Default)]
pub struct AidRegistry {
    entries: Vec<RegistryEntry>,
}

impl AidRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry
    pub fn add(&mut self, entry: RegistryEntry) {
        self.entries.push(entry);
    }

    /// All entries, in the order the card reported them
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Application and security-domain entries
    pub fn applications(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter().filter(|e| {
            matches!(
                e.kind,
                EntryKind::Application | EntryKind::SecurityDomain
            )
        })
    }

    /// Executable load-file entries
    pub fn packages(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter().filter(|e| {
            matches!(
                e.kind,
                EntryKind::ExecutableLoadFile | EntryKind::ExecutableLoadFileAndModules
            )
        })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse the concatenated records of one GET STATUS category
pub(crate) fn parse_records(data: &[u8], p1: u8, registry: &mut AidRegistry) -> Result<()> {
    let mut index = 0;
    while index < data.len() {
        let (aid, next) = read_aid(data, index)?;
        index = next;
        if index + 2 > data.len() {
            return Err(Error::InvalidResponse("truncated registry record"));
        }
        let lifecycle = data[index];
        let privileges = data[index + 1];
        index += 2;

        let kind = match p1 {
            get_status_p1::ISSUER_SECURITY_DOMAIN => EntryKind::IssuerSecurityDomain,
            get_status_p1::APPLICATIONS => {
                if privileges & 0x80 == 0 {
                    EntryKind::Application
                } else {
                    EntryKind::SecurityDomain
                }
            }
            get_status_p1::EXEC_LOAD_FILES_AND_MODULES => EntryKind::ExecutableLoadFileAndModules,
            _ => EntryKind::ExecutableLoadFile,
        };

        let mut executable_aids = Vec::new();
        if p1 == get_status_p1::EXEC_LOAD_FILES_AND_MODULES {
            if index >= data.len() {
                return Err(Error::InvalidResponse("truncated registry record"));
            }
            let count = data[index];
            index += 1;
            for _ in 0..count {
                let (module, next) = read_aid(data, index)?;
                executable_aids.push(module);
                index = next;
            }
        }

        registry.add(RegistryEntry {
            aid,
            lifecycle,
            privileges,
            kind,
            executable_aids,
        });
    }
    Ok(())
}

fn read_aid(data: &[u8], index: usize) -> Result<(Aid, usize)> {
    if index >= data.len() {
        return Err(Error::InvalidResponse("truncated registry record"));
    }
    let len = data[index] as usize;
    let start = index + 1;
    if start + len > data.len() {
        return Err(Error::InvalidResponse("truncated registry record"));
    }
    let aid = Aid::new(&data[start..start + len])?;
    Ok((aid, start + len))
}

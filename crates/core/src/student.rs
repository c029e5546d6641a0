//! Students and the registry that owns their identity.

use crate::error::Result;
use crate::ids::StudentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Who pays for a student's program.
///
/// Serialized as a nullable boolean (`null`, `true`, `false`) so snapshots
/// stay readable by anything that expects the plain tri-state field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
#[repr(u8)]
pub enum FinancedStatus {
    /// Not looked up yet.
    #[default]
    Unknown = 0,
    /// Funded by a third party, billed at full price.
    Financed = 1,
    /// Self-funded, billed at the discounted rate.
    AutoFinanced = 2,
}

impl FinancedStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Financed,
            2 => Self::AutoFinanced,
            _ => Self::Unknown,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Short label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Financed => "F",
            Self::AutoFinanced => "AF",
        }
    }
}

impl From<Option<bool>> for FinancedStatus {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Unknown,
            Some(true) => Self::Financed,
            Some(false) => Self::AutoFinanced,
        }
    }
}

impl From<FinancedStatus> for Option<bool> {
    fn from(status: FinancedStatus) -> Self {
        match status {
            FinancedStatus::Unknown => None,
            FinancedStatus::Financed => Some(true),
            FinancedStatus::AutoFinanced => Some(false),
        }
    }
}

/// A mentored student.
///
/// Identity is the platform id. The financing status is the only mutable
/// field and moves at most once, from `Unknown` to a resolved value, so a
/// `Student` can be shared across enrichment workers without a lock.
#[derive(Debug)]
pub struct Student {
    id: StudentId,
    name: String,
    financed: AtomicU8,
}

impl Student {
    pub fn new(id: StudentId, name: impl Into<String>) -> Self {
        Self::with_status(id, name, FinancedStatus::Unknown)
    }

    pub fn with_status(id: StudentId, name: impl Into<String>, financed: FinancedStatus) -> Self {
        Self {
            id,
            name: name.into(),
            financed: AtomicU8::new(financed as u8),
        }
    }

    pub fn id(&self) -> &StudentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn financed(&self) -> FinancedStatus {
        FinancedStatus::from_u8(self.financed.load(Ordering::Acquire))
    }

    /// Records the financing status if it is still unknown.
    ///
    /// Returns the status that is in effect afterwards: `status` when this
    /// call won the transition, the earlier value otherwise. Passing
    /// `Unknown` never changes anything.
    pub fn resolve(&self, status: FinancedStatus) -> FinancedStatus {
        if !status.is_resolved() {
            return self.financed();
        }

        match self.financed.compare_exchange(
            FinancedStatus::Unknown as u8,
            status as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => status,
            Err(current) => FinancedStatus::from_u8(current),
        }
    }

    pub fn snapshot(&self) -> StudentSnapshot {
        StudentSnapshot {
            student_id: self.id.clone(),
            name: self.name.clone(),
            financed: self.financed(),
        }
    }
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.financed().label())
    }
}

/// Persisted form of a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub student_id: StudentId,
    pub name: String,
    #[serde(default)]
    pub financed: FinancedStatus,
}

/// Single source of truth for student identity.
///
/// Created per run and passed by reference to whatever needs lookups. When a
/// snapshot path is set, the registry is loaded from it eagerly and written
/// back synchronously on every creation.
#[derive(Debug, Default)]
pub struct StudentRegistry {
    students: HashMap<StudentId, Arc<Student>>,
    snapshot_path: Option<PathBuf>,
}

impl StudentRegistry {
    /// Creates an in-memory registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry backed by a JSON snapshot file.
    ///
    /// A missing file yields an empty registry; an unreadable one is an error.
    pub fn persistent(path: impl Into<PathBuf>) -> Result<Self> {
        let mut registry = Self {
            students: HashMap::new(),
            snapshot_path: Some(path.into()),
        };
        registry.load()?;
        Ok(registry)
    }

    fn load(&mut self) -> Result<()> {
        let Some(path) = self.snapshot_path.clone() else {
            return Ok(());
        };

        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No student snapshot yet");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let entries: Vec<StudentSnapshot> = serde_json::from_slice(&raw)?;
        let count = entries.len();
        self.merge(entries);

        info!(path = %path.display(), count, "Loaded student snapshot");
        Ok(())
    }

    /// Merges snapshot entries by id. Entries already present win.
    pub fn merge(&mut self, entries: impl IntoIterator<Item = StudentSnapshot>) {
        for entry in entries {
            self.students
                .entry(entry.student_id.clone())
                .or_insert_with(|| {
                    Arc::new(Student::with_status(
                        entry.student_id,
                        entry.name,
                        entry.financed,
                    ))
                });
        }
    }

    /// Returns the student for `id`, creating it when a name is available.
    ///
    /// A known id always yields the existing instance and ignores `name`.
    /// An unknown id without a name yields `None`.
    pub fn get_or_create(
        &mut self,
        id: &StudentId,
        name: Option<&str>,
    ) -> Result<Option<Arc<Student>>> {
        if let Some(student) = self.students.get(id) {
            return Ok(Some(student.clone()));
        }

        let Some(name) = name else {
            return Ok(None);
        };

        let student = Arc::new(Student::new(id.clone(), name));
        self.students.insert(id.clone(), student.clone());
        debug!(student_id = %id, name, "Created student");

        self.save()?;
        Ok(Some(student))
    }

    pub fn get(&self, id: &StudentId) -> Option<Arc<Student>> {
        self.students.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn is_persistent(&self) -> bool {
        self.snapshot_path.is_some()
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Students sorted by id.
    pub fn snapshot(&self) -> Vec<StudentSnapshot> {
        let mut entries: Vec<StudentSnapshot> =
            self.students.values().map(|s| s.snapshot()).collect();
        entries.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        entries
    }

    /// Writes the snapshot file. No-op for in-memory registries.
    ///
    /// The file is replaced atomically: the new content goes to a sibling
    /// temp file that is then renamed over the old one, so an interrupted
    /// write leaves the previous snapshot intact.
    pub fn save(&self) -> Result<()> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, &self.snapshot())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

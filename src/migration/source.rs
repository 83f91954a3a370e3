use super::index::Migrations;
use super::types::{MigrationDirection, MigrationError, MigrationFile, MigrationKind, MigrationVersion};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// `<version>_<name>.<up|down>.<sql|yaml>`
static FLAT_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+)_(.+)\.(up|down)\.(sql|yaml|yml)$").expect("valid migration file pattern")
});

/// `<version>_<name>/` holding `up.sql`, `down.yaml`, ...
static VERSION_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)_(.+)$").expect("valid migration directory pattern"));

static DIR_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(up|down)\.(sql|yaml|yml)$").expect("valid migration file pattern"));

/// Migration files discovered in a migrations directory.
///
/// Both layouts are understood: flat files (`1000_init.up.sql`) and one
/// directory per version (`1000_init/up.sql`). Names that match neither are
/// skipped.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
    up: Migrations,
    down: Migrations,
    files: BTreeMap<(MigrationVersion, MigrationDirection), Vec<MigrationFile>>,
    names: BTreeMap<MigrationVersion, String>,
}

impl FileSource {
    /// Create an empty source for `root`. Call [`FileSource::scan`] to populate it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            up: Migrations::new(),
            down: Migrations::new(),
            files: BTreeMap::new(),
            names: BTreeMap::new(),
        }
    }

    /// Create a source and scan it.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, MigrationError> {
        let mut source = Self::new(root);
        source.scan().await?;
        Ok(source)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the directory and replace everything known about it.
    pub async fn scan(&mut self) -> Result<(), MigrationError> {
        if !fs::try_exists(&self.root).await? {
            return Err(MigrationError::DirectoryNotFound(self.root.clone()));
        }

        let mut up = Migrations::new();
        let mut down = Migrations::new();
        let mut files: BTreeMap<_, Vec<MigrationFile>> = BTreeMap::new();
        let mut names = BTreeMap::new();

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(file) = parse_entry(entry.path(), entry.depth()) else {
                debug!(path = %entry.path().display(), "Skipping non-migration file");
                continue;
            };

            match file.direction {
                MigrationDirection::Up => up.append(file.version),
                MigrationDirection::Down => down.append(file.version),
            };
            names
                .entry(file.version)
                .or_insert_with(|| file.name.clone());
            files
                .entry((file.version, file.direction))
                .or_default()
                .push(file);
        }

        // Up runs SQL before metadata, down undoes metadata before SQL
        for ((_, direction), group) in files.iter_mut() {
            match direction {
                MigrationDirection::Up => group.sort_by_key(|f| f.kind),
                MigrationDirection::Down => group.sort_by_key(|f| std::cmp::Reverse(f.kind)),
            }
        }

        debug!(
            up = up.len(),
            down = down.len(),
            root = %self.root.display(),
            "Scanned migrations"
        );

        self.up = up;
        self.down = down;
        self.files = files;
        self.names = names;
        Ok(())
    }

    /// Versions with at least one up file.
    pub fn up(&self) -> &Migrations {
        &self.up
    }

    /// Versions with at least one down file.
    pub fn down(&self) -> &Migrations {
        &self.down
    }

    /// Whether any file exists for `version`.
    pub fn contains(&self, version: MigrationVersion) -> bool {
        self.names.contains_key(&version)
    }

    /// Descriptive name of a version (`init` for `1000_init.up.sql`).
    pub fn name(&self, version: MigrationVersion) -> Option<&str> {
        self.names.get(&version).map(String::as_str)
    }

    /// Files for one version and direction, in execution order.
    pub fn files(&self, version: MigrationVersion, direction: MigrationDirection) -> &[MigrationFile] {
        self.files
            .get(&(version, direction))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All known versions, ascending, whatever their direction.
    pub fn versions(&self) -> impl Iterator<Item = MigrationVersion> + '_ {
        self.names.keys().copied()
    }

    /// Read the content of a migration file.
    pub async fn read(&self, file: &MigrationFile) -> Result<String, MigrationError> {
        Ok(fs::read_to_string(&file.path).await?)
    }
}

fn parse_entry(path: &Path, depth: usize) -> Option<MigrationFile> {
    let file_name = path.file_name()?.to_str()?;

    let (version, name, direction, extension) = match depth {
        1 => {
            let captures = FLAT_FILE.captures(file_name)?;
            (
                captures[1].parse().ok()?,
                captures[2].to_string(),
                captures[3].to_string(),
                captures[4].to_string(),
            )
        }
        2 => {
            let dir_name = path.parent()?.file_name()?.to_str()?;
            let dir = VERSION_DIR.captures(dir_name)?;
            let file = DIR_FILE.captures(file_name)?;
            (
                dir[1].parse().ok()?,
                dir[2].to_string(),
                file[1].to_string(),
                file[2].to_string(),
            )
        }
        _ => return None,
    };

    let direction = match direction.as_str() {
        "up" => MigrationDirection::Up,
        _ => MigrationDirection::Down,
    };

    Some(MigrationFile {
        version,
        name,
        direction,
        kind: MigrationKind::from_extension(&extension)?,
        path: path.to_path_buf(),
    })
}

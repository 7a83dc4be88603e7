use crate::jvm::class_graph::{ClassGraph, ClassPathHierarchy};
use crate::jvm::{ClassReader, ClassWriter, ComputeFlags, Error};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration for re-encoding class files
pub struct Settings {
    /// What the writer recomputes instead of taking from the input
    ///
    /// Defaults to recomputing frames (and therefore maximum stack/locals).
    pub compute: ComputeFlags,

    /// Directories searched for `.class` files when the frame engine needs to know about a class
    /// that is not part of the standard `java.lang` types
    ///
    /// A class `foo/Bar` is looked up as `<dir>/foo/Bar.class`, trying directories in order.
    pub class_path: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            compute: ComputeFlags::COMPUTE_FRAMES,
            class_path: vec![],
        }
    }
}

impl Settings {
    /// Append a directory to the class path
    pub fn add_class_path(&mut self, directory: PathBuf) -> Result<(), SettingsError> {
        if !directory.is_dir() {
            return Err(SettingsError::NotADirectory(directory));
        }
        self.class_path.push(directory);
        Ok(())
    }

    /// Class hierarchy backed by the standard types and the class path
    pub fn class_hierarchy(&self) -> ClassPathHierarchy {
        ClassPathHierarchy::new(ClassGraph::with_java_classes(), self.class_path.clone())
    }

    /// Decode a class and encode it again
    ///
    /// Under [`ComputeFlags::COMPUTE_NONE`], a well formed input comes back byte for byte.
    pub fn reencode(&self, hierarchy: &ClassPathHierarchy, bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let reader = ClassReader::parse(bytes)?;
        log::debug!(
            "Re-encoding {} (version {}.{})",
            reader.class_name()?,
            reader.version().major_version,
            reader.version().minor_version
        );
        let mut writer = ClassWriter::from_reader(&reader, self.compute, hierarchy);
        reader.accept(&mut writer)?;
        writer.to_bytes()
    }
}

/// Named compute mode, as accepted on the command line
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ComputeMode {
    /// Keep maximums and frames from the input
    None,

    /// Recompute maximum stack and locals
    Maxs,

    /// Recompute maximums and stack map frames
    Frames,
}

impl ComputeMode {
    pub const NAMES: [&'static str; 3] = ["none", "maxs", "frames"];

    pub fn flags(self) -> ComputeFlags {
        match self {
            ComputeMode::None => ComputeFlags::COMPUTE_NONE,
            ComputeMode::Maxs => ComputeFlags::COMPUTE_MAXS,
            ComputeMode::Frames => ComputeFlags::COMPUTE_FRAMES,
        }
    }
}

impl FromStr for ComputeMode {
    type Err = SettingsError;

    fn from_str(mode: &str) -> Result<ComputeMode, SettingsError> {
        match mode {
            "none" => Ok(ComputeMode::None),
            "maxs" => Ok(ComputeMode::Maxs),
            "frames" => Ok(ComputeMode::Frames),
            other => Err(SettingsError::UnknownComputeMode(String::from(other))),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SettingsError {
    UnknownComputeMode(String),

    /// Class path entry that isn't a directory
    NotADirectory(PathBuf),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::UnknownComputeMode(mode) => write!(
                f,
                "unknown compute mode '{}' (expected one of {})",
                mode,
                ComputeMode::NAMES.join(", ")
            ),
            SettingsError::NotADirectory(path) => {
                write!(f, "class path entry {} is not a directory", path.display())
            }
        }
    }
}

impl std::error::Error for SettingsError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compute_modes() {
        for name in ComputeMode::NAMES {
            assert!(name.parse::<ComputeMode>().is_ok());
        }
        assert_eq!("maxs".parse::<ComputeMode>().unwrap().flags(), ComputeFlags::COMPUTE_MAXS);
        assert_eq!(
            "all".parse::<ComputeMode>(),
            Err(SettingsError::UnknownComputeMode(String::from("all")))
        );
    }

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.compute, ComputeFlags::COMPUTE_FRAMES);
        assert!(settings.class_path.is_empty());
    }

    #[test]
    fn class_path_must_be_directories() {
        let mut settings = Settings::default();
        let missing = PathBuf::from("definitely/not/a/real/dir");
        assert_eq!(
            settings.add_class_path(missing.clone()),
            Err(SettingsError::NotADirectory(missing))
        );
        settings.add_class_path(std::env::temp_dir()).unwrap();
        assert_eq!(settings.class_path, vec![std::env::temp_dir()]);
    }
}
